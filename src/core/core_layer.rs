// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "captcha/mod.rs"]
pub mod captcha;

#[path = "comments/mod.rs"]
pub mod comments;

#[path = "rate_limit/mod.rs"]
pub mod rate_limit;

#[path = "sanitize/mod.rs"]
pub mod sanitize;
