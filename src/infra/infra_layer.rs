// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "captcha/mod.rs"]
pub mod captcha;

#[path = "comments/mod.rs"]
pub mod comments;
