// Core rate limiting module - per-identifier sliding window with block escalation.

pub mod rate_limit_models;
pub mod rate_limiter;

pub use rate_limit_models::*;
pub use rate_limiter::*;
