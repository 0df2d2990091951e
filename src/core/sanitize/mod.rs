// Core content-safety module - markup stripping and spam heuristics for comments.

pub mod sanitizer;
pub mod spam_rules;

pub use sanitizer::*;
