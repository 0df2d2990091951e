// Core comments module - threaded comments, public read path and moderation.

pub mod comment_models;
pub mod comment_service;
pub mod comment_store;
pub mod comment_tree;

pub use comment_models::*;
pub use comment_service::*;
pub use comment_store::*;
