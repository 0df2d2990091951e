// Implementations for comment storage.

pub mod in_memory;
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::InMemoryCommentStore;
pub use sqlite_store::SqliteCommentStore;
