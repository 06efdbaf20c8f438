//! Memory store implementations for contextweave.

pub mod in_memory;
pub mod vector;
pub mod window;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use vector::cosine_similarity;
pub use window::{keyword_score, recent_window, relevant_selection};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
