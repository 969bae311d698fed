//! Retrieval core: split source files into chunks, persist them, embed them
//! with a content-hash cache and answer queries with exhaustive cosine search
//! behind a lexical first stage.

pub mod chunker;
pub mod context;
pub mod embedding;
pub mod error;
pub mod hash;
pub mod index;
pub mod progress;
pub mod search;
pub mod similarity;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{IndexError, Result};
pub use index::VectorIndex;
pub use store::ContentStore;
