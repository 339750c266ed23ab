//! The memory domain: document type, loose dates, the repository that
//! embeds and retrieves memories, and the on-disk mirror.

pub mod dates;
pub mod mirror;
pub mod repository;
pub mod types;

pub use repository::{MemoryHit, MemoryPage, MemoryRepository, SortBy};
pub use types::{MemoryDocument, MemoryFilters, MemoryPatch, MemoryType};
