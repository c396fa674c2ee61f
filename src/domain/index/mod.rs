//! Passage index contract
//!
//! This module provides:
//! - `IndexedPassage`, the persisted unit of retrieval
//! - `IndexStore`, the contract every vector/keyword backend implements
//! - search queries, filters and scored results

mod passage;
mod store;

pub use passage::{DocumentVersion, IndexedPassage, PassageId};
pub use store::{CommittedVersion, IndexStore, ScoredPassage, SearchFilter, SearchQuery};
