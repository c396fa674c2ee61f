//! Index store implementations

mod azure_search;
mod in_memory;

pub use azure_search::{odata_filter, AzureSearchConfig, AzureSearchIndexStore};
pub use in_memory::InMemoryIndexStore;
