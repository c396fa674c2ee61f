//! Source document storage implementations

mod azure_blob;
mod in_memory;

pub use azure_blob::{AzureBlobConfig, AzureBlobStorage};
pub use in_memory::InMemoryBlobStorage;
