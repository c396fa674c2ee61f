//! Text extraction implementations

mod document_intelligence;
mod plain_text;
mod routing;

pub use document_intelligence::{DocumentIntelligenceConfig, DocumentIntelligenceExtractor};
pub use plain_text::PlainTextExtractor;
pub use routing::RoutingExtractor;
