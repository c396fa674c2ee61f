//! Query answering: retrieve, assemble, generate, validate citations

mod citation;
mod orchestrator;
mod response;

pub use citation::{validate_citations, ValidatedAnswer};
pub use orchestrator::{EmptyContextPolicy, RagConfig, RagOrchestrator};
pub use response::{AnswerError, AnswerErrorCode, AnswerResponse, Citation, Grounding};
