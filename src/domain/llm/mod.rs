//! Generation provider domain models and traits

mod message;
mod params;
mod provider;

pub use message::{Message, MessageRole};
pub use params::{Completion, FinishReason, GenerationParams, Usage};
pub use provider::GenerationProvider;

#[cfg(test)]
pub use provider::mock::MockGenerationProvider;
