//! Contracts shared with language-model providers.
//!
//! The tool runtime never talks to a model provider directly. Components that
//! need a model (the delegated router) depend on the [`ModelAdapter`] trait.

#![warn(missing_docs, clippy::pedantic)]

mod traits;

pub use traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk,
    InferenceRequest, MessageRole, ModelAdapter, PromptMessage, ResponseFormat, collect_text,
};
