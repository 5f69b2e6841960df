//! Client for the generation backend.

mod client;

pub use client::{
    ChatCompletionRequest, GenerateClient, GenerationError, LlmClient, LlmClientBuilder,
};
