//! Pairwise request/response/stream transforms between the OpenAI, Anthropic,
//! and Gemini wire shapes, plus the `middleware` layer that picks the right
//! transform pair for a given (source protocol, destination protocol, op).

pub mod count_tokens;
pub mod generate_content;
pub mod get_model;
pub mod list_models;
pub mod middleware;
pub mod stream2nostream;
