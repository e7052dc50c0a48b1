pub mod count_tokens;
pub mod generate_content;
pub mod get_model;
pub mod list_models;
pub mod stream_content;
pub mod types;

pub use types::*;
