//! The prompt-based function-calling engine: recognizes tool invocations
//! written into model prose, repairs their often-malformed JSON parameters,
//! and sanitizes the prose itself for display once calls are extracted.

mod decode;
mod idgen;
mod json_repair;
mod parser;
mod result_detect;
mod sanitizer;
mod trigger;
mod types;

pub use json_repair::JsonRepairer;
pub use parser::FunctionCallParser;
pub use result_detect::is_tool_result;
pub use sanitizer::{sanitize, SanitizerState};
pub use trigger::{
    contains_trigger, derive as derive_trigger, find_trigger_end, generate as generate_trigger, trigger_regex,
};
pub use types::{FCParseError, FCParseErrorCode, ParseOutcome, ToolCall};

pub mod idgen_ext {
    pub use crate::idgen::generate as generate_id;
}
