use std::collections::BTreeMap;

use serde_json::Value;

/// A single tool invocation extracted from model prose.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: BTreeMap<String, Value>,
    pub id: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: BTreeMap<String, Value>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            id: id.into(),
        }
    }
}

/// Why the parser emitted no call for a given input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FCParseErrorCode {
    EmptyContent,
    NoTrigger,
    NoInvoke,
    UnclosedInvoke,
    UnclosedFunctionCalls,
    MissingInvokeName,
    InvalidJsonParam,
    TriggerInThinking,
    ParseFailed,
}

impl FCParseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FCParseErrorCode::EmptyContent => "EMPTY_CONTENT",
            FCParseErrorCode::NoTrigger => "NO_TRIGGER",
            FCParseErrorCode::NoInvoke => "NO_INVOKE",
            FCParseErrorCode::UnclosedInvoke => "UNCLOSED_INVOKE",
            FCParseErrorCode::UnclosedFunctionCalls => "UNCLOSED_FUNCTION_CALLS",
            FCParseErrorCode::MissingInvokeName => "MISSING_INVOKE_NAME",
            FCParseErrorCode::InvalidJsonParam => "INVALID_JSON_PARAM",
            FCParseErrorCode::TriggerInThinking => "TRIGGER_IN_THINKING",
            FCParseErrorCode::ParseFailed => "PARSE_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FCParseError {
    pub code: FCParseErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl FCParseError {
    pub fn new(code: FCParseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for FCParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for FCParseError {}

/// Result of a parse attempt: zero or more calls, or a diagnostic explaining why none were found.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub calls: Vec<ToolCall>,
    pub error: Option<FCParseError>,
}

impl ParseOutcome {
    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self { calls, error: None }
    }

    pub fn error(error: FCParseError) -> Self {
        Self {
            calls: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
