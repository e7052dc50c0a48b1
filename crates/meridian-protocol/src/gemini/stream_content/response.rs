use crate::gemini::generate_content::response::GenerateContentResponse;

/// `streamGenerateContent` emits a sequence of JSON objects with the exact
/// same shape as the non-streaming response, one per incremental candidate
/// update.
pub type StreamGenerateContentResponse = GenerateContentResponse;
