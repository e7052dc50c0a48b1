use serde::{Deserialize, Serialize};

use super::types::InputTokenObjectType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InputTokenCountResponse {
    pub object: InputTokenObjectType,
    pub input_tokens: i64,
}
