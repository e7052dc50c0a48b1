//! Generates ids for tool calls and repaired fields that arrived empty.

pub fn generate() -> String {
    uuid::Uuid::new_v4().to_string()
}
