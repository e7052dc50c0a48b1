use super::types::Model;

/// `models.get` returns the `Model` resource directly, with no outer envelope.
pub type GetModelResponse = Model;
