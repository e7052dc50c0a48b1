/// `GET /v1/models` takes no path, query, or body parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListModelsRequest;
