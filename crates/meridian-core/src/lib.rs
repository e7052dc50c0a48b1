pub mod bootstrap;
pub mod proxy_engine;
pub mod rewrite;
pub mod state;
pub mod upstream_client;

pub use proxy_engine::{ProxyAuth, ProxyCall, ProxyEngine};
pub use state::AppState;
