//! HTTP surface for meridian: the client-facing proxy routes (`/proxy/{group}/...`)
//! and the admin API/WS routes, both built on top of `meridian-core`.

pub mod admin;
pub mod proxy;

pub use admin::{AdminState, admin_router};
pub use proxy::proxy_router;
