//! HTTP surface: WebSocket upgrade and health

pub mod routes;

pub use routes::build_router;
