//! HTTP control endpoint and process lifecycle

pub mod http;
pub mod lifecycle;

pub use http::{route, AppState, HttpServer, Reply};
pub use lifecycle::{bounded_step, wait_for_shutdown, Shutdown};
