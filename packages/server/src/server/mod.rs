// HTTP server and the push-socket listener
pub mod app;
pub mod routes;
pub mod status_socket;

pub use app::*;
pub use status_socket::*;
