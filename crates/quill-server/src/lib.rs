pub mod api;
pub mod server;

// Re-export for convenience
pub use api::ApiContext;
pub use server::{check_api_server_health, routes, start_api_server, stop_api_server};
