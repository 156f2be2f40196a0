pub mod error;
pub mod http;
pub mod routes;
mod state;

pub use state::AppState;
