pub mod routes;
pub mod sse;

pub use routes::ApiResponse;
