pub mod dto;
pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use routes::{build_router, ApiState, METRICS_PATH};
pub use server::serve;
