pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod paths;
pub mod text;
pub mod time;

pub use crate::config::AppConfig;
pub use crate::domain::EventType;
pub use crate::errors::{AppError, Result};
