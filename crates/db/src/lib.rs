pub mod errors;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod sqlite;

pub use errors::DbError;
pub use models::*;
pub use repositories::*;
pub use sqlite::{SqliteDatabase, ENTITY_SUBSTITUTION};
