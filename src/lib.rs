pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod messaging;
pub mod models;
pub mod output;
pub mod query;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;

pub use error::{ResourceKey, TaskError};
pub use models::{RoleCommand, StatusReport, TaskRecord};
pub use query::{TaskQuery, TaskQueryEngine};
pub use state::TaskStatus;
