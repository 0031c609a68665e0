//! HTTP API handlers for abx-server

pub mod error;
pub mod events;
pub mod health;
pub mod results;

pub use error::ApiError;
pub use events::{get_variant, record_event};
pub use health::health_routes;
pub use results::get_results;
pub use tests::{
    complete_test, create_test, delete_test, get_test, list_tests, pause_test, start_test,
};
