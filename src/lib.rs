pub mod api;
pub mod configuration;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used items
pub use error::{DirectoryError, Result};
pub use services::directory_service::DirectoryService;
