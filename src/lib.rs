// Re-export modules for both binary and tests
pub mod error;
pub mod logger;
pub mod parse;
pub mod registry;
pub mod service;
pub mod shell;
pub mod task;
pub mod watcher;

pub use error::Error;
