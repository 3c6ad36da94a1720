pub mod config;
pub mod error;
pub mod fetch;
pub mod pacing;
pub mod providers;
pub mod quote;
pub mod server;
pub mod services;
pub mod utils;

pub use error::{AppError, Result};
