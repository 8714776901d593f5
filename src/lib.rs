pub mod config;
pub mod error;
pub mod external;
pub mod models;
pub mod services;

pub use config::{DrawConfig, TimeFactorRule};
pub use error::{AppError, AppResult};
