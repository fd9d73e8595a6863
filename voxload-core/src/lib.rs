pub use error::{Result, UploadError};

pub mod backends;
pub mod error;
pub mod models;
pub mod services;
