pub mod config;
mod error;
mod types;

pub use config::*;
pub use error::{ArborError, Result};
pub use types::*;
