//! Common types, errors and configuration shared by the CAST crates

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

pub use config::{CastConfig, Configuration, ConfigError};
pub use error::{Error, ErrorResponse, Result};
pub use types::*;
pub use utils::{Clock, ManualClock, SystemClock};
