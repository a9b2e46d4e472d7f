pub mod pipeline;
pub mod model;
pub mod config;
pub mod error;
pub mod server;
pub mod utils;

pub use error::{DetectorError, Result};
pub use config::Config;
