pub mod config;
pub mod error;

pub use config::{load_dotenv, ClientConfig, StreamEndPolicy};
pub use error::*;
