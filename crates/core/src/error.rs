use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("missing configuration: {0}")]
    Missing(String),
}
