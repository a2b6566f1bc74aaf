use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown technology: {0}")]
    UnknownTechnology(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
