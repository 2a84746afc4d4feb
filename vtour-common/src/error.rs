//! Errors raised while bootstrapping: config files, folders and the database

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Creating the root folder or writing a config file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or unparsable config, or a missing API key
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored identifier that does not parse as a UUID
    #[error("Invalid UUID in column {column}: {value} ({source})")]
    InvalidUuid {
        column: String,
        value: String,
        #[source]
        source: uuid::Error,
    },
}
