use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("No broker addresses given")]
    NoBrokers,

    #[error("Invalid broker address {addr:?}: {reason}")]
    InvalidBroker { addr: String, reason: String },

    #[error("Invalid worker identifier {0:?}: must be non-empty and free of MQTT wildcards")]
    InvalidIdentifier(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
