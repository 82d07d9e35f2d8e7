use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("Client Open Error: {message} {location}")]
    Open {
        message: String,
        location: ErrorLocation,
        #[source]
        source: redis::RedisError,
    },

    #[error("Client Connect Error: {message} after {attempts} attempts {location}")]
    Connect {
        message: String,
        attempts: u32,
        location: ErrorLocation,
        #[source]
        source: redis::RedisError,
    },
}
