use crate::protocol::constants::{CLOSE_CODE_NO_RECONNECT_MAX, CLOSE_CODE_NO_RECONNECT_MIN};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // 4000-4099: client must not reconnect
    #[error("Application does not exist")]
    ApplicationNotFound,

    #[error("Application disabled")]
    ApplicationDisabled,

    #[error("Connection is unauthorized")]
    Unauthorized,

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid app key")]
    InvalidAppKey,

    #[error("Application is over connection quota")]
    OverConnectionQuota,

    #[error("Unsupported protocol version")]
    UnsupportedProtocolVersion,

    // Channel specific errors
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Channel name invalid: {0}")]
    InvalidChannelName(String),

    // Trigger API errors
    #[error("Wrong format: {0}")]
    WrongFormat(String),

    // Connection errors
    #[error("Connection closed")]
    ConnectionClosed,

    // Protocol errors
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Invalid event name: {0}")]
    InvalidEventName(String),

    // Shared state store / sync bus failures
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Redis error: {0}")]
    Redis(String),

    // JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    ConfigFile(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Maps an error to the protocol close code sent before dropping a socket.
    pub fn close_code(&self) -> u16 {
        match self {
            // 4000-4099: don't reconnect
            Error::ApplicationNotFound => 4001,
            Error::ApplicationDisabled => 4003,
            Error::OverConnectionQuota => 4004,
            Error::UnsupportedProtocolVersion => 4007,
            Error::Unauthorized
            | Error::Auth(_)
            | Error::InvalidSignature
            | Error::InvalidAppKey => 4009,

            Error::Channel(_) | Error::InvalidChannelName(_) => 4300,
            Error::InvalidMessageFormat(_) | Error::InvalidEventName(_) | Error::WrongFormat(_) => {
                4301
            }

            // Reconnecting may help once the upstream store/bus recovers
            _ => 4200,
        }
    }

    /// Fatal errors carry a close code in the no-reconnect range.
    pub fn is_fatal(&self) -> bool {
        let code = self.close_code();
        (CLOSE_CODE_NO_RECONNECT_MIN..=CLOSE_CODE_NO_RECONNECT_MAX).contains(&code)
    }
}

impl From<&Error> for crate::protocol::messages::ErrorData {
    fn from(error: &Error) -> Self {
        Self {
            code: Some(error.close_code()),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
