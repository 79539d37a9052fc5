//! Echo service error types

use secure_channel::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EchoError {
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Accept error: {0}")]
    Accept(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Server closed the connection without replying")]
    NoReply,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EchoResult<T> = Result<T, EchoError>;
