use lobbynet_proto::BackendError;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use super::address::VirtualAddr;

/// Socket-style error code, kept on the socket as its last error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoStaticStr)]
pub enum SocketErrorCode {
    #[default]
    NoError,
    NotConnected,
    ConnectionReset,
    WouldBlock,
    Unsupported,
    MessageTooLarge,
    InvalidAddress,
    SendFailed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SocketError {
    #[error("no endpoint for {0}")]
    NotConnected(VirtualAddr),

    #[error("local endpoint is gone")]
    ConnectionReset,

    #[error("refusing to send to our own endpoint")]
    SelfSend,

    #[error("{0} is not supported on a virtual socket")]
    Unsupported(&'static str),

    #[error("message of {0} bytes is too large")]
    MessageTooLarge(usize),

    #[error("invalid address {0}")]
    InvalidAddress(VirtualAddr),

    #[error("send failed: {0}")]
    Backend(#[from] BackendError),
}

impl SocketError {
    /// Code recorded on the socket. A self-send records nothing.
    pub fn code(&self) -> Option<SocketErrorCode> {
        match self {
            Self::NotConnected(_) => Some(SocketErrorCode::NotConnected),
            Self::ConnectionReset => Some(SocketErrorCode::ConnectionReset),
            Self::SelfSend => None,
            Self::Unsupported(_) => Some(SocketErrorCode::Unsupported),
            Self::MessageTooLarge(_) => Some(SocketErrorCode::MessageTooLarge),
            Self::InvalidAddress(_) => Some(SocketErrorCode::InvalidAddress),
            Self::Backend(_) => Some(SocketErrorCode::SendFailed),
        }
    }
}
