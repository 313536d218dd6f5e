//! Collection of error handling types and aliases.

use ssh_packet::trans::DisconnectReason;
use thiserror::Error;

/// The disconnection side for [`DisconnectedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectedBy {
    /// The session has been disconnected by _us_.
    Us,

    /// The session has been disconnected by _them_.
    Them,
}

/// The error describing why and by whom a session was torn down.
#[must_use]
#[derive(Debug, Error, Clone)]
#[error("session disconnected by {by:?} for {reason:?}: {description}")]
pub struct DisconnectedError {
    /// Side that sent the `SSH_MSG_DISCONNECT` message.
    pub by: DisconnectedBy,

    /// Reason code, per RFC 4253 §11.1.
    pub reason: DisconnectReason,

    /// Human-readable description sent alongside the reason.
    pub description: String,
}

/// The reason a [`Timeout`](Error::Timeout) fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    /// The peer never completed authentication in time.
    AuthTimeout,

    /// No traffic was seen on the session in time.
    IdleTimeout,
}

/// The error types that can occur when driving a [`Session`](crate::session::Session).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Binary (de)serialization error from a message codec.
    #[error(transparent)]
    Binary(#[from] ssh_packet::binrw::Error),

    /// SSH key parsing/signature error.
    #[error(transparent)]
    Key(#[from] ssh_key::Error),

    /// Signature verification failed during key-exchange.
    #[error(transparent)]
    Signature(#[from] signature::Error),

    /// Packet integrity check failed.
    #[error("MAC verification failed")]
    Mac,

    /// Malformed framing: bad length, bad padding, bad identification line.
    #[error("protocol framing error: {0}")]
    Protocol(&'static str),

    /// No common algorithm was found for a given negotiation slot.
    #[error("unable to negotiate a common {0} algorithm")]
    NoCommonAlgorithm(&'static str),

    /// The requested algorithm name isn't known to the factory manager.
    #[error("unknown algorithm name: {0}")]
    UnsupportedAlgorithm(String),

    /// A fault occurred inside the running key-exchange.
    #[error("key-exchange failed: {0}")]
    KexFailed(&'static str),

    /// A cipher operation failed (e.g. invalid key/iv length).
    #[error("cipher operation failed")]
    Cipher,

    /// A second key-exchange was attempted while one was already in flight.
    #[error("a key-exchange is already in progress")]
    KexInProgress,

    /// A message arrived that made no sense in the current session state.
    #[error("unexpected message (opcode {0}) in current state")]
    UnexpectedMessage(u8),

    /// The peer requested a service this session doesn't provide.
    #[error("requested service `{0}` is not available")]
    ServiceNotAvailable(String),

    /// A timeout elapsed.
    #[error("session timed out: {0:?}")]
    Timeout(TimeoutStatus),

    /// An operation was attempted after the session started closing.
    #[error("session is closing")]
    Closing,

    /// The session has been disconnected.
    #[error(transparent)]
    Disconnected(#[from] DisconnectedError),
}

impl Error {
    /// Map this error to the `SSH_MSG_DISCONNECT` reason code it should be reported with,
    /// if it is the kind of error that warrants sending one.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::Protocol(_) | Self::Binary(_) => Some(DisconnectReason::ProtocolError),
            Self::Mac => Some(DisconnectReason::MacError),
            Self::NoCommonAlgorithm(_) | Self::KexFailed(_) | Self::Signature(_) => {
                Some(DisconnectReason::KeyExchangeFailed)
            }
            Self::Key(_) => Some(DisconnectReason::HostKeyNotVerifiable),
            Self::ServiceNotAvailable(_) => Some(DisconnectReason::ServiceNotAvailable),
            Self::Timeout(_) => Some(DisconnectReason::ProtocolError),
            Self::UnexpectedMessage(_) => Some(DisconnectReason::ProtocolError),
            Self::Cipher | Self::UnsupportedAlgorithm(_) | Self::KexInProgress => {
                Some(DisconnectReason::ProtocolError)
            }
            Self::Io(_) | Self::Closing | Self::Disconnected(_) => None,
        }
    }
}

/// A handy [`std::result::Result`] alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
