//! # Network Errors
//!
//! Peer-scoped failures: the offending connection is closed and its
//! reputation debited, other peers continue untouched.

use shared_types::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte cap")]
    FrameTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Codec(#[from] ember_codec::CodecError),

    #[error(transparent)]
    Seal(#[from] ember_codec::SealError),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("peer is on network {got}, we are on {expected}")]
    WrongNetwork { expected: u32, got: u32 },

    #[error("peer protocol version {theirs} below our minimum {minimum}")]
    IncompatibleProtocol { minimum: u32, theirs: u32 },

    #[error("identity {0} is already connected")]
    DuplicatePeer(Address),

    #[error("identity {0} is banned")]
    PeerBanned(Address),

    #[error("request timed out")]
    Timeout,

    #[error("peer connection closed")]
    ConnectionClosed,

    #[error("unexpected response kind")]
    UnexpectedResponse,

    #[error(transparent)]
    Store(#[from] ember_storage::StoreError),

    #[error("directory request failed: {0}")]
    Http(String),

    #[error("directory response signature invalid")]
    DirectorySignature,

    /// The directory says our software is too old to participate. The
    /// runtime maps this to exit code 2.
    #[error("directory requires a newer software version")]
    VersionTooOld,
}
