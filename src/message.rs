//! Binary (de)serialization of the small set of `ssh_packet` message structs
//! the session core needs to read and write directly, once our own codec
//! has already handled framing/MAC/encryption/compression.

use ssh_packet::binrw::{BinRead, BinWrite};

use crate::error::Result;

/// RFC 4253 §12 message opcodes this session core switches on directly.
pub mod opcode {
    pub const DISCONNECT: u8 = 1;
    pub const IGNORE: u8 = 2;
    pub const UNIMPLEMENTED: u8 = 3;
    pub const DEBUG: u8 = 4;
    pub const SERVICE_REQUEST: u8 = 5;
    pub const SERVICE_ACCEPT: u8 = 6;
    pub const KEXINIT: u8 = 20;
    pub const NEWKEYS: u8 = 21;
    /// Inclusive range reserved for a running key-exchange method's own messages.
    pub const KEX_SPECIFIC: std::ops::RangeInclusive<u8> = 30..=49;
    /// `SSH_MSG_USERAUTH_SUCCESS`, owned by the auth service but watched by
    /// the session core to flip its `authed` state (RFC 4252 §5.1).
    pub const USERAUTH_SUCCESS: u8 = 52;
}

/// Serialize a message struct to its raw wire payload.
pub fn encode<T: for<'a> BinWrite<Args<'a> = ()>>(message: &T) -> Result<Vec<u8>> {
    let mut out = std::io::Cursor::new(Vec::new());
    message
        .write(&mut out)
        .map_err(ssh_packet::binrw::Error::from)?;

    Ok(out.into_inner())
}

/// Parse a message struct out of a raw wire payload.
pub fn decode<T: for<'a> BinRead<Args<'a> = ()>>(payload: &[u8]) -> Result<T> {
    let mut cursor = std::io::Cursor::new(payload);

    Ok(T::read(&mut cursor).map_err(ssh_packet::binrw::Error::from)?)
}
