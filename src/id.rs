//! The `SSH-2.0-...` identification string exchanged before the binary
//! packet protocol begins, per RFC 4253 §4.2.
//!
//! Parsing and rendering the identification line is `ssh_packet`'s job, not
//! ours — re-scanning CRLF-terminated banners by hand is exactly the kind of
//! wire-format work this crate delegates to its dependencies.

#[doc(no_inline)]
pub use ssh_packet::Id;
