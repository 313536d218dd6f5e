#![doc = concat!(
    "[![crates.io](https://img.shields.io/crates/v/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "![license](https://img.shields.io/crates/l/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! A [`Session`] drives the wire: identification exchange, `KexInit`
//! negotiation, a key-exchange method, and binary packet framing. Once
//! established it hands every payload past opcode 49 to whatever
//! [`Service`] has been requested over it (`ssh-userauth`, `ssh-connection`,
//! ...) and otherwise stays out of the way.
//!
//! ### Supported algorithms
//!
//! #### Key-exchange
//!
//! see [`algorithm::kex`].
//!
//! #### Encryption
//!
//! see [`algorithm::cipher`].
//!
//! #### MACs
//!
//! see [`algorithm::hmac`].
//!
//! #### Compression
//!
//! see [`algorithm::compress`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,
    clippy::undocumented_unsafe_blocks
)]
#![forbid(unsafe_code)]

mod error;
pub use error::{
    DisconnectedBy, DisconnectedError, Error, Result, TimeoutStatus,
};

mod wire;

mod message;

mod codec;

mod negotiate;
pub use negotiate::Negotiated;

mod id;
pub use id::Id;

pub mod algorithm;

pub mod factory;
pub use factory::FactoryManager;

pub mod side;
pub use side::{Algorithms, Client, Server, Side};

mod config;
pub use config::Config;

pub mod service;
pub use service::{NoServices, Service, ServiceFactory};

mod listener;

mod rendezvous;

mod session;
pub use session::{Pipe, Session, SessionListener};
