//! Session [`Side`]s, either [`Client`] or [`Server`].

use ssh_key::PrivateKey;

use crate::config::Config;

pub mod client;
pub use client::Client;

pub mod server;
pub use server::Server;

mod private {
    pub trait Sealed {}

    impl Sealed for super::Client {}
    impl Sealed for super::Server {}
}

/// The ten algorithm-negotiation slots' preference lists, by name.
///
/// Names are resolved against the [`crate::factory::FactoryManager`] once
/// negotiation picks a winner; the lists themselves are just preference
/// order, not capability instances.
#[derive(Debug, Clone)]
pub struct Algorithms {
    /// Enabled algorithms for _key-exchange_, most preferred first.
    pub kexs: Vec<String>,

    /// Enabled algorithms for _server host key_ verification, most preferred
    /// first. On the server side this is derived from the configured host
    /// keys rather than read from this list.
    pub host_keys: Vec<String>,

    /// Enabled algorithms for _encryption & decryption_, most preferred first.
    pub ciphers: Vec<String>,

    /// Enabled algorithms for _message integrity_, most preferred first.
    pub macs: Vec<String>,

    /// Enabled algorithms for _compression_, most preferred first.
    pub compressions: Vec<String>,
}

impl Default for Algorithms {
    fn default() -> Self {
        Self {
            kexs: vec![
                "curve25519-sha256".into(),
                "curve25519-sha256@libssh.org".into(),
            ],
            host_keys: vec![
                "ssh-ed25519".into(),
                "ecdsa-sha2-nistp384".into(),
                "ecdsa-sha2-nistp256".into(),
                "rsa-sha2-512".into(),
                "rsa-sha2-256".into(),
                "ssh-rsa".into(),
                "ssh-dss".into(),
            ],
            ciphers: vec![
                "aes256-ctr".into(),
                "aes192-ctr".into(),
                "aes128-ctr".into(),
                "aes256-cbc".into(),
                "aes192-cbc".into(),
                "aes128-cbc".into(),
                "3des-cbc".into(),
            ],
            macs: vec![
                "hmac-sha2-512".into(),
                "hmac-sha2-256".into(),
                "hmac-sha1".into(),
                "hmac-md5".into(),
            ],
            compressions: vec!["zlib@openssh.com".into(), "zlib".into(), "none".into()],
        }
    }
}

/// A side of the SSH protocol, either [`Client`] or [`Server`].
pub trait Side: private::Sealed + Send + Sync + Unpin + 'static {
    /// Local identification string for this session.
    fn id(&self) -> &crate::id::Id;

    /// Ambient configuration (timeouts, rekey thresholds, factories).
    fn config(&self) -> &Config;

    /// Enabled algorithms, in preference order.
    fn algorithms(&self) -> &Algorithms;

    /// Whether this side initiates (client) or responds to (server)
    /// requests, which decides which half of [`crate::factory::KeyExchange`]
    /// is driven during a key-exchange round.
    fn is_client(&self) -> bool;

    /// The host keys this side can sign a key-exchange with. Always empty
    /// for a [`Client`].
    fn host_keys(&self) -> &[PrivateKey] {
        &[]
    }

    /// Host-key algorithm names offered in this side's `KexInit`. A
    /// [`Client`] offers its configured preference list; a [`Server`]
    /// instead offers the names derived from its actual configured keys.
    fn host_key_algorithm_names(&self) -> Vec<String> {
        self.algorithms().host_keys.clone()
    }
}
