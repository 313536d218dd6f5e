//! Named factories resolving algorithm identifiers to boxed capability objects.
//!
//! The transport core never matches on a concrete cipher/MAC/compression/KEX
//! enum directly; it asks a [`FactoryManager`] to resolve the name that came
//! out of [`crate::negotiate::negotiate`] into a trait object. This is the
//! seam external collaborators use to register their own algorithm
//! implementations (hardware-backed ciphers, FIPS-validated digests, a
//! different KEX curve) without touching the session core.

use std::{fmt, sync::Arc};

use secrecy::SecretBox;
use ssh_key::{PrivateKey, PublicKey};

use crate::error::{Error, Result};

/// A stateful symmetric cipher bound to a single transport direction.
pub trait CipherAlgorithm: Send + Sync {
    /// Cipher block size in bytes (`1` for stream ciphers).
    fn block_size(&self) -> usize;
    /// Key material size in bytes.
    fn key_size(&self) -> usize;
    /// IV size in bytes.
    fn iv_size(&self) -> usize;

    /// Encrypt `buffer` in place.
    fn encrypt(&mut self, key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<()>;
    /// Decrypt `buffer` in place.
    fn decrypt(&mut self, key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<()>;
}

/// A message authentication code bound to a single transport direction.
pub trait MacAlgorithm: Send + Sync {
    /// Output size in bytes (`0` disables MAC verification entirely).
    fn size(&self) -> usize;

    /// Produce the tag for `seq || message`.
    fn sign(&self, seq: u32, message: &[u8], key: &[u8]) -> Vec<u8>;
    /// Verify `tag` against `seq || message`.
    fn verify(&self, seq: u32, message: &[u8], key: &[u8], tag: &[u8]) -> Result<()>;
}

/// A payload compressor bound to a single transport direction.
pub trait CompressAlgorithm: Send + Sync {
    /// Whether this compressor must stay inert until authentication
    /// completes (`zlib@openssh.com`, RFC 4253's "delayed compression"
    /// extension). Most algorithms compress unconditionally once
    /// negotiated, so the default is `false`.
    fn is_delayed(&self) -> bool {
        false
    }

    /// Compress a plaintext payload before encryption.
    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>>;
    /// Decompress a payload after decryption.
    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

/// The negotiated key material for one direction of traffic, per RFC 4253 §7.2.
pub struct DirectionKeys {
    /// Cipher key.
    pub key: SecretBox<Vec<u8>>,
    /// Cipher initialization vector.
    pub iv: SecretBox<Vec<u8>>,
    /// Integrity key.
    pub mac: SecretBox<Vec<u8>>,
}

/// The output of a completed key-exchange round.
pub struct KexOutput {
    /// The shared secret `K`, still in its `mpint` wire encoding.
    pub shared_secret: Vec<u8>,
    /// The exchange hash `H`.
    pub exchange_hash: Vec<u8>,
    /// The host key used to sign `H`, for the caller to verify or record.
    pub host_key: PublicKey,
}

/// A single round of key-exchange, opaque to the session core.
///
/// Implementors own the DH/ECDH math, the transcript hashing and the host
/// key signature check; the session core only drives [`client_exchange`] or
/// [`server_exchange`] and then asks the result to [`derive`] per-direction
/// keys.
///
/// [`client_exchange`]: KeyExchange::client_exchange
/// [`server_exchange`]: KeyExchange::server_exchange
/// [`derive`]: KeyExchange::derive
#[async_trait::async_trait]
pub trait KeyExchange: Send + Sync {
    /// Run this exchange as the initiating (client) side, given the wire
    /// transcript (both `KexInit` payloads) to bind into `H`. Implementors
    /// must reject a reply whose host key isn't of
    /// `transcript.host_key_algorithm`.
    async fn client_exchange(
        &self,
        transcript: &KexTranscript<'_>,
        io: &mut (dyn KexIo + Send),
    ) -> Result<KexOutput>;

    /// Run this exchange as the responding (server) side. `host_keys` is
    /// tried in order for one whose algorithm matches
    /// `transcript.host_key_algorithm`, not blindly taken as the first
    /// configured key.
    async fn server_exchange(
        &self,
        transcript: &KexTranscript<'_>,
        io: &mut (dyn KexIo + Send),
        host_keys: &[PrivateKey],
    ) -> Result<KexOutput>;

    /// Hash `data` with this exchange's chosen digest, for both `H` and key
    /// derivation (RFC 4253 §7.2 letters A-F).
    fn hash(&self, data: &[u8]) -> Vec<u8>;

    /// Derive the six direction-bound keys from `K`, `H` and the session id.
    fn derive(
        &self,
        shared_secret: &[u8],
        exchange_hash: &[u8],
        session_id: &[u8],
        cipher: &dyn CipherAlgorithm,
        mac: &dyn MacAlgorithm,
        as_client: bool,
    ) -> (DirectionKeys, DirectionKeys) {
        let (c2s_iv_id, c2s_key_id, c2s_mac_id, s2c_iv_id, s2c_key_id, s2c_mac_id) = if as_client {
            (b'A', b'C', b'E', b'B', b'D', b'F')
        } else {
            (b'B', b'D', b'F', b'A', b'C', b'E')
        };

        let derive_one = |kind: u8, size: usize| -> SecretBox<Vec<u8>> {
            SecretBox::new(Box::new(self.expand(
                shared_secret,
                exchange_hash,
                kind,
                session_id,
                size,
            )))
        };

        let tx = DirectionKeys {
            iv: derive_one(c2s_iv_id, cipher.iv_size()),
            key: derive_one(c2s_key_id, cipher.key_size()),
            mac: derive_one(c2s_mac_id, mac.size()),
        };
        let rx = DirectionKeys {
            iv: derive_one(s2c_iv_id, cipher.iv_size()),
            key: derive_one(s2c_key_id, cipher.key_size()),
            mac: derive_one(s2c_mac_id, mac.size()),
        };

        (tx, rx)
    }

    /// The RFC 4253 §7.2 key-expansion loop, run with this exchange's digest.
    fn expand(
        &self,
        shared_secret: &[u8],
        exchange_hash: &[u8],
        kind: u8,
        session_id: &[u8],
        size: usize,
    ) -> Vec<u8> {
        let mut key = self.hash(
            &[
                shared_secret,
                exchange_hash,
                &[kind],
                session_id,
            ]
            .concat(),
        );

        while key.len() < size {
            let mut input = Vec::with_capacity(shared_secret.len() + exchange_hash.len() + key.len());
            input.extend_from_slice(shared_secret);
            input.extend_from_slice(exchange_hash);
            input.extend_from_slice(&key);

            key.extend_from_slice(&self.hash(&input));
        }

        key.truncate(size);
        key
    }
}

/// The two KEXINIT payloads bound into a key-exchange transcript.
pub struct KexTranscript<'a> {
    /// The identification string sent by the client.
    pub client_id: &'a [u8],
    /// The identification string sent by the server.
    pub server_id: &'a [u8],
    /// The raw `SSH_MSG_KEXINIT` payload sent by the client.
    pub client_kexinit: &'a [u8],
    /// The raw `SSH_MSG_KEXINIT` payload sent by the server.
    pub server_kexinit: &'a [u8],
    /// The `server-host-key` algorithm negotiated for this exchange. The
    /// server side must sign with a key of this algorithm; the client side
    /// must reject a reply whose host key is of any other algorithm.
    pub host_key_algorithm: &'a str,
}

/// The narrow channel a [`KeyExchange`] needs to talk to its peer, decoupled
/// from the session's packet codec so exchange implementations stay
/// independent of framing/rekey concerns.
#[async_trait::async_trait]
pub trait KexIo {
    /// Send a single KEX sub-protocol message payload.
    async fn send(&mut self, payload: &[u8]) -> Result<()>;
    /// Receive a single KEX sub-protocol message payload.
    async fn recv(&mut self) -> Result<Vec<u8>>;
}

/// A source of cryptographically secure random bytes.
pub trait Prng: Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}

/// Produces [`CipherAlgorithm`]s by negotiated name.
pub trait CipherFactory: Send + Sync {
    /// Instantiate the cipher named `name`, or `None` if this factory
    /// doesn't recognize it.
    fn create(&self, name: &str) -> Option<Box<dyn CipherAlgorithm>>;
}

/// Produces [`MacAlgorithm`]s by negotiated name.
pub trait MacFactory: Send + Sync {
    /// Instantiate the MAC named `name`, or `None` if unrecognized.
    fn create(&self, name: &str) -> Option<Box<dyn MacAlgorithm>>;
}

/// Produces [`CompressAlgorithm`]s by negotiated name.
pub trait CompressFactory: Send + Sync {
    /// Instantiate the compressor named `name`, or `None` if unrecognized.
    fn create(&self, name: &str) -> Option<Box<dyn CompressAlgorithm>>;
}

/// Produces [`KeyExchange`]s by negotiated name.
pub trait KexFactory: Send + Sync {
    /// Instantiate the key-exchange named `name`, or `None` if unrecognized.
    fn create(&self, name: &str) -> Option<Arc<dyn KeyExchange>>;
}

/// The set of named factories a [`crate::session::Session`] resolves
/// algorithms through.
///
/// A manager is built once, populated with the default, teacher-grade
/// implementations via [`FactoryManager::with_defaults`], and can be
/// extended or overridden per-category by callers who need a capability
/// this crate doesn't ship (a hardware security module cipher, a
/// post-quantum KEX).
#[derive(Clone)]
pub struct FactoryManager {
    ciphers: Arc<dyn CipherFactory>,
    macs: Arc<dyn MacFactory>,
    compressions: Arc<dyn CompressFactory>,
    kexs: Arc<dyn KexFactory>,
    prng: Arc<dyn Prng>,
}

impl fmt::Debug for FactoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryManager").finish_non_exhaustive()
    }
}

impl FactoryManager {
    /// Build a manager from this crate's built-in algorithm implementations.
    pub fn with_defaults() -> Self {
        Self {
            ciphers: Arc::new(crate::algorithm::cipher::DefaultCipherFactory),
            macs: Arc::new(crate::algorithm::hmac::DefaultMacFactory),
            compressions: Arc::new(crate::algorithm::compress::DefaultCompressFactory),
            kexs: Arc::new(crate::algorithm::kex::DefaultKexFactory),
            prng: Arc::new(crate::algorithm::OsPrng::default()),
        }
    }

    /// Override the cipher factory.
    pub fn with_cipher_factory(mut self, factory: impl CipherFactory + 'static) -> Self {
        self.ciphers = Arc::new(factory);
        self
    }

    /// Override the MAC factory.
    pub fn with_mac_factory(mut self, factory: impl MacFactory + 'static) -> Self {
        self.macs = Arc::new(factory);
        self
    }

    /// Override the compression factory.
    pub fn with_compress_factory(mut self, factory: impl CompressFactory + 'static) -> Self {
        self.compressions = Arc::new(factory);
        self
    }

    /// Override the key-exchange factory.
    pub fn with_kex_factory(mut self, factory: impl KexFactory + 'static) -> Self {
        self.kexs = Arc::new(factory);
        self
    }

    /// Override the PRNG.
    pub fn with_prng(mut self, prng: impl Prng + 'static) -> Self {
        self.prng = Arc::new(prng);
        self
    }

    /// Resolve a cipher by negotiated name.
    pub fn cipher(&self, name: &str) -> Result<Box<dyn CipherAlgorithm>> {
        self.ciphers
            .create(name)
            .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_owned()))
    }

    /// Resolve a MAC by negotiated name.
    pub fn mac(&self, name: &str) -> Result<Box<dyn MacAlgorithm>> {
        self.macs
            .create(name)
            .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_owned()))
    }

    /// Resolve a compressor by negotiated name.
    pub fn compress(&self, name: &str) -> Result<Box<dyn CompressAlgorithm>> {
        self.compressions
            .create(name)
            .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_owned()))
    }

    /// Resolve a key-exchange by negotiated name.
    pub fn kex(&self, name: &str) -> Result<Arc<dyn KeyExchange>> {
        self.kexs
            .create(name)
            .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_owned()))
    }

    /// This manager's PRNG.
    pub fn prng(&self) -> &Arc<dyn Prng> {
        &self.prng
    }
}
