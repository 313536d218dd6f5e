//! The stateful binary packet protocol: framing, padding, compression,
//! encrypt-and-MAC and sequence numbering, per RFC 4253 §6. The MAC is
//! always computed over `sequence_number || unencrypted_packet`, never over
//! the ciphertext.

use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::{Duration, Instant},
};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{Error, Result},
    factory::{CipherAlgorithm, CompressAlgorithm, DirectionKeys, MacAlgorithm, Prng},
    wire::Wire,
};

/// Lower bound on a complete wire packet (`length` field included).
const PACKET_MIN_SIZE: usize = 5;
/// Upper bound on a complete wire packet, matching common SSH implementations'
/// sanity limit.
const PACKET_MAX_SIZE: usize = 256 * 1024;
/// Padding is always at least this many bytes, per RFC 4253 §6.
const MIN_PADDING: usize = 4;
/// Framing is always aligned to at least this many bytes, even with a
/// stream cipher or no cipher at all.
const MIN_ALIGN: usize = 8;

fn empty_keys() -> DirectionKeys {
    DirectionKeys {
        key: secrecy::SecretBox::new(Box::new(Vec::new())),
        iv: secrecy::SecretBox::new(Box::new(Vec::new())),
        mac: secrecy::SecretBox::new(Box::new(Vec::new())),
    }
}

/// One direction's framing state: the currently installed algorithms, their
/// keys, and the counters that drive rekeying.
pub struct Transport {
    cipher: Box<dyn CipherAlgorithm>,
    mac: Box<dyn MacAlgorithm>,
    compress: Box<dyn CompressAlgorithm>,
    keys: DirectionKeys,

    seq: u32,
    bytes_since_rekey: u64,
    packets_since_rekey: u64,
    installed_at: Instant,

    /// Shared with the session core: flips to `true` once
    /// `SSH_MSG_USERAUTH_SUCCESS` has gone by, unlocking any negotiated
    /// delayed compressor (`zlib@openssh.com`). Shared between a session's
    /// two [`Transport`]s so either direction sees the flip immediately.
    authed: Arc<AtomicBool>,
}

impl Transport {
    /// The pre-KEX transport: no cipher, no MAC, no compression, sharing
    /// `authed` with the session's other direction.
    pub fn none(authed: Arc<AtomicBool>) -> Self {
        Self {
            cipher: Box::new(crate::algorithm::cipher::NoneCipher),
            mac: Box::new(crate::algorithm::hmac::NoneMac),
            compress: Box::new(crate::algorithm::compress::NoneCompress),
            keys: empty_keys(),
            seq: 0,
            bytes_since_rekey: 0,
            packets_since_rekey: 0,
            installed_at: Instant::now(),
            authed,
        }
    }

    /// Whether a negotiated delayed compressor should actually run yet.
    fn compression_active(&self) -> bool {
        !self.compress.is_delayed() || self.authed.load(Ordering::Relaxed)
    }

    /// Swap in newly negotiated algorithms and keys after `SSH_MSG_NEWKEYS`,
    /// resetting the byte/packet counters but *not* the sequence number,
    /// which runs continuously for the life of the connection.
    pub fn install(
        &mut self,
        cipher: Box<dyn CipherAlgorithm>,
        mac: Box<dyn MacAlgorithm>,
        compress: Box<dyn CompressAlgorithm>,
        keys: DirectionKeys,
    ) {
        self.cipher = cipher;
        self.mac = mac;
        self.compress = compress;
        self.keys = keys;
        self.bytes_since_rekey = 0;
        self.packets_since_rekey = 0;
        self.installed_at = Instant::now();
    }

    /// Whether this direction has crossed one of the rekey thresholds.
    pub fn is_rekeyable(&self, bytes_threshold: u64, time_threshold: Duration) -> bool {
        self.bytes_since_rekey >= bytes_threshold || self.installed_at.elapsed() >= time_threshold
    }

    fn block_size(&self) -> usize {
        self.cipher.block_size().max(MIN_ALIGN)
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }
}

fn padding_len(payload_len: usize, block_size: usize) -> usize {
    // `length || padding_len || payload || padding` is encrypted as a whole, so
    // `length` counts toward the alignment.
    let size = 4 + 1 + payload_len;

    let padding = block_size - (size % block_size);
    let padding = if padding < MIN_PADDING {
        padding + block_size
    } else {
        padding
    };

    if size + padding < PACKET_MIN_SIZE.max(block_size) {
        padding + block_size
    } else {
        padding
    }
}

fn validate_packet_len(packet_len: u32) -> Result<()> {
    let total = packet_len as usize + 4;
    if !(PACKET_MIN_SIZE..=PACKET_MAX_SIZE).contains(&total) {
        Err(Error::Protocol("packet length out of bounds"))
    } else {
        Ok(())
    }
}

/// Compress, pad, MAC and encrypt `payload`, then write it to `out`.
pub async fn encode(
    tx: &mut Transport,
    payload: &[u8],
    prng: &dyn Prng,
    mut out: impl AsyncWrite + Unpin,
) -> Result<()> {
    use secrecy::ExposeSecret;

    let payload = if tx.compression_active() {
        tx.compress.compress(payload)?
    } else {
        payload.to_vec()
    };
    let block_size = tx.block_size();

    let pad_len = padding_len(payload.len(), block_size);
    let mut padding = vec![0u8; pad_len];
    prng.fill(&mut padding);

    let mut body = Wire::new();
    body.put_u8(pad_len as u8);
    body.put_bytes(&payload);
    body.put_bytes(&padding);
    let body = body.written().to_vec();

    let packet_len = body.len() as u32;
    validate_packet_len(packet_len)?;

    let seq = tx.next_seq();
    let key = tx.keys.key.expose_secret().clone();
    let iv = tx.keys.iv.expose_secret().clone();
    let mac_key = tx.keys.mac.expose_secret().clone();

    let mut plain = Wire::new();
    plain.put_u32(packet_len);
    plain.put_bytes(&body);
    let plain = plain.written().to_vec();

    let tag = tx.mac.sign(seq, &plain, &mac_key);

    let mut ciphertext = plain;
    tx.cipher.encrypt(&key, &iv, &mut ciphertext)?;

    out.write_all(&ciphertext).await?;
    out.write_all(&tag).await?;

    tx.bytes_since_rekey += (ciphertext.len() + tag.len()) as u64;
    tx.packets_since_rekey += 1;

    Ok(())
}

/// Read, verify, decrypt and decompress one packet from `input`.
pub async fn decode(rx: &mut Transport, mut input: impl AsyncRead + Unpin) -> Result<Vec<u8>> {
    use secrecy::ExposeSecret;

    let block_size = rx.block_size();
    let mac_size = rx.mac.size();

    let key = rx.keys.key.expose_secret().clone();
    let iv = rx.keys.iv.expose_secret().clone();
    let mac_key = rx.keys.mac.expose_secret().clone();

    // Phase 1: decrypt the first block to learn `packet_length`.
    let mut first_block = vec![0u8; block_size];
    input.read_exact(&mut first_block).await?;

    let mut decrypted_prefix = first_block;
    rx.cipher.decrypt(&key, &iv, &mut decrypted_prefix)?;

    let packet_len = u32::from_be_bytes(
        decrypted_prefix[..4]
            .try_into()
            .expect("block size is at least 4"),
    );
    validate_packet_len(packet_len)?;

    // Phase 2: read the rest of the packet plus the MAC tag.
    let total_len = 4 + packet_len as usize;
    let remaining = total_len - block_size;

    let mut rest = vec![0u8; remaining];
    input.read_exact(&mut rest).await?;

    let mut mac_tag = vec![0u8; mac_size];
    input.read_exact(&mut mac_tag).await?;

    let seq = rx.next_seq();

    let mut decrypted_rest = rest;
    rx.cipher.decrypt(&key, &iv, &mut decrypted_rest)?;
    decrypted_prefix.extend_from_slice(&decrypted_rest);

    if mac_size > 0 {
        let mut plain = Wire::new();
        plain.put_u32(packet_len);
        plain.put_bytes(&decrypted_prefix[4..]);
        rx.mac.verify(seq, plain.written(), &mac_key, &mac_tag)?;
    }

    let body = decrypted_prefix[4..].to_vec();

    if body.is_empty() {
        return Err(Error::Protocol("empty packet body"));
    }

    let pad_len = body[0] as usize;
    if 1 + pad_len > body.len() {
        return Err(Error::Protocol("padding exceeds packet length"));
    }

    let payload = &body[1..body.len() - pad_len];
    let payload = if rx.compression_active() {
        rx.compress.decompress(payload)?
    } else {
        payload.to_vec()
    };

    rx.bytes_since_rekey += (total_len + mac_size) as u64;
    rx.packets_since_rekey += 1;

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[test]
    fn padding_respects_minimum_and_alignment() {
        let len = padding_len(0, 8);
        assert!(len >= MIN_PADDING);
        assert_eq!((4 + 1 + len) % 8, 0);
    }

    fn no_auth() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[async_std::test]
    async fn roundtrip_unencrypted() {
        let mut tx = Transport::none(no_auth());
        let mut rx = Transport::none(no_auth());
        let prng = crate::algorithm::OsPrng::default();

        let mut wire = Vec::new();
        encode(&mut tx, b"hello, world", &prng, &mut wire).await.unwrap();

        let payload = decode(&mut rx, Cursor::new(wire)).await.unwrap();
        assert_eq!(payload, b"hello, world");
    }

    #[async_std::test]
    async fn sequence_numbers_advance_independently() {
        let mut tx = Transport::none(no_auth());
        let prng = crate::algorithm::OsPrng::default();

        let mut wire = Vec::new();
        encode(&mut tx, b"one", &prng, &mut wire).await.unwrap();
        encode(&mut tx, b"two", &prng, &mut wire).await.unwrap();

        assert_eq!(tx.seq, 2);
    }

    #[test]
    fn delayed_compressor_is_inert_until_authed() {
        let authed = Arc::new(AtomicBool::new(false));
        let mut tx = Transport::none(authed.clone());
        tx.compress = Box::new(crate::algorithm::compress::DelayedZlib::default());

        assert!(!tx.compression_active());

        authed.store(true, Ordering::Relaxed);
        assert!(tx.compression_active());
    }

    #[test]
    fn plain_zlib_is_never_delayed() {
        let tx = Transport::none(Arc::new(AtomicBool::new(false)));
        assert!(tx.compression_active());
    }

    fn keyed_transport(authed: Arc<AtomicBool>) -> Transport {
        use crate::factory::MacFactory;

        let mut t = Transport::none(authed);
        t.install(
            Box::new(crate::algorithm::cipher::NoneCipher),
            crate::algorithm::hmac::DefaultMacFactory
                .create("hmac-sha2-256")
                .unwrap(),
            Box::new(crate::algorithm::compress::NoneCompress),
            crate::factory::DirectionKeys {
                key: secrecy::SecretBox::new(Box::new(Vec::new())),
                iv: secrecy::SecretBox::new(Box::new(Vec::new())),
                mac: secrecy::SecretBox::new(Box::new(b"integrity-key".to_vec())),
            },
        );
        t
    }

    #[async_std::test]
    async fn tampered_ciphertext_is_rejected_by_mac() {
        let mut tx = keyed_transport(no_auth());
        let mut rx = keyed_transport(no_auth());

        let mut wire = Vec::new();
        encode(&mut tx, b"hello, world", &crate::algorithm::OsPrng::default(), &mut wire)
            .await
            .unwrap();

        // Flip a payload byte (index 5, past the length+padding-length prefix)
        // so the length field is untouched and only the MAC disagrees.
        wire[5] ^= 0x01;

        let err = decode(&mut rx, Cursor::new(wire)).await.unwrap_err();
        assert!(matches!(err, Error::Mac));
    }

    #[async_std::test]
    async fn tampered_mac_tag_is_rejected() {
        let mut tx = keyed_transport(no_auth());
        let mut rx = keyed_transport(no_auth());

        let mut wire = Vec::new();
        encode(&mut tx, b"hello, world", &crate::algorithm::OsPrng::default(), &mut wire)
            .await
            .unwrap();

        let last = wire.len() - 1;
        wire[last] ^= 0x01;

        let err = decode(&mut rx, Cursor::new(wire)).await.unwrap_err();
        assert!(matches!(err, Error::Mac));
    }

    #[test]
    fn rejects_packet_length_below_minimum() {
        assert!(matches!(
            validate_packet_len(0),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn rejects_packet_length_above_maximum() {
        assert!(matches!(
            validate_packet_len(PACKET_MAX_SIZE as u32),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn accepts_packet_length_at_the_bounds() {
        assert!(validate_packet_len(PACKET_MIN_SIZE as u32 - 4).is_ok());
        assert!(validate_packet_len(PACKET_MAX_SIZE as u32 - 4).is_ok());
    }
}
