//! Built-in [`KeyExchange`] implementations.

use secrecy::{ExposeSecret, SecretBox};
use signature::{SignatureEncoding, Signer, Verifier};
use ssh_key::{PrivateKey, PublicKey, Signature};
use ssh_packet::{
    arch::MpInt,
    crypto::exchange::Ecdh,
    trans::{KexEcdhInit, KexEcdhReply},
};

use crate::{
    error::{Error, Result},
    factory::{KexFactory, KexIo, KexOutput, KexTranscript, KeyExchange},
    message::{decode, encode},
};

/// Curve25519 ECDH key-exchange, hashed with SHA-256 (RFC 8731, and its
/// pre-standardization `@libssh.org` alias).
pub struct Curve25519Sha256;

#[async_trait::async_trait]
impl KeyExchange for Curve25519Sha256 {
    async fn client_exchange(
        &self,
        transcript: &KexTranscript<'_>,
        io: &mut (dyn KexIo + Send),
    ) -> Result<KexOutput> {
        let e_c = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
        let q_c = x25519_dalek::PublicKey::from(&e_c);

        io.send(&encode(&KexEcdhInit {
            q_c: q_c.as_ref().into(),
        })?)
        .await?;

        let ecdh: KexEcdhReply = decode(&io.recv().await?)?;
        let q_s = x25519_dalek::PublicKey::from(
            <[u8; 32]>::try_from(ecdh.q_s.as_ref()).map_err(|_| Error::KexFailed("bad q_s length"))?,
        );

        let secret = e_c.diffie_hellman(&q_s);
        let secret = SecretBox::new(Box::new(secret.as_bytes().to_vec()));

        let host_key = PublicKey::from_bytes(&ecdh.k_s)?;
        if host_key.algorithm().to_string() != transcript.host_key_algorithm {
            return Err(Error::KexFailed("host key algorithm does not match negotiation"));
        }

        let hash = Ecdh {
            v_c: transcript.client_id.into(),
            v_s: transcript.server_id.into(),
            i_c: transcript.client_kexinit.into(),
            i_s: transcript.server_kexinit.into(),
            k_s: ecdh.k_s.clone(),
            q_c: q_c.as_ref().into(),
            q_s: q_s.as_ref().into(),
            k: MpInt::positive(secret.expose_secret()),
        }
        .hash::<sha2::Sha256>();

        Verifier::verify(
            &host_key,
            &hash,
            &Signature::try_from(ecdh.signature.as_ref())?,
        )?;

        Ok(KexOutput {
            shared_secret: secret.expose_secret().clone(),
            exchange_hash: hash.to_vec(),
            host_key,
        })
    }

    async fn server_exchange(
        &self,
        transcript: &KexTranscript<'_>,
        io: &mut (dyn KexIo + Send),
        host_keys: &[PrivateKey],
    ) -> Result<KexOutput> {
        let ecdh: KexEcdhInit = decode(&io.recv().await?)?;

        let e_s = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
        let q_s = x25519_dalek::PublicKey::from(&e_s);

        let q_c = x25519_dalek::PublicKey::from(
            <[u8; 32]>::try_from(ecdh.q_c.as_ref()).map_err(|_| Error::KexFailed("bad q_c length"))?,
        );

        let secret = e_s.diffie_hellman(&q_c);
        let secret = SecretBox::new(Box::new(secret.as_bytes().to_vec()));

        let key = host_keys
            .iter()
            .find(|key| key.algorithm().to_string() == transcript.host_key_algorithm)
            .ok_or(Error::KexFailed("no configured host key matches the negotiated algorithm"))?;
        let k_s = key.public_key().to_bytes()?;

        let hash = Ecdh {
            v_c: transcript.client_id.into(),
            v_s: transcript.server_id.into(),
            i_c: transcript.client_kexinit.into(),
            i_s: transcript.server_kexinit.into(),
            k_s: k_s.clone().into(),
            q_c: q_c.as_ref().into(),
            q_s: q_s.as_ref().into(),
            k: MpInt::positive(secret.expose_secret()),
        }
        .hash::<sha2::Sha256>();

        let signature = Signer::sign(key, &hash);

        io.send(&encode(&KexEcdhReply {
            k_s: k_s.into(),
            q_s: q_s.as_ref().into(),
            signature: signature.to_vec().into(),
        })?)
        .await?;

        Ok(KexOutput {
            shared_secret: secret.expose_secret().clone(),
            exchange_hash: hash.to_vec(),
            host_key: key.public_key().clone(),
        })
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        use sha2::Digest;

        sha2::Sha256::digest(data).to_vec()
    }
}

/// This crate's built-in [`KexFactory`], covering Curve25519/SHA-256 under
/// both its RFC 8731 name and its pre-standardization `@libssh.org` alias.
pub struct DefaultKexFactory;

impl KexFactory for DefaultKexFactory {
    fn create(&self, name: &str) -> Option<std::sync::Arc<dyn KeyExchange>> {
        match name {
            "curve25519-sha256" | "curve25519-sha256@libssh.org" => {
                Some(std::sync::Arc::new(Curve25519Sha256))
            }
            _ => None,
        }
    }
}
