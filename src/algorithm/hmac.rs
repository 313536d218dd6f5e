//! Built-in [`MacAlgorithm`](crate::factory::MacAlgorithm) implementations.

use digest::OutputSizeUser;
use hmac::Mac as _;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::{
    error::{Error, Result},
    factory::{MacAlgorithm, MacFactory},
};

struct HmacOf<D>(std::marker::PhantomData<D>);

impl<D> MacAlgorithm for HmacOf<D>
where
    D: digest::Digest + digest::core_api::BlockSizeUser + Send + Sync,
    hmac::Hmac<D>: digest::Mac + digest::KeyInit,
{
    fn size(&self) -> usize {
        D::output_size()
    }

    fn sign(&self, seq: u32, message: &[u8], key: &[u8]) -> Vec<u8> {
        <hmac::Hmac<D> as digest::KeyInit>::new_from_slice(key)
            .expect("hmac accepts any key length")
            .chain_update(seq.to_be_bytes())
            .chain_update(message)
            .finalize()
            .into_bytes()
            .to_vec()
    }

    fn verify(&self, seq: u32, message: &[u8], key: &[u8], tag: &[u8]) -> Result<()> {
        <hmac::Hmac<D> as digest::KeyInit>::new_from_slice(key)
            .expect("hmac accepts any key length")
            .chain_update(seq.to_be_bytes())
            .chain_update(message)
            .verify(tag.into())
            .map_err(|_| Error::Mac)
    }
}

/// The no-op MAC negotiated before the first key-exchange completes.
pub struct NoneMac;

impl MacAlgorithm for NoneMac {
    fn size(&self) -> usize {
        0
    }

    fn sign(&self, _seq: u32, _message: &[u8], _key: &[u8]) -> Vec<u8> {
        Vec::new()
    }

    fn verify(&self, _seq: u32, _message: &[u8], _key: &[u8], _tag: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// This crate's built-in [`MacFactory`], covering the `hmac-sha2-*`,
/// `hmac-sha1` and `hmac-md5` families. Every MAC here is computed over the
/// plaintext (encrypt-and-MAC order) — see [`crate::codec`].
pub struct DefaultMacFactory;

impl MacFactory for DefaultMacFactory {
    fn create(&self, name: &str) -> Option<Box<dyn MacAlgorithm>> {
        Some(match name {
            "hmac-sha2-512" => Box::new(HmacOf::<Sha512>(std::marker::PhantomData)),
            "hmac-sha2-256" => Box::new(HmacOf::<Sha256>(std::marker::PhantomData)),
            "hmac-sha1" => Box::new(HmacOf::<Sha1>(std::marker::PhantomData)),
            "hmac-md5" => Box::new(HmacOf::<Md5>(std::marker::PhantomData)),
            "none" => Box::new(NoneMac),
            _ => return None,
        })
    }
}
