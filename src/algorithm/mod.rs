//! Default, built-in algorithm implementations registered with a
//! [`crate::factory::FactoryManager`] by [`FactoryManager::with_defaults`].
//!
//! [`FactoryManager::with_defaults`]: crate::factory::FactoryManager::with_defaults

pub mod cipher;
pub mod compress;
pub mod hmac;
pub mod kex;

use crate::factory::Prng;

/// A [`Prng`] backed by [`ring::rand::SystemRandom`].
pub struct OsPrng(ring::rand::SystemRandom);

impl Default for OsPrng {
    fn default() -> Self {
        Self(ring::rand::SystemRandom::new())
    }
}

impl Prng for OsPrng {
    fn fill(&self, buf: &mut [u8]) {
        use ring::rand::SecureRandom;

        self.0.fill(buf).expect("system RNG is unavailable");
    }
}
