//! Built-in [`CipherAlgorithm`](crate::factory::CipherAlgorithm) implementations.

use cbc::cipher::{inout::InOutBufReserved, block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ctr::cipher::StreamCipher;

use crate::{
    error::{Error, Result},
    factory::{CipherAlgorithm, CipherFactory},
};

macro_rules! ctr_cipher {
    ($name:ident, $inner:ty, $key:literal, $iv:literal) => {
        /// Stream cipher in counter mode.
        #[derive(Default)]
        pub struct $name(Option<$inner>);

        impl CipherAlgorithm for $name {
            fn block_size(&self) -> usize {
                1
            }

            fn key_size(&self) -> usize {
                $key
            }

            fn iv_size(&self) -> usize {
                $iv
            }

            fn encrypt(&mut self, key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<()> {
                self.0
                    .get_or_insert_with(|| <$inner>::new_from_slices(key, iv).expect("key/iv length mismatch"))
                    .try_apply_keystream(buffer)
                    .map_err(|_| Error::Cipher)
            }

            fn decrypt(&mut self, key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<()> {
                self.encrypt(key, iv, buffer)
            }
        }
    };
}

ctr_cipher!(Aes256Ctr, ctr::Ctr128BE<aes::Aes256>, 32, 16);
ctr_cipher!(Aes192Ctr, ctr::Ctr128BE<aes::Aes192>, 24, 16);
ctr_cipher!(Aes128Ctr, ctr::Ctr128BE<aes::Aes128>, 16, 16);

macro_rules! cbc_cipher {
    ($name:ident, $enc:ty, $dec:ty, $key:literal, $iv:literal) => {
        /// Block cipher in cipher-block-chaining mode.
        #[derive(Default)]
        pub struct $name(Option<$enc>, Option<$dec>);

        impl CipherAlgorithm for $name {
            fn block_size(&self) -> usize {
                $iv
            }

            fn key_size(&self) -> usize {
                $key
            }

            fn iv_size(&self) -> usize {
                $iv
            }

            fn encrypt(&mut self, key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<()> {
                let cipher = self
                    .0
                    .get_or_insert_with(|| <$enc>::new_from_slices(key, iv).expect("key/iv length mismatch"));

                let data = InOutBufReserved::from_mut_slice(buffer, buffer.len())
                    .map_err(|_| Error::Cipher)?;
                let mut blocks = data
                    .into_padded_blocks::<NoPadding, _>()
                    .map_err(|_| Error::Cipher)?;

                cipher.encrypt_blocks_inout_mut(blocks.get_blocks());
                if let Some(block) = blocks.get_tail_block() {
                    cipher.encrypt_block_inout_mut(block);
                }

                Ok(())
            }

            fn decrypt(&mut self, key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<()> {
                let cipher = self
                    .1
                    .get_or_insert_with(|| <$dec>::new_from_slices(key, iv).expect("key/iv length mismatch"));

                let data = InOutBufReserved::from_mut_slice(buffer, buffer.len())
                    .map_err(|_| Error::Cipher)?;
                let mut blocks = data
                    .into_padded_blocks::<NoPadding, _>()
                    .map_err(|_| Error::Cipher)?;

                cipher.decrypt_blocks_inout_mut(blocks.get_blocks());
                if let Some(block) = blocks.get_tail_block() {
                    cipher.decrypt_block_inout_mut(block);
                }

                Ok(())
            }
        }
    };
}

cbc_cipher!(
    Aes256Cbc,
    cbc::Encryptor<aes::Aes256>,
    cbc::Decryptor<aes::Aes256>,
    32,
    16
);
cbc_cipher!(
    Aes192Cbc,
    cbc::Encryptor<aes::Aes192>,
    cbc::Decryptor<aes::Aes192>,
    24,
    16
);
cbc_cipher!(
    Aes128Cbc,
    cbc::Encryptor<aes::Aes128>,
    cbc::Decryptor<aes::Aes128>,
    16,
    16
);
cbc_cipher!(
    TDesCbc,
    cbc::Encryptor<des::TdesEde3>,
    cbc::Decryptor<des::TdesEde3>,
    24,
    8
);

/// The no-op cipher negotiated before the first key-exchange completes.
#[derive(Default)]
pub struct NoneCipher;

impl CipherAlgorithm for NoneCipher {
    fn block_size(&self) -> usize {
        8
    }

    fn key_size(&self) -> usize {
        0
    }

    fn iv_size(&self) -> usize {
        0
    }

    fn encrypt(&mut self, _key: &[u8], _iv: &[u8], _buffer: &mut [u8]) -> Result<()> {
        Ok(())
    }

    fn decrypt(&mut self, _key: &[u8], _iv: &[u8], _buffer: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

/// This crate's built-in [`CipherFactory`], covering the AES CTR/CBC family
/// and legacy 3DES-CBC.
pub struct DefaultCipherFactory;

impl CipherFactory for DefaultCipherFactory {
    fn create(&self, name: &str) -> Option<Box<dyn CipherAlgorithm>> {
        Some(match name {
            "aes256-ctr" => Box::new(Aes256Ctr::default()),
            "aes192-ctr" => Box::new(Aes192Ctr::default()),
            "aes128-ctr" => Box::new(Aes128Ctr::default()),
            "aes256-cbc" => Box::new(Aes256Cbc::default()),
            "aes192-cbc" => Box::new(Aes192Cbc::default()),
            "aes128-cbc" => Box::new(Aes128Cbc::default()),
            "3des-cbc" => Box::new(TDesCbc::default()),
            "none" => Box::new(NoneCipher),
            _ => return None,
        })
    }
}
