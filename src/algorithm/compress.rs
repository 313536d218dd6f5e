//! Built-in [`CompressAlgorithm`](crate::factory::CompressAlgorithm) implementations.

use std::io::{Read, Write};

use crate::{
    error::Result,
    factory::{CompressAlgorithm, CompressFactory},
};

/// zlib compression, applied unconditionally once negotiated.
#[derive(Default)]
pub struct Zlib;

impl CompressAlgorithm for Zlib {
    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = libflate::zlib::Encoder::new(Vec::with_capacity(data.len()))?;
        encoder.write_all(data)?;

        Ok(encoder.finish().into_result()?)
    }

    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(data.len());
        let decoder = libflate::zlib::Decoder::new(std::io::Cursor::new(data))?;

        decoder
            .take(ssh_packet::PACKET_MAX_SIZE as u64)
            .read_to_end(&mut buffer)?;

        Ok(buffer)
    }
}

/// `zlib@openssh.com`: the same zlib framing as [`Zlib`], but inert until
/// authentication completes (the "delayed compression" extension) — see
/// [`CompressAlgorithm::is_delayed`]. The codec checks `is_delayed()` before
/// every compress/decompress call and passes payloads through unchanged
/// while the session is still unauthenticated.
#[derive(Default)]
pub struct DelayedZlib(Zlib);

impl CompressAlgorithm for DelayedZlib {
    fn is_delayed(&self) -> bool {
        true
    }

    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.0.compress(data)
    }

    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.0.decompress(data)
    }
}

/// The no-op compressor.
#[derive(Default)]
pub struct NoneCompress;

impl CompressAlgorithm for NoneCompress {
    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// This crate's built-in [`CompressFactory`].
pub struct DefaultCompressFactory;

impl CompressFactory for DefaultCompressFactory {
    fn create(&self, name: &str) -> Option<Box<dyn CompressAlgorithm>> {
        Some(match name {
            "zlib@openssh.com" => Box::new(DelayedZlib::default()),
            "zlib" => Box::new(Zlib),
            "none" => Box::new(NoneCompress),
            _ => return None,
        })
    }
}
