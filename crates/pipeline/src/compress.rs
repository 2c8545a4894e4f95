use crate::PipelineError;
use std::io::{Read, Write};

/// Compression stage strategy.
pub trait Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError>;
}

/// Pass-through stage.
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        Ok(data.to_vec())
    }
}

/// zstd compression at a configurable level (default 3).
pub struct ZstdCompression {
    level: i32,
}

impl ZstdCompression {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompression {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Compressor for ZstdCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let mut encoder = zstd::Encoder::new(Vec::new(), self.level)
            .map_err(|e| PipelineError::Compression(e.to_string()))?;
        encoder
            .write_all(data)
            .map_err(|e| PipelineError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| PipelineError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let mut decoder =
            zstd::Decoder::new(data).map_err(|e| PipelineError::Compression(e.to_string()))?;
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(|e| PipelineError::Compression(e.to_string()))?;
        Ok(buf)
    }
}
