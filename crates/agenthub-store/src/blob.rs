//! Gzip codec for action input/output blobs. Payloads are stored compressed
//! and decompressed on read; empty input stays `None` end to end.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::Result;

pub fn compress(text: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

pub fn decompress(bytes: &[u8]) -> Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

pub fn compress_opt(text: Option<&str>) -> Result<Option<Vec<u8>>> {
    match text {
        Some(t) if !t.is_empty() => Ok(Some(compress(t)?)),
        _ => Ok(None),
    }
}

pub fn decompress_opt(bytes: Option<&[u8]>) -> Result<Option<String>> {
    match bytes {
        Some(b) => Ok(Some(decompress(b)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let text = "{\"file_path\": \"/tmp/main.rs\", \"content\": \"fn main() {}\"}";
        let packed = compress(text).unwrap();
        assert_eq!(decompress(&packed).unwrap(), text);
    }

    #[test]
    fn compresses_repetitive_payloads() {
        let text = "tool output line\n".repeat(500);
        let packed = compress(&text).unwrap();
        assert!(packed.len() < text.len() / 4);
    }

    #[test]
    fn empty_input_stays_none() {
        assert!(compress_opt(None).unwrap().is_none());
        assert!(compress_opt(Some("")).unwrap().is_none());
        assert!(decompress_opt(None).unwrap().is_none());
    }
}
