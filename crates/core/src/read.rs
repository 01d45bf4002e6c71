use std::fs;
use std::io;
use std::path::Path;

use encoding_rs::{Encoding, GB18030, GBK, UTF_16LE, UTF_8};

use crate::error::{RefinerError, Result};

fn encoding_candidates() -> [&'static Encoding; 4] {
    [UTF_8, GBK, GB18030, UTF_16LE]
}

pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => RefinerError::NotFound(path.to_path_buf()),
        _ => RefinerError::Io(err),
    })?;
    match decode_bytes(&bytes) {
        Some(text) => Ok(text),
        None => Err(RefinerError::Decode(path.to_path_buf())),
    }
}

fn decode_bytes(bytes: &[u8]) -> Option<String> {
    for encoding in encoding_candidates() {
        let (text, actual, had_errors) = encoding.decode(bytes);
        if !had_errors {
            tracing::trace!(encoding = actual.name(), "decoded manuscript bytes");
            return Some(text.into_owned());
        }
    }
    None
}
