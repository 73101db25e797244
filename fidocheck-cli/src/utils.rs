//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fidocheck_core::serde_b64url;
use tracing::debug;

use crate::exit_codes::InputError;

/// Read a file given on the command line.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Decode a binary argument given as hex or base64/base64url.
///
/// Hex wins when the text is valid hex of even length.
pub fn decode_binary(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 == 0 {
        if let Ok(bytes) = hex::decode(text) {
            debug!(encoding = "hex", bytes = bytes.len(), "decoded argument");
            return Ok(bytes);
        }
    }
    let bytes = serde_b64url::decode(text)
        .map_err(|e| InputError(format!("input is neither hex nor base64: {e}")))?;
    debug!(encoding = "base64", bytes = bytes.len(), "decoded argument");
    Ok(bytes)
}

pub fn b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Route `tracing` output to stderr. `RUST_LOG` overrides the verbosity flag.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_binary_hex_and_base64() {
        assert_eq!(decode_binary("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_binary("3q2-7w").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_binary("3q2+7w==").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decode_binary_rejects_garbage() {
        let err = decode_binary("not*valid").unwrap_err();
        assert!(err.downcast_ref::<InputError>().is_some());
    }
}
