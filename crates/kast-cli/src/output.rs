//! Input and output helpers for CLI commands.
//!
//! Resources travel on stdin and stdout; progress and summaries go to
//! stderr through `tracing`.

use std::io::{Read, Write};

use anyhow::Context;

/// Reads all of stdin.
///
/// # Errors
///
/// Returns an error if stdin cannot be read as UTF-8.
pub fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    let _ = std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    Ok(input)
}

/// Writes `content` to stdout in one piece.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn write_stdout(content: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(content.as_bytes())
        .and_then(|()| stdout.flush())
        .context("failed to write stdout")
}

/// Shortens a `sha256:<hex>` digest for display.
#[must_use]
pub fn short_digest(digest: &str) -> &str {
    const SHOWN: usize = "sha256:".len() + 12;
    digest.get(..SHOWN).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_digest_keeps_twelve_hex_chars() {
        let digest = format!("sha256:{}", "ab".repeat(32));
        assert_eq!(short_digest(&digest), "sha256:abababababab");
    }

    #[test]
    fn short_digest_leaves_short_input_alone() {
        assert_eq!(short_digest("sha256:ab"), "sha256:ab");
    }
}
