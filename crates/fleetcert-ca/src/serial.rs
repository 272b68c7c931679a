//! Certificate serial number generators.
//!
//! The file-backed generator is a counter persisted as zero-padded
//! uppercase hex plus a newline. Each `next` returns the value on disk and
//! leaves its successor behind, so two successful calls against one file
//! never return the same serial. Callers sharing one file across processes
//! must hold an external lock around issuance; nothing here provides one.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleetcert_common::fs::parent_dir;
use fleetcert_common::{FileAccess, FileMode};
use fleetcert_crypto::pinning::hex_upper;
use rand::RngCore;

use crate::error::CaError;

/// Big-endian serial number bytes, minimal length, at least one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serial(Vec<u8>);

impl Serial {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let first = bytes.iter().position(|b| *b != 0);
        match first {
            Some(i) => Self(bytes[i..].to_vec()),
            None => Self(vec![0]),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<u128> for Serial {
    fn from(value: u128) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_upper(&self.0))
    }
}

/// Source of serial numbers for one CA instance.
pub trait SerialGenerator: Send {
    fn next(&mut self) -> Result<Serial, CaError>;

    /// Short name for logs.
    fn kind(&self) -> &'static str;
}

/// Counter persisted in a hex text file.
pub struct FileSerialGenerator {
    fs: Arc<dyn FileAccess>,
    path: PathBuf,
}

impl FileSerialGenerator {
    pub fn new(fs: Arc<dyn FileAccess>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    /// Reset the counter to zero (`00\n`).
    pub fn reset(&self) -> Result<(), CaError> {
        self.store(0)
    }

    /// Value the next call to `next` will return.
    ///
    /// A missing file is an error: only [`reset`](Self::reset) starts a
    /// counter, otherwise serials already issued would be handed out again.
    pub fn peek(&self) -> Result<u128, CaError> {
        let raw = match self.fs.read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaError::Serial(format!(
                    "serial file {} is missing",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        parse_counter(&raw)
    }

    fn store(&self, value: u128) -> Result<(), CaError> {
        self.fs
            .create_dir_all(parent_dir(&self.path).unwrap_or_else(|| Path::new("")))?;

        // Write-then-rename so a crash never leaves a truncated counter.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        self.fs
            .write(&tmp, format_counter(value).as_bytes(), FileMode::Private)?;
        self.fs.rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SerialGenerator for FileSerialGenerator {
    fn next(&mut self) -> Result<Serial, CaError> {
        let current = self.peek()?;
        let following = current
            .checked_add(1)
            .ok_or_else(|| CaError::Serial("serial counter exhausted".to_string()))?;
        self.store(following)?;
        tracing::debug!(serial = current, path = %self.path.display(), "Serial allocated");
        Ok(Serial::from(current))
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// 128-bit random serials from the OS RNG. No persisted state.
#[derive(Debug, Default)]
pub struct RandomSerialGenerator;

impl SerialGenerator for RandomSerialGenerator {
    fn next(&mut self) -> Result<Serial, CaError> {
        let mut bytes = [0u8; 16];
        loop {
            rand::rngs::OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| CaError::Serial(e.to_string()))?;
            // Keep the DER INTEGER positive without a padding byte.
            bytes[0] &= 0x7f;
            if bytes.iter().any(|b| *b != 0) {
                return Ok(Serial::from_bytes(&bytes));
            }
        }
    }

    fn kind(&self) -> &'static str {
        "random"
    }
}

fn parse_counter(raw: &[u8]) -> Result<u128, CaError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| CaError::Serial(format!("serial file is not text: {e}")))?
        .trim();
    if text.is_empty() {
        return Err(CaError::Serial("serial file is empty".to_string()));
    }
    u128::from_str_radix(text, 16)
        .map_err(|e| CaError::Serial(format!("invalid serial {text:?}: {e}")))
}

/// Uppercase hex, padded to an even number of digits, newline-terminated.
fn format_counter(value: u128) -> String {
    let mut hex = format!("{value:X}");
    if hex.len() % 2 == 1 {
        hex.insert(0, '0');
    }
    hex.push('\n');
    hex
}
