//! Tracking identifiers: allocation and the base-26 token encoding.
//!
//! Identifiers are positive integers handed out by an [`IdAllocator`]. The
//! token is the identifier written in positional base 26 over `a..=z`, where
//! `a` is the zero digit. This is not bijective base 26: `encode(26)` is
//! `"ba"`, and there is no token with a leading `a` other than for digits
//! that are genuinely zero.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::error::{AllocError, DecodeError};

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";
const RADIX: u64 = ALPHABET.len() as u64;

/// Encode an identifier as a lowercase base-26 token.
///
/// `encode(0)` is the empty string; allocators never issue 0.
pub fn encode(id: u64) -> String {
    let mut digits = Vec::new();
    let mut n = id;
    while n > 0 {
        digits.push(ALPHABET[(n % RADIX) as usize]);
        n /= RADIX;
    }
    digits.reverse();
    // Every byte comes from ALPHABET.
    String::from_utf8(digits).unwrap_or_default()
}

/// Decode a token produced by [`encode`]. Only used for diagnostics.
pub fn decode(token: &str) -> Result<u64, DecodeError> {
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }

    token.chars().try_fold(0u64, |acc, c| {
        if !c.is_ascii_lowercase() {
            return Err(DecodeError::InvalidChar(c));
        }
        let digit = u64::from(c as u8 - b'a');
        acc.checked_mul(RADIX)
            .and_then(|v| v.checked_add(digit))
            .ok_or(DecodeError::Overflow)
    })
}

/// Source of fresh identifiers.
///
/// Implementations must return positive values that are never reissued and
/// never decrease across calls.
pub trait IdAllocator {
    fn allocate(&self) -> Result<u64, AllocError>;
}

/// In-memory sequence starting after a given value.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    last: AtomicU64,
}

impl SequenceAllocator {
    /// Create a sequence whose first identifier is `last + 1`.
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }
}

impl IdAllocator for SequenceAllocator {
    fn allocate(&self) -> Result<u64, AllocError> {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|prev| prev + 1)
            .map_err(|_| AllocError::Exhausted)
    }
}

/// Counter persisted as a decimal number in a text file.
///
/// The file holds the last identifier issued; a missing file means none has
/// been issued yet. Updates are written to a temporary file in the same
/// directory and renamed into place. Not safe against two processes
/// allocating at the same instant.
#[derive(Debug, Clone)]
pub struct FileCounter {
    path: PathBuf,
}

impl FileCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> AllocError {
        AllocError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_last(&self) -> Result<u64, AllocError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_error(e)),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse().map_err(|_| AllocError::Corrupt {
            path: self.path.display().to_string(),
            content: trimmed.to_string(),
        })
    }

    fn write_last(&self, value: u64) -> Result<(), AllocError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        writeln!(tmp, "{}", value).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

impl IdAllocator for FileCounter {
    fn allocate(&self) -> Result<u64, AllocError> {
        let next = self
            .read_last()?
            .checked_add(1)
            .ok_or(AllocError::Exhausted)?;
        self.write_last(next)?;

        info!(
            counter = %self.path.display(),
            id = next,
            "identifier_allocated"
        );

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_encode_small_values() {
        assert_eq!(encode(0), "");
        assert_eq!(encode(1), "b");
        assert_eq!(encode(25), "z");
        assert_eq!(encode(26), "ba");
        assert_eq!(encode(27), "bb");
        assert_eq!(encode(26 * 26), "baa");
    }

    #[test]
    fn test_encode_is_deterministic() {
        for n in [1u64, 42, 9999, u64::MAX] {
            assert_eq!(encode(n), encode(n));
        }
    }

    #[test]
    fn test_encode_is_injective() {
        let tokens: HashSet<String> = (1..5000u64).map(encode).collect();
        assert_eq!(tokens.len(), 4999);
    }

    #[test]
    fn test_decode_inverts_encode() {
        for n in [1u64, 25, 26, 27, 701, 702, 123_456_789, u64::MAX] {
            assert_eq!(decode(&encode(n)), Ok(n));
        }
    }

    #[test]
    fn test_decode_rejects_bad_tokens() {
        assert_eq!(decode(""), Err(DecodeError::Empty));
        assert_eq!(decode("aB"), Err(DecodeError::InvalidChar('B')));
        assert_eq!(decode("zzzzzzzzzzzzzzzz"), Err(DecodeError::Overflow));
    }

    #[test]
    fn test_sequence_allocator() {
        let alloc = SequenceAllocator::default();
        assert_eq!(alloc.allocate().unwrap(), 1);
        assert_eq!(alloc.allocate().unwrap(), 2);

        let alloc = SequenceAllocator::starting_after(u64::MAX - 1);
        assert_eq!(alloc.allocate().unwrap(), u64::MAX);
        assert!(matches!(alloc.allocate(), Err(AllocError::Exhausted)));
    }

    #[test]
    fn test_file_counter_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clickcheck.seq");

        let counter = FileCounter::new(&path);
        assert_eq!(counter.allocate().unwrap(), 1);
        assert_eq!(counter.allocate().unwrap(), 2);

        let reopened = FileCounter::new(&path);
        assert_eq!(reopened.allocate().unwrap(), 3);
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "3");
    }

    #[test]
    fn test_file_counter_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clickcheck.seq");
        fs::write(&path, "not a number\n").unwrap();

        let counter = FileCounter::new(&path);
        assert!(matches!(counter.allocate(), Err(AllocError::Corrupt { .. })));
    }
}
