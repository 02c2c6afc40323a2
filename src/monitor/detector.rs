use sha2::{Digest, Sha256};

/// SHA-256 of a raw response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyHash([u8; 32]);

impl BodyHash {
    pub fn of(body: &[u8]) -> Self {
        Self(Sha256::digest(body).into())
    }
}

impl std::fmt::Display for BodyHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Remembers the last body that was parsed successfully.
///
/// Servers that ignore conditional requests still return byte-identical
/// bodies; comparing hashes lets the poll loop skip parsing and diffing them.
/// The hash is only committed by the caller after the body parsed, so a body
/// that failed to parse is retried in full next cycle.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<BodyHash>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unchanged(&self, hash: &BodyHash) -> bool {
        self.last.as_ref() == Some(hash)
    }

    pub fn commit(&mut self, hash: BodyHash) {
        self.last = Some(hash);
    }

    pub fn last(&self) -> Option<&BodyHash> {
        self.last.as_ref()
    }
}
