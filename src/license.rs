//! Host identifiers and the `license.fo` fingerprint derived from them.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Error;

/// An opaque 8-byte host identifier. The wire format only fixes that the
/// primary's identifier travels as decimal text; it leaves open how a host
/// derives its own value. This crate derives it once, at startup, from the
/// resolved hostname, so it is stable across restarts of the same host and
/// needs no OS-specific machine-id API (see DESIGN.md for the rationale).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostId(pub [u8; 8]);

impl HostId {
    pub fn from_hostname(hostname: &str) -> HostId {
        let digest = Sha256::digest(hostname.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        HostId(bytes)
    }

    /// Decimal text representation, as carried in the registration reply.
    pub fn to_decimal_string(self) -> String {
        u64::from_be_bytes(self.0).to_string()
    }

    pub fn from_decimal_string(s: &str) -> Result<HostId, Error> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|_| Error::protocol(format!("malformed host identifier {s:?}")))?;
        Ok(HostId(value.to_be_bytes()))
    }

    pub fn xor(self, other: HostId) -> [u8; 8] {
        let mut out = [0u8; 8];
        for i in 0..8 {
            out[i] = self.0[i] ^ other.0[i];
        }
        out
    }
}

/// `<priv>/license.fo` — 8 bytes, mode 0600, the XOR of the two hosts'
/// identifiers, written exactly once per successful registration.
pub struct LicenseFile {
    path: PathBuf,
}

impl LicenseFile {
    pub fn new(priv_dir: impl AsRef<Path>) -> Self {
        LicenseFile {
            path: priv_dir.as_ref().join("license.fo"),
        }
    }

    pub async fn write(&self, fingerprint: [u8; 8]) -> Result<(), Error> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_sync(&path, &fingerprint))
            .await
            .map_err(|join_err| Error::fatal(format!("license write task panicked: {join_err}")))??;
        Ok(())
    }

    pub async fn read(&self) -> Result<[u8; 8], Error> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::fatal(format!("cannot open {}: {e}", self.path.display())))?;
        bytes
            .try_into()
            .map_err(|_| Error::fatal(format!("{} is not 8 bytes", self.path.display())))
    }
}

#[cfg(unix)]
fn write_sync(path: &Path, fingerprint: &[u8; 8]) -> Result<(), std::io::Error> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(fingerprint)
}

#[cfg(not(unix))]
fn write_sync(path: &Path, fingerprint: &[u8; 8]) -> Result<(), std::io::Error> {
    std::fs::write(path, fingerprint)
}
