//! Local endpoint identity
//!
//! Maps an application identifier to the channel name used for the lock file
//! and the Unix socket. The name is a pure function of the identifier and the
//! current user, so every launch of the same application on the same account
//! lands on the same channel.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Prefix shared by every channel name
const CHANNEL_PREFIX: &str = "sp";

/// Readable characters of the identifier kept in the name
const HINT_LEN: usize = 6;

/// Digest bytes kept in the name (rendered as hex)
const DIGEST_LEN: usize = 8;

/// Derived channel name for one application identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    /// Derive the channel name for `application_id` as the current user
    pub fn derive(application_id: &str) -> Self {
        Self::derive_for_user(application_id, nix::unistd::getuid().as_raw())
    }

    /// Derive the channel name for `application_id` as a specific user
    pub fn derive_for_user(application_id: &str, uid: u32) -> Self {
        let hint: String = application_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(HINT_LEN)
            .collect::<String>()
            .to_ascii_lowercase();

        let hash = blake3::hash(application_id.as_bytes());
        let digest: String = hash.as_bytes()[..DIGEST_LEN]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        let name = if hint.is_empty() {
            format!("{}-{}-{}", CHANNEL_PREFIX, digest, uid)
        } else {
            format!("{}-{}-{}-{}", CHANNEL_PREFIX, hint, digest, uid)
        };
        debug!(%application_id, %name, "ChannelName::derive_for_user: derived");
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lock file guarding the primary role
    pub fn lock_path(&self, runtime_dir: &Path) -> PathBuf {
        runtime_dir.join(format!("{}.lock", self.0))
    }

    /// Socket the primary listens on
    pub fn socket_path(&self, runtime_dir: &Path) -> PathBuf {
        runtime_dir.join(format!("{}.sock", self.0))
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
