//! Durable session cache.
//!
//! The cached user is trusted on restore without re-verifying the credential.
//! Anything able to write the cache can sign in as anyone; the dashboard has
//! always behaved this way and it is kept as-is.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::IdentityClaim;

/// Errors from the session cache backend.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the cache failed.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The cache content could not be (de)serialized.
    #[error("Session serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The authenticated user as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionUser {
    /// Verified email.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub picture: Option<String>,
    /// The raw signed token this user was derived from.
    pub credential: Option<String>,
}

impl SessionUser {
    /// Builds the cache entry from a freshly decoded claim.
    pub fn from_claim(claim: IdentityClaim, credential: &str) -> Self {
        Self {
            email: claim.email,
            name: claim.name,
            picture: claim.picture,
            credential: Some(credential.to_string()),
        }
    }

    /// Placeholder identity used by the loopback dev bypass.
    pub fn developer() -> Self {
        Self {
            email: "dev@localhost".to_string(),
            name: Some("Developer".to_string()),
            picture: None,
            credential: None,
        }
    }

    /// The claim view of this user.
    pub fn claim(&self) -> IdentityClaim {
        IdentityClaim {
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
        }
    }
}

/// A durable key-value slot holding at most one [`SessionUser`].
pub trait SessionStore: Send + Sync {
    /// Returns the cached user, if any.
    fn load(&self) -> Result<Option<SessionUser>, SessionError>;
    /// Replaces the cached user.
    fn save(&self, user: &SessionUser) -> Result<(), SessionError>;
    /// Removes the cached user.
    fn clear(&self) -> Result<(), SessionError>;
}

/// JSON file backed session cache.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Uses `path` as the cache file. Parent directories are created on save.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionUser>, SessionError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, user: &SessionUser) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(user)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process session cache, for hosts without durable storage.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<SessionUser>>,
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionUser>, SessionError> {
        Ok(self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, user: &SessionUser) -> Result<(), SessionError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}
