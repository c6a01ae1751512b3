//! The generation-service credential and its on-disk persistence.
//!
//! A single API key is stored as a JSON object under a fixed key name, in
//! `$CONFIG_DIR/agentflow/credentials.json` unless a path is given. The file
//! is read once when a session starts and rewritten whenever the key changes.

use crate::error::AgentFlowError;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON key the API key is stored under.
pub const CREDENTIAL_KEY: &str = "gemini_api_key";

/// An opaque API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for empty or whitespace-only keys.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "Credential(…{tail})")
    }
}

/// File-backed credential persistence.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The per-user default location.
    pub fn default_location() -> Result<Self, AgentFlowError> {
        let dir = dirs::config_dir().ok_or_else(|| {
            AgentFlowError::Internal("no configuration directory for this platform".into())
        })?;
        Ok(Self::new(dir.join("agentflow").join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential. A missing file is not an error.
    pub fn load(&self) -> Result<Option<Credential>, AgentFlowError> {
        let Some(map) = self.read_map()? else {
            return Ok(None);
        };
        Ok(map
            .get(CREDENTIAL_KEY)
            .and_then(Value::as_str)
            .and_then(Credential::new))
    }

    /// Persist `credential`, keeping any other keys already in the file.
    ///
    /// An existing file that cannot be read or parsed is left untouched and
    /// reported, as [`load`](Self::load) does.
    pub fn save(&self, credential: &Credential) -> Result<(), AgentFlowError> {
        let mut map = self.read_map()?.unwrap_or_default();
        map.insert(
            CREDENTIAL_KEY.to_string(),
            Value::String(credential.expose().to_string()),
        );

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.failure(e))?;
        }
        let body = serde_json::to_string_pretty(&map).map_err(|e| self.failure(e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.failure(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.failure(e))?;
        debug!("Saved credential to {}", self.path.display());
        Ok(())
    }

    /// `None` when the file does not exist yet.
    fn read_map(&self) -> Result<Option<Map<String, Value>>, AgentFlowError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.failure(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| self.failure(e))
    }

    fn failure(&self, e: impl fmt::Display) -> AgentFlowError {
        AgentFlowError::CredentialStoreFailed {
            path: self.path.clone(),
            detail: e.to_string(),
        }
    }
}
