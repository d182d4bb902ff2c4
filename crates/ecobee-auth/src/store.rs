//! Token stores
//!
//! A store owns exactly one `Credential` and swaps it wholesale on `update`, so
//! readers always see a matching access token, refresh token and expiry.
//! `MemoryTokenStore` forgets everything on restart; `PersistentTokenStore`
//! writes each new credential to disk before making it visible in memory.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::constants::VALIDITY_SAFETY_MARGIN_SECS;
use crate::error::{Error, Result};
use crate::token::TokenRefreshResponse;

/// Bearer credential. Also the on-disk layout of `PersistentTokenStore`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub valid_until: DateTime<Utc>,
}

impl Credential {
    /// Build the credential for a refresh response received at `now`.
    ///
    /// `valid_until` is fixed here, `expires_in` minus the safety margin. An
    /// expiry that does not fit in a timestamp is a malformed response.
    pub fn from_refresh(response: &TokenRefreshResponse, now: DateTime<Utc>) -> Result<Self> {
        let valid_until = response
            .expires_in
            .checked_sub(&TimeDelta::seconds(VALIDITY_SAFETY_MARGIN_SECS))
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::Decode(format!(
                    "expires_in of {}s overflows the credential expiry",
                    response.expires_in.num_seconds()
                ))
            })?;
        Ok(Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            valid_until,
        })
    }

    /// Remaining validity at `now`. Negative once expired.
    pub fn valid_for(&self, now: DateTime<Utc>) -> TimeDelta {
        self.valid_until - now
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("valid_until", &self.valid_until)
            .finish()
    }
}

/// Holder of the process's bearer credential.
///
/// Reads are synchronous and never wait on network I/O. `update` is async
/// because durable stores write to disk before returning.
pub trait TokenStore: Send + Sync {
    /// A consistent copy of the whole credential.
    fn credential(&self) -> Credential;

    fn access_token(&self) -> String {
        self.credential().access_token
    }

    fn refresh_token(&self) -> String {
        self.credential().refresh_token
    }

    /// `valid_until - now`. Callers must treat a negative value as expired.
    fn valid_for(&self) -> TimeDelta;

    /// Replace the credential with the contents of a refresh response.
    ///
    /// Either all three fields change or none do.
    fn update<'a>(
        &'a self,
        response: &'a TokenRefreshResponse,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

fn read(lock: &RwLock<Credential>) -> Credential {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace(lock: &RwLock<Credential>, credential: Credential) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = credential;
}

/// Token store with no persistence.
pub struct MemoryTokenStore {
    state: RwLock<Credential>,
    clock: Arc<dyn Clock>,
}

impl MemoryTokenStore {
    pub fn new(response: &TokenRefreshResponse, clock: Arc<dyn Clock>) -> Result<Self> {
        let credential = Credential::from_refresh(response, clock.now())?;
        Ok(Self::from_credential(credential, clock))
    }

    pub fn from_credential(credential: Credential, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(credential),
            clock,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn credential(&self) -> Credential {
        read(&self.state)
    }

    fn valid_for(&self) -> TimeDelta {
        self.credential().valid_for(self.clock.now())
    }

    fn update<'a>(
        &'a self,
        response: &'a TokenRefreshResponse,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let credential = Credential::from_refresh(response, self.clock.now())?;
            replace(&self.state, credential);
            debug!("updated in-memory credential");
            Ok(())
        })
    }
}

/// Token store mirrored to a JSON file.
///
/// `write_lock` serializes updates so the file and the in-memory copy never
/// disagree about which refresh landed last.
pub struct PersistentTokenStore {
    path: PathBuf,
    state: RwLock<Credential>,
    write_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl PersistentTokenStore {
    /// Create a store from a fresh token response, writing it to `path`.
    pub async fn create(
        response: &TokenRefreshResponse,
        path: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let credential = Credential::from_refresh(response, clock.now())?;
        write_atomic(&path, &credential).await?;
        info!(path = %path.display(), "created persistent token store");
        Ok(Self {
            path,
            state: RwLock::new(credential),
            write_lock: Mutex::new(()),
            clock,
        })
    }

    /// Reconstruct a store from `path`.
    ///
    /// A missing or unreadable file is an error; there is no empty cold start
    /// because nothing works without a credential.
    pub async fn load(path: PathBuf, clock: Arc<dyn Clock>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Io(format!("reading token store {}: {e}", path.display())))?;
        let credential: Credential = serde_json::from_str(&contents).map_err(|e| {
            Error::CredentialParse(format!("parsing token store {}: {e}", path.display()))
        })?;
        info!(
            path = %path.display(),
            valid_for_secs = credential.valid_for(clock.now()).num_seconds(),
            "loaded token store"
        );
        Ok(Self {
            path,
            state: RwLock::new(credential),
            write_lock: Mutex::new(()),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for PersistentTokenStore {
    fn credential(&self) -> Credential {
        read(&self.state)
    }

    fn valid_for(&self) -> TimeDelta {
        self.credential().valid_for(self.clock.now())
    }

    fn update<'a>(
        &'a self,
        response: &'a TokenRefreshResponse,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let _writer = self.write_lock.lock().await;
            let credential = Credential::from_refresh(response, self.clock.now())?;
            write_atomic(&self.path, &credential).await?;
            replace(&self.state, credential);
            debug!(path = %self.path.display(), "updated persistent credential");
            Ok(())
        })
    }
}

/// Write the credential to a temp file beside `path`, then rename it over
/// `path`. Permissions are 0600 since the file holds bearer tokens.
async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".promobee-tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token store: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token store permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token store: {e}")))?;

    Ok(())
}
