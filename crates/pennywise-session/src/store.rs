//! Token store: the in-memory access token and its durable mirror.
//!
//! Memory is the source of truth. The [`SideChannel`] (a cookie in the
//! browser build, a file or nothing here) is read once at construction to
//! seed the store after a reload, and written on every change after that.
//!
//! Every mutation bumps a generation counter. The refresh coordinator
//! remembers the generation it started under and only writes its result
//! if nothing has changed since; that's how a sign-out wins against a
//! refresh that was already on the wire.
//!
//! Once the backend rejects the refresh credential the store remembers it
//! until a new token is written (normally by signing in again), so nothing
//! keeps presenting a credential that is known to be dead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use pennywise_protocol::{
    AccessToken, Codec, JsonCodec, TokenGrant, from_unix_seconds, unix_seconds,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SessionError;

// ---------------------------------------------------------------------------
// Side-channel
// ---------------------------------------------------------------------------

/// The durable form of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub access_token: AccessToken,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl StoredToken {
    fn expiry(&self) -> Option<SystemTime> {
        self.expires_at.and_then(from_unix_seconds)
    }
}

/// Durable storage that survives a reload.
///
/// `clear` wipes everything the side-channel owns, not just the token.
pub trait SideChannel: Send + Sync + 'static {
    fn load(&self) -> Option<StoredToken>;
    fn save(&self, token: &StoredToken) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Keeps the "durable" copy in memory. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySideChannel {
    slot: Arc<Mutex<Option<StoredToken>>>,
}

impl MemorySideChannel {
    /// A side-channel pre-seeded as if a previous page load had saved `token`.
    pub fn seeded(token: StoredToken) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(token))),
        }
    }

    /// What's currently persisted.
    pub fn peek(&self) -> Option<StoredToken> {
        self.slot.lock().clone()
    }
}

impl SideChannel for MemorySideChannel {
    fn load(&self) -> Option<StoredToken> {
        self.peek()
    }

    fn save(&self, token: &StoredToken) -> Result<(), SessionError> {
        *self.slot.lock() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// Persists the token as a small JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSideChannel {
    path: PathBuf,
}

impl JsonFileSideChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SideChannel for JsonFileSideChannel {
    fn load(&self) -> Option<StoredToken> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read token file");
                return None;
            }
        };
        match JsonCodec.decode(&bytes) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt token file");
                None
            }
        }
    }

    fn save(&self, token: &StoredToken) -> Result<(), SessionError> {
        let bytes = JsonCodec
            .encode(token)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SessionError::Storage(e.to_string()))?;
            }
        }
        std::fs::write(&self.path, bytes).map_err(|e| SessionError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// A consistent read of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: Option<AccessToken>,
    pub expires_at: Option<SystemTime>,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<AccessToken>,
    expires_at: Option<SystemTime>,
    generation: u64,
    rejected: Option<String>,
}

/// Holds the current access token.
///
/// Reads never block on I/O. Writes take one lock for both the token and
/// its expiry, so readers never see a token paired with the wrong expiry.
pub struct TokenStore {
    state: RwLock<TokenState>,
    side_channel: Box<dyn SideChannel>,
}

impl TokenStore {
    /// Creates a store seeded from `side_channel`.
    pub fn new(side_channel: impl SideChannel) -> Self {
        Self::from_boxed(Box::new(side_channel))
    }

    /// A store with nothing durable behind it.
    pub fn in_memory() -> Self {
        Self::new(MemorySideChannel::default())
    }

    pub(crate) fn from_boxed(side_channel: Box<dyn SideChannel>) -> Self {
        let mut state = TokenState::default();
        if let Some(stored) = side_channel.load() {
            debug!(expires_at = ?stored.expires_at, "seeded token from side-channel");
            state.expires_at = stored.expiry();
            state.token = Some(stored.access_token);
        }
        Self {
            state: RwLock::new(state),
            side_channel,
        }
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.state.read().token.clone()
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.state.read().expires_at
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read();
        TokenSnapshot {
            access_token: state.token.clone(),
            expires_at: state.expires_at,
            generation: state.generation,
        }
    }

    /// Replaces the token and mirrors it to the side-channel.
    pub fn set_access_token(&self, token: AccessToken, expires_at: Option<SystemTime>) {
        let mut state = self.state.write();
        self.write_locked(&mut state, token, expires_at);
    }

    /// Writes `grant` only if no other mutation happened since `generation`.
    ///
    /// Returns `false` (and writes nothing) when the store moved on, e.g.
    /// because the user signed out while the refresh was in flight.
    pub fn set_if_generation(&self, generation: u64, grant: &TokenGrant) -> bool {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        self.write_locked(&mut state, grant.access_token.clone(), grant.expires_at);
        true
    }

    /// Wipes the token here and in the side-channel.
    pub fn clear(&self) {
        let mut state = self.state.write();
        self.clear_locked(&mut state);
    }

    /// Wipes the token and marks the refresh credential as dead.
    ///
    /// The mark survives [`clear`](Self::clear) and is lifted by the next
    /// token write.
    pub fn reject_credential(&self, reason: impl Into<String>) {
        let mut state = self.state.write();
        self.clear_locked(&mut state);
        state.rejected = Some(reason.into());
    }

    /// Why the refresh credential was rejected, if it was.
    pub fn rejected_credential(&self) -> Option<String> {
        self.state.read().rejected.clone()
    }

    fn clear_locked(&self, state: &mut TokenState) {
        state.token = None;
        state.expires_at = None;
        state.generation += 1;
        if let Err(e) = self.side_channel.clear() {
            warn!(error = %e, "could not clear durable session state");
        }
    }

    fn write_locked(
        &self,
        state: &mut TokenState,
        token: AccessToken,
        expires_at: Option<SystemTime>,
    ) {
        let stored = StoredToken {
            access_token: token.clone(),
            expires_at: expires_at.map(unix_seconds),
        };
        state.token = Some(token);
        state.expires_at = expires_at;
        state.generation += 1;
        state.rejected = None;
        // Memory stays authoritative even if the mirror fails.
        if let Err(e) = self.side_channel.save(&stored) {
            warn!(error = %e, "could not persist access token");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_new_store_from_empty_side_channel_has_no_token() {
        let store = TokenStore::in_memory();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.expires_at(), None);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_new_store_seeds_from_side_channel() {
        let side = MemorySideChannel::seeded(StoredToken {
            access_token: AccessToken::new("persisted"),
            expires_at: Some(5_000),
        });

        let store = TokenStore::new(side);

        assert_eq!(store.access_token(), Some(AccessToken::new("persisted")));
        assert_eq!(store.expires_at(), Some(at(5_000)));
    }

    #[test]
    fn test_new_store_out_of_range_seeded_expiry_is_unknown() {
        let side = MemorySideChannel::seeded(StoredToken {
            access_token: AccessToken::new("persisted"),
            expires_at: Some(u64::MAX),
        });

        let store = TokenStore::new(side);

        assert_eq!(store.access_token(), Some(AccessToken::new("persisted")));
        assert_eq!(store.expires_at(), None);
    }

    #[test]
    fn test_reject_credential_survives_clear_until_next_write() {
        let store = TokenStore::in_memory();
        store.set_access_token(AccessToken::new("t1"), None);

        store.reject_credential("invalid_grant");
        store.clear();

        assert_eq!(store.access_token(), None);
        assert_eq!(store.rejected_credential().as_deref(), Some("invalid_grant"));

        store.set_access_token(AccessToken::new("t2"), None);
        assert_eq!(store.rejected_credential(), None);
    }

    #[test]
    fn test_set_access_token_mirrors_to_side_channel() {
        let side = MemorySideChannel::default();
        let store = TokenStore::new(side.clone());

        store.set_access_token(AccessToken::new("t1"), Some(at(900)));

        assert_eq!(
            side.peek(),
            Some(StoredToken {
                access_token: AccessToken::new("t1"),
                expires_at: Some(900),
            })
        );
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_clear_wipes_memory_and_side_channel() {
        let side = MemorySideChannel::default();
        let store = TokenStore::new(side.clone());
        store.set_access_token(AccessToken::new("t1"), None);

        store.clear();

        assert_eq!(store.access_token(), None);
        assert_eq!(side.peek(), None);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_set_if_generation_rejects_stale_writer() {
        let store = TokenStore::in_memory();
        let started_at = store.generation();

        store.clear();
        let written = store.set_if_generation(started_at, &TokenGrant::new("late", None));

        assert!(!written);
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_set_if_generation_accepts_current_writer() {
        let store = TokenStore::in_memory();
        let started_at = store.generation();

        let written =
            store.set_if_generation(started_at, &TokenGrant::new("fresh", Some(at(10))));

        assert!(written);
        assert_eq!(store.access_token(), Some(AccessToken::new("fresh")));
        assert_eq!(store.expires_at(), Some(at(10)));
    }

    #[test]
    fn test_json_file_side_channel_round_trips_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("token.json");

        let first = TokenStore::new(JsonFileSideChannel::new(&path));
        first.set_access_token(AccessToken::new("on-disk"), Some(at(1_234)));
        drop(first);

        let reloaded = TokenStore::new(JsonFileSideChannel::new(&path));
        assert_eq!(reloaded.access_token(), Some(AccessToken::new("on-disk")));
        assert_eq!(reloaded.expires_at(), Some(at(1_234)));

        reloaded.clear();
        assert!(!path.exists());
    }

    #[test]
    fn test_json_file_side_channel_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = TokenStore::new(JsonFileSideChannel::new(&path));

        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_json_file_side_channel_clear_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let side = JsonFileSideChannel::new(dir.path().join("absent.json"));
        assert!(side.clear().is_ok());
    }
}
