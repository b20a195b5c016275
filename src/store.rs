use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scratch data tying this trigger to its remote registration.
///
/// `webhook_id` and `signing_secret` are only ever set or cleared together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationState {
    webhook_id: Option<String>,
    #[serde(rename = "hmacSecret")]
    signing_secret: Option<String>,
    handshake_secret: Option<String>,
}

impl RegistrationState {
    pub fn webhook_id(&self) -> Option<&str> {
        self.webhook_id.as_deref()
    }

    pub fn signing_secret(&self) -> Option<&str> {
        self.signing_secret.as_deref()
    }

    pub fn handshake_secret(&self) -> Option<&str> {
        self.handshake_secret.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.webhook_id.is_some()
    }

    /// Take over a remote registration.
    pub fn adopt(&mut self, webhook_id: impl Into<String>, signing_secret: impl Into<String>) {
        self.webhook_id = Some(webhook_id.into());
        self.signing_secret = Some(signing_secret.into());
    }

    pub fn record_handshake(&mut self, secret: impl Into<String>) {
        self.handshake_secret = Some(secret.into());
    }

    /// Forget the registration and every secret tied to it.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_consistent(&self) -> bool {
        self.webhook_id.is_some() == self.signing_secret.is_some()
    }
}

/// Handle to the registration state of one running trigger.
///
/// Cloning shares the same state. When opened with a file path every
/// [`persist`](Self::persist) writes the state there as JSON, so a restart
/// resumes with the same registration.
#[derive(Debug, Clone, Default)]
pub struct TriggerState {
    inner: Arc<RwLock<RegistrationState>>,
    path: Option<PathBuf>,
}

impl TriggerState {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_state(state: RegistrationState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
            path: None,
        }
    }

    /// Open a file-backed state, loading it when the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = load(&path)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(state)),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> RegistrationState {
        self.inner.read().await.clone()
    }

    pub async fn signing_secret(&self) -> Option<String> {
        self.inner.read().await.signing_secret.clone()
    }

    pub async fn webhook_id(&self) -> Option<String> {
        self.inner.read().await.webhook_id.clone()
    }

    /// Apply a mutation under the write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut RegistrationState) -> R) -> R {
        let mut state = self.inner.write().await;
        let result = f(&mut state);
        debug_assert!(state.is_consistent(), "webhook id and secret out of step");
        result
    }

    /// Write the current state to its file. No-op for in-memory state.
    ///
    /// The write lock is held until the file is in place, so the last
    /// writer always stores the newest state.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let state = self.inner.write().await;
        save(path, &state)
    }
}

fn load(path: &Path) -> Result<RegistrationState, StoreError> {
    if !path.exists() {
        return Ok(RegistrationState::default());
    }
    let content = std::fs::read_to_string(path).map_err(StoreError::Read)?;
    if content.trim().is_empty() {
        return Ok(RegistrationState::default());
    }
    let mut state: RegistrationState = serde_json::from_str(&content)?;
    if !state.is_consistent() {
        // A half-written registration cannot verify anything.
        state.clear();
    }
    Ok(state)
}

fn save(path: &Path, state: &RegistrationState) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(StoreError::Write)?;
    }
    let content = serde_json::to_string_pretty(state)?;
    let staging = staging_path(path);
    std::fs::write(&staging, content).map_err(StoreError::Write)?;
    std::fs::rename(&staging, path).map_err(StoreError::Write)
}

/// Sibling of `path` the new content is written to before the rename.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopt_and_clear_move_id_and_secret_together() {
        let mut state = RegistrationState::default();
        assert!(!state.is_registered());

        state.adopt("wh-1", "secret");
        assert_eq!(state.webhook_id(), Some("wh-1"));
        assert_eq!(state.signing_secret(), Some("secret"));

        state.record_handshake("hs");
        state.clear();
        assert_eq!(state, RegistrationState::default());
    }

    #[test]
    fn serialized_field_names() {
        let mut state = RegistrationState::default();
        state.adopt("wh-1", "secret");
        state.record_handshake("hs");
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            serde_json::json!({
                "webhookId": "wh-1",
                "hmacSecret": "secret",
                "handshakeSecret": "hs"
            })
        );
    }

    #[tokio::test]
    async fn file_backed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let state = TriggerState::open(&path).unwrap();
        assert_eq!(state.snapshot().await, RegistrationState::default());

        state.update(|s| s.adopt("wh-9", "s3cr3t")).await;
        state.persist().await.unwrap();

        let reopened = TriggerState::open(&path).unwrap();
        assert_eq!(reopened.webhook_id().await.as_deref(), Some("wh-9"));
        assert_eq!(reopened.signing_secret().await.as_deref(), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn concurrent_updates_all_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let registrar_side = TriggerState::open(&path).unwrap();
        let handshake_side = registrar_side.clone();

        let adopt = async {
            registrar_side.update(|s| s.adopt("wh-3", "sig")).await;
            registrar_side.persist().await.unwrap();
        };
        let handshake = async {
            handshake_side.update(|s| s.record_handshake("hs")).await;
            handshake_side.persist().await.unwrap();
        };
        tokio::join!(adopt, handshake);

        let reopened = TriggerState::open(&path).unwrap().snapshot().await;
        assert_eq!(reopened.webhook_id(), Some("wh-3"));
        assert_eq!(reopened.handshake_secret(), Some("hs"));
    }

    #[tokio::test]
    async fn persist_replaces_file_without_leaving_staging_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = TriggerState::open(&path).unwrap();

        state.update(|s| s.adopt("wh-1", "a")).await;
        state.persist().await.unwrap();
        state.update(|s| s.adopt("wh-2", "b")).await;
        state.persist().await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("state.json")]);
        assert_eq!(
            TriggerState::open(&path).unwrap().webhook_id().await.as_deref(),
            Some("wh-2")
        );
    }

    #[tokio::test]
    async fn inconsistent_file_is_discarded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"webhookId":"wh-1"}"#).unwrap();

        let state = TriggerState::open(&path).unwrap();
        assert_eq!(state.snapshot().await, RegistrationState::default());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(TriggerState::open(&path), Err(StoreError::Parse(_))));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = TriggerState::in_memory();
        let b = a.clone();
        a.update(|s| s.record_handshake("hs")).await;
        assert_eq!(b.snapshot().await.handshake_secret(), Some("hs"));
        assert!(b.persist().await.is_ok());
    }
}
