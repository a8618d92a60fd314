//! Device state persistence.
//!
//! The state lives in a single serialized blob at `db.proto`, written
//! through a `db.proto.tmp` staging file. The save path removes the old
//! file before renaming the staging file into place, so there is a
//! brief window where a power loss leaves neither; a boot after that
//! window reinstalls defaults, which is the accepted failure mode.

use std::path::{Path, PathBuf};

use tokio::fs;

use loramesh_core::constants::DEVICESTATE_CUR_VER;

use crate::devicestate::DeviceState;

/// File name of the current device state.
pub const DEVICE_STATE_FILE: &str = "db.proto";

/// File name of the staging copy written during a save.
pub const DEVICE_STATE_TMP: &str = "db.proto.tmp";

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Encode(String),

    #[error("deserialization error: {0}")]
    Decode(String),

    #[error("failed to determine storage directory")]
    Directory,
}

/// Persistent storage for the device state.
pub struct Store {
    base_dir: PathBuf,
}

impl Store {
    /// Create a store, creating the directory if needed.
    pub fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Create a store at the default path (`~/.loramesh/storage`).
    pub fn default_path() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::Directory)?;
        Self::new(home.join(".loramesh").join("storage"))
    }

    /// Path of the current device state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join(DEVICE_STATE_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.base_dir.join(DEVICE_STATE_TMP)
    }

    /// Load the saved device state. Returns `Ok(None)` when no state
    /// has been saved yet; version acceptance is the caller's contract.
    pub async fn load(&self) -> Result<Option<DeviceState>, StoreError> {
        match fs::read(self.state_path()).await {
            Ok(bytes) => {
                let state: DeviceState = postcard::from_bytes(&bytes)
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Save the device state, stamping the current schema version.
    ///
    /// Honors the `no_save` development flag by not touching the
    /// filesystem at all. On a serialization or staging-write failure
    /// the previous state file is left intact.
    pub async fn save(&self, state: &mut DeviceState) -> Result<(), StoreError> {
        if state.no_save {
            tracing::warn!("development mode, not saving device state");
            return Ok(());
        }

        state.version = DEVICESTATE_CUR_VER;
        let bytes =
            postcard::to_allocvec(state).map_err(|e| StoreError::Encode(e.to_string()))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes).await?;

        // Brief window of risk between the remove and the rename.
        self.replace_current(&tmp).await?;

        tracing::debug!(bytes = bytes.len(), "device state saved");
        Ok(())
    }

    async fn replace_current(&self, tmp: &Path) -> Result<(), StoreError> {
        let current = self.state_path();
        match fs::remove_file(&current).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("can't remove old device state file: {e}"),
        }
        fs::rename(tmp, &current).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devicestate::NodeInfo;
    use loramesh_core::constants::DEVICESTATE_MIN_VER;
    use loramesh_core::NodeNum;

    fn store_in(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path().to_path_buf()).unwrap()
    }

    fn populated_state() -> DeviceState {
        let mut state = DeviceState {
            has_my_node: true,
            has_owner: true,
            has_radio: true,
            ..Default::default()
        };
        state.my_node.my_node_num = NodeNum::new(0x1234);
        state.owner.long_name = "Unknown 4455".to_string();
        state.owner.macaddr = [2, 0x11, 0x22, 0x33, 0x44, 0x55];
        let mut info = NodeInfo::new(NodeNum::new(0x42));
        info.snr = 6.25;
        info.position.time = 1000;
        state.node_db.push(info);
        state
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = populated_state();
        store.save(&mut state).await.unwrap();

        let loaded = store.load().await.unwrap().expect("state should load");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn save_stamps_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = populated_state();
        assert_eq!(state.version, 0);
        store.save(&mut state).await.unwrap();

        assert_eq!(state.version, DEVICESTATE_CUR_VER);
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.version, DEVICESTATE_CUR_VER);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_corrupt_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.state_path(), b"\xFF\xFF\xFF\xFF garbage").unwrap();

        match store.load().await {
            Err(StoreError::Decode(_)) => {}
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_save_leaves_filesystem_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = populated_state();
        state.no_save = true;
        store.save(&mut state).await.unwrap();

        assert!(!store.state_path().exists());
        // The version is not even stamped.
        assert_eq!(state.version, 0);
    }

    #[tokio::test]
    async fn staging_file_is_not_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = populated_state();
        store.save(&mut state).await.unwrap();

        assert!(store.state_path().exists());
        assert!(!dir.path().join(DEVICE_STATE_TMP).exists());
    }

    #[tokio::test]
    async fn save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut first = populated_state();
        store.save(&mut first).await.unwrap();

        let mut second = populated_state();
        second.owner.long_name = "Renamed".to_string();
        store.save(&mut second).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.owner.long_name, "Renamed");
    }

    #[tokio::test]
    async fn stale_version_is_loadable_for_caller_to_reject() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        // Written directly, bypassing the version stamp.
        let state = DeviceState {
            version: DEVICESTATE_MIN_VER - 1,
            ..Default::default()
        };
        let bytes = postcard::to_allocvec(&state).unwrap();
        std::fs::write(store.state_path(), bytes).unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.version, DEVICESTATE_MIN_VER - 1);
    }

    #[test]
    fn store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(!nested.exists());
        let _store = Store::new(nested.clone()).unwrap();
        assert!(nested.exists());
    }
}
