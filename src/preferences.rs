//! User preferences consulted before a batch starts

use fjall::PartitionHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

const GLOBAL_PAUSE_KEY: &[u8] = b"global_upload_paused";

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),
}

pub trait Preferences: Send + Sync {
    fn is_global_upload_paused(&self) -> bool;

    fn set_global_upload_paused(&self, paused: bool) -> Result<(), PreferencesError>;
}

/// In-memory preferences, lost on restart
#[derive(Debug, Default)]
pub struct SharedPreferences {
    paused: AtomicBool,
}

impl SharedPreferences {
    pub fn new(paused: bool) -> Self {
        Self {
            paused: AtomicBool::new(paused),
        }
    }
}

impl Preferences for SharedPreferences {
    fn is_global_upload_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_global_upload_paused(&self, paused: bool) -> Result<(), PreferencesError> {
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }
}

/// Preferences persisted next to the upload queue
///
/// See [`crate::records::FjallUploadStore::preferences`].
#[derive(Clone)]
pub struct FjallPreferences {
    partition: PartitionHandle,
}

impl FjallPreferences {
    pub(crate) fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }
}

impl Preferences for FjallPreferences {
    fn is_global_upload_paused(&self) -> bool {
        match self.partition.get(GLOBAL_PAUSE_KEY) {
            Ok(Some(value)) => value.first() == Some(&1),
            Ok(None) => false,
            Err(e) => {
                // Unreadable preference: keep uploading rather than stall silently
                warn!(error = %e, "Failed to read global pause flag");
                false
            }
        }
    }

    fn set_global_upload_paused(&self, paused: bool) -> Result<(), PreferencesError> {
        self.partition
            .insert(GLOBAL_PAUSE_KEY, &[u8::from(paused)][..])?;
        info!(paused, "Global upload pause updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FjallUploadStore;
    use tempfile::TempDir;

    #[test]
    fn test_shared_preferences_toggle() {
        let prefs = SharedPreferences::default();
        assert!(!prefs.is_global_upload_paused());

        prefs.set_global_upload_paused(true).unwrap();
        assert!(prefs.is_global_upload_paused());
    }

    #[test]
    fn test_fjall_preferences_persist_across_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FjallUploadStore::open(temp_dir.path()).unwrap();
            let prefs = store.preferences().unwrap();
            assert!(!prefs.is_global_upload_paused());
            prefs.set_global_upload_paused(true).unwrap();
            store.flush().unwrap();
        }

        let store = FjallUploadStore::open(temp_dir.path()).unwrap();
        let prefs = store.preferences().unwrap();
        assert!(prefs.is_global_upload_paused());

        prefs.set_global_upload_paused(false).unwrap();
        assert!(!prefs.is_global_upload_paused());
    }
}
