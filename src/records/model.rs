use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::operation::ResultCode;

/// What happens to the local file once the upload succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalBehaviour {
    /// Leave the local file where it is
    #[default]
    Copy,
    /// Remove the local file; the remote copy becomes the only one
    Move,
    Delete,
    /// Leave the file and drop any local bookkeeping for it
    Forget,
}

impl LocalBehaviour {
    pub fn removes_local_file(&self) -> bool {
        matches!(self, LocalBehaviour::Move | LocalBehaviour::Delete)
    }
}

/// Origin of a queued upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedBy {
    #[default]
    User,
    AutoUpload,
    ShareIntent,
    Api,
}

/// Policy applied when the remote path is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameCollisionPolicy {
    #[default]
    AskUser,
    Overwrite,
    Rename,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
    /// Stopped by the user; not picked up again
    Cancelled,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::InProgress => "in_progress",
            UploadStatus::Done => "done",
            UploadStatus::Failed => "failed",
            UploadStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One queued file transfer, owned by the upload store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: u64,
    pub account_name: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(default)]
    pub local_behaviour: LocalBehaviour,
    #[serde(default)]
    pub created_by: CreatedBy,
    #[serde(default)]
    pub name_collision_policy: NameCollisionPolicy,
    #[serde(default)]
    pub status: UploadStatus,
    #[serde(default)]
    pub last_result: Option<ResultCode>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    /// File name component of the remote path, used in notifications
    pub fn file_name(&self) -> &str {
        self.remote_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.remote_path)
    }
}

/// Upload request before the store has assigned an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUpload {
    pub account_name: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(default)]
    pub local_behaviour: LocalBehaviour,
    #[serde(default)]
    pub created_by: CreatedBy,
    #[serde(default)]
    pub name_collision_policy: NameCollisionPolicy,
}

impl NewUpload {
    pub fn new(
        account_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            local_behaviour: LocalBehaviour::default(),
            created_by: CreatedBy::default(),
            name_collision_policy: NameCollisionPolicy::default(),
        }
    }

    pub fn with_local_behaviour(mut self, behaviour: LocalBehaviour) -> Self {
        self.local_behaviour = behaviour;
        self
    }

    pub fn with_collision_policy(mut self, policy: NameCollisionPolicy) -> Self {
        self.name_collision_policy = policy;
        self
    }

    pub fn with_created_by(mut self, created_by: CreatedBy) -> Self {
        self.created_by = created_by;
        self
    }

    pub fn into_record(self, id: u64, now: DateTime<Utc>) -> UploadRecord {
        UploadRecord {
            id,
            account_name: self.account_name,
            local_path: self.local_path,
            remote_path: self.remote_path,
            local_behaviour: self.local_behaviour,
            created_by: self.created_by,
            name_collision_policy: self.name_collision_policy,
            status: UploadStatus::Pending,
            last_result: None,
            created_at: now,
            updated_at: now,
        }
    }
}
