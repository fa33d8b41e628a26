//! Request and response bodies of the control API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::records::{LocalBehaviour, NameCollisionPolicy, UploadRecord};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}

/// Ids of uploads currently executing
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveUploadsResponse {
    pub ids: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: u64,
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub paused: bool,
}

/// Body of `POST /uploads`
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub account: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(default)]
    pub local_behaviour: LocalBehaviour,
    #[serde(default)]
    pub name_collision_policy: NameCollisionPolicy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadListResponse {
    pub account: String,
    pub uploads: Vec<UploadRecord>,
}
