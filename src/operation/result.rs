use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome code of a single-file upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    Cancelled,
    AlreadyExistsSkipped,
    QuotaExceeded,
    Forbidden,
    AccountRemoved,
    AccountMismatch,
    NoNetworkConnection,
    InternetWalled,
    Timeout,
    ServerError,
    HostNotAvailable,
    SyncConflict,
    LocalFileNotFound,
    LocalFileNotReadable,
    LocalStorageFull,
    WrongConnection,
    /// Stopped by a worker shutdown; the upload stays queued
    Interrupted,
    Unknown,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::Cancelled => "CANCELLED",
            ResultCode::AlreadyExistsSkipped => "ALREADY_EXISTS_SKIPPED",
            ResultCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ResultCode::Forbidden => "FORBIDDEN",
            ResultCode::AccountRemoved => "ACCOUNT_REMOVED",
            ResultCode::AccountMismatch => "ACCOUNT_MISMATCH",
            ResultCode::NoNetworkConnection => "NO_NETWORK_CONNECTION",
            ResultCode::InternetWalled => "INTERNET_WALLED",
            ResultCode::Timeout => "TIMEOUT",
            ResultCode::ServerError => "SERVER_ERROR",
            ResultCode::HostNotAvailable => "HOST_NOT_AVAILABLE",
            ResultCode::SyncConflict => "SYNC_CONFLICT",
            ResultCode::LocalFileNotFound => "LOCAL_FILE_NOT_FOUND",
            ResultCode::LocalFileNotReadable => "LOCAL_FILE_NOT_READABLE",
            ResultCode::LocalStorageFull => "LOCAL_STORAGE_FULL",
            ResultCode::WrongConnection => "WRONG_CONNECTION",
            ResultCode::Interrupted => "INTERRUPTED",
            ResultCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a result code affects the rest of the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    /// Aborts the remaining records; the batch fails
    Fatal,
    /// Transient; the batch continues and asks to be rescheduled
    Retryable,
    /// Deliberately not uploaded; never counted as a failure
    BenignSkip,
}

/// The one place result codes are bucketed. Codes without an explicit entry
/// are retryable so that work is rescheduled rather than dropped.
pub fn classify(code: ResultCode) -> Classification {
    match code {
        ResultCode::Ok => Classification::Success,

        ResultCode::QuotaExceeded
        | ResultCode::Forbidden
        | ResultCode::AccountRemoved
        | ResultCode::AccountMismatch => Classification::Fatal,

        ResultCode::Cancelled | ResultCode::AlreadyExistsSkipped => Classification::BenignSkip,

        ResultCode::NoNetworkConnection
        | ResultCode::InternetWalled
        | ResultCode::Timeout
        | ResultCode::ServerError
        | ResultCode::HostNotAvailable => Classification::Retryable,

        _ => Classification::Retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_codes() {
        for code in [
            ResultCode::QuotaExceeded,
            ResultCode::Forbidden,
            ResultCode::AccountRemoved,
            ResultCode::AccountMismatch,
        ] {
            assert_eq!(classify(code), Classification::Fatal, "{code}");
        }
    }

    #[test]
    fn test_benign_and_success_codes() {
        assert_eq!(classify(ResultCode::Ok), Classification::Success);
        assert_eq!(classify(ResultCode::Cancelled), Classification::BenignSkip);
        assert_eq!(
            classify(ResultCode::AlreadyExistsSkipped),
            Classification::BenignSkip
        );
    }

    #[test]
    fn test_unlisted_codes_default_to_retryable() {
        for code in [
            ResultCode::NoNetworkConnection,
            ResultCode::Timeout,
            ResultCode::SyncConflict,
            ResultCode::LocalFileNotFound,
            ResultCode::LocalStorageFull,
            ResultCode::WrongConnection,
            ResultCode::Interrupted,
            ResultCode::Unknown,
        ] {
            assert_eq!(classify(code), Classification::Retryable, "{code}");
        }
    }

    #[test]
    fn test_wire_names_match_display() {
        let json = serde_json::to_string(&ResultCode::QuotaExceeded).unwrap();
        assert_eq!(json, "\"QUOTA_EXCEEDED\"");
        assert_eq!(ResultCode::QuotaExceeded.to_string(), "QUOTA_EXCEEDED");

        let parsed: ResultCode = serde_json::from_str("\"NO_NETWORK_CONNECTION\"").unwrap();
        assert_eq!(parsed, ResultCode::NoNetworkConnection);
    }
}
