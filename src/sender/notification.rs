//! Wire shape of a dispatched notification.

use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;

/// Built in the SenderPool's `BuildNotification` step, consumed by
/// `Dispatch`. `content` is populated only when the action's
/// `PostFileContents` is enabled and the file is within `MaxContentBytes`.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub path: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
    #[serde(rename = "lastWriteTime")]
    pub last_write_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Notification {
    pub fn build(path: &Path, size: u64, last_write: SystemTime, content: Option<String>) -> Self {
        let last_write_time: chrono::DateTime<chrono::Utc> = last_write.into();
        Self {
            path: path.to_string_lossy().into_owned(),
            file_size: size,
            last_write_time: last_write_time.to_rfc3339(),
            content,
        }
    }

    /// The metadata-only view used as the `metadata` part of a multipart
    /// request (never carries `content`, regardless of this notification's
    /// own `content` field).
    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path,
            "fileSize": self.file_size,
            "lastWriteTime": self.last_write_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn metadata_json_omits_content() {
        let n = Notification::build(
            &PathBuf::from("/watch/a.txt"),
            10,
            SystemTime::UNIX_EPOCH,
            Some("hello".to_string()),
        );
        let metadata = n.metadata_json();
        assert!(metadata.get("content").is_none());
        assert_eq!(metadata["fileSize"], 10);
    }
}
