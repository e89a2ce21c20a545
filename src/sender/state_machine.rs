//! Per-file processing pipeline: `CheckPosted -> ResolveConfig ->
//! WaitForReady -> BuildNotification -> Dispatch -> Interpret -> Archive`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use reqwest::multipart;

use crate::config::{EffectiveConfig, ResolvedAction, ResolvedRestPost};
use crate::core::CancellationToken;

use super::SenderPool;
use super::notification::Notification;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn run(path: PathBuf, pool: &SenderPool, cancel: &CancellationToken) {
    // 1. CheckPosted
    if pool.diagnostics.is_posted(&path) {
        return;
    }

    // 2. ResolveConfig
    let Some(effective) = (pool.resolve_config)(&path) else {
        return;
    };
    let Some(ResolvedAction::RestPost(rest_post)) = effective.action.clone() else {
        // External-process actions are dispatched by the watcher directly;
        // nothing left for the sender pool to do here.
        return;
    };

    // 3. WaitForReady
    let Some(size) = wait_for_ready(&path, &effective, rest_post.post_file_contents, cancel).await else {
        pool.diagnostics.record_file_event(&path, false, None);
        return;
    };

    let last_write = std::fs::metadata(&path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());

    // 4. BuildNotification
    let raw_bytes = if rest_post.post_file_contents && size <= rest_post.max_content_bytes {
        tokio::fs::read(&path).await.ok()
    } else {
        if rest_post.post_file_contents {
            crate::log!("send"; "{} exceeds MaxContentBytes, sending metadata only", path.display());
        }
        None
    };
    let content = raw_bytes
        .as_ref()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
    let notification = Notification::build(&path, size, last_write, content);

    // 5. Dispatch
    let use_multipart =
        rest_post.post_file_contents && size > rest_post.streaming_threshold_bytes && size <= rest_post.max_content_bytes;

    let endpoint_key = rest_post.endpoint.clone();
    let request_id = generate_request_id();
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let outcome = if use_multipart {
        let Some(bytes) = raw_bytes.clone() else {
            pool.diagnostics.record_file_event(&path, false, None);
            return;
        };
        pool.resilience
            .execute(&endpoint_key, &rest_post, cancel, || {
                build_multipart_request(pool, &rest_post, &notification, &basename, bytes.clone(), &request_id)
            })
            .await
    } else {
        pool.resilience
            .execute(&endpoint_key, &rest_post, cancel, || {
                build_json_request(pool, &rest_post, &notification, &request_id)
            })
            .await
    };

    // 6. Interpret result
    if outcome.short_circuited {
        pool.diagnostics.record_file_event(&path, false, None);
        crate::log!("send"; "{} short-circuited by open breaker [{request_id}]", path.display());
        return;
    }

    if outcome.success {
        pool.diagnostics.record_file_event(&path, true, outcome.last_status);
        crate::log!(
            "send", status: outcome.last_status;
            "posted {} in {} attempt(s) [{request_id}]",
            path.display(),
            outcome.attempts
        );
        if effective.move_processed_files {
            // 7. Archive
            if let Err(e) = super::archive::archive(&path, &effective.processed_folder) {
                crate::log!("send"; "archive failed for {}: {e}", path.display());
            }
        }
    } else {
        pool.diagnostics.record_file_event(&path, false, outcome.last_status);
        crate::log!(
            "send", status: outcome.last_status;
            "failed to post {} after {} attempt(s) [{request_id}]{}",
            path.display(),
            outcome.attempts,
            outcome.last_error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
        );
    }
}

async fn wait_for_ready(
    path: &Path,
    effective: &EffectiveConfig,
    post_file_contents: bool,
    cancel: &CancellationToken,
) -> Option<u64> {
    let is_ready = |len: u64| -> bool {
        if post_file_contents {
            len > 0
        } else {
            std::fs::File::open(path).is_ok()
        }
    };

    if effective.wait_for_file_ready_ms == 0 {
        let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if len == 0 && effective.discard_zero_byte_files {
            return None;
        }
        return Some(len);
    }

    let deadline = Instant::now() + Duration::from_millis(effective.wait_for_file_ready_ms);
    loop {
        let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if is_ready(len) {
            return Some(len);
        }
        if Instant::now() >= deadline || cancel.is_cancelled() {
            if len == 0 && effective.discard_zero_byte_files {
                return None;
            }
            return Some(len);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
        }
    }
}

fn apply_auth(builder: reqwest::RequestBuilder, bearer_token: &Option<String>, request_id: &str) -> reqwest::RequestBuilder {
    let builder = builder.header("X-Request-Id", request_id);
    match bearer_token {
        Some(token) => {
            let token = token.strip_prefix("Bearer ").unwrap_or(token);
            builder.bearer_auth(token)
        }
        None => builder,
    }
}

fn build_json_request(
    pool: &SenderPool,
    rest_post: &ResolvedRestPost,
    notification: &Notification,
    request_id: &str,
) -> reqwest::RequestBuilder {
    let builder = pool.http_client.post(&rest_post.endpoint).json(notification);
    apply_auth(builder, &rest_post.bearer_token, request_id)
}

fn build_multipart_request(
    pool: &SenderPool,
    rest_post: &ResolvedRestPost,
    notification: &Notification,
    basename: &str,
    bytes: Vec<u8>,
    request_id: &str,
) -> reqwest::RequestBuilder {
    let form = multipart::Form::new()
        .text("metadata", notification.metadata_json().to_string())
        .part(
            "file",
            multipart::Part::bytes(bytes)
                .file_name(basename.to_string())
                .mime_str("application/octet-stream")
                .unwrap_or_else(|_| multipart::Part::bytes(Vec::new())),
        );
    let builder = pool.http_client.post(&rest_post.endpoint).multipart(form);
    apply_auth(builder, &rest_post.bearer_token, request_id)
}

fn generate_request_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_32_hex_chars() {
        let id = generate_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
