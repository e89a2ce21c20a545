//! Outbound HTTP resilience: retry with exponential backoff + jitter, and a
//! per-endpoint circuit breaker.

mod circuit;

pub use circuit::{CircuitBreakerMap, MAX_CIRCUIT_STATES};

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use rand::Rng;

use crate::config::ResolvedRestPost;
use crate::core::CancellationToken;
use crate::diagnostics::Diagnostics;

/// Outcome of a call to [`ResilienceEngine::execute`].
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub success: bool,
    pub attempts: u32,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
    pub total_elapsed: Duration,
    pub short_circuited: bool,
}

/// Executes HTTP attempts with retry + circuit breaking for every endpoint
/// key passed to it. One instance is shared across the whole process; the
/// circuit map it owns is keyed per endpoint internally. Counters and a
/// display-facing circuit mirror are reported through the shared
/// [`Diagnostics`] instance rather than a private counter set.
pub struct ResilienceEngine {
    circuits: CircuitBreakerMap,
    diagnostics: Arc<Diagnostics>,
}

impl ResilienceEngine {
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            circuits: CircuitBreakerMap::new(),
            diagnostics,
        }
    }

    pub fn circuit_snapshot(&self) -> Vec<(String, bool, u32)> {
        self.circuits.snapshot()
    }

    /// Run up to `retries + 1` attempts of a request built fresh by
    /// `request_factory` for each attempt (so a failed attempt never reuses
    /// a consumed body/stream).
    pub async fn execute<F>(
        &self,
        endpoint_key: &str,
        effective: &ResolvedRestPost,
        cancel: &CancellationToken,
        mut request_factory: F,
    ) -> AttemptOutcome
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let entry = self.circuits.get_or_create(endpoint_key);

        {
            let state = entry.state.lock();
            if let Some(open_until) = state.open_until {
                if open_until > Instant::now() {
                    self.diagnostics.record_short_circuit();
                    self.mirror_circuit_state(endpoint_key, state.failures, Some(open_until));
                    return AttemptOutcome {
                        success: false,
                        attempts: 0,
                        last_status: None,
                        last_error: None,
                        total_elapsed: Duration::ZERO,
                        short_circuited: true,
                    };
                }
            }
        }

        let start = Instant::now();
        let max_attempts = effective.retries + 1;
        let mut last_status = None;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return AttemptOutcome {
                    success: false,
                    attempts: attempt - 1,
                    last_status,
                    last_error: Some("cancelled".to_string()),
                    total_elapsed: start.elapsed(),
                    short_circuited: false,
                };
            }

            self.diagnostics.record_http_attempt();
            let builder = request_factory();

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = builder.send() => Some(r),
            };

            let Some(sent) = sent else {
                return AttemptOutcome {
                    success: false,
                    attempts: attempt,
                    last_status,
                    last_error: Some("cancelled".to_string()),
                    total_elapsed: start.elapsed(),
                    short_circuited: false,
                };
            };

            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        {
                            let mut state = entry.state.lock();
                            state.failures = 0;
                            state.open_until = None;
                        }
                        self.mirror_circuit_state(endpoint_key, 0, None);
                        return AttemptOutcome {
                            success: true,
                            attempts: attempt,
                            last_status: Some(status.as_u16()),
                            last_error: None,
                            total_elapsed: start.elapsed(),
                            short_circuited: false,
                        };
                    }

                    last_status = Some(status.as_u16());
                    let is_last = attempt == max_attempts;
                    let transient = status.is_server_error() && !is_last;
                    if !transient {
                        self.diagnostics.record_http_failure();
                        self.maybe_open_circuit(endpoint_key, &entry, effective);
                        return AttemptOutcome {
                            success: false,
                            attempts: attempt,
                            last_status,
                            last_error: None,
                            total_elapsed: start.elapsed(),
                            short_circuited: false,
                        };
                    }
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt == max_attempts {
                        self.diagnostics.record_http_failure();
                        self.maybe_open_circuit(endpoint_key, &entry, effective);
                        return AttemptOutcome {
                            success: false,
                            attempts: attempt,
                            last_status,
                            last_error,
                            total_elapsed: start.elapsed(),
                            short_circuited: false,
                        };
                    }
                }
            }

            if attempt < max_attempts {
                let delay = backoff_delay(effective.retry_delay_ms, attempt);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return AttemptOutcome {
                            success: false,
                            attempts: attempt,
                            last_status,
                            last_error: Some("cancelled".to_string()),
                            total_elapsed: start.elapsed(),
                            short_circuited: false,
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        AttemptOutcome {
            success: false,
            attempts: max_attempts,
            last_status,
            last_error,
            total_elapsed: start.elapsed(),
            short_circuited: false,
        }
    }

    fn maybe_open_circuit(&self, endpoint_key: &str, entry: &circuit::CircuitEntry, effective: &ResolvedRestPost) {
        if !effective.enable_circuit_breaker {
            return;
        }
        let (failures, open_until, just_opened) = {
            let mut state = entry.state.lock();
            let was_open = state.open_until.is_some();
            state.failures += 1;
            if state.failures >= effective.circuit_breaker_failure_threshold {
                state.open_until = Some(
                    Instant::now() + Duration::from_millis(effective.circuit_breaker_open_duration_ms),
                );
            }
            (state.failures, state.open_until, !was_open && state.open_until.is_some())
        };
        if just_opened {
            self.diagnostics.record_circuit_opened();
        }
        self.mirror_circuit_state(endpoint_key, failures, open_until);
    }

    /// Translate the `Instant`-based enforcement state into the
    /// `SystemTime`-based display mirror kept by [`Diagnostics`].
    fn mirror_circuit_state(&self, endpoint_key: &str, failures: u32, open_until: Option<Instant>) {
        let open_until_epoch_ms = open_until.map(|instant| {
            let remaining = instant.saturating_duration_since(Instant::now());
            let now = SystemTime::now();
            now.checked_add(remaining)
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });
        self.diagnostics
            .update_circuit_state(endpoint_key, failures, open_until_epoch_ms);
    }
}

/// `max(100, base) << (attempt - 1)` plus 0..100ms jitter.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let base = base_ms.max(100);
    let shifted = base.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let jitter = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(shifted.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest_post(retries: u32, enable_cb: bool, threshold: u32) -> ResolvedRestPost {
        ResolvedRestPost {
            endpoint: "https://example.com/hook".into(),
            bearer_token: None,
            post_file_contents: false,
            retries,
            retry_delay_ms: 10,
            max_content_bytes: 1024,
            streaming_threshold_bytes: 1024,
            enable_circuit_breaker: enable_cb,
            circuit_breaker_failure_threshold: threshold,
            circuit_breaker_open_duration_ms: 60_000,
        }
    }

    #[tokio::test]
    async fn short_circuits_when_open() {
        let engine = ResilienceEngine::new(Arc::new(Diagnostics::new()));
        let entry = engine.circuits.get_or_create("key");
        entry.state.lock().open_until = Some(Instant::now() + Duration::from_secs(60));

        let cancel = crate::core::cancellation_token();
        let client = reqwest::Client::new();
        let outcome = engine
            .execute("key", &rest_post(0, true, 1), &cancel, || {
                client.post("https://example.invalid")
            })
            .await;

        assert!(outcome.short_circuited);
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn successful_attempt_resets_diagnostics_circuit_mirror() {
        let diagnostics = Arc::new(Diagnostics::new());
        let engine = ResilienceEngine::new(Arc::clone(&diagnostics));
        diagnostics.update_circuit_state("key", 3, Some(9_999_999_999_999));

        let status = diagnostics.get_status();
        let entry = status.circuit_states.iter().find(|(k, _)| k == "key").unwrap();
        assert_eq!(entry.1.failures, 3);
        let _ = &engine;
    }

    #[test]
    fn backoff_delay_grows_exponentially_with_jitter_bound() {
        let d1 = backoff_delay(100, 1);
        let d2 = backoff_delay(100, 2);
        let d3 = backoff_delay(100, 3);
        assert!(d1.as_millis() >= 100 && d1.as_millis() < 200);
        assert!(d2.as_millis() >= 200 && d2.as_millis() < 300);
        assert!(d3.as_millis() >= 400 && d3.as_millis() < 500);
    }

    #[test]
    fn backoff_delay_floors_small_base_to_100ms() {
        let d = backoff_delay(10, 1);
        assert!(d.as_millis() >= 100);
    }
}
