//! Diagnostics HTTP server: GET-only status/metrics surface, bearer-token
//! gated except `/config`.
//!
//! Mirrors the teacher's `cli::serve` acceptor-plus-thread-pool shape: one
//! blocking `tiny_http::Server` owned by an acceptor thread, requests handed
//! off to a small `rayon` pool so a slow handler never blocks the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::core::CancellationToken;
use crate::diagnostics::Diagnostics;

const DIAGNOSTICS_THREADS: usize = 4;

/// Bound, not-yet-serving diagnostics server.
pub struct DiagnosticsServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

/// Bind the diagnostics server to `url_prefix` (e.g. `http://0.0.0.0:9191`).
pub fn bind(url_prefix: &str) -> anyhow::Result<DiagnosticsServer> {
    let addr = parse_bind_addr(url_prefix)?;
    let server = Server::http(addr).map_err(|e| anyhow::anyhow!("bind {addr}: {e}"))?;
    crate::log!("diagnostics"; "listening on http://{addr}");
    Ok(DiagnosticsServer {
        server: Arc::new(server),
        addr,
    })
}

fn parse_bind_addr(url_prefix: &str) -> anyhow::Result<SocketAddr> {
    let url = url::Url::parse(url_prefix)?;
    let host = url.host_str().unwrap_or("0.0.0.0");
    let port = url.port().unwrap_or(80);
    format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid diagnostics bind address `{url_prefix}`: {e}"))
}

impl DiagnosticsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the accept loop until `cancel` fires. Blocking; spawn on a
    /// dedicated thread.
    pub fn run(self, diagnostics: Arc<Diagnostics>, bearer_token: Option<String>, cancel: CancellationToken) {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(DIAGNOSTICS_THREADS)
            .build()
            .expect("failed to create diagnostics thread pool");
        let bearer_token = Arc::new(bearer_token);

        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.server.recv_timeout(std::time::Duration::from_millis(200)) {
                Ok(Some(request)) => {
                    let diagnostics = Arc::clone(&diagnostics);
                    let bearer_token = Arc::clone(&bearer_token);
                    pool.spawn(move || {
                        if let Err(e) = handle_request(request, &diagnostics, &bearer_token) {
                            crate::log!("diagnostics"; "request error: {e}");
                        }
                    });
                }
                Ok(None) => continue,
                Err(e) => {
                    crate::log!("diagnostics"; "accept error: {e}");
                    return;
                }
            }
        }
    }
}

fn handle_request(
    request: Request,
    diagnostics: &Diagnostics,
    bearer_token: &Option<String>,
) -> anyhow::Result<()> {
    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or("/").to_string();

    if method == Method::Options {
        return respond_cors_preflight(request);
    }
    if method != Method::Get {
        return respond_json(request, 405, &json!({"error": "method not allowed"}));
    }

    if path != "/config" && !authorized(&request, bearer_token) {
        return respond_json(request, 401, &json!({"error": "unauthorized"}));
    }

    match path.as_str() {
        "/" | "/status" => {
            let status = diagnostics.get_status();
            respond_json(request, 200, &status)
        }
        "/health" => respond_json(
            request,
            200,
            &json!({"status": "healthy", "timestamp": now_millis()}),
        ),
        "/events" => {
            let events = diagnostics.recent_events(500);
            respond_json(request, 200, &events)
        }
        "/watchers" => {
            let watchers: Vec<String> = diagnostics
                .active_watchers()
                .into_iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            respond_json(request, 200, &watchers)
        }
        "/config" => {
            let config = crate::config::cfg().redacted();
            respond_json(request, 200, &config)
        }
        "/metrics" => {
            let body = super::metrics::render(diagnostics);
            respond_text(request, 200, "text/plain; version=0.0.4", body)
        }
        _ => respond_json(
            request,
            404,
            &json!({
                "error": "not found",
                "available": ["/", "/status", "/health", "/events", "/watchers", "/config", "/metrics"],
            }),
        ),
    }
}

fn authorized(request: &Request, bearer_token: &Option<String>) -> bool {
    let Some(expected) = bearer_token else {
        return true;
    };
    let header = request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case("authorization"))
        .map(|h| h.value.as_str());
    match header {
        Some(value) => value.strip_prefix("Bearer ").unwrap_or(value) == expected,
        None => false,
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn respond_json(request: Request, status: u16, body: &impl serde::Serialize) -> anyhow::Result<()> {
    let body = serde_json::to_string(body)?;
    respond_text(request, status, "application/json", body)
}

fn respond_text(request: Request, status: u16, content_type: &str, body: String) -> anyhow::Result<()> {
    let response = Response::from_string(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type))
        .with_header(make_header("Access-Control-Allow-Origin", "*"));
    request.respond(response)?;
    Ok(())
}

fn respond_cors_preflight(request: Request) -> anyhow::Result<()> {
    let response = Response::empty(StatusCode(204))
        .with_header(make_header("Access-Control-Allow-Origin", "*"))
        .with_header(make_header("Access-Control-Allow-Methods", "GET, OPTIONS"))
        .with_header(make_header("Access-Control-Allow-Headers", "Authorization"));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Header {
    Header::from_bytes(key.as_bytes(), value.as_bytes()).expect("static header is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_from_prefix() {
        let addr = parse_bind_addr("http://127.0.0.1:9191").unwrap();
        assert_eq!(addr.port(), 9191);
    }

    #[test]
    fn defaults_to_port_80_when_unspecified() {
        let addr = parse_bind_addr("http://0.0.0.0").unwrap();
        assert_eq!(addr.port(), 80);
    }
}
