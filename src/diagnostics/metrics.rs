//! Prometheus text-exposition rendering of [`super::Diagnostics`] counters.

use std::fmt::Write as _;

use super::Diagnostics;

/// Render the current counters in Prometheus text format (exposition format
/// 0.0.4), suitable for the `/metrics` route.
pub fn render(diagnostics: &Diagnostics) -> String {
    let counters = diagnostics.counters();
    let mut out = String::new();

    write_gauge(&mut out, "filewatchrest_file_processed_success_total",
        "Files successfully dispatched.", counters.file_processed_success_total);
    write_gauge(&mut out, "filewatchrest_file_processed_failure_total",
        "Files that failed dispatch after all retries.", counters.file_processed_failure_total);
    write_gauge(&mut out, "filewatchrest_file_enqueued_total",
        "Files enqueued to the sender pool.", counters.file_enqueued_total);
    write_gauge(&mut out, "filewatchrest_circuit_open_total",
        "Number of times a circuit breaker transitioned to open.", counters.circuit_open_total);
    write_gauge(&mut out, "filewatchrest_http_attempts_total",
        "Outbound HTTP attempts, including retries.", counters.http_attempts_total);
    write_gauge(&mut out, "filewatchrest_http_failures_total",
        "Outbound HTTP attempts exhausted without a success response.", counters.http_failures_total);
    write_gauge(&mut out, "filewatchrest_http_short_circuits_total",
        "Requests rejected immediately by an open circuit breaker.", counters.http_short_circuits_total);

    let watcher_count = diagnostics.active_watchers().len();
    writeln!(out, "# HELP filewatchrest_active_watchers Number of currently running folder watchers.").ok();
    writeln!(out, "# TYPE filewatchrest_active_watchers gauge").ok();
    writeln!(out, "filewatchrest_active_watchers {watcher_count}").ok();

    for (endpoint, entry) in diagnostics.get_status().circuit_states {
        writeln!(
            out,
            "filewatchrest_circuit_breaker_open{{endpoint=\"{}\"}} {}",
            escape_label(&endpoint),
            if entry.open { 1 } else { 0 }
        )
        .ok();
    }

    out
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: u64) {
    writeln!(out, "# HELP {name} {help}").ok();
    writeln!(out, "# TYPE {name} counter").ok();
    writeln!(out, "{name} {value}").ok();
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn renders_known_counter_names() {
        let diagnostics = Diagnostics::new();
        diagnostics.record_file_event(Path::new("/a.txt"), true, Some(200));
        diagnostics.record_http_attempt();

        let text = render(&diagnostics);
        assert!(text.contains("filewatchrest_file_processed_success_total 1"));
        assert!(text.contains("filewatchrest_http_attempts_total 1"));
        assert!(text.contains("# TYPE filewatchrest_http_attempts_total counter"));
    }

    #[test]
    fn escapes_quotes_in_circuit_labels() {
        let diagnostics = Diagnostics::new();
        diagnostics.update_circuit_state("https://ex\"ample", 1, None);
        let text = render(&diagnostics);
        assert!(text.contains("endpoint=\"https://ex\\\"ample\""));
    }
}
