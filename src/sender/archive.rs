//! Moves a processed file into its folder's processed subdirectory.
//!
//! Destination naming: `<yyyyMMdd_HHmmss_fff>_<stem>[_N].<ext>`, where `_N`
//! is appended only when the timestamp-qualified name already exists
//! (millisecond collision).

use std::path::{Path, PathBuf};

use chrono::Local;

/// Build the `n`th candidate destination name for `stem`/`ext` under a
/// given `timestamp` prefix. `n == 0` is the unsuffixed name.
fn candidate_name(timestamp: &str, stem: &str, ext: Option<&str>, n: u32) -> String {
    match (ext, n) {
        (Some(ext), 0) => format!("{timestamp}_{stem}.{ext}"),
        (Some(ext), n) => format!("{timestamp}_{stem}_{n}.{ext}"),
        (None, 0) => format!("{timestamp}_{stem}"),
        (None, n) => format!("{timestamp}_{stem}_{n}"),
    }
}

fn first_free_destination(dest_dir: &Path, timestamp: &str, stem: &str, ext: Option<&str>) -> PathBuf {
    let mut n = 0u32;
    loop {
        let candidate = dest_dir.join(candidate_name(timestamp, stem, ext, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

pub fn archive(path: &Path, processed_folder: &str) -> std::io::Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let dest_dir = parent.join(processed_folder);
    std::fs::create_dir_all(&dest_dir)?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();

    let dest = first_free_destination(&dest_dir, &timestamp, &stem, ext.as_deref());

    // `rename` fails across filesystem boundaries (e.g. processed/ mounted
    // separately); fall back to copy + remove rather than surfacing that as
    // an archive failure.
    match std::fs::rename(path, &dest) {
        Ok(()) => Ok(dest),
        Err(_) => {
            std::fs::copy(path, &dest)?;
            std::fs::remove_file(path)?;
            Ok(dest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_name_begins_with_timestamp_and_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.csv");
        std::fs::write(&src, b"data").unwrap();

        let dest = archive(&src, "processed").unwrap();
        assert!(dest.starts_with(dir.path().join("processed")));
        assert!(dest.extension().unwrap() == "csv");
        assert!(!src.exists());
    }

    #[test]
    fn collision_appends_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("processed")).unwrap();
        std::fs::write(dir.path().join("processed/20260101_120000_000_a.txt"), b"existing").unwrap();

        let dest = first_free_destination(&dir.path().join("processed"), "20260101_120000_000", "a", Some("txt"));
        assert_eq!(dest.file_name().unwrap().to_str().unwrap(), "20260101_120000_000_a_1.txt");
    }

    #[test]
    fn candidate_name_places_suffix_before_extension() {
        assert_eq!(candidate_name("ts", "report", Some("csv"), 0), "ts_report.csv");
        assert_eq!(candidate_name("ts", "report", Some("csv"), 2), "ts_report_2.csv");
        assert_eq!(candidate_name("ts", "report", None, 1), "ts_report_1");
    }
}
