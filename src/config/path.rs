//! Config path discovery.
//!
//! An external collaborator's contract, per the external-interface spec:
//! the precedence `--config <p>` > `-c <p>` > positional argv (if it names
//! an existing file) > env variable > `<programData>/FileWatchRest/FileWatchRest.json`.
//!
//! Exposed as a pure function of its inputs (not `std::env`/`std::fs`
//! directly) so it is unit-testable without touching the real process
//! environment or filesystem.

use std::path::{Path, PathBuf};

/// Resolve the config file path following the documented precedence.
///
/// `args` excludes argv\[0\]. `env_var` is the value of the
/// `FILEWATCHREST_CONFIG` environment variable, if set. `program_data` is
/// the platform's shared-config directory (e.g. `/etc` or `%ProgramData%`).
/// `exists_fn` abstracts `Path::exists` so tests can simulate a filesystem.
pub fn get_config_path(
    args: &[String],
    env_var: Option<&str>,
    program_data: &Path,
    exists_fn: impl Fn(&Path) -> bool,
) -> PathBuf {
    if let Some(p) = flag_value(args, "--config") {
        return PathBuf::from(p);
    }
    if let Some(p) = flag_value(args, "-c") {
        return PathBuf::from(p);
    }
    if let Some(positional) = args.iter().find(|a| !a.starts_with('-')) {
        let candidate = PathBuf::from(positional);
        if exists_fn(&candidate) {
            return candidate;
        }
    }
    if let Some(env_path) = env_var {
        return PathBuf::from(env_path);
    }
    program_data.join("FileWatchRest").join("FileWatchRest.json")
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    for i in 0..args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(String::as_str);
        }
        if let Some(value) = args[i].strip_prefix(&format!("{flag}=")) {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never_exists(_: &Path) -> bool {
        false
    }

    #[test]
    fn long_flag_takes_precedence() {
        let args = vec!["--config".into(), "/a.json".into(), "-c".into(), "/b.json".into()];
        let result = get_config_path(&args, Some("/c.json"), Path::new("/pd"), never_exists);
        assert_eq!(result, PathBuf::from("/a.json"));
    }

    #[test]
    fn short_flag_used_when_long_flag_absent() {
        let args = vec!["-c".into(), "/b.json".into()];
        let result = get_config_path(&args, Some("/c.json"), Path::new("/pd"), never_exists);
        assert_eq!(result, PathBuf::from("/b.json"));
    }

    #[test]
    fn positional_used_only_if_file_exists() {
        let args = vec!["/positional.json".into()];
        let result = get_config_path(&args, Some("/env.json"), Path::new("/pd"), |p| {
            p == Path::new("/positional.json")
        });
        assert_eq!(result, PathBuf::from("/positional.json"));

        let result_missing = get_config_path(&args, Some("/env.json"), Path::new("/pd"), never_exists);
        assert_eq!(result_missing, PathBuf::from("/env.json"));
    }

    #[test]
    fn env_var_used_when_no_flags_or_existing_positional() {
        let result = get_config_path(&[], Some("/env.json"), Path::new("/pd"), never_exists);
        assert_eq!(result, PathBuf::from("/env.json"));
    }

    #[test]
    fn falls_back_to_program_data_default() {
        let result = get_config_path(&[], None, Path::new("/pd"), never_exists);
        assert_eq!(result, PathBuf::from("/pd/FileWatchRest/FileWatchRest.json"));
    }

    #[test]
    fn equals_syntax_supported_for_long_flag() {
        let args = vec!["--config=/eq.json".to_string()];
        let result = get_config_path(&args, None, Path::new("/pd"), never_exists);
        assert_eq!(result, PathBuf::from("/eq.json"));
    }
}
