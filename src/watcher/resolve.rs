//! Path → configured-folder resolution by longest-prefix match.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;

/// Cache entries older than this are recomputed rather than trusted; the
/// folder set rarely changes, so this only needs to be short enough that a
/// config reload's `set_folders` call (which clears the cache outright)
/// isn't the only way to observe an update.
const CACHE_TTL: Duration = Duration::from_secs(2);

/// Resolves an absolute path to the most specific configured folder that
/// contains it, with a short-lived cache to amortize repeated lookups for
/// bursts of events under the same folder.
pub struct FolderResolver {
    folders: RwLock<Vec<PathBuf>>,
    cache: DashMap<PathBuf, (Option<PathBuf>, Instant)>,
}

impl FolderResolver {
    pub fn new() -> Self {
        Self {
            folders: RwLock::new(Vec::new()),
            cache: DashMap::new(),
        }
    }

    /// Replace the configured folder set. Longest paths are checked first
    /// so the first `starts_with` match is the longest-prefix match.
    pub fn set_folders(&self, mut folders: Vec<PathBuf>) {
        folders.sort_by_key(|p| std::cmp::Reverse(p.as_os_str().len()));
        *self.folders.write() = folders;
        self.cache.clear();
    }

    pub fn try_resolve(&self, path: &Path) -> Option<PathBuf> {
        if let Some(entry) = self.cache.get(path)
            && entry.1.elapsed() < CACHE_TTL
        {
            return entry.0.clone();
        }

        let folders = self.folders.read();
        let result = folders.iter().find(|f| path.starts_with(f.as_path())).cloned();
        drop(folders);
        self.cache.insert(path.to_path_buf(), (result.clone(), Instant::now()));
        result
    }
}

impl Default for FolderResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_to_longest_matching_prefix() {
        let resolver = FolderResolver::new();
        resolver.set_folders(vec![PathBuf::from("/watch"), PathBuf::from("/watch/nested")]);

        let resolved = resolver.try_resolve(Path::new("/watch/nested/a.txt"));
        assert_eq!(resolved, Some(PathBuf::from("/watch/nested")));
    }

    #[test]
    fn returns_none_for_unconfigured_path() {
        let resolver = FolderResolver::new();
        resolver.set_folders(vec![PathBuf::from("/watch")]);
        assert_eq!(resolver.try_resolve(Path::new("/other/a.txt")), None);
    }

    #[test]
    fn cached_result_is_reused_until_folders_change() {
        let resolver = FolderResolver::new();
        resolver.set_folders(vec![PathBuf::from("/watch")]);
        let first = resolver.try_resolve(Path::new("/watch/a.txt"));
        let second = resolver.try_resolve(Path::new("/watch/a.txt"));
        assert_eq!(first, second);

        resolver.set_folders(vec![PathBuf::from("/other")]);
        assert_eq!(resolver.try_resolve(Path::new("/watch/a.txt")), None);
    }
}
