//! Filesystem locations for the event store and its configuration.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs::data_dir;
use once_cell::sync::Lazy;

/// Overrides the platform data directory as the home of every radar file.
pub const HOME_ENV: &str = "EVENT_RADAR_HOME";

const APP_DIR: &str = "event-radar";
const STORE_FILE: &str = "events.sqlite";
const CONFIG_FILE: &str = "config.json";

static RADAR_HOME: Lazy<PathBuf> =
    Lazy::new(|| resolve_home(env::var_os(HOME_ENV).map(PathBuf::from), data_dir()));

fn resolve_home(explicit: Option<PathBuf>, platform: Option<PathBuf>) -> PathBuf {
    explicit
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| platform.map(|dir| dir.join(APP_DIR)))
        .unwrap_or_else(|| PathBuf::from(APP_DIR))
}

pub fn radar_home() -> &'static Path {
    &RADAR_HOME
}

pub fn default_store_path() -> PathBuf {
    radar_home().join(STORE_FILE)
}

pub fn default_config_path() -> PathBuf {
    radar_home().join(CONFIG_FILE)
}

/// Creates the directory a store or config file is about to be written into.
pub fn ensure_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(err) = fs::create_dir_all(parent) {
        tracing::warn!(path = %parent.display(), "failed to create directory: {err}");
    }
}

/// Keeps the last `limit` entries, oldest first.
pub fn tail<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    let start = items.len().saturating_sub(limit);
    items[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_most_recent_entries() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(tail(&items, 2), vec![4, 5]);
        assert_eq!(tail(&items, 10), items);
        assert!(tail(&items, 0).is_empty());
    }

    #[test]
    fn home_prefers_the_explicit_directory() {
        let platform = Some(PathBuf::from("/data"));
        assert_eq!(
            resolve_home(Some(PathBuf::from("/srv/radar")), platform.clone()),
            PathBuf::from("/srv/radar")
        );
        assert_eq!(
            resolve_home(Some(PathBuf::new()), platform.clone()),
            PathBuf::from("/data/event-radar")
        );
        assert_eq!(resolve_home(None, platform), PathBuf::from("/data/event-radar"));
        assert_eq!(resolve_home(None, None), PathBuf::from("event-radar"));
    }

    #[test]
    fn ensure_parent_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested").join("events.sqlite");
        ensure_parent(&target);
        assert!(target.parent().is_some_and(Path::is_dir));
        ensure_parent(Path::new("events.sqlite"));
    }
}
