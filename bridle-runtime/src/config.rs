use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// Configuration for guided decoding on one engine instance.
#[derive(Debug, Clone, Deserialize)]
pub struct GuidedDecodingConfig {
    /// How many accepted tokens a guide remembers for `rollback`.
    #[serde(default = "default_max_rollback_tokens")]
    pub max_rollback_tokens: usize,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_max_rollback_tokens() -> usize {
    32
}

impl Default for GuidedDecodingConfig {
    fn default() -> Self {
        Self {
            max_rollback_tokens: default_max_rollback_tokens(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on in-memory automata. Oldest entries are evicted first.
    /// `None` keeps every automaton for the life of the process.
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub disk: Option<DiskCacheConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiskCacheConfig {
    pub dir: PathBuf,
}

const USE_DISK_CACHE_VAR: &str = "BRIDLE_USE_DISK_CACHE";
const CACHE_DIR_VAR: &str = "BRIDLE_CACHE_DIR";

impl DiskCacheConfig {
    /// Disk cache settings from the environment, or `None` unless
    /// `BRIDLE_USE_DISK_CACHE` is set to `1` or `true`.
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var(USE_DISK_CACHE_VAR)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);
        if !enabled {
            return None;
        }
        warn!(
            "Enabling the on-disk grammar cache. It is unbounded on disk; \
             do not enable it when serving untrusted clients."
        );
        Some(Self {
            dir: resolve_cache_dir(
                std::env::var_os(CACHE_DIR_VAR).map(PathBuf::from),
                std::env::var_os("XDG_CACHE_HOME").map(PathBuf::from),
                dirs::home_dir(),
            ),
        })
    }
}

fn resolve_cache_dir(
    explicit: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Some(xdg) = xdg_cache_home {
        return xdg.join(".cache").join("bridle");
    }
    match home {
        Some(home) if home != PathBuf::from("/") => home.join(".cache").join("bridle"),
        _ => std::env::temp_dir().join(".cache").join("bridle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GuidedDecodingConfig::default();
        assert_eq!(config.max_rollback_tokens, 32);
        assert!(config.cache.max_entries.is_none());
        assert!(config.cache.disk.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: GuidedDecodingConfig =
            serde_json::from_str(r#"{"cache": {"max_entries": 8}}"#).unwrap();
        assert_eq!(config.max_rollback_tokens, 32);
        assert_eq!(config.cache.max_entries, Some(8));
    }

    #[test]
    fn test_cache_dir_precedence() {
        let explicit = Some(PathBuf::from("/srv/grammars"));
        let xdg = Some(PathBuf::from("/xdg"));
        let home = Some(PathBuf::from("/home/u"));

        assert_eq!(
            resolve_cache_dir(explicit, xdg.clone(), home.clone()),
            PathBuf::from("/srv/grammars")
        );
        assert_eq!(
            resolve_cache_dir(None, xdg, home.clone()),
            PathBuf::from("/xdg/.cache/bridle")
        );
        assert_eq!(
            resolve_cache_dir(None, None, home),
            PathBuf::from("/home/u/.cache/bridle")
        );
        assert_eq!(
            resolve_cache_dir(None, None, Some(PathBuf::from("/"))),
            std::env::temp_dir().join(".cache").join("bridle")
        );
    }
}
