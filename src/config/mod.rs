use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use time::Duration;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Delwatch";
const APP_NAME: &str = "delwatch";

pub const DEFAULT_SLOT_KEY: &str = "SAVED_DELMSGS";
pub const DEFAULT_CHANNEL: &str = "0";
pub const DEFAULT_CHANNEL_MARKER: &str = "channels/";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("DELWATCH_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("DELWATCH_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_root.join("delmsgs.db");

        Ok(Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
        })
    }

    /// Lays every path out below `root`; used by tests and portable installs.
    pub fn rooted_at(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            database_path: data_dir.join("delmsgs.db"),
            data_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub filter: FilterThresholds,
    pub store: StoreOptions,
    pub session: SessionOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.store.resolve(paths).context("resolving storage paths")?;
        self.filter.sanitize();
        if self.store.slot_key.trim().is_empty() {
            tracing::warn!("empty slot key in config, falling back to {DEFAULT_SLOT_KEY}");
            self.store.slot_key = DEFAULT_SLOT_KEY.to_string();
        }
        if self.session.channel_marker.is_empty() {
            tracing::warn!("empty channel marker in config, falling back to {DEFAULT_CHANNEL_MARKER}");
            self.session.channel_marker = DEFAULT_CHANNEL_MARKER.to_string();
        }
        Ok(())
    }
}

/// Heuristic cut-offs of the recycling filter.
///
/// The defaults were tuned by watching a real chat client discard off-screen
/// items; none of them is a hard invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterThresholds {
    /// Total scrollable height above which scroll-driven pruning is suspected.
    pub scroll_height_threshold: f64,
    /// `scroll_height / scroll_top` above which a removal counts as pruning.
    pub scroll_ratio_threshold: f64,
    /// Removals with fewer preceding siblings than this may be boundary trims.
    pub boundary_window: usize,
    /// Boundary trims are only plausible on lists longer than `window * multiplier`.
    pub boundary_multiplier: usize,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            scroll_height_threshold: 7000.0,
            scroll_ratio_threshold: 1.7,
            boundary_window: 10,
            boundary_multiplier: 3,
        }
    }
}

impl FilterThresholds {
    pub fn boundary_list_len(&self) -> usize {
        self.boundary_window.saturating_mul(self.boundary_multiplier)
    }

    fn sanitize(&mut self) {
        let defaults = Self::default();
        if !(self.scroll_height_threshold.is_finite() && self.scroll_height_threshold > 0.0) {
            tracing::warn!(
                value = self.scroll_height_threshold,
                "invalid scroll_height_threshold, using default"
            );
            self.scroll_height_threshold = defaults.scroll_height_threshold;
        }
        if !(self.scroll_ratio_threshold.is_finite() && self.scroll_ratio_threshold > 0.0) {
            tracing::warn!(
                value = self.scroll_ratio_threshold,
                "invalid scroll_ratio_threshold, using default"
            );
            self.scroll_ratio_threshold = defaults.scroll_ratio_threshold;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    /// Key of the single slot holding the whole channel log.
    pub slot_key: String,
    pub wal_autocheckpoint: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            slot_key: DEFAULT_SLOT_KEY.to_string(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StoreOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Path segment after which the channel identifier starts.
    pub channel_marker: String,
    /// Channel used when the path carries no marker.
    pub default_channel: String,
    /// Interval at which the host is expected to deliver a [`Tick`].
    ///
    /// [`Tick`]: crate::app::Tick
    pub poll_interval_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            channel_marker: DEFAULT_CHANNEL_MARKER.to_string(),
            default_channel: DEFAULT_CHANNEL.to_string(),
            poll_interval_ms: 500,
        }
    }
}

impl SessionOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::milliseconds(self.poll_interval_ms as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_or_init_writes_defaults_on_first_run() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        let loader = ConfigLoader::from_paths(paths.clone());

        let cfg = loader.load_or_init()?;
        assert!(paths.config_file.exists());
        assert_eq!(cfg.store.slot_key, DEFAULT_SLOT_KEY);
        assert_eq!(cfg.store.database_path, paths.database_path);
        assert_eq!(cfg.filter, FilterThresholds::default());
        assert_eq!(cfg.session.poll_interval(), Duration::milliseconds(500));

        let reloaded = loader.load()?;
        assert_eq!(reloaded.filter, cfg.filter);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[filter]\nboundary_window = 4\nscroll_ratio_threshold = -2.0\n",
        )?;

        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.filter.boundary_window, 4);
        assert_eq!(cfg.filter.boundary_multiplier, 3);
        assert_eq!(cfg.filter.boundary_list_len(), 12);
        assert_eq!(cfg.filter.scroll_ratio_threshold, 1.7);
        assert_eq!(cfg.session.channel_marker, DEFAULT_CHANNEL_MARKER);
        Ok(())
    }
}
