use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use lib_autosplit::protocol::DEFAULT_URL;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "SNES auto splitter driven by a QUsb2Snes server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "AUTOSPLITTER_URL", help = "WebSocket URL of the QUsb2Snes server.")]
    pub url: Option<String>,

    #[clap(long, env = "AUTOSPLITTER_DEVICE", help = "Device to attach to; the last listed device when unset.")]
    pub device: Option<String>,

    #[clap(long, env = "AUTOSPLITTER_GAME_CONFIG", help = "Path to the game configuration (splits) file.")]
    pub game_config: Option<PathBuf>,

    #[clap(long, env = "AUTOSPLITTER_CATEGORY", help = "Run category, selects the category of a legacy game file.")]
    pub category: Option<String>,

    #[clap(long, env = "AUTOSPLITTER_SEGMENTS", help = "Segments in the run; the run ends after the last one.")]
    pub segments: Option<usize>,

    #[clap(long, env = "AUTOSPLITTER_AUTOSTART", help = "Start the run when the autostart split matches.")]
    pub autostart: Option<bool>,

    #[clap(long, env = "AUTOSPLITTER_RESET_HARDWARE", help = "Reset the console when the run is reset.")]
    pub reset_hardware: Option<bool>,

    #[clap(long, env = "AUTOSPLITTER_DEBUG", help = "Log every evaluated check.")]
    pub debug: Option<bool>,

    #[clap(long, env = "AUTOSPLITTER_CONFIG_PATH", help = "Path to the JSON settings file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "AUTOSPLITTER_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "AUTOSPLITTER_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "AUTOSPLITTER_IDLE_INTERVAL_MS", help = "Poll interval in milliseconds while not attached.")]
    pub idle_interval_ms: Option<u64>,

    #[clap(long, env = "AUTOSPLITTER_ACTIVE_INTERVAL_MS", help = "Poll interval in milliseconds while attached.")]
    pub active_interval_ms: Option<u64>,

    #[clap(long, env = "AUTOSPLITTER_CLIENT_NAME", help = "Name announced to the server.")]
    pub client_name: Option<String>,

    #[clap(long, help = "List the devices the server offers and exit.")]
    #[serde(skip)]
    pub detect: bool,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            url: other.url.or(self.url),
            device: other.device.or(self.device),
            game_config: other.game_config.or(self.game_config),
            category: other.category.or(self.category),
            segments: other.segments.or(self.segments),
            autostart: other.autostart.or(self.autostart),
            reset_hardware: other.reset_hardware.or(self.reset_hardware),
            debug: other.debug.or(self.debug),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            idle_interval_ms: other.idle_interval_ms.or(self.idle_interval_ms),
            active_interval_ms: other.active_interval_ms.or(self.active_interval_ms),
            client_name: other.client_name.or(self.client_name),
            detect: other.detect || self.detect,
        }
    }

    fn defaults() -> Config {
        Config {
            url: Some(DEFAULT_URL.to_string()),
            autostart: Some(false),
            reset_hardware: Some(false),
            debug: Some(false),
            log_dir: Some(default_log_dir()),
            log_level: Some("info".to_string()),
            idle_interval_ms: Some(1000),
            active_interval_ms: Some(33),
            client_name: Some("Rust AutoSplitter".to_string()),
            ..Default::default()
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("autosplitter").join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

pub fn load_config() -> Config {
    load_config_with(Config::parse())
}

/// Defaults, then the settings file, then `cli` (which already carries env vars).
pub fn load_config_with(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("autosplitter.conf"));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }

    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        // Logging is not set up yet at this point.
        eprintln!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return None;
    }

    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                eprintln!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    path.display(),
                    e
                );
                None
            }
        },
        Err(e) => {
            eprintln!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_overrides_defaults_and_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosplitter.conf");
        fs::write(
            &path,
            r#"{ "url": "ws://127.0.0.1:23074", "device": "SD2SNES COM3", "debug": true, "activeIntervalMs": 50 }"#,
        )
        .unwrap();

        let cli = Config {
            config_path: Some(path),
            device: Some("EMU SNES9X".to_string()),
            ..Default::default()
        };
        let config = load_config_with(cli);

        assert_eq!(config.url.as_deref(), Some("ws://127.0.0.1:23074"));
        assert_eq!(config.device.as_deref(), Some("EMU SNES9X"));
        assert_eq!(config.debug, Some(true));
        assert_eq!(config.active_interval_ms, Some(50));
        assert_eq!(config.idle_interval_ms, Some(1000));
        assert_eq!(config.client_name.as_deref(), Some("Rust AutoSplitter"));
    }

    #[test]
    fn test_missing_file_keeps_defaults() {
        let cli = Config {
            config_path: Some(PathBuf::from("/nonexistent/autosplitter.conf")),
            ..Default::default()
        };
        let config = load_config_with(cli);
        assert_eq!(config.url.as_deref(), Some(DEFAULT_URL));
        assert_eq!(config.autostart, Some(false));
        assert!(!config.detect);
    }
}
