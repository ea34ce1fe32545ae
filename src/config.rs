use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from `~/.taltext.toml`
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Recognition backend settings
    pub recognition: RecognitionConfig,
    /// Microphone capture settings
    pub audio: AudioConfig,
    /// Transcript export settings
    pub export: ExportConfig,
    /// Terminal shell settings
    pub ui: UiConfig,
    /// Logging settings
    pub telemetry: TelemetryConfig,
}

/// Settings for the whisper-backed recognizer
#[derive(Debug, Deserialize, Clone)]
pub struct RecognitionConfig {
    /// Model name, e.g. "tiny", "base", "small"
    pub model: String,
    /// Path to the ggml model file (downloaded on first run if absent)
    pub model_path: String,
    /// Startup locale tag; must be one of the registered locales
    pub locale: String,
    /// CPU threads for inference
    pub threads: usize,
    /// Beam search width (1 = greedy)
    pub beam_size: usize,
    /// Continuous sessions end spontaneously after this long; the session
    /// controller restarts them while listening
    pub session_limit_secs: u64,
}

/// Settings for microphone capture and utterance segmentation
#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Capture drain interval in milliseconds
    pub chunk_ms: u64,
    /// RMS level above which a chunk counts as speech
    pub vad_threshold: f32,
    /// When set, each finalized utterance is also written here as WAV
    pub debug_dir: Option<String>,
}

/// Settings for transcript export
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Directory transcript files are written to
    pub output_dir: String,
}

/// Settings for the terminal shell
#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// Theme used when no preference has been persisted yet
    pub default_theme: Theme,
    /// Redraw/visualizer cadence in milliseconds
    pub tick_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Write logs to `log_path` instead of stderr
    pub enabled: bool,
    /// Log file location
    pub log_path: String,
}

/// Color theme preference
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark backgrounds, bright foregrounds
    Dark,
    /// Light backgrounds, dark foregrounds
    Light,
}

impl Theme {
    /// The persisted spelling of this theme
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    /// The other theme
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }
}

const DEFAULT_CONFIG: &str = r#"[recognition]
model = "small"
model_path = "~/.taltext/models/ggml-small.bin"
locale = "sv-SE"
threads = 4
beam_size = 1
session_limit_secs = 55

[audio]
chunk_ms = 300
vad_threshold = 0.012

[export]
output_dir = "~/Documents"

[ui]
default_theme = "dark"
tick_ms = 33

[telemetry]
enabled = false
log_path = "~/.taltext/taltext.log"
"#;

impl Config {
    /// Load config from `~/.taltext.toml`, writing the defaults first if the
    /// file does not exist
    ///
    /// # Errors
    /// Returns error if the file cannot be read, created, or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG).context("failed to write default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".taltext.toml"))
    }

    /// Expand `~` in paths to the home directory
    ///
    /// # Errors
    /// Returns error if `HOME` is not set
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        path.strip_prefix("~/").map_or_else(
            || Ok(PathBuf::from(path)),
            |rest| {
                let home = std::env::var("HOME").context("HOME environment variable not set")?;
                Ok(PathBuf::from(home).join(rest))
            },
        )
    }
}

/// Read the persisted theme preference, falling back to `default` when the
/// key has never been written
#[must_use]
pub fn load_theme(default: Theme) -> Theme {
    theme_path()
        .ok()
        .and_then(|path| read_theme(&path))
        .unwrap_or(default)
}

/// Persist the theme preference
///
/// # Errors
/// Returns error if the state directory cannot be created or written
pub fn save_theme(theme: Theme) -> Result<()> {
    let path = theme_path()?;
    write_theme(&path, theme)
}

fn theme_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".taltext").join("theme"))
}

fn read_theme(path: &Path) -> Option<Theme> {
    let contents = fs::read_to_string(path).ok()?;
    Theme::parse(&contents)
}

fn write_theme(path: &Path, theme: Theme) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create state directory")?;
    }
    fs::write(path, theme.as_str()).context("failed to write theme preference")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.recognition.locale, "sv-SE");
        assert_eq!(config.recognition.beam_size, 1);
        assert_eq!(config.audio.chunk_ms, 300);
        assert!(config.audio.debug_dir.is_none());
        assert_eq!(config.ui.default_theme, Theme::Dark);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/models/ggml-small.bin").unwrap();
        assert_eq!(result, PathBuf::from(home).join("models/ggml-small.bin"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let result = Config::expand_path("/var/lib/taltext/model.bin").unwrap();
        assert_eq!(result, PathBuf::from("/var/lib/taltext/model.bin"));
    }

    #[test]
    fn test_theme_toggle() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }

    #[test]
    fn test_theme_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("theme");

        write_theme(&path, Theme::Light).unwrap();
        assert_eq!(read_theme(&path), Some(Theme::Light));

        write_theme(&path, Theme::Dark).unwrap();
        assert_eq!(read_theme(&path), Some(Theme::Dark));
    }

    #[test]
    fn test_theme_absent_or_garbage_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_theme(&dir.path().join("missing")), None);

        let path = dir.path().join("theme");
        fs::write(&path, "solarized").unwrap();
        assert_eq!(read_theme(&path), None);
    }

    #[test]
    fn test_theme_parse_trims_whitespace() {
        assert_eq!(Theme::parse("dark\n"), Some(Theme::Dark));
        assert_eq!(Theme::parse("  light  "), Some(Theme::Light));
    }
}
