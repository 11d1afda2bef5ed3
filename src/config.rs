use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::usb::UsbSettings;

const DEFAULT_OUTPUT_FILE: &str = "monitor.png";

/// Which sinks receive frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Ax206usb,
    #[default]
    File,
    Both,
}

impl OutputType {
    pub fn wants_device(self) -> bool {
        matches!(self, OutputType::Ax206usb | OutputType::Both)
    }

    pub fn wants_file(self) -> bool {
        matches!(self, OutputType::File | OutputType::Both)
    }
}

// Case-insensitive; an empty string means the default
impl<'de> Deserialize<'de> for OutputType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "file" => Ok(OutputType::File),
            "ax206usb" => Ok(OutputType::Ax206usb),
            "both" => Ok(OutputType::Both),
            _ => Err(de::Error::unknown_variant(&raw, &["ax206usb", "file", "both"])),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub output_type: OutputType,
    pub output_file: String,
    /// Milliseconds between frames
    pub refresh_interval: u64,
    /// Backlight level 0-7, clamped
    pub brightness: i32,
    pub transfer_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: String::new(),
            width: 480,
            height: 320,
            output_type: OutputType::File,
            output_file: DEFAULT_OUTPUT_FILE.into(),
            refresh_interval: 1000,
            brightness: 7,
            transfer_timeout_ms: 1000,
        }
    }
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        match self.refresh_interval {
            0 => Duration::from_millis(Config::default().refresh_interval),
            ms => Duration::from_millis(ms),
        }
    }

    /// PNG destination; an empty setting falls back to the default name
    pub fn output_path(&self) -> &str {
        match self.output_file.trim() {
            "" => DEFAULT_OUTPUT_FILE,
            path => path,
        }
    }

    pub fn usb_settings(&self) -> UsbSettings {
        UsbSettings {
            timeout: Duration::from_millis(self.transfer_timeout_ms),
            ..UsbSettings::default()
        }
    }
}

/// Named JSON configurations in one directory (`<dir>/<name>.json`)
pub struct ConfigDir {
    dir: PathBuf,
}

impl ConfigDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ConfigDir { dir: dir.into() }
    }

    pub fn load(&self, name: &str) -> Result<Config> {
        let file = self.dir.join(format!("{}.json", name));
        if !file.exists() {
            bail!("Config file not found: {}", file.display());
        }
        let data = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        Ok(config)
    }

    /// Names of all `.json` files, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read config directory {}", self.dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
