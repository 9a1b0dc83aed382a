//! Daemon configuration management

use anyhow::{Context, Result, anyhow};
use protocol::{DeviceKind, WorkerSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
const DEFAULT_WRITE_RETRIES: u32 = 150;
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HidConfig {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub udc: UdcSettings,
    #[serde(default)]
    pub keyboard: KeyboardSettings,
    #[serde(default)]
    pub mouse: MouseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub log_level: String,
    pub service_mode: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            service_mode: false,
        }
    }
}

/// USB device controller whose state tells whether the link is up
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UdcSettings {
    /// Empty = first controller under /sys/class/udc
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardSettings {
    pub enabled: bool,
    pub device_path: String,
    /// Bytes per inbound (LED) report; 0 disables reading
    pub read_chunk_size: usize,
    #[serde(with = "duration_serde")]
    pub select_timeout: Duration,
    #[serde(with = "duration_serde")]
    pub queue_timeout: Duration,
    pub write_retries: u32,
    pub noop: bool,
}

impl Default for KeyboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device_path: "/dev/kvmd-hid-keyboard".to_string(),
            read_chunk_size: 8,
            select_timeout: DEFAULT_TIMEOUT,
            queue_timeout: DEFAULT_TIMEOUT,
            write_retries: DEFAULT_WRITE_RETRIES,
            noop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseSettings {
    pub enabled: bool,
    pub device_path: String,
    pub read_chunk_size: usize,
    #[serde(with = "duration_serde")]
    pub select_timeout: Duration,
    #[serde(with = "duration_serde")]
    pub queue_timeout: Duration,
    pub write_retries: u32,
    pub noop: bool,
    /// Absolute (tablet) instead of relative positioning
    pub absolute: bool,
    pub horizontal_wheel: bool,
}

impl Default for MouseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device_path: "/dev/kvmd-hid-mouse".to_string(),
            read_chunk_size: 0,
            select_timeout: DEFAULT_TIMEOUT,
            queue_timeout: DEFAULT_TIMEOUT,
            write_retries: DEFAULT_WRITE_RETRIES,
            noop: false,
            absolute: true,
            horizontal_wheel: true,
        }
    }
}

/// Human readable durations: "100ms", "1s", "1m30s"
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format_duration(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse "1h", "30m", "1m30s", "250ms"; a bare number means seconds
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim().to_lowercase();
        let mut total = Duration::ZERO;
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            let mut number = String::new();
            while let Some(c) = chars.next_if(char::is_ascii_digit) {
                number.push(c);
            }
            let mut unit = String::new();
            while let Some(c) = chars.next_if(char::is_ascii_alphabetic) {
                unit.push(c);
            }
            if number.is_empty() {
                return Err(format!("Invalid duration format: {}", s));
            }
            let num: u64 = number
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", number))?;

            total += match unit.as_str() {
                "h" => Duration::from_secs(num * 3600),
                "m" => Duration::from_secs(num * 60),
                "s" | "" => Duration::from_secs(num),
                "ms" => Duration::from_millis(num),
                _ => return Err(format!("Invalid duration unit: {}", unit)),
            };
        }

        if total.is_zero() {
            return Err("Duration must be greater than 0".to_string());
        }
        Ok(total)
    }

    pub fn format_duration(d: Duration) -> String {
        if d.subsec_millis() != 0 {
            return format!("{}ms", d.as_millis());
        }
        let secs = d.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        let mut result = String::new();
        if hours > 0 {
            result.push_str(&format!("{}h", hours));
        }
        if mins > 0 {
            result.push_str(&format!("{}m", mins));
        }
        if secs > 0 || result.is_empty() {
            result.push_str(&format!("{}s", secs));
        }
        result
    }
}

pub use duration_serde::parse_duration;

impl HidConfig {
    /// Load configuration from `path`, or the first standard location found
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref()),
            None => {
                let candidates = [Self::default_path(), PathBuf::from("/etc/kvmd-otg-hid/hid.toml")];
                candidates
                    .into_iter()
                    .find(|p| p.exists())
                    .ok_or_else(|| anyhow!("No configuration file found"))?
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HidConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("kvmd-otg-hid").join("hid.toml")
        } else {
            PathBuf::from(".config/kvmd-otg-hid/hid.toml")
        }
    }

    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.keyboard.device_path.trim().is_empty() {
            return Err(anyhow!("keyboard.device_path must not be empty"));
        }
        if self.mouse.device_path.trim().is_empty() {
            return Err(anyhow!("mouse.device_path must not be empty"));
        }
        Ok(())
    }

    fn udc_name(&self) -> Option<String> {
        let name = self.udc.name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Worker start-up record for the keyboard, if enabled
    pub fn keyboard_spec(&self, log_level: &str) -> Option<WorkerSpec> {
        let kb = &self.keyboard;
        kb.enabled.then(|| WorkerSpec {
            name: "keyboard".to_string(),
            kind: DeviceKind::Keyboard,
            device_path: expand_path(&kb.device_path),
            read_chunk_size: kb.read_chunk_size,
            select_timeout: kb.select_timeout,
            queue_timeout: kb.queue_timeout,
            write_retries: kb.write_retries,
            noop: kb.noop,
            udc: self.udc_name(),
            log_level: log_level.to_string(),
            error_backoff: ERROR_BACKOFF,
        })
    }

    /// Worker start-up record for the mouse, if enabled
    pub fn mouse_spec(&self, log_level: &str) -> Option<WorkerSpec> {
        let mouse = &self.mouse;
        mouse.enabled.then(|| WorkerSpec {
            name: "mouse".to_string(),
            kind: DeviceKind::Mouse {
                absolute: mouse.absolute,
                horizontal_wheel: mouse.horizontal_wheel,
            },
            device_path: expand_path(&mouse.device_path),
            read_chunk_size: mouse.read_chunk_size,
            select_timeout: mouse.select_timeout,
            queue_timeout: mouse.queue_timeout,
            write_retries: mouse.write_retries,
            noop: mouse.noop,
            udc: self.udc_name(),
            log_level: log_level.to_string(),
            error_backoff: ERROR_BACKOFF,
        })
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = HidConfig::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.keyboard.device_path, "/dev/kvmd-hid-keyboard");
        assert_eq!(config.keyboard.read_chunk_size, 8);
        assert_eq!(config.mouse.device_path, "/dev/kvmd-hid-mouse");
        assert_eq!(config.mouse.read_chunk_size, 0);
        assert_eq!(config.keyboard.queue_timeout, Duration::from_millis(100));
        assert_eq!(config.mouse.write_retries, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_kind_defaults() {
        let config: HidConfig = toml::from_str(
            r#"
            [keyboard]
            noop = true
            queue_timeout = "250ms"

            [mouse]
            absolute = false
            write_retries = 3
            "#,
        )
        .unwrap();

        assert!(config.keyboard.noop);
        assert_eq!(config.keyboard.queue_timeout, Duration::from_millis(250));
        assert_eq!(config.keyboard.read_chunk_size, 8);
        assert_eq!(config.keyboard.select_timeout, DEFAULT_TIMEOUT);
        assert!(!config.mouse.absolute);
        assert_eq!(config.mouse.write_retries, 3);
        assert_eq!(config.mouse.device_path, "/dev/kvmd-hid-mouse");
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("100ms"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_duration("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1s500ms"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration(" 2 "), Ok(Duration::from_secs(2)));

        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_format_duration() {
        use duration_serde::format_duration;
        assert_eq!(format_duration(Duration::from_millis(100)), "100ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
    }

    #[test]
    fn test_validate() {
        let mut config = HidConfig::default();
        config.daemon.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        config.daemon.log_level = "debug".to_string();
        assert!(config.validate().is_ok());

        config.mouse.device_path = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("hid.toml");

        let mut config = HidConfig::default();
        config.udc.name = "fe980000.usb".to_string();
        config.mouse.horizontal_wheel = false;
        config.keyboard.select_timeout = Duration::from_millis(20);
        config.save(&path).unwrap();

        let loaded = HidConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.udc.name, "fe980000.usb");
        assert!(!loaded.mouse.horizontal_wheel);
        assert_eq!(loaded.keyboard.select_timeout, Duration::from_millis(20));
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hid.toml");
        fs::write(&path, "[keyboard]\nselect_timeout = \"soon\"\n").unwrap();
        assert!(HidConfig::load(Some(path)).is_err());

        assert!(HidConfig::load(Some(dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_worker_specs() {
        let mut config = HidConfig::default();
        config.mouse.absolute = false;

        let kb = config.keyboard_spec("debug").unwrap();
        assert_eq!(kb.kind, DeviceKind::Keyboard);
        assert_eq!(kb.device_path, PathBuf::from("/dev/kvmd-hid-keyboard"));
        assert!(kb.needs_read());
        assert_eq!(kb.log_level, "debug");
        assert_eq!(kb.udc, None);
        assert_eq!(kb.error_backoff, ERROR_BACKOFF);

        let mouse = config.mouse_spec("info").unwrap();
        assert_eq!(
            mouse.kind,
            DeviceKind::Mouse {
                absolute: false,
                horizontal_wheel: true
            }
        );
        assert!(!mouse.needs_read());

        config.udc.name = "dummy_udc.0".to_string();
        config.keyboard.enabled = false;
        assert!(config.keyboard_spec("info").is_none());
        assert_eq!(
            config.mouse_spec("info").unwrap().udc.as_deref(),
            Some("dummy_udc.0")
        );
    }

    #[test]
    fn test_device_path_tilde_is_expanded() {
        let mut config = HidConfig::default();
        config.keyboard.device_path = "~/hidg0".to_string();
        let spec = config.keyboard_spec("info").unwrap();
        assert!(!spec.device_path.to_string_lossy().starts_with('~'));
        assert!(spec.device_path.ends_with("hidg0"));
    }
}
