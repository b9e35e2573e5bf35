//! Bridge configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    /// Default printer for the `print` and `permission` commands
    #[serde(default)]
    pub printer: PrinterSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "BridgeSettings::default_log_level")]
    pub log_level: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl BridgeSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Vendor and product id as `0x`-prefixed hex strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Watch for device removal
    #[serde(default = "UsbSettings::default_hotplug")]
    pub hotplug: bool,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            hotplug: Self::default_hotplug(),
        }
    }
}

impl UsbSettings {
    fn default_hotplug() -> bool {
        true
    }
}

impl BridgeConfig {
    /// Load configuration from file
    ///
    /// Without an explicit path the standard locations are tried in order;
    /// it is an error when none exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::candidate_paths()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load from the standard locations, falling back to defaults
    ///
    /// Defaults apply only when no file exists. A file that fails to parse or
    /// validate is an error.
    pub fn load_or_default() -> Result<Self> {
        Self::load_first(&Self::candidate_paths())
    }

    /// Load the first existing file of `paths`, or defaults when none exists
    pub fn load_first(paths: &[PathBuf]) -> Result<Self> {
        match paths.iter().find(|p| p.exists()) {
            Some(path) => Self::load(Some(path.clone())),
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
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

    /// Per-user config file location
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(config_dir) => config_dir.join("usb-print-bridge").join("bridge.toml"),
            None => PathBuf::from(".config/usb-print-bridge/bridge.toml"),
        }
    }

    fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/usb-print-bridge/bridge.toml"),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.bridge.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.bridge.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        match (&self.printer.vendor_id, &self.printer.product_id) {
            (Some(vid), Some(pid)) => {
                validate_hex_id(vid, "vendor_id")?;
                validate_hex_id(pid, "product_id")?;
            }
            (None, None) => {}
            _ => {
                return Err(anyhow!(
                    "printer.vendor_id and printer.product_id must be set together"
                ));
            }
        }

        Ok(())
    }

    /// Configured default printer, if any
    pub fn printer_identity(&self) -> Result<Option<(u16, u16)>> {
        match (&self.printer.vendor_id, &self.printer.product_id) {
            (Some(vid), Some(pid)) => Ok(Some((parse_usb_id(vid)?, parse_usb_id(pid)?))),
            _ => Ok(None),
        }
    }
}

/// Check a `0x`-prefixed hex id of 1-4 digits
pub fn validate_hex_id(id: &str, name: &str) -> Result<()> {
    let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x04b8')",
            name,
            id
        ));
    };

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

    Ok(())
}

/// Parse a USB id given as `0x`-prefixed hex or as decimal
pub fn parse_usb_id(s: &str) -> Result<u16> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16)
            .map_err(|_| anyhow!("Invalid USB id '{}', not a valid hex number", s)),
        None => s
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid USB id '{}', expected 0-65535 or 0x0000-0xffff", s)),
    }
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path: {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
