use crate::domain::commander::{ControlMode, Sensitivity};
use crate::infrastructure::link::protocol;
use crate::infrastructure::link::service::LinkConfig;
use crate::infrastructure::link::simulated::SimulatedConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "breeze_blue".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Flight Controls
    #[serde(default)]
    pub control_mode: ControlMode,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default = "default_right_deadband_x")]
    pub right_deadband_x: f32,
    #[serde(default = "default_tilt_max_angle_deg")]
    pub tilt_max_angle_deg: f32,

    // Link Timing
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    // Advanced BLE Settings
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_crtp_uuid")]
    pub ble_crtp_char_uuid: String,
    #[serde(default = "default_crtp_up_uuid")]
    pub ble_crtp_up_char_uuid: String,

    // Transport
    #[serde(default = "default_transport_queue_depth")]
    pub transport_queue_depth: usize,
    #[serde(default = "default_simulated_step_ms")]
    pub simulated_step_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),

            control_mode: ControlMode::default(),
            sensitivity: Sensitivity::default(),
            right_deadband_x: default_right_deadband_x(),
            tilt_max_angle_deg: default_tilt_max_angle_deg(),

            tick_period_ms: default_tick_period_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),

            ble_service_uuid: default_service_uuid(),
            ble_crtp_char_uuid: default_crtp_uuid(),
            ble_crtp_up_char_uuid: default_crtp_up_uuid(),

            transport_queue_depth: default_transport_queue_depth(),
            simulated_step_ms: default_simulated_step_ms(),
        }
    }
}

impl Settings {
    /// Timing configuration for the flight link service
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            tick_period: Duration::from_millis(self.tick_period_ms.max(1)),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn simulated_config(&self) -> SimulatedConfig {
        SimulatedConfig {
            step_delay: Duration::from_millis(self.simulated_step_ms),
            queue_depth: self.transport_queue_depth.max(1),
            ..SimulatedConfig::default()
        }
    }
}

fn default_right_deadband_x() -> f32 {
    0.1
}
fn default_tilt_max_angle_deg() -> f32 {
    30.0
}
fn default_tick_period_ms() -> u64 {
    50
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_service_uuid() -> String {
    protocol::SERVICE_UUID.to_string()
}
fn default_crtp_uuid() -> String {
    protocol::CRTP_CHAR_UUID.to_string()
}
fn default_crtp_up_uuid() -> String {
    protocol::CRTP_UP_CHAR_UUID.to_string()
}
fn default_transport_queue_depth() -> usize {
    32
}
fn default_simulated_step_ms() -> u64 {
    200
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BreezeBlue");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn update_control_mode(&mut self, mode: ControlMode) -> anyhow::Result<()> {
        if self.settings.control_mode != mode {
            self.settings.control_mode = mode;
            self.save()?;
        }
        Ok(())
    }

    pub fn update_sensitivity(&mut self, sensitivity: Sensitivity) -> anyhow::Result<()> {
        self.settings.sensitivity = sensitivity;
        self.save()
    }
}
