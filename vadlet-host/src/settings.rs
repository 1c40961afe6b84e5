//! Host settings (JSON file, camelCase keys).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use vadlet_core::{AnalysisRate, ClassifierBackend, EngineConfig, FrameDuration, Sensitivity};

/// Environment variable that overrides the configured sensitivity.
pub const SENSITIVITY_ENV: &str = "VADLET_SENSITIVITY";

/// Accepted context rates, telephony up to high-resolution interfaces.
const MIN_CONTEXT_RATE: u32 = 8_000;
const MAX_CONTEXT_RATE: u32 = 192_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct HostSettings {
    /// Rate of the simulated (or assumed) audio context.
    pub context_sample_rate: u32,
    pub analysis_rate: u32,
    pub frame_ms: u32,
    pub sensitivity: u8,
    pub backend: String,
    pub passthrough: bool,
    pub ring_capacity: usize,
    pub event_capacity: usize,
    /// Report input level every N quanta; 0 disables.
    pub level_report_interval: u32,
    /// Give up on bring-up after this long; 0 waits forever.
    pub init_timeout_ms: u64,
    /// Simulated latency of each host completion.
    pub stage_delay_ms: u64,
    pub preferred_input_device: Option<String>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            context_sample_rate: 48_000,
            analysis_rate: 16_000,
            frame_ms: 10,
            sensitivity: 2,
            backend: "earshot".into(),
            passthrough: true,
            ring_capacity: 1024,
            event_capacity: 256,
            level_report_interval: 0,
            init_timeout_ms: 5_000,
            stage_delay_ms: 5,
            preferred_input_device: None,
        }
    }
}

impl HostSettings {
    pub fn normalize(&mut self) {
        self.analysis_rate = normalize_analysis_rate(self.analysis_rate).hz();
        self.frame_ms = normalize_frame_ms(self.frame_ms).millis();
        self.context_sample_rate = self
            .context_sample_rate
            .clamp(MIN_CONTEXT_RATE, MAX_CONTEXT_RATE);
        self.sensitivity = self.sensitivity.min(Sensitivity::MAX);
        self.backend = normalize_backend(&self.backend).into();

        let frame_len = (self.analysis_rate * self.frame_ms / 1000) as usize;
        self.ring_capacity = self.ring_capacity.clamp(frame_len * 2, 1 << 16);
        self.event_capacity = self.event_capacity.clamp(16, 1 << 16);
        self.level_report_interval = self.level_report_interval.min(10_000);
        self.init_timeout_ms = self.init_timeout_ms.min(60_000);
        self.stage_delay_ms = self.stage_delay_ms.min(1_000);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    /// Apply a raw `VADLET_SENSITIVITY` value. Unparseable values are ignored.
    pub fn apply_sensitivity_override(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else { return };
        match raw.trim().parse::<u8>() {
            Ok(level) => self.sensitivity = level,
            Err(_) => warn!(value = raw, "ignoring invalid {SENSITIVITY_ENV}"),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            input_sample_rate: self.context_sample_rate,
            analysis_rate: normalize_analysis_rate(self.analysis_rate),
            frame_duration: normalize_frame_ms(self.frame_ms),
            ring_capacity: self.ring_capacity,
            sensitivity: Sensitivity::new(self.sensitivity.min(Sensitivity::MAX))
                .unwrap_or_default(),
            passthrough: self.passthrough,
            event_capacity: self.event_capacity,
            level_report_interval: (self.level_report_interval > 0)
                .then_some(self.level_report_interval),
            backend: backend_for(&self.backend),
            ..EngineConfig::default()
        }
    }
}

/// Nearest supported analysis rate (8, 16 or 32 kHz).
pub fn normalize_analysis_rate(hz: u32) -> AnalysisRate {
    match hz {
        0..=11_999 => AnalysisRate::Khz8,
        12_000..=23_999 => AnalysisRate::Khz16,
        _ => AnalysisRate::Khz32,
    }
}

pub fn normalize_frame_ms(ms: u32) -> FrameDuration {
    FrameDuration::from_millis(ms).unwrap_or_default()
}

pub fn normalize_backend(raw: &str) -> &'static str {
    match raw.trim().to_ascii_lowercase().as_str() {
        "energy" | "rms" => "energy",
        _ => "earshot",
    }
}

fn backend_for(name: &str) -> ClassifierBackend {
    match normalize_backend(name) {
        "energy" => ClassifierBackend::Energy,
        _ => ClassifierBackend::Earshot,
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Vadlet")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("vadlet")
            .join("settings.json")
    }
}

/// Read settings from `path`, falling back to defaults, then apply the
/// environment override and normalise.
pub fn load_settings(path: &Path) -> HostSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<HostSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "settings unreadable ({e}), using defaults");
            HostSettings::default()
        }),
        Err(_) => HostSettings::default(),
    };
    let env = std::env::var(SENSITIVITY_ENV).ok();
    settings.apply_sensitivity_override(env.as_deref());
    settings.normalize();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: HostSettings =
            serde_json::from_str(r#"{"sensitivity":1,"levelReportInterval":16}"#)
                .expect("parse settings");
        assert_eq!(settings.sensitivity, 1);
        assert_eq!(settings.level_report_interval, 16);
        assert_eq!(settings.context_sample_rate, 48_000);
        assert_eq!(settings.backend, "earshot");
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = HostSettings {
            analysis_rate: 22_050,
            frame_ms: 25,
            context_sample_rate: 4_000,
            sensitivity: 9,
            backend: " RMS ".into(),
            ring_capacity: 10,
            preferred_input_device: Some("   ".into()),
            ..HostSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.analysis_rate, 16_000);
        assert_eq!(settings.frame_ms, 10);
        assert_eq!(settings.context_sample_rate, 8_000);
        assert_eq!(settings.sensitivity, 3);
        assert_eq!(settings.backend, "energy");
        assert_eq!(settings.ring_capacity, 320);
        assert!(settings.preferred_input_device.is_none());
    }

    #[test]
    fn sensitivity_override_is_applied_before_clamping() {
        let mut settings = HostSettings::default();
        settings.apply_sensitivity_override(Some(" 0 "));
        assert_eq!(settings.sensitivity, 0);
        settings.apply_sensitivity_override(Some("loud"));
        assert_eq!(settings.sensitivity, 0);
        settings.apply_sensitivity_override(Some("7"));
        settings.normalize();
        assert_eq!(settings.sensitivity, 3);
    }

    #[test]
    fn engine_config_mapping_validates() {
        let mut settings = HostSettings {
            analysis_rate: 32_000,
            frame_ms: 30,
            level_report_interval: 16,
            backend: "energy".into(),
            ..HostSettings::default()
        };
        settings.normalize();
        let config = settings.engine_config();
        config.validate().expect("normalised settings validate");
        assert_eq!(config.frame_length(), 960);
        assert_eq!(config.level_report_interval, Some(16));
        assert_eq!(config.backend, ClassifierBackend::Energy);
    }

    #[test]
    fn narrowband_context_is_kept_below_the_analysis_rate() {
        let mut settings = HostSettings {
            context_sample_rate: 8_000,
            backend: "energy".into(),
            ..HostSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.context_sample_rate, 8_000);
        let config = settings.engine_config();
        config.validate().expect("8 kHz context validates");
        assert_eq!(config.input_sample_rate, 8_000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings(Path::new("/nonexistent/vadlet/settings.json"));
        assert_eq!(settings.frame_ms, 10);
        assert!(settings.passthrough);
    }
}
