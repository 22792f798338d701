use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::error::ConfigError;
use crate::ingest::Key;
use crate::transport::TransportMode;

/// A gap longer than the profile's gap threshold times this factor is a
/// hand-off to manual typing.
pub const TAKEOVER_FACTOR: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Shortest decoded value accepted as a scan
    pub min_length: usize,
    /// Longest expected value; reaching it finalizes early
    pub max_length: usize,
    pub fast_gap_threshold_ms: u64,
    pub moderate_gap_threshold_ms: u64,
    /// Keys that end a session immediately
    pub terminators: Vec<Key>,
    /// Treat quiescence as a fallback for fast bursts instead of the primary strategy
    pub wait_for_terminator: bool,
    /// Finalize on quiescence when no terminator arrives
    pub auto_submit: bool,
    pub clear_host_input_on_dispatch: bool,
    pub transport: TransportMode,
    pub fast_quiescence_ms: u64,
    pub terminator_wait_ms: u64,
    pub moderate_quiescence_ms: u64,
    pub max_length_grace_ms: u64,
    pub dispatch_cooldown_ms: u64,
    pub moderate_dispatch_cooldown_ms: u64,
    pub max_events_per_second: u32,
    pub lockout_ms: u64,
    /// Reserved key that always forces an emergency stop
    pub abort_key: Option<Key>,
    /// Accept events when no interactive element has focus
    pub page_fallback: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 50,
            fast_gap_threshold_ms: 50,
            moderate_gap_threshold_ms: 150,
            terminators: vec![Key::Enter, Key::Tab],
            wait_for_terminator: true,
            auto_submit: true,
            clear_host_input_on_dispatch: true,
            transport: TransportMode::Auto,
            fast_quiescence_ms: 100,
            terminator_wait_ms: 300,
            moderate_quiescence_ms: 500,
            max_length_grace_ms: 50,
            dispatch_cooldown_ms: 200,
            moderate_dispatch_cooldown_ms: 500,
            max_events_per_second: 50,
            lockout_ms: 2000,
            abort_key: Some(Key::Escape),
            page_fallback: true,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_length == 0 {
            return Err(ConfigError::ZeroMinLength);
        }
        if self.min_length > self.max_length {
            return Err(ConfigError::LengthRange {
                min: self.min_length,
                max: self.max_length,
            });
        }
        let durations = [
            ("fast_gap_threshold_ms", self.fast_gap_threshold_ms),
            ("moderate_gap_threshold_ms", self.moderate_gap_threshold_ms),
            ("fast_quiescence_ms", self.fast_quiescence_ms),
            ("terminator_wait_ms", self.terminator_wait_ms),
            ("moderate_quiescence_ms", self.moderate_quiescence_ms),
            ("lockout_ms", self.lockout_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::ZeroDuration(*name));
        }
        if self.fast_gap_threshold_ms >= self.moderate_gap_threshold_ms {
            return Err(ConfigError::GapThresholds {
                fast: self.fast_gap_threshold_ms,
                moderate: self.moderate_gap_threshold_ms,
            });
        }
        if self.max_events_per_second == 0 {
            return Err(ConfigError::ZeroEventCeiling);
        }
        if let Some(abort) = self.abort_key {
            if self.terminators.contains(&abort) {
                return Err(ConfigError::AbortIsTerminator(abort.to_string()));
            }
        }
        Ok(())
    }

    /// Hard ceiling on the buffer; anything longer is treated as a runaway source.
    pub fn buffer_ceiling(&self) -> usize {
        self.max_length.saturating_mul(2)
    }

    pub fn fast_gap(&self) -> Duration {
        Duration::from_millis(self.fast_gap_threshold_ms)
    }

    pub fn moderate_gap(&self) -> Duration {
        Duration::from_millis(self.moderate_gap_threshold_ms)
    }

    pub fn lockout(&self) -> Duration {
        Duration::from_millis(self.lockout_ms)
    }

    pub fn max_length_grace(&self) -> Duration {
        Duration::from_millis(self.max_length_grace_ms)
    }
}

pub trait ConfigStore {
    fn load(&self) -> ScanConfig;
    fn save(&self, cfg: &ScanConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("scantap_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> ScanConfig {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<ScanConfig>(&bytes) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "ignoring unreadable config");
                    ScanConfig::default()
                }
            },
            Err(_) => ScanConfig::default(),
        }
    }

    fn save(&self, cfg: &ScanConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
