use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tonelink_core::{Modulation, ProtocolConfig};

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulationName {
    Binary,
    Grouped,
}

impl From<ModulationName> for Modulation {
    fn from(name: ModulationName) -> Self {
        match name {
            ModulationName::Binary => Modulation::Binary,
            ModulationName::Grouped => Modulation::Grouped,
        }
    }
}

/// Partial protocol parameters loaded from a JSON file; absent fields keep
/// their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub sample_rate: Option<u32>,
    pub marker_hz: Option<f32>,
    pub bit0_hz: Option<f32>,
    pub bit1_hz: Option<f32>,
    pub symbol_base_hz: Option<f32>,
    pub symbol_spacing_hz: Option<f32>,
    pub preamble_duration_s: Option<f32>,
    pub preamble_repeats: Option<usize>,
    pub data_duration_s: Option<f32>,
    pub generator: Option<u32>,
    pub crc_width: Option<u32>,
    pub max_errors: Option<usize>,
    pub max_frame_bits: Option<usize>,
    pub modulation: Option<ModulationName>,
    pub frequency_tolerance_hz: Option<f32>,
    pub timing_tolerance: Option<f32>,
    pub sync_timeout_s: Option<f32>,
    pub analysis_window_s: Option<f32>,
}

macro_rules! overlay_fields {
    ($overlay:expr, $config:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $overlay.$field {
                $config.$field = value.into();
            }
        )+
    };
}

impl ConfigOverlay {
    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let text = std::fs::read_to_string(path).map_err(|source| OverlayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| OverlayError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(self, config: &mut ProtocolConfig) {
        overlay_fields!(
            self,
            config,
            sample_rate,
            marker_hz,
            bit0_hz,
            bit1_hz,
            symbol_base_hz,
            symbol_spacing_hz,
            preamble_duration_s,
            preamble_repeats,
            data_duration_s,
            generator,
            crc_width,
            max_errors,
            max_frame_bits,
            modulation,
            frequency_tolerance_hz,
            timing_tolerance,
            sync_timeout_s,
            analysis_window_s,
        );
    }
}
