//! Compute backend selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// Accelerated backend.
    Gpu,
    /// Portable fallback.
    Cpu,
}

impl ComputeDevice {
    /// Short badge text shown by the player.
    pub fn badge(&self) -> &'static str {
        match self {
            ComputeDevice::Gpu => "GPU",
            ComputeDevice::Cpu => "CPU",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Gpu => write!(f, "gpu"),
            ComputeDevice::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(ComputeDevice::Gpu),
            "cpu" => Ok(ComputeDevice::Cpu),
            other => Err(format!("unknown device '{}', expected gpu or cpu", other)),
        }
    }
}

/// Platforms where the accelerated backend is known to misbehave.
const UNSTABLE_ACCELERATION_PLATFORMS: &[&str] = &["android"];

/// Pick the backend for a model load.
///
/// `probe` reports whether acceleration is available; an error counts as
/// unavailable. The probe is skipped when CPU is forced or the platform is
/// on the unstable list.
pub fn select_device<F>(force_cpu: bool, platform: &str, probe: F) -> ComputeDevice
where
    F: FnOnce() -> crate::error::Result<bool>,
{
    if force_cpu {
        tracing::info!("CPU backend forced by configuration");
        return ComputeDevice::Cpu;
    }
    if UNSTABLE_ACCELERATION_PLATFORMS.contains(&platform) {
        tracing::info!(platform, "Accelerated backend disabled on this platform");
        return ComputeDevice::Cpu;
    }
    match probe() {
        Ok(true) => ComputeDevice::Gpu,
        Ok(false) => {
            tracing::info!("Acceleration unavailable, using CPU backend");
            ComputeDevice::Cpu
        }
        Err(e) => {
            tracing::warn!("Acceleration probe failed ({}), using CPU backend", e);
            ComputeDevice::Cpu
        }
    }
}

/// The platform name used for device selection.
pub fn current_platform() -> &'static str {
    std::env::consts::OS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoxError;

    #[test]
    fn test_prefers_gpu_when_available() {
        assert_eq!(select_device(false, "linux", || Ok(true)), ComputeDevice::Gpu);
    }

    #[test]
    fn test_falls_back_when_unavailable() {
        assert_eq!(select_device(false, "linux", || Ok(false)), ComputeDevice::Cpu);
    }

    #[test]
    fn test_falls_back_on_probe_error() {
        let device = select_device(false, "linux", || {
            Err(VoxError::Other("no adapter".to_string()))
        });
        assert_eq!(device, ComputeDevice::Cpu);
    }

    #[test]
    fn test_force_cpu_skips_probe() {
        let device = select_device(true, "linux", || panic!("probe must not run"));
        assert_eq!(device, ComputeDevice::Cpu);
    }

    #[test]
    fn test_android_skips_probe() {
        let device = select_device(false, "android", || panic!("probe must not run"));
        assert_eq!(device, ComputeDevice::Cpu);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("GPU".parse::<ComputeDevice>().unwrap(), ComputeDevice::Gpu);
        assert_eq!("cpu".parse::<ComputeDevice>().unwrap(), ComputeDevice::Cpu);
        assert!("tpu".parse::<ComputeDevice>().is_err());
        assert_eq!(ComputeDevice::Gpu.to_string(), "gpu");
        assert_eq!(ComputeDevice::Cpu.badge(), "CPU");
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ComputeDevice::Gpu).unwrap(), "\"gpu\"");
    }
}
