//! Backend abstraction - CUDA (optional) or NdArray (always available)
//!
//! Serving never uses an autodiff backend: with a plain backend Burn tracks no
//! gradients, dropout is a no-op and batch norm reads its running statistics.
//!
//! The device decision is made once at startup by [`negotiate`] and is
//! immutable afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::error::ClassifierError;

/// CPU inference backend, always compiled in
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// GPU inference backend
#[cfg(feature = "cuda")]
pub type GpuBackend = burn_cuda::Cuda;

/// Minimum CUDA compute capability accepted for serving (major * 10 + minor)
pub const MIN_COMPUTE_CAPABILITY: u32 = 50;

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DevicePreference {
    /// Use CUDA when it is usable, otherwise CPU
    #[default]
    Auto,
    /// Always CPU
    Cpu,
    /// A specific CUDA ordinal, downgraded to CPU if unusable
    Cuda(usize),
}

impl FromStr for DevicePreference {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda(0)),
            other => {
                let index = other
                    .strip_prefix("cuda:")
                    .or_else(|| other.strip_prefix("gpu:"))
                    .and_then(|i| i.parse::<usize>().ok());
                index.map(DevicePreference::Cuda).ok_or_else(|| {
                    ClassifierError::Config(format!(
                        "unknown device '{}', expected auto, cpu, cuda or cuda:N",
                        other
                    ))
                })
            }
        }
    }
}

/// The device actually used for every forward pass of this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeTarget {
    Cpu,
    Cuda(usize),
}

impl fmt::Display for ComputeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeTarget::Cpu => write!(f, "cpu"),
            ComputeTarget::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

impl ComputeTarget {
    /// Human-readable backend name
    pub fn backend_name(&self) -> &'static str {
        match self {
            ComputeTarget::Cpu => "NdArray (CPU)",
            ComputeTarget::Cuda(_) => "CUDA (GPU)",
        }
    }
}

/// Whether the CUDA backend was compiled into this binary
pub fn cuda_compiled() -> bool {
    cfg!(feature = "cuda")
}

/// Resolve the operator's preference into a single compute target.
///
/// CUDA is only chosen when it is compiled in, a driver is visible and the
/// device reports compute capability >= 5.0. Anything else downgrades to CPU.
pub fn negotiate(preference: DevicePreference) -> ComputeTarget {
    let index = match preference {
        DevicePreference::Cpu => {
            info!("Using CPU backend (requested)");
            return ComputeTarget::Cpu;
        }
        DevicePreference::Auto => 0,
        DevicePreference::Cuda(index) => index,
    };

    if !cuda_compiled() {
        if matches!(preference, DevicePreference::Cuda(_)) {
            warn!("CUDA requested but this binary was built without the `cuda` feature - falling back to CPU");
        } else {
            info!("Using CPU backend (CUDA support not compiled in)");
        }
        return ComputeTarget::Cpu;
    }

    if !has_nvidia_driver() {
        warn!("No NVIDIA driver detected - falling back to CPU");
        return ComputeTarget::Cpu;
    }

    match probe_compute_capability(index) {
        Some((major, minor)) if major * 10 + minor >= MIN_COMPUTE_CAPABILITY => {
            info!("CUDA device {} (compute capability {}.{}) selected", index, major, minor);
            ComputeTarget::Cuda(index)
        }
        Some((major, minor)) => {
            warn!(
                "CUDA device {} has compute capability {}.{} (< 5.0) - falling back to CPU",
                index, major, minor
            );
            ComputeTarget::Cpu
        }
        None => {
            warn!("Could not query CUDA device {} - falling back to CPU", index);
            ComputeTarget::Cpu
        }
    }
}

/// Check for an NVIDIA driver on this machine
fn has_nvidia_driver() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/proc/driver/nvidia/version").exists()
            || std::path::Path::new("/dev/nvidia0").exists()
            || nvidia_smi(&["-L"]).is_some()
    }

    #[cfg(not(target_os = "linux"))]
    {
        nvidia_smi(&["-L"]).is_some()
    }
}

fn nvidia_smi(args: &[&str]) -> Option<String> {
    let program = if cfg!(target_os = "windows") {
        "nvidia-smi.exe"
    } else {
        "nvidia-smi"
    };

    let output = std::process::Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// Query `(major, minor)` compute capability of one CUDA device
fn probe_compute_capability(index: usize) -> Option<(u32, u32)> {
    let id = format!("--id={}", index);
    let stdout = nvidia_smi(&["--query-gpu=compute_cap", "--format=csv,noheader", &id])?;
    parse_compute_capability(&stdout)
}

/// Parse `nvidia-smi --query-gpu=compute_cap` output such as `"8.6\n"`
pub fn parse_compute_capability(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (major, minor) = line.split_once('.')?;
    Some((major.trim().parse().ok()?, minor.trim().parse().ok()?))
}

/// Print what this process can see, for the `device-info` command
pub fn describe_devices() -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "CUDA compiled in: {}\n",
        if cuda_compiled() { "yes" } else { "no" }
    ));
    out.push_str(&format!(
        "NVIDIA driver:    {}\n",
        if has_nvidia_driver() { "detected" } else { "not found" }
    ));
    if let Some((major, minor)) = probe_compute_capability(0) {
        out.push_str(&format!("Device 0:         compute capability {}.{}\n", major, minor));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_preference() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("cuda".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda(0));
        assert_eq!("cuda:2".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda(2));
        assert!("tpu".parse::<DevicePreference>().is_err());
        assert!("cuda:x".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_parse_compute_capability() {
        assert_eq!(parse_compute_capability("8.6\n"), Some((8, 6)));
        assert_eq!(parse_compute_capability("\n 3.7 \n"), Some((3, 7)));
        assert_eq!(parse_compute_capability("N/A"), None);
        assert_eq!(parse_compute_capability(""), None);
    }

    #[test]
    fn test_cpu_preference_is_always_cpu() {
        assert_eq!(negotiate(DevicePreference::Cpu), ComputeTarget::Cpu);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_without_cuda_feature_everything_downgrades() {
        assert_eq!(negotiate(DevicePreference::Auto), ComputeTarget::Cpu);
        assert_eq!(negotiate(DevicePreference::Cuda(1)), ComputeTarget::Cpu);
    }

    #[test]
    fn test_compute_target_display() {
        assert_eq!(ComputeTarget::Cpu.to_string(), "cpu");
        assert_eq!(ComputeTarget::Cuda(1).to_string(), "cuda:1");
    }
}
