// Backend selection: WGPU on the GPU by default, NdArray on the CPU
// when asked for (or when no GPU is available on the host).

use std::env;

use burn::backend::{
    ndarray::{NdArray, NdArrayDevice},
    wgpu::{Wgpu, WgpuDevice},
    Autodiff,
};
use serde::{Deserialize, Serialize};

pub type GpuBackend = Wgpu;
pub type CpuBackend = NdArray;
pub type GpuTrainBackend = Autodiff<GpuBackend>;
pub type CpuTrainBackend = Autodiff<CpuBackend>;

/// Environment variable consulted when no backend is given explicitly.
pub const BACKEND_ENV: &str = "CRICKET_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Wgpu,
    Cpu,
}

impl BackendKind {
    /// Explicit choice wins, then `CRICKET_BACKEND`, then WGPU.
    pub fn resolve(explicit: Option<BackendKind>) -> Self {
        if let Some(kind) = explicit {
            return kind;
        }
        let requested = env::var(BACKEND_ENV)
            .ok()
            .map(|value| value.trim().to_ascii_lowercase());
        match requested.as_deref() {
            Some("cpu") | Some("ndarray") => BackendKind::Cpu,
            Some("wgpu") | Some("gpu") | None => BackendKind::Wgpu,
            Some(other) => {
                tracing::warn!("Unknown backend '{other}', defaulting to WGPU.");
                BackendKind::Wgpu
            }
        }
    }
}

pub fn gpu_device() -> WgpuDevice {
    WgpuDevice::default()
}

pub fn cpu_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_choice_wins() {
        assert_eq!(BackendKind::resolve(Some(BackendKind::Cpu)), BackendKind::Cpu);
        assert_eq!(BackendKind::resolve(Some(BackendKind::Wgpu)), BackendKind::Wgpu);
    }
}
