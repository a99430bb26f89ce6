use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Row order of a read-back frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// First row is the top of the image.
    TopLeft,
    /// First row is the bottom of the image, as `glReadPixels` returns it.
    BottomLeft,
}

/// Identity of one mounted render surface. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Preferred GPU power profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuOptions {
    pub power: GpuPowerPreference,
    /// Request the software fallback adapter; useful on machines without a GPU.
    pub force_fallback_adapter: bool,
}

/// Summary of the adapter wgpu picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub max_texture_side: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            driver: info.driver.clone(),
            max_texture_side: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        if self.device_type == wgpu::DeviceType::Cpu {
            return true;
        }
        let name = self.name.to_ascii_lowercase();
        ["llvmpipe", "swiftshader", "softpipe", "warp"]
            .iter()
            .any(|needle| name.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_ids_are_unique() {
        let a = SurfaceId::next();
        let b = SurfaceId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn detects_software_adapters_by_name() {
        let profile = AdapterProfile {
            name: "llvmpipe (LLVM 17.0.6, 256 bits)".into(),
            backend: wgpu::Backend::Vulkan,
            device_type: wgpu::DeviceType::Other,
            driver: String::new(),
            max_texture_side: 8192,
        };
        assert!(profile.is_software());

        let discrete = AdapterProfile {
            name: "AMD Radeon RX 7800 XT".into(),
            device_type: wgpu::DeviceType::DiscreteGpu,
            ..profile
        };
        assert!(!discrete.is_software());
    }
}
