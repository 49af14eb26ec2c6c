//! Device discovery: GPU-class devices are preferred over CPU-class ones.

use std::fmt;

use opencl3::device::{CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU, Device};
use opencl3::error_codes::{CL_DEVICE_NOT_FOUND, ClError};
use opencl3::platform::{Platform, get_platforms};
use opencl3::types::{cl_device_id, cl_device_type};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

/// Device classes the session is willing to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Gpu,
    Cpu,
}

impl DeviceClass {
    pub fn cl_type(self) -> cl_device_type {
        match self {
            DeviceClass::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceClass::Cpu => CL_DEVICE_TYPE_CPU,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceClass::Gpu => "GPU",
            DeviceClass::Cpu => "CPU",
        })
    }
}

/// Picks the first GPU candidate, else the first CPU candidate.
pub fn pick_preferred<T>(gpus: Vec<T>, cpus: Vec<T>) -> Option<(T, DeviceClass)> {
    if let Some(gpu) = gpus.into_iter().next() {
        return Some((gpu, DeviceClass::Gpu));
    }
    cpus.into_iter().next().map(|cpu| (cpu, DeviceClass::Cpu))
}

/// The device a session runs on.
pub struct SelectedDevice {
    pub(crate) device: Device,
    pub class: DeviceClass,
    pub name: String,
    pub platform_name: String,
}

impl SelectedDevice {
    pub fn id(&self) -> cl_device_id {
        self.device.id()
    }
}

impl fmt::Debug for SelectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedDevice")
            .field("class", &self.class)
            .field("name", &self.name)
            .field("platform", &self.platform_name)
            .finish()
    }
}

/// `CL_DEVICE_NOT_FOUND` just means the platform has none of that class.
fn devices_of(platform: &Platform, class: DeviceClass) -> Result<Vec<cl_device_id>> {
    match platform.get_devices(class.cl_type()) {
        Ok(ids) => Ok(ids),
        Err(ClError(code)) if code == CL_DEVICE_NOT_FOUND => Ok(Vec::new()),
        Err(code) => Err(SessionError::Api { op: "clGetDeviceIDs", code }),
    }
}

/// Enumerates every platform and selects a device, GPU first.
pub fn acquire_device() -> Result<SelectedDevice> {
    let platforms = get_platforms().map_err(|_| SessionError::NoPlatform)?;
    if platforms.is_empty() {
        return Err(SessionError::NoPlatform);
    }

    let mut gpus = Vec::new();
    let mut cpus = Vec::new();
    for platform in &platforms {
        let platform_name = platform.name().unwrap_or_default();
        debug!("Scanning OpenCL platform: {}", platform_name);
        for id in devices_of(platform, DeviceClass::Gpu)? {
            gpus.push((id, platform_name.clone()));
        }
        for id in devices_of(platform, DeviceClass::Cpu)? {
            cpus.push((id, platform_name.clone()));
        }
    }

    let have_gpu = !gpus.is_empty();
    let ((id, platform_name), class) = pick_preferred(gpus, cpus).ok_or(SessionError::NoDevice {
        platforms: platforms.len(),
    })?;
    if !have_gpu {
        warn!("GPU not found, falling back to CPU");
    }

    let device = Device::new(id);
    let name = device.name().unwrap_or_default().trim().to_string();
    info!(%class, device = %name, platform = %platform_name, "selected OpenCL device");
    Ok(SelectedDevice {
        device,
        class,
        name,
        platform_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_wins_when_both_present() {
        let picked = pick_preferred(vec!["gpu0", "gpu1"], vec!["cpu0"]);
        assert_eq!(picked, Some(("gpu0", DeviceClass::Gpu)));
    }

    #[test]
    fn cpu_only_without_gpu() {
        let picked = pick_preferred(Vec::new(), vec!["cpu0", "cpu1"]);
        assert_eq!(picked, Some(("cpu0", DeviceClass::Cpu)));
    }

    #[test]
    fn nothing_to_pick() {
        assert_eq!(pick_preferred::<u8>(Vec::new(), Vec::new()), None);
    }

    #[test]
    fn acquire_graceful_on_missing_hardware() {
        match acquire_device() {
            Ok(dev) => assert!(!dev.platform_name.is_empty() || !dev.name.is_empty()),
            Err(e) => assert!(
                matches!(
                    e,
                    SessionError::NoPlatform
                        | SessionError::NoDevice { .. }
                        | SessionError::Api { .. }
                ),
                "unexpected error: {e}"
            ),
        }
    }
}
