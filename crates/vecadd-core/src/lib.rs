//! Element-wise `i32` vector addition on the host (serial and rayon) and
//! on an OpenCL device through a type-state compute session.

pub mod buffer;
pub mod config;
pub mod cpu;
pub mod device;
pub mod driver;
pub mod error;
pub mod host;
pub mod logging;
pub mod memtracer;
pub mod metrics;
pub mod session;

pub use buffer::{DeviceBuffer, VectorBuffers};
pub use config::{Args, Backend, RunConfig};
pub use cpu::{ThreadedAdder, add_parallel, add_serial};
pub use device::{DeviceClass, SelectedDevice, acquire_device, pick_preferred};
pub use error::{HostError, SessionError};
pub use host::{HostVector, preview};
pub use session::{
    Built, Complete, DeviceComputeSession, InFlight, KERNEL_NAME, KernelTiming, Loaded, Opened,
    State, VECTOR_OPS_SOURCE, run_vector_add,
};

#[cfg(feature = "metrics")]
pub use metrics::{ALLOC_BYTES, ALLOCS, summary};
#[cfg(feature = "memtrace")]
pub use memtracer::{Dir, flush_csv, start};
