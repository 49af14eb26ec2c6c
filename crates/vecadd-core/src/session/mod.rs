//! One-shot offload of `vector_add_ocl` to an OpenCL device.
//!
//! A session moves through `Opened → Built → Loaded → InFlight → Complete`.
//! Every transition consumes the previous value, so buffers can only be
//! allocated after a successful build and results can only be downloaded
//! after the completion wait. Teardown order is buffers, kernel, queue,
//! program, context, whether via [`DeviceComputeSession::release`] or drop.

mod state;

pub use state::{Built, Complete, InFlight, Loaded, Opened, State};

use std::fmt;
use std::path::Path;
use std::ptr;
use std::time::{Duration, Instant};

use opencl3::command_queue::{CL_QUEUE_PROFILING_ENABLE, CommandQueue};
use opencl3::context::Context;
use opencl3::kernel::Kernel;
use opencl3::program::Program;
use opencl3::types::cl_int;
use tracing::{debug, info};

use crate::buffer::VectorBuffers;
use crate::config::DEFAULT_KERNEL_PATH;
use crate::device::{SelectedDevice, acquire_device};
use crate::error::{Result, SessionError};
#[cfg(feature = "memtrace")]
use crate::memtracer::{Dir, start as trace_start};

/// Entry point looked up in the compiled program.
pub const KERNEL_NAME: &str = "vector_add_ocl";

/// Kernel source shipped with the crate.
pub const VECTOR_OPS_SOURCE: &str = include_str!("../../kernels/vector_ops_ocl.cl");

/// Wall time from submission to completion, plus the device's own
/// start→end interval when the queue exposes profiling counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelTiming {
    pub wall: Duration,
    pub device: Option<Duration>,
}

impl KernelTiming {
    pub fn wall_ms(&self) -> f64 {
        self.wall.as_secs_f64() * 1e3
    }
}

pub struct DeviceComputeSession<S: State> {
    stage: S,
    context: Context,
    device: SelectedDevice,
}

impl<S: State> fmt::Debug for DeviceComputeSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceComputeSession")
            .field("state", &S::NAME)
            .field("device", &self.device)
            .finish()
    }
}

impl<S: State> DeviceComputeSession<S> {
    pub fn device(&self) -> &SelectedDevice {
        &self.device
    }

    pub fn state_name(&self) -> &'static str {
        S::NAME
    }

    /// Destroys everything the session owns, newest object first.
    pub fn release(self) {
        let Self { stage, context, device } = self;
        stage.release();
        drop(context);
        debug!(device = %device.name, "released context");
    }

    fn advance<T: State>(self, f: impl FnOnce(S) -> T) -> DeviceComputeSession<T> {
        let Self { stage, context, device } = self;
        DeviceComputeSession {
            stage: f(stage),
            context,
            device,
        }
    }
}

impl DeviceComputeSession<Opened> {
    /// Selects a device (GPU first) and opens a context on it.
    pub fn acquire() -> Result<Self> {
        Self::open(acquire_device()?)
    }

    pub fn open(device: SelectedDevice) -> Result<Self> {
        let context =
            Context::from_device(&device.device).map_err(SessionError::api("clCreateContext"))?;
        debug!(device = %device.name, "created context");
        Ok(Self {
            stage: Opened,
            context,
            device,
        })
    }

    /// Compiles `source` for the selected device, then creates the
    /// command queue and the [`KERNEL_NAME`] kernel.
    ///
    /// A failed build returns [`SessionError::Build`] with the compiler
    /// log; the session (context only) is released on the way out.
    pub fn build_program(self, source: &str) -> Result<DeviceComputeSession<Built>> {
        #[cfg(feature = "metrics")]
        let t0 = Instant::now();

        let mut program = Program::create_from_source(&self.context, source)
            .map_err(SessionError::api("clCreateProgramWithSource"))?;
        if let Err(code) = program.build(&[self.device.id()], "") {
            let log = program.get_build_log(self.device.id()).unwrap_or_default();
            let log = if log.trim().is_empty() {
                code.to_string()
            } else {
                log
            };
            return Err(SessionError::Build { log });
        }
        debug!("built program");

        #[cfg(feature = "metrics")]
        crate::metrics::record("build_program", t0);

        let queue =
            CommandQueue::create(&self.context, self.device.id(), CL_QUEUE_PROFILING_ENABLE)
                .map_err(SessionError::api("clCreateCommandQueue"))?;
        debug!("created command queue");
        let kernel =
            Kernel::create(&program, KERNEL_NAME).map_err(SessionError::api("clCreateKernel"))?;
        debug!(kernel = KERNEL_NAME, "created kernel");

        Ok(self.advance(|Opened| Built {
            kernel,
            queue,
            program,
        }))
    }
}

impl DeviceComputeSession<Built> {
    /// Three read/write buffers of `n * 4` bytes each.
    pub fn allocate_buffers(self, n: usize) -> Result<DeviceComputeSession<Loaded>> {
        if n == 0 {
            return Err(SessionError::EmptyDispatch);
        }
        let buffers = VectorBuffers::allocate(&self.context, n)?;
        Ok(self.advance(|built| Loaded { buffers, built }))
    }
}

impl DeviceComputeSession<Loaded> {
    pub fn len(&self) -> usize {
        self.stage.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stage.buffers.is_empty()
    }

    /// Blocking copies of both inputs.
    pub fn upload(&mut self, a: &[i32], b: &[i32]) -> Result<()> {
        let Loaded { buffers, built } = &mut self.stage;
        buffers.a.write(&built.queue, a)?;
        buffers.b.write(&built.queue, b)?;
        Ok(())
    }

    /// Binds `(size, a, b, out)` and enqueues `n` work items, leaving the
    /// local size to the runtime. Returns without waiting.
    pub fn dispatch(self, n: usize) -> Result<DeviceComputeSession<InFlight>> {
        if n == 0 {
            return Err(SessionError::EmptyDispatch);
        }
        if n > self.len() {
            return Err(SessionError::SizeMismatch {
                expected: self.stage.buffers.a.bytes(),
                actual: n * std::mem::size_of::<i32>(),
            });
        }
        let size = cl_int::try_from(n).map_err(|_| SessionError::WorkSizeOverflow(n))?;

        let Loaded { buffers, built } = &self.stage;
        let (a, b, out) = (buffers.a.mem(), buffers.b.mem(), buffers.out.mem());
        let kernel = &built.kernel;
        kernel
            .set_arg(0, &size)
            .map_err(SessionError::api("clSetKernelArg(size)"))?;
        kernel
            .set_arg(1, &a)
            .map_err(SessionError::api("clSetKernelArg(a)"))?;
        kernel
            .set_arg(2, &b)
            .map_err(SessionError::api("clSetKernelArg(b)"))?;
        kernel
            .set_arg(3, &out)
            .map_err(SessionError::api("clSetKernelArg(out)"))?;

        let global = [n];
        let submitted = Instant::now();
        let event = built
            .queue
            .enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                ptr::null(),
                &[],
            )
            .map_err(SessionError::api("clEnqueueNDRangeKernel"))?;
        debug!(work_items = n, "kernel enqueued");

        Ok(self.advance(|loaded| InFlight {
            event,
            submitted,
            loaded,
        }))
    }
}

impl DeviceComputeSession<InFlight> {
    /// Blocks until the kernel has finished. There is no timeout.
    pub fn await_completion(self) -> Result<DeviceComputeSession<Complete>> {
        #[cfg(feature = "memtrace")]
        let tok = trace_start(Dir::Kernel, 0);

        self.stage
            .event
            .wait()
            .map_err(SessionError::api("clWaitForEvents"))?;
        let wall = self.stage.submitted.elapsed();

        #[cfg(feature = "memtrace")]
        tok.finish();
        #[cfg(feature = "metrics")]
        crate::metrics::record("kernel", self.stage.submitted);

        let event = &self.stage.event;
        let device = match (event.profiling_command_start(), event.profiling_command_end()) {
            (Ok(start), Ok(end)) if end >= start => Some(Duration::from_nanos(end - start)),
            _ => None,
        };
        let timing = KernelTiming { wall, device };
        info!(
            wall_ms = timing.wall_ms(),
            device_ms = device.map(|d| d.as_secs_f64() * 1e3),
            "kernel finished"
        );

        Ok(self.advance(|InFlight { loaded, .. }| Complete { loaded, timing }))
    }
}

impl DeviceComputeSession<Complete> {
    pub fn timing(&self) -> KernelTiming {
        self.stage.timing
    }

    /// Blocking copy of the output buffer into `out`.
    pub fn download(&self, out: &mut [i32]) -> Result<()> {
        let Loaded { buffers, built } = &self.stage.loaded;
        buffers.out.read(&built.queue, out)
    }
}

/// Kernel source text; its content is opaque to the session.
pub fn load_kernel_source(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| SessionError::KernelSource {
        path: path.to_path_buf(),
        source,
    })
}

/// Source for a run: an explicit path must be readable; without one,
/// [`DEFAULT_KERNEL_PATH`] is tried and [`VECTOR_OPS_SOURCE`] used when it
/// does not exist.
pub fn resolve_kernel_source(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        return load_kernel_source(path);
    }
    match load_kernel_source(DEFAULT_KERNEL_PATH) {
        Err(SessionError::KernelSource { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = DEFAULT_KERNEL_PATH, "kernel file not found, using built-in source");
            Ok(VECTOR_OPS_SOURCE.to_string())
        }
        other => other,
    }
}

/// Runs the whole lifecycle once: build, allocate, upload, dispatch, wait,
/// download, release.
pub fn run_vector_add(
    session: DeviceComputeSession<Opened>,
    source: &str,
    a: &[i32],
    b: &[i32],
    out: &mut [i32],
) -> Result<KernelTiming> {
    let n = a.len();
    let mut loaded = session.build_program(source)?.allocate_buffers(n)?;
    loaded.upload(a, b)?;
    let done = loaded.dispatch(n)?.await_completion()?;
    done.download(out)?;
    let timing = done.timing();
    done.release();
    Ok(timing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_source_declares_entry_point() {
        assert!(VECTOR_OPS_SOURCE.contains(&format!("__kernel void {KERNEL_NAME}(")));
        assert!(VECTOR_OPS_SOURCE.contains("get_global_id(0)"));
    }

    #[test]
    fn state_names_are_distinct() {
        let names = [
            Opened::NAME,
            Built::NAME,
            Loaded::NAME,
            InFlight::NAME,
            Complete::NAME,
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn missing_kernel_file_is_reported() {
        let err = load_kernel_source("/nonexistent/vector_ops_ocl.cl").unwrap_err();
        assert!(matches!(err, SessionError::KernelSource { .. }));
        assert!(err.to_string().contains("/nonexistent/vector_ops_ocl.cl"));
    }

    #[test]
    fn explicit_missing_path_does_not_fall_back() {
        let err = resolve_kernel_source(Some(Path::new("/nonexistent/k.cl"))).unwrap_err();
        assert!(matches!(err, SessionError::KernelSource { .. }));
    }

    #[test]
    fn default_source_always_resolves() {
        let source = resolve_kernel_source(None).unwrap();
        assert!(source.contains(KERNEL_NAME));
    }

    #[test]
    fn wall_ms_converts() {
        let t = KernelTiming {
            wall: Duration::from_micros(1500),
            device: None,
        };
        assert!((t.wall_ms() - 1.5).abs() < 1e-9);
    }
}
