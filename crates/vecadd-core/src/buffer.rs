//! Byte-sized device buffers mirroring one host `i32` vector each.

use std::ptr;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
#[cfg(feature = "metrics")]
use std::time::Instant;

use bytemuck::{cast_slice, cast_slice_mut};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::memory::{Buffer, CL_MEM_READ_WRITE, ClMem};
use opencl3::types::{CL_BLOCKING, cl_mem};
use tracing::debug;

use crate::error::{Result, SessionError};
#[cfg(feature = "memtrace")]
use crate::memtracer::{Dir, start as trace_start};

/// Device-resident memory of exactly `bytes` bytes.
pub struct DeviceBuffer {
    inner: Buffer<u8>,
    bytes: usize,
}

impl DeviceBuffer {
    /// Reserves a read/write region; no host pointer is attached.
    pub fn new(context: &Context, bytes: usize) -> Result<Self> {
        let inner = Buffer::<u8>::create(context, CL_MEM_READ_WRITE, bytes, ptr::null_mut())
            .map_err(|code| SessionError::Allocation { bytes, code })?;

        #[cfg(feature = "metrics")]
        {
            crate::metrics::ALLOCS.fetch_add(1, Ordering::Relaxed);
            crate::metrics::ALLOC_BYTES.fetch_add(bytes, Ordering::Relaxed);
        }

        debug!(bytes, "device buffer allocated");
        Ok(Self { inner, bytes })
    }

    /// Sized for `n` elements of `i32`.
    pub fn for_elements(context: &Context, n: usize) -> Result<Self> {
        Self::new(context, n * std::mem::size_of::<i32>())
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn mem(&self) -> cl_mem {
        self.inner.get()
    }

    fn check(&self, actual: usize) -> Result<()> {
        if actual != self.bytes {
            return Err(SessionError::SizeMismatch {
                expected: self.bytes,
                actual,
            });
        }
        Ok(())
    }

    /// Blocking host → device copy.
    pub fn write(&mut self, queue: &CommandQueue, host: &[i32]) -> Result<()> {
        let src: &[u8] = cast_slice(host);
        self.check(src.len())?;

        #[cfg(feature = "memtrace")]
        let tok = trace_start(Dir::H2D, self.bytes);
        #[cfg(feature = "metrics")]
        let t0 = Instant::now();

        queue
            .enqueue_write_buffer(&mut self.inner, CL_BLOCKING, 0, src, &[])
            .map_err(SessionError::api("clEnqueueWriteBuffer"))?;

        #[cfg(feature = "metrics")]
        crate::metrics::record("enqueue_write", t0);
        #[cfg(feature = "memtrace")]
        tok.finish();
        Ok(())
    }

    /// Blocking device → host copy.
    pub fn read(&self, queue: &CommandQueue, host: &mut [i32]) -> Result<()> {
        let dst: &mut [u8] = cast_slice_mut(host);
        self.check(dst.len())?;

        #[cfg(feature = "memtrace")]
        let tok = trace_start(Dir::D2H, self.bytes);
        #[cfg(feature = "metrics")]
        let t0 = Instant::now();

        queue
            .enqueue_read_buffer(&self.inner, CL_BLOCKING, 0, dst, &[])
            .map_err(SessionError::api("clEnqueueReadBuffer"))?;

        #[cfg(feature = "metrics")]
        crate::metrics::record("enqueue_read", t0);
        #[cfg(feature = "memtrace")]
        tok.finish();
        Ok(())
    }
}

/// The two inputs and the output of one dispatch. Field order is drop order.
pub struct VectorBuffers {
    pub(crate) a: DeviceBuffer,
    pub(crate) b: DeviceBuffer,
    pub(crate) out: DeviceBuffer,
    pub(crate) len: usize,
}

impl VectorBuffers {
    pub fn allocate(context: &Context, n: usize) -> Result<Self> {
        Ok(Self {
            a: DeviceBuffer::for_elements(context, n)?,
            b: DeviceBuffer::for_elements(context, n)?,
            out: DeviceBuffer::for_elements(context, n)?,
            len: n,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn release(self) {
        let Self { a, b, out, len } = self;
        drop(a);
        drop(b);
        drop(out);
        debug!(len, "released device buffers");
    }
}
