//! Type-state pattern for the lifecycle of a compute session.
//!
//! Each state owns exactly the OpenCL objects created up to that stage.
//! Struct fields are listed in release order, so an implicit drop and an
//! explicit [`State::release`] tear down in the same sequence.

use std::time::Instant;

use opencl3::command_queue::CommandQueue;
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::program::Program;
use tracing::{debug, warn};

use super::KernelTiming;
use crate::buffer::VectorBuffers;

/// Sealed trait pattern for state types
mod sealed {
    pub trait Sealed {}
}

/// State trait for session stages
pub trait State: sealed::Sealed {
    const NAME: &'static str;

    /// Releases the objects owned by this stage, newest first.
    fn release(self);
}

/// Context exists; no program yet.
#[derive(Debug, Clone, Copy)]
pub struct Opened;
impl sealed::Sealed for Opened {}
impl State for Opened {
    const NAME: &'static str = "opened";

    fn release(self) {}
}

/// Program compiled, queue and kernel created.
pub struct Built {
    pub(crate) kernel: Kernel,
    pub(crate) queue: CommandQueue,
    pub(crate) program: Program,
}
impl sealed::Sealed for Built {}
impl State for Built {
    const NAME: &'static str = "built";

    fn release(self) {
        let Self { kernel, queue, program } = self;
        drop(kernel);
        debug!("released kernel");
        drop(queue);
        debug!("released command queue");
        drop(program);
        debug!("released program");
    }
}

/// Buffers allocated; inputs may be uploaded.
pub struct Loaded {
    pub(crate) buffers: VectorBuffers,
    pub(crate) built: Built,
}
impl sealed::Sealed for Loaded {}
impl State for Loaded {
    const NAME: &'static str = "loaded";

    fn release(self) {
        self.buffers.release();
        self.built.release();
    }
}

/// Kernel submitted; the event has not been waited on.
pub struct InFlight {
    pub(crate) event: Event,
    pub(crate) submitted: Instant,
    pub(crate) loaded: Loaded,
}
impl sealed::Sealed for InFlight {}
impl State for InFlight {
    const NAME: &'static str = "in-flight";

    fn release(self) {
        // Buffers must outlive the running kernel.
        if let Err(code) = self.event.wait() {
            warn!(%code, "wait before release failed");
        }
        drop(self.event);
        self.loaded.release();
    }
}

/// Kernel finished; output can be downloaded.
pub struct Complete {
    pub(crate) loaded: Loaded,
    pub(crate) timing: KernelTiming,
}
impl sealed::Sealed for Complete {}
impl State for Complete {
    const NAME: &'static str = "complete";

    fn release(self) {
        self.loaded.release();
    }
}
