//! Host execution of the element-wise add: a serial baseline and a rayon
//! parallel-for over all elements.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::HostError;

fn check_lengths(a: &[i32], b: &[i32], out: &[i32]) -> Result<(), HostError> {
    if a.len() != b.len() || a.len() != out.len() {
        return Err(HostError::LengthMismatch {
            a: a.len(),
            b: b.len(),
            out: out.len(),
        });
    }
    Ok(())
}

/// `out[i] = a[i] + b[i]` on the calling thread.
pub fn add_serial(a: &[i32], b: &[i32], out: &mut [i32]) -> Result<(), HostError> {
    check_lengths(a, b, out)?;
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x + y;
    }
    Ok(())
}

/// `out[i] = a[i] + b[i]` split across the current rayon pool.
pub fn add_parallel(a: &[i32], b: &[i32], out: &mut [i32]) -> Result<(), HostError> {
    check_lengths(a, b, out)?;
    out.par_iter_mut()
        .zip(a.par_iter())
        .zip(b.par_iter())
        .for_each(|((o, x), y)| *o = x + y);
    Ok(())
}

/// Rayon pool used by the threaded backend.
pub struct ThreadedAdder {
    pool: Option<rayon::ThreadPool>,
}

impl ThreadedAdder {
    /// `None` uses rayon's global pool (one thread per logical CPU).
    pub fn new(threads: Option<usize>) -> Result<Self, HostError> {
        let pool = match threads {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("vecadd-{i}"))
                    .build()?,
            ),
            None => None,
        };
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Runs [`add_parallel`] inside the pool and returns the wall time.
    pub fn run(&self, a: &[i32], b: &[i32], out: &mut [i32]) -> Result<Duration, HostError> {
        debug!(threads = self.num_threads(), n = a.len(), "threaded add");
        let start = Instant::now();
        match &self.pool {
            Some(pool) => pool.install(|| add_parallel(a, b, out))?,
            None => add_parallel(a, b, out)?,
        }
        let elapsed = start.elapsed();
        info!(ms = elapsed.as_secs_f64() * 1e3, "threaded add finished");
        Ok(elapsed)
    }
}

/// Times [`add_serial`].
pub fn run_serial(a: &[i32], b: &[i32], out: &mut [i32]) -> Result<Duration, HostError> {
    let start = Instant::now();
    add_serial(a, b, out)?;
    Ok(start.elapsed())
}
