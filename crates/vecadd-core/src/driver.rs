//! Top-level run: generate inputs, execute the selected backends, print
//! vectors and timings. The binary decides how errors end the process.
//!
//! Each backend's output is dropped once it has been printed and checked,
//! so at most the two inputs and one output are alive at a time.

use std::io::{self, Write};
use std::time::Duration;

use rand::{SeedableRng, rngs::SmallRng};
use thiserror::Error;
use tracing::info;

use crate::config::{Backend, RunConfig};
use crate::cpu::{ThreadedAdder, run_serial};
use crate::error::{HostError, SessionError};
use crate::host::{HostVector, render_block};
use crate::session::{DeviceComputeSession, resolve_kernel_source, run_vector_add};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("{backend} result differs at index {index}: expected {expected}, got {actual}")]
    Mismatch {
        backend: &'static str,
        index: usize,
        expected: i32,
        actual: i32,
    },

    #[error("couldn't write output: {0}")]
    Io(#[from] io::Error),
}

/// Timing of one backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendRun {
    pub backend: Backend,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub runs: Vec<BackendRun>,
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

/// First index where `out[i] != a[i] + b[i]`, or where the lengths stop
/// agreeing.
pub fn first_mismatch(a: &[i32], b: &[i32], out: &[i32]) -> Option<usize> {
    let common = a.len().min(b.len()).min(out.len());
    (0..common)
        .find(|&i| out[i] != a[i] + b[i])
        .or_else(|| (a.len() != out.len() || b.len() != out.len()).then_some(common))
}

fn verify(backend: Backend, a: &[i32], b: &[i32], out: &[i32]) -> Result<(), RunError> {
    match first_mismatch(a, b, out) {
        None => Ok(()),
        Some(index) => Err(RunError::Mismatch {
            backend: backend.label(),
            index,
            expected: match (a.get(index), b.get(index)) {
                (Some(x), Some(y)) => x + y,
                _ => 0,
            },
            actual: out.get(index).copied().unwrap_or_default(),
        }),
    }
}

fn run_threads<W: Write>(
    config: &RunConfig,
    a: &[i32],
    b: &[i32],
    result: &mut [i32],
    out: &mut W,
) -> Result<Duration, RunError> {
    let adder = ThreadedAdder::new(config.threads)?;
    writeln!(
        out,
        "Running threaded implementation with {} threads",
        adder.num_threads()
    )?;
    Ok(adder.run(a, b, result)?)
}

fn run_opencl<W: Write>(
    config: &RunConfig,
    a: &[i32],
    b: &[i32],
    result: &mut [i32],
    out: &mut W,
) -> Result<(Duration, Option<Duration>), RunError> {
    let session = DeviceComputeSession::acquire()?;
    let device = session.device();
    writeln!(out, "Using OpenCL device: {} ({})", device.name, device.class)?;
    let source = resolve_kernel_source(config.kernel_path.as_deref())?;
    let timing = run_vector_add(session, &source, a, b, result)?;
    Ok((timing.wall, timing.device))
}

/// Runs one concrete backend, prints its block and timing line, then
/// verifies when asked. `All` has nothing to run on its own.
fn run_backend<W: Write>(
    backend: Backend,
    config: &RunConfig,
    a: &HostVector,
    b: &HostVector,
    out: &mut W,
) -> Result<Option<BackendRun>, RunError> {
    let (a, b) = (a.as_slice(), b.as_slice());
    let mut result = HostVector::zeroed(a.len());
    let (title, elapsed, device) = match backend {
        Backend::Serial => ("serial", run_serial(a, b, result.as_mut_slice())?, None),
        Backend::Threads => {
            let elapsed = run_threads(config, a, b, result.as_mut_slice(), out)?;
            ("threads", elapsed, None)
        }
        Backend::Opencl => {
            let (elapsed, device) = run_opencl(config, a, b, result.as_mut_slice(), out)?;
            ("OpenCL", elapsed, device)
        }
        Backend::All => return Ok(None),
    };

    if config.print {
        let heading = format!("Vector v_out ({title})");
        writeln!(out, "{}", render_block(&heading, result.as_slice()))?;
    }
    match backend {
        Backend::Serial => writeln!(out, "Serial Execution Time: {:.6} ms", ms(elapsed))?,
        Backend::Threads => writeln!(out, "CPU (threads) Execution Time: {:.6} ms", ms(elapsed))?,
        _ => {
            writeln!(out, "OpenCL Kernel Execution Time: {:.6} ms", ms(elapsed))?;
            if let Some(device) = device {
                writeln!(out, "OpenCL Device Time: {:.6} ms", ms(device))?;
            }
        }
    }
    if config.verify {
        verify(backend, a, b, result.as_slice())?;
    }
    info!(backend = backend.label(), ms = ms(elapsed), "backend finished");
    Ok(Some(BackendRun { backend, elapsed }))
}

/// Runs every configured backend over the same random inputs.
pub fn run<W: Write>(config: &RunConfig, out: &mut W) -> Result<Report, RunError> {
    let mut rng = match config.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let a = HostVector::random(config.size, &mut rng);
    let b = HostVector::random(config.size, &mut rng);
    run_with_inputs(config, &a, &b, out)
}

/// Same as [`run`] with caller-provided inputs.
pub fn run_with_inputs<W: Write>(
    config: &RunConfig,
    a: &HostVector,
    b: &HostVector,
    out: &mut W,
) -> Result<Report, RunError> {
    if a.len() != b.len() {
        return Err(HostError::LengthMismatch {
            a: a.len(),
            b: b.len(),
            out: a.len(),
        }
        .into());
    }
    if config.print {
        writeln!(out, "{}", render_block("Vector v1", a.as_slice()))?;
        writeln!(out, "{}", render_block("Vector v2", b.as_slice()))?;
    }

    let mut report = Report::default();
    for backend in config.backends.iter().flat_map(|b| b.expand()) {
        if let Some(run) = run_backend(backend, config, a, b, out)? {
            report.runs.push(run);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(size: usize) -> RunConfig {
        RunConfig {
            print: false,
            verify: true,
            seed: Some(1),
            ..RunConfig::host_only(size)
        }
    }

    #[test]
    fn five_element_example_prints_everything() {
        let mut out = Vec::new();
        let report = run_with_inputs(
            &RunConfig {
                verify: true,
                ..RunConfig::host_only(5)
            },
            &vec![3, 1, 4, 1, 5].into(),
            &vec![9, 2, 6, 5, 3].into(),
            &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Vector v1:\n3 1 4 1 5\n"));
        assert!(text.contains("Vector v2:\n9 2 6 5 3\n"));
        assert!(text.contains("Vector v_out (serial):\n12 3 10 6 8\n"));
        assert!(text.contains("Vector v_out (threads):\n12 3 10 6 8\n"));
        assert!(text.contains("Serial Execution Time:"));
        assert!(text.contains("CPU (threads) Execution Time:"));
        let backends: Vec<Backend> = report.runs.iter().map(|r| r.backend).collect();
        assert_eq!(backends, vec![Backend::Serial, Backend::Threads]);
    }

    #[test]
    fn twenty_element_ramp_is_truncated() {
        let ramp: HostVector = (0..20).collect::<Vec<i32>>().into();
        let mut out = Vec::new();
        run_with_inputs(&RunConfig::host_only(20), &ramp, &ramp, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("0 1 2 3 4 ..... 15 16 17 18 19"));
        assert!(text.contains("0 2 4 6 8 ..... 30 32 34 36 38"));
    }

    #[test]
    fn seeded_runs_verify_on_every_backend() {
        let report = run(&quiet(10_000), &mut io::sink()).unwrap();
        assert_eq!(report.runs.len(), 2);
    }

    #[test]
    fn all_inside_backend_list_is_expanded() {
        let config = RunConfig {
            backends: vec![Backend::Serial, Backend::All],
            ..quiet(4)
        };
        let mut out = Vec::new();
        let result = run(&config, &mut out);
        let text = String::from_utf8(out).unwrap();
        // Serial twice, then threads; the OpenCL step may fail without a device.
        assert_eq!(text.matches("Serial Execution Time").count(), 2);
        assert!(text.contains("CPU (threads) Execution Time"));
        match result {
            Ok(report) => assert_eq!(report.runs.len(), 4),
            Err(e) => assert!(matches!(e, RunError::Session(_)), "unexpected error: {e}"),
        }
    }

    #[test]
    fn quiet_mode_prints_only_timings() {
        let mut out = Vec::new();
        run(&quiet(50), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("Vector v1"));
        assert!(text.contains("Execution Time"));
    }

    #[test]
    fn mismatch_is_located() {
        assert_eq!(first_mismatch(&[1, 2], &[3, 4], &[4, 6]), None);
        assert_eq!(first_mismatch(&[1, 2, 3], &[0, 0, 0], &[1, 5, 3]), Some(1));
        assert_eq!(first_mismatch(&[1, 2, 3], &[0, 0, 0], &[1, 2]), Some(2));
    }

    #[test]
    fn verify_reports_backend_and_index() {
        let err = verify(Backend::Threads, &[1, 2, 3], &[0, 0, 0], &[1, 2, 4]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "threads result differs at index 2: expected 3, got 4"
        );
    }
}
