//! Error types for the device session and the host-side helpers.

use std::path::PathBuf;

use opencl3::error_codes::ClError;
use thiserror::Error;

/// Failures on the OpenCL path. Every variant is terminal for the session
/// that produced it; nothing is retried.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("couldn't identify an OpenCL platform")]
    NoPlatform,

    #[error("couldn't access any devices (no GPU or CPU device on {platforms} platform(s))")]
    NoDevice { platforms: usize },

    #[error("OpenCL call `{op}` failed: {code}")]
    Api { op: &'static str, code: ClError },

    #[error("couldn't read kernel source {}: {source}", path.display())]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program build failed:\n{log}")]
    Build { log: String },

    #[error("couldn't allocate {bytes} byte device buffer: {code}")]
    Allocation { bytes: usize, code: ClError },

    #[error("host slice is {actual} bytes, device buffer is {expected} bytes")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("refusing to dispatch zero work items")]
    EmptyDispatch,

    #[error("work size {0} does not fit the kernel's int size argument")]
    WorkSizeOverflow(usize),
}

impl SessionError {
    /// Tags an opencl3 status with the call that produced it.
    pub(crate) fn api(op: &'static str) -> impl FnOnce(ClError) -> Self {
        move |code| SessionError::Api { op, code }
    }
}

/// Failures of the host-side (serial / threaded) path.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("length mismatch: a={a}, b={b}, out={out}")]
    LengthMismatch { a: usize, b: usize, out: usize },

    #[error("couldn't build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_carries_log_verbatim() {
        let err = SessionError::Build {
            log: "<kernel>:3:5: error: use of undeclared identifier 'x'".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("program build failed"));
        assert!(msg.contains("undeclared identifier 'x'"));
    }

    #[test]
    fn api_error_names_the_call() {
        let err = SessionError::api("clCreateKernel")(ClError(-46));
        assert!(err.to_string().contains("clCreateKernel"));
    }

    #[test]
    fn length_mismatch_reports_all_lengths() {
        let err = HostError::LengthMismatch { a: 3, b: 4, out: 3 };
        assert_eq!(err.to_string(), "length mismatch: a=3, b=4, out=3");
    }
}
