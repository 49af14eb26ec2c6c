//! Command-line configuration.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

pub const DEFAULT_SIZE: usize = 100_000_000;
/// Looked up relative to the working directory when `--kernel` is not given.
pub const DEFAULT_KERNEL_PATH: &str = "kernels/vector_ops_ocl.cl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Single-threaded host loop
    Serial,
    /// Rayon thread pool
    Threads,
    /// OpenCL device offload
    Opencl,
    /// Every backend above, in that order
    All,
}

impl Backend {
    pub fn label(self) -> &'static str {
        match self {
            Backend::Serial => "serial",
            Backend::Threads => "threads",
            Backend::Opencl => "OpenCL",
            Backend::All => "all",
        }
    }

    /// Concrete backends to run; never contains `All`.
    pub fn expand(self) -> Vec<Backend> {
        match self {
            Backend::All => vec![Backend::Serial, Backend::Threads, Backend::Opencl],
            one => vec![one],
        }
    }
}

/// Element-wise addition of two random integer vectors on the host and on
/// an OpenCL device, with timings.
#[derive(Parser, Debug)]
#[command(name = "vecadd")]
#[command(version)]
pub struct Args {
    /// Vector length (1..=2147483647)
    #[arg(value_parser = parse_size, default_value_t = DEFAULT_SIZE)]
    pub size: usize,

    /// Which implementation(s) to run
    #[arg(short, long, value_enum, default_value_t = Backend::All)]
    pub backend: Backend,

    /// OpenCL kernel source file providing `vector_add_ocl`
    /// [default: kernels/vector_ops_ocl.cl, else the built-in copy]
    #[arg(short, long)]
    pub kernel: Option<PathBuf>,

    /// Worker threads for the threaded backend (default: one per CPU)
    #[arg(short, long, value_parser = parse_threads)]
    pub threads: Option<usize>,

    /// Seed for the input generator; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Don't print vector contents
    #[arg(short, long)]
    pub quiet: bool,

    /// Check every result against the serial sum
    #[arg(long)]
    pub verify: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Validated settings handed to the driver.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub size: usize,
    pub backends: Vec<Backend>,
    /// `None` means [`DEFAULT_KERNEL_PATH`] with the built-in source as fallback.
    pub kernel_path: Option<PathBuf>,
    pub threads: Option<usize>,
    pub seed: Option<u64>,
    pub print: bool,
    pub verify: bool,
    pub verbosity: u8,
}

impl From<Args> for RunConfig {
    fn from(args: Args) -> Self {
        Self {
            size: args.size,
            backends: args.backend.expand(),
            kernel_path: args.kernel,
            threads: args.threads,
            seed: args.seed,
            print: !args.quiet,
            verify: args.verify,
            verbosity: args.verbose,
        }
    }
}

impl RunConfig {
    /// Host-only defaults for `size` elements.
    pub fn host_only(size: usize) -> Self {
        Self {
            size,
            backends: vec![Backend::Serial, Backend::Threads],
            kernel_path: None,
            threads: None,
            seed: None,
            print: true,
            verify: false,
            verbosity: 0,
        }
    }
}

/// Accepts `1..=i32::MAX`; the kernel takes its size as `int`.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|_| format!("`{s}` is not an integer"))?;
    if n <= 0 {
        return Err(format!("size must be positive, got {n}"));
    }
    if n > i64::from(i32::MAX) {
        return Err(format!("size {n} exceeds {}", i32::MAX));
    }
    Ok(n as usize)
}

fn parse_threads(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("thread count must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("`{s}` is not a thread count")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_accepts_positive_integers() {
        assert_eq!(parse_size("5"), Ok(5));
        assert_eq!(parse_size("2147483647"), Ok(i32::MAX as usize));
    }

    #[test]
    fn size_rejects_non_positive_and_garbage() {
        assert!(parse_size("0").is_err());
        assert!(parse_size("-3").is_err());
        assert!(parse_size("ten").is_err());
        assert!(parse_size("2147483648").is_err());
    }

    #[test]
    fn defaults() {
        let cfg = RunConfig::from(Args::try_parse_from(["vecadd"]).unwrap());
        assert_eq!(cfg.size, DEFAULT_SIZE);
        assert_eq!(
            cfg.backends,
            vec![Backend::Serial, Backend::Threads, Backend::Opencl]
        );
        assert!(cfg.print);
        assert_eq!(cfg.kernel_path, None);
    }

    #[test]
    fn positional_size_and_flags() {
        let argv = ["vecadd", "20", "-b", "threads", "-t", "2", "-q", "-vv"];
        let args = Args::try_parse_from(argv).unwrap();
        let cfg = RunConfig::from(args);
        assert_eq!(cfg.size, 20);
        assert_eq!(cfg.backends, vec![Backend::Threads]);
        assert_eq!(cfg.threads, Some(2));
        assert!(!cfg.print);
        assert_eq!(cfg.verbosity, 2);
    }

    #[test]
    fn explicit_kernel_path() {
        let cfg = RunConfig::from(Args::try_parse_from(["vecadd", "-k", "my.cl"]).unwrap());
        assert_eq!(cfg.kernel_path, Some(PathBuf::from("my.cl")));
    }

    #[test]
    fn all_expands_to_concrete_backends() {
        assert!(!Backend::All.expand().contains(&Backend::All));
        assert_eq!(Backend::Opencl.expand(), vec![Backend::Opencl]);
    }

    #[test]
    fn bad_size_is_a_usage_error() {
        let err = Args::try_parse_from(["vecadd", "-5"]).unwrap_err();
        assert_ne!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(Args::try_parse_from(["vecadd", "abc"]).is_err());
        assert!(Args::try_parse_from(["vecadd", "--threads", "0"]).is_err());
    }
}
