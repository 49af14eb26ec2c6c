#![cfg(feature = "memtrace")]

//! Host↔device transfer and kernel tracing.

mod copytoken;

pub use copytoken::{CopyToken, start};

use once_cell::sync::Lazy;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::Mutex,
    time::Instant,
};

/// Transfer direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dir {
    H2D,
    D2H,
    Kernel,
}

impl Dir {
    pub fn as_str(self) -> &'static str {
        match self {
            Dir::H2D => "H2D",
            Dir::D2H => "D2H",
            Dir::Kernel => "Kernel",
        }
    }
}

/// Global start time reference
pub static T0: Lazy<Instant> = Lazy::new(Instant::now);

/// Log record
#[derive(Debug, Clone)]
pub struct Record {
    pub t_start_us: u64,
    pub t_end_us: u64,
    pub bytes: usize,
    pub dir: Dir,
    /// Gap between the previous record's end and this one's start.
    pub idle_us: u64,
}

/// Global log storage
pub static LOG: Lazy<Mutex<Vec<Record>>> = Lazy::new(|| Mutex::new(Vec::with_capacity(64)));

/// Get current time in microseconds since T0
#[inline]
pub fn now_us() -> u64 {
    Instant::now().duration_since(*T0).as_micros() as u64
}

pub(crate) fn push(t_start_us: u64, t_end_us: u64, bytes: usize, dir: Dir) {
    let Ok(mut log) = LOG.lock() else { return };
    let idle_us = log
        .last()
        .map(|prev| t_start_us.saturating_sub(prev.t_end_us))
        .unwrap_or(0);
    log.push(Record {
        t_start_us,
        t_end_us,
        bytes,
        dir,
        idle_us,
    });
}

/// Copy of the current log.
pub fn snapshot() -> Vec<Record> {
    LOG.lock().map(|log| log.clone()).unwrap_or_default()
}

/// One CSV row per record.
pub fn write_csv<W: Write>(records: &[Record], mut w: W) -> io::Result<()> {
    writeln!(w, "t_start_us,t_end_us,bytes,dir,idle_us")?;
    for r in records {
        writeln!(
            w,
            "{},{},{},{},{}",
            r.t_start_us,
            r.t_end_us,
            r.bytes,
            r.dir.as_str(),
            r.idle_us
        )?;
    }
    Ok(())
}

/// Totals per direction.
pub fn write_summary<W: Write>(records: &[Record], mut w: W) -> io::Result<()> {
    let bytes = |dir: Dir| -> u64 {
        records
            .iter()
            .filter(|r| r.dir == dir)
            .map(|r| r.bytes as u64)
            .sum()
    };
    let kernel_us: u64 = records
        .iter()
        .filter(|r| r.dir == Dir::Kernel)
        .map(|r| r.t_end_us - r.t_start_us)
        .sum();
    writeln!(w, "events_total: {}", records.len())?;
    writeln!(w, "idle_total_us: {}", records.iter().map(|r| r.idle_us).sum::<u64>())?;
    writeln!(w, "bytes_h2d: {}", bytes(Dir::H2D))?;
    writeln!(w, "bytes_d2h: {}", bytes(Dir::D2H))?;
    writeln!(w, "kernel_us: {}", kernel_us)?;
    Ok(())
}

/// Writes `memtrace.csv` and `memtrace_summary.txt` into `dir`.
pub fn flush_csv_to(dir: &Path) -> io::Result<()> {
    let records = snapshot();
    write_csv(&records, BufWriter::new(File::create(dir.join("memtrace.csv"))?))?;
    write_summary(
        &records,
        BufWriter::new(File::create(dir.join("memtrace_summary.txt"))?),
    )
}

/// Writes the trace files into the working directory.
pub fn flush_csv() -> io::Result<()> {
    flush_csv_to(Path::new("."))
}
