#![cfg(feature = "metrics")]

//! Per-phase latency registry for the device path.

use once_cell::sync::Lazy;
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

// raw latencies

static TIMES: Lazy<Mutex<Vec<(&'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Call at the end of a phase: `record("enqueue_write", t0);`
pub fn record(name: &'static str, start: Instant) {
    let dur = start.elapsed().as_micros();
    if let Ok(mut times) = TIMES.lock() {
        times.push((name, dur));
    }
}

// buffer allocations

pub static ALLOCS: AtomicUsize = AtomicUsize::new(0);
pub static ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

/// Drains the recorded latencies into a printable report.
pub fn report() -> String {
    let mut map: BTreeMap<&str, Vec<u128>> = BTreeMap::new();
    if let Ok(mut times) = TIMES.lock() {
        for (name, us) in times.drain(..) {
            map.entry(name).or_default().push(us);
        }
    }

    let mut out = String::from("── metrics summary ──\n");
    for (name, mut v) in map {
        v.sort_unstable();
        let mean = v.iter().sum::<u128>() / v.len() as u128;
        let p95 = v[((v.len() * 95) / 100).saturating_sub(1)];
        let _ = writeln!(
            out,
            "{:<18} n={:<3} mean={:>8} µs   p95={:>8} µs",
            name,
            v.len(),
            mean,
            p95
        );
    }

    let allocs = ALLOCS.load(Ordering::Relaxed);
    let bytes = ALLOC_BYTES.load(Ordering::Relaxed);
    let _ = writeln!(out, "device allocations: {}   ({} MiB)", allocs, bytes / 1024 / 1024);
    out
}

pub fn summary() {
    print!("{}", report());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_groups_by_phase() {
        let t0 = Instant::now();
        record("unit_phase", t0);
        record("unit_phase", t0);
        let out = report();
        assert!(out.contains("unit_phase"));
        assert!(out.contains("n=2"));
        assert!(!report().contains("unit_phase"));
    }
}
