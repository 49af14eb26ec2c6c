// Walks one device session through every stage by hand.
//
//   cargo run --example vec_add --features metrics,memtrace -- 1048576

use rand::{SeedableRng, rngs::SmallRng};
use vecadd_core::{DeviceComputeSession, HostVector, SessionError, VECTOR_OPS_SOURCE, logging};

#[cfg(feature = "memtrace")]
use vecadd_core::flush_csv;
#[cfg(feature = "metrics")]
use vecadd_core::summary;

fn main() -> Result<(), SessionError> {
    logging::init(2);

    let n: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1 << 22);

    // 1) host data
    let mut rng = SmallRng::seed_from_u64(2025);
    let h_a = HostVector::random(n, &mut rng);
    let h_b = HostVector::random(n, &mut rng);
    let mut h_out = HostVector::zeroed(n);

    // 2) device, context, program, queue, kernel
    let session = DeviceComputeSession::acquire()?;
    println!("device: {:?}", session.device());
    let built = session.build_program(VECTOR_OPS_SOURCE)?;

    // 3) buffers + host→device
    let mut loaded = built.allocate_buffers(n)?;
    loaded.upload(h_a.as_slice(), h_b.as_slice())?;

    // 4) kernel
    let done = loaded.dispatch(n)?.await_completion()?;
    let timing = done.timing();

    // 5) device→host, teardown
    done.download(h_out.as_mut_slice())?;
    done.release();

    // 6) verification
    let ok = h_out
        .as_slice()
        .iter()
        .zip(h_a.as_slice().iter().zip(h_b.as_slice()))
        .all(|(o, (x, y))| *o == x + y);
    assert!(ok, "device result differs from host sum");
    println!("v_out = {h_out}");
    println!("vec_add OK in {:.3} ms", timing.wall_ms());

    #[cfg(feature = "metrics")]
    summary();
    #[cfg(feature = "memtrace")]
    if let Err(e) = flush_csv() {
        eprintln!("memtrace: {e}");
    }

    Ok(())
}
