//! Start/finish token for one traced operation.

use super::{Dir, now_us, push};

/// Created by [`start`]; [`CopyToken::finish`] appends the record.
#[must_use = "call finish() to record the operation"]
#[derive(Debug)]
pub struct CopyToken {
    dir: Dir,
    bytes: usize,
    t_start_us: u64,
}

pub fn start(dir: Dir, bytes: usize) -> CopyToken {
    CopyToken {
        dir,
        bytes,
        t_start_us: now_us(),
    }
}

impl CopyToken {
    pub fn finish(self) {
        push(self.t_start_us, now_us(), self.bytes, self.dir);
    }
}
