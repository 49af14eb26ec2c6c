//! Host-side vectors: random initialisation and truncated printing.

use std::fmt;

use rand::Rng;

/// Vectors longer than this are printed as head + marker + tail.
pub const PREVIEW_FULL_LIMIT: usize = 15;
/// Elements shown on each side of the marker.
pub const PREVIEW_EDGE: usize = 5;
pub const PREVIEW_MARKER: &str = ".....";
pub const SEPARATOR: &str = "----------------------------";

/// Owned contiguous `i32` vector mirrored by a device buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct HostVector {
    data: Vec<i32>,
}

impl HostVector {
    /// Fills `n` elements with values in `[0, 99]`.
    pub fn random<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Self {
        let data = (0..n).map(|_| rng.gen_range(0..100)).collect();
        Self { data }
    }

    /// Output vectors start zeroed; every element is overwritten by the add.
    pub fn zeroed(n: usize) -> Self {
        Self { data: vec![0; n] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size in bytes of the matching device buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<i32>()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.data
    }
}

impl From<Vec<i32>> for HostVector {
    fn from(data: Vec<i32>) -> Self {
        Self { data }
    }
}

impl fmt::Debug for HostVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostVector")
            .field("len", &self.data.len())
            .field("preview", &preview(&self.data))
            .finish()
    }
}

impl fmt::Display for HostVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", preview(&self.data))
    }
}

/// All elements for short slices, otherwise the first and last
/// [`PREVIEW_EDGE`] around [`PREVIEW_MARKER`].
pub fn preview(values: &[i32]) -> String {
    let join = |part: &[i32]| {
        part.iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    };

    if values.len() <= PREVIEW_FULL_LIMIT {
        return join(values);
    }
    let head = join(&values[..PREVIEW_EDGE]);
    let tail = join(&values[values.len() - PREVIEW_EDGE..]);
    format!("{head} {PREVIEW_MARKER} {tail}")
}

/// Titled block as printed by the driver.
pub fn render_block(title: &str, values: &[i32]) -> String {
    format!("{title}:\n{}\n{SEPARATOR}", preview(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn random_values_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        let v = HostVector::random(10_000, &mut rng);
        assert_eq!(v.len(), 10_000);
        assert!(v.as_slice().iter().all(|x| (0..100).contains(x)));
    }

    #[test]
    fn same_seed_same_vector() {
        let a = HostVector::random(64, &mut SmallRng::seed_from_u64(42));
        let b = HostVector::random(64, &mut SmallRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn zeroed_has_device_byte_len() {
        let v = HostVector::zeroed(25);
        assert_eq!(v.byte_len(), 100);
        assert!(v.as_slice().iter().all(|&x| x == 0));
    }

    #[test]
    fn short_vectors_print_in_full() {
        assert_eq!(preview(&[3, 1, 4, 1, 5]), "3 1 4 1 5");
        let fifteen: Vec<i32> = (0..15).collect();
        assert!(!preview(&fifteen).contains(PREVIEW_MARKER));
        assert_eq!(preview(&fifteen).split(' ').count(), 15);
    }

    #[test]
    fn long_vectors_print_head_and_tail() {
        let doubled: Vec<i32> = (0..20).map(|i| 2 * i).collect();
        assert_eq!(preview(&doubled), "0 2 4 6 8 ..... 30 32 34 36 38");
    }

    #[test]
    fn block_ends_with_separator() {
        let block = render_block("Vector v1", &[1, 2]);
        assert_eq!(block, format!("Vector v1:\n1 2\n{SEPARATOR}"));
    }

    #[test]
    fn empty_preview_is_empty() {
        assert_eq!(preview(&[]), "");
    }

    proptest! {
        #[test]
        fn preview_shape(values in proptest::collection::vec(0i32..100, 0..64)) {
            let out = preview(&values);
            let tokens: Vec<&str> = out.split_whitespace().collect();
            if values.len() <= PREVIEW_FULL_LIMIT {
                prop_assert_eq!(tokens.len(), values.len());
            } else {
                prop_assert_eq!(tokens.len(), 2 * PREVIEW_EDGE + 1);
                prop_assert_eq!(tokens[PREVIEW_EDGE], PREVIEW_MARKER);
                let last = values[values.len() - 1].to_string();
                prop_assert_eq!(tokens[2 * PREVIEW_EDGE], last.as_str());
            }
        }
    }
}
