//! Exact content hashing of coordinate arrays.
//!
//! The digest is xxHash3-64 over the row-major sequence of little-endian
//! `f64` values, which is also the byte layout stored in the catalog. Any bit
//! difference in the input produces a different digest with overwhelming
//! probability; there is no tolerance.
use ndarray::ArrayD;
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

const BUFFER_SIZE: usize = 8192;

/// A 64-bit exact content digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExactHash(pub u64);

impl ExactHash {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Bit-identical signed form, as stored in SQLite INTEGER columns
    pub fn to_i64(&self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    /// Parse the 16 digit hex form produced by `Display`
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 {
            return None;
        }
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for ExactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Compute the exact hash of an array
pub fn exact_hash(array: &ArrayD<f64>) -> ExactHash {
    let mut hasher = Xxh3::new();

    // Feed the hasher in fixed-size chunks instead of per element
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut filled = 0;
    for value in array.iter() {
        buffer[filled..filled + 8].copy_from_slice(&value.to_le_bytes());
        filled += 8;
        if filled == BUFFER_SIZE {
            hasher.update(&buffer);
            filled = 0;
        }
    }
    hasher.update(&buffer[..filled]);

    ExactHash(hasher.digest())
}

/// Raw little-endian bytes of an array in logical (row-major) order
pub fn array_bytes(array: &ArrayD<f64>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(array.len() * 8);
    for value in array.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use xxhash_rust::xxh3::xxh3_64;

    fn lat(n: usize) -> ArrayD<f64> {
        Array1::linspace(-89.5, 89.5, n).into_dyn()
    }

    #[test]
    fn test_exact_hash_is_deterministic() {
        assert_eq!(exact_hash(&lat(180)), exact_hash(&lat(180)));
    }

    #[test]
    fn test_exact_hash_detects_single_element_change() {
        let original = Array1::linspace(-89.5, 89.5, 180);
        let mut nudged = original.clone();
        nudged[90] += 1e-9;

        assert_ne!(
            exact_hash(&original.into_dyn()),
            exact_hash(&nudged.into_dyn())
        );
    }

    #[test]
    fn test_exact_hash_matches_one_shot_digest_of_stored_bytes() {
        // Larger than one buffer to exercise the chunked path
        let array = Array2::from_shape_fn((120, 50), |(i, j)| i as f64 * 0.5 - j as f64).into_dyn();

        assert_eq!(exact_hash(&array).as_u64(), xxh3_64(&array_bytes(&array)));
    }

    #[test]
    fn test_exact_hash_follows_logical_order() {
        // Same values, transposed memory layout
        let array = Array2::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64);
        let fortran = array.t().as_standard_layout().t().to_owned();

        assert_eq!(
            exact_hash(&array.into_dyn()),
            exact_hash(&fortran.into_dyn())
        );
    }

    #[test]
    fn test_hex_and_integer_forms_agree() {
        let hash = exact_hash(&lat(10));

        assert_eq!(ExactHash::from_hex(&hash.to_string()), Some(hash));
        assert_eq!(ExactHash::from_i64(hash.to_i64()), hash);
        assert_eq!(hash.to_string().len(), 16);
    }
}
