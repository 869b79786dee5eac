//! # Perceptual Hashing Module
//!
//! DCT-based perceptual hashes of 1-D and 2-D coordinate arrays.
//!
//! ## Overview
//!
//! A perceptual hash generates a "fingerprint" that stays the same, or nearly
//! the same, for arrays describing the same underlying field, unlike the exact
//! hash where a single flipped bit produces an unrelated digest. Coordinate
//! arrays sampled at a different resolution, or carrying rounding noise, land
//! on equal or close hashes.
//!
//! ## Algorithm
//!
//! 1. Resize each axis to `hash_size * highfreq_factor` samples with linear
//!    interpolation, blurring first when downsampling (anti-aliasing)
//! 2. Apply a DCT-II along each axis
//! 3. Keep the `hash_size^N` low-frequency block
//! 4. Set a bit for every coefficient strictly greater than the block median
//! 5. Pack the bits, first coefficient most significant
//!
//! ## Hamming Distance Interpretation
//!
//! Similarity is the number of differing bits. For the default 8×8 hash of a
//! 2-D field:
//!
//! - 0-3: Same field, resampled or perturbed
//! - 4-10: Related fields
//! - >10: Different fields
//!
//! 1-D hashes only carry `hash_size` bits, so thresholds scale down with them.
use ndarray::{s, Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis as NdAxis, Ix1, Ix2};
use rustdct::{Dct2, DctPlanner};

use crate::error::{Error, Result};

/// Side of the low-frequency block
pub const DEFAULT_HASH_SIZE: usize = 8;

/// Oversampling of the resized array relative to the low-frequency block
pub const DEFAULT_HIGHFREQ_FACTOR: usize = 4;

/// Largest low-frequency block a hash can hold
pub const MAX_HASH_BITS: usize = 64;

/// Longest axis an array is resized to before the DCT
pub const MAX_RESIZED_LEN: usize = 4096;

// Gaussian kernels are cut off at this many standard deviations
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Parameters of the perceptual hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PHashParams {
    pub hash_size: usize,
    pub highfreq_factor: usize,
}

impl Default for PHashParams {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            highfreq_factor: DEFAULT_HIGHFREQ_FACTOR,
        }
    }
}

impl PHashParams {
    pub fn new(hash_size: usize, highfreq_factor: usize) -> Self {
        Self {
            hash_size,
            highfreq_factor,
        }
    }

    /// Length of every axis after resizing
    pub fn resized_len(&self) -> usize {
        self.hash_size * self.highfreq_factor
    }

    /// Check the parameters can produce a hash for an array of rank `rank`
    pub fn check(&self, rank: usize) -> Result<()> {
        if self.hash_size == 0 || self.highfreq_factor == 0 {
            return Err(Error::Configuration(format!(
                "hash_size ({}) and highfreq_factor ({}) must be non-zero",
                self.hash_size, self.highfreq_factor
            )));
        }
        match self.hash_size.checked_mul(self.highfreq_factor) {
            Some(len) if len <= MAX_RESIZED_LEN => {}
            _ => {
                return Err(Error::Configuration(format!(
                    "hash_size ({}) times highfreq_factor ({}) exceeds {} samples per axis",
                    self.hash_size, self.highfreq_factor, MAX_RESIZED_LEN
                )))
            }
        }
        let coefficients = u32::try_from(rank)
            .ok()
            .and_then(|rank| self.hash_size.checked_pow(rank))
            .unwrap_or(usize::MAX);
        if coefficients > MAX_HASH_BITS {
            return Err(Error::ArrayTooLarge { coefficients });
        }
        Ok(())
    }
}

/// A perceptual hash together with the shape of the bit block it was packed from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayHash {
    shape: Vec<usize>,
    hash: u64,
}

impl ArrayHash {
    /// Pack a boolean block, first element most significant
    pub fn from_binary(block: &ArrayD<bool>) -> Result<Self> {
        if block.len() > MAX_HASH_BITS {
            return Err(Error::ArrayTooLarge {
                coefficients: block.len(),
            });
        }
        let hash = block
            .iter()
            .fold(0u64, |acc, &bit| (acc << 1) | u64::from(bit));
        Ok(Self {
            shape: block.shape().to_vec(),
            hash,
        })
    }

    /// Shape of the thresholded low-frequency block
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The packed hash value
    pub fn value(&self) -> u64 {
        self.hash
    }

    /// Number of meaningful bits
    pub fn bits(&self) -> usize {
        self.shape.iter().product()
    }

    /// Width of the smallest unsigned integer holding the hash
    pub fn width(&self) -> u32 {
        match self.bits() {
            0..=16 => 16,
            17..=32 => 32,
            _ => 64,
        }
    }

    /// Calculate the Hamming distance between two perceptual hashes
    pub fn distance(&self, other: &ArrayHash) -> u32 {
        (self.hash ^ other.hash).count_ones()
    }

    /// Check if two arrays are perceptually similar based on a threshold
    pub fn is_similar(&self, other: &ArrayHash, threshold: u32) -> bool {
        self.shape == other.shape && self.distance(other) <= threshold
    }
}

/// Perceptual hash of a 1-D or 2-D array
pub fn phash(array: &ArrayD<f64>, params: PHashParams) -> Result<ArrayHash> {
    match array.ndim() {
        1 => {
            let view = array
                .view()
                .into_dimensionality::<Ix1>()
                .map_err(|_| Error::UnsupportedRank(1))?;
            phash_1d(view, params)
        }
        2 => {
            let view = array
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| Error::UnsupportedRank(2))?;
            phash_2d(view, params)
        }
        rank => Err(Error::UnsupportedRank(rank)),
    }
}

/// Perceptual hash of a 1-D array
pub fn phash_1d(array: ArrayView1<f64>, params: PHashParams) -> Result<ArrayHash> {
    params.check(1)?;
    if array.is_empty() {
        return Err(Error::EmptyArray(array.shape().to_vec()));
    }

    let mut resized = resize_lane(array, params.resized_len()).to_vec();
    let mut planner = DctPlanner::<f64>::new();
    planner
        .plan_dct2(resized.len())
        .process_dct2(&mut resized[..]);

    let lowfreq = Array1::from(resized[..params.hash_size].to_vec());
    threshold(lowfreq.into_dyn())
}

/// Perceptual hash of a 2-D array
pub fn phash_2d(array: ArrayView2<f64>, params: PHashParams) -> Result<ArrayHash> {
    params.check(2)?;
    if array.is_empty() {
        return Err(Error::EmptyArray(array.shape().to_vec()));
    }

    let side = params.resized_len();
    let widened = resize_along(array, NdAxis(1), side);
    let mut resized = resize_along(widened.view(), NdAxis(0), side);

    let mut planner = DctPlanner::<f64>::new();
    dct_along(&mut planner, &mut resized, NdAxis(0));
    dct_along(&mut planner, &mut resized, NdAxis(1));

    let lowfreq = resized
        .slice(s![..params.hash_size, ..params.hash_size])
        .to_owned();
    threshold(lowfreq.into_dyn())
}

/// Compare every coefficient to the block median
fn threshold(lowfreq: ArrayD<f64>) -> Result<ArrayHash> {
    let median = median(lowfreq.iter().copied());
    ArrayHash::from_binary(&lowfreq.mapv(|v| v > median))
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Apply an unnormalised DCT-II to every lane along `axis`
fn dct_along(planner: &mut DctPlanner<f64>, data: &mut Array2<f64>, axis: NdAxis) {
    let len = data.len_of(axis);
    let dct = planner.plan_dct2(len);
    let mut buffer = vec![0.0; len];
    for mut lane in data.lanes_mut(axis) {
        buffer.iter_mut().zip(lane.iter()).for_each(|(b, v)| *b = *v);
        dct.process_dct2(&mut buffer);
        lane.iter_mut().zip(&buffer).for_each(|(v, b)| *v = *b);
    }
}

/// Resize every lane along `axis` to `len` samples
fn resize_along(data: ArrayView2<f64>, axis: NdAxis, len: usize) -> Array2<f64> {
    let mut dim = data.raw_dim();
    dim[axis.index()] = len;
    let mut resized = Array2::zeros(dim);
    for (src, mut dst) in data.lanes(axis).into_iter().zip(resized.lanes_mut(axis)) {
        dst.assign(&resize_lane(src, len));
    }
    resized
}

/// Anti-aliased linear resampling of one lane
fn resize_lane(lane: ArrayView1<f64>, len: usize) -> Array1<f64> {
    let scale = lane.len() as f64 / len as f64;
    let sigma = ((scale - 1.0) / 2.0).max(0.0);
    if sigma > 0.0 {
        interpolate(gaussian_blur(lane, sigma).view(), len)
    } else {
        interpolate(lane, len)
    }
}

/// Linear interpolation with pixel-centre alignment
fn interpolate(lane: ArrayView1<f64>, len: usize) -> Array1<f64> {
    let n = lane.len();
    let scale = n as f64 / len as f64;
    Array1::from_shape_fn(len, |j| {
        let position = (j as f64 + 0.5) * scale - 0.5;
        let left = position.floor();
        let t = position - left;
        let left = left as isize;
        let a = lane[mirror_index(left, n)];
        let b = lane[mirror_index(left + 1, n)];
        a * (1.0 - t) + b * t
    })
}

fn gaussian_blur(lane: ArrayView1<f64>, sigma: f64) -> Array1<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k * k) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= total);

    let n = lane.len();
    Array1::from_shape_fn(n, |i| {
        weights
            .iter()
            .zip(-radius..=radius)
            .map(|(w, k)| w * lane[mirror_index(i as isize + k, n)])
            .sum()
    })
}

/// Reflect an out-of-range index about the edge samples: `d c b | a b c d | c b a`
fn mirror_index(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let folded = index.rem_euclid(2 * last);
    if folded > last {
        (2 * last - folded) as usize
    } else {
        folded as usize
    }
}
