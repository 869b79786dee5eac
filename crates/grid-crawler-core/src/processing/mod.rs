// Core modules
pub mod exact;
pub mod fingerprint;
pub mod perceptual;

// Expose exact content hashing
pub use exact::{array_bytes, exact_hash, ExactHash};

// Expose perceptual hash
pub use perceptual::{phash, phash_1d, phash_2d, ArrayHash, PHashParams};

// Expose fingerprint builders
pub use fingerprint::{fingerprint, fingerprint_grid, CoordinateFingerprint, GridFingerprint};
