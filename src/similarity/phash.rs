//! Difference-hash perceptual fingerprint. The image is collapsed to a
//! 9x8 grayscale thumbnail and each bit records whether a pixel is darker
//! than its right-hand neighbor, giving a 64-bit signature that survives
//! resizing and mild re-rendering artifacts.

use bit_vec::BitVec;
use log::trace;

use crate::error::{Error, Result};
use crate::similarity::raster;
use crate::types::RasterImage;

pub const HASH_BITS: usize = 64;
const HASH_SIZE: u32 = 8;

/// Computes the perceptual hash of an image. Deterministic and
/// side-effect-free; any valid image produces exactly `HASH_BITS` bits.
pub fn hash(image: &RasterImage) -> BitVec {
    let gray = raster::to_gray(image);
    let thumb = raster::resize_bilinear(&gray, HASH_SIZE + 1, HASH_SIZE);

    let mut bits = BitVec::with_capacity(HASH_BITS);
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            bits.push(thumb.luma(x, y) < thumb.luma(x + 1, y));
        }
    }

    trace!("Computed {}-bit perceptual hash: {}", bits.len(), to_hex(&bits));
    bits
}

/// Similarity of two hashes as 1 minus the normalized Hamming distance.
/// Hashes of different lengths cannot be compared.
pub fn compare(a: &BitVec, b: &BitVec) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::invalid_input(format!(
            "Hash length mismatch: {} vs {}", a.len(), b.len()
        )));
    }
    if a.is_empty() {
        return Err(Error::invalid_input("Empty hash"));
    }

    let differing = a.iter()
        .zip(b.iter())
        .filter(|(x, y)| x != y)
        .count();

    Ok(1.0 - differing as f64 / a.len() as f64)
}

/// Hex rendering for logs and debug output.
pub fn to_hex(bits: &BitVec) -> String {
    hex::encode(bits.to_bytes())
}
