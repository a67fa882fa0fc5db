use std::{fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, RoiError},
    handle::ImageHandle,
};

/// 64-bit perceptual fingerprint of an image.
///
/// Similar images produce fingerprints that differ in few bits; compare them
/// with [`Fingerprint::distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(image: &ImageHandle) -> Result<Self> {
        image.engine().compute_hash(image.pixels()).map(Self)
    }

    /// Number of differing bits, `0..=64`.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        hash_distance(self.0, other.0)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Fingerprint {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = RoiError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| RoiError::invalid("hash", s))
    }
}

/// Hamming distance between two fingerprints.
pub fn hash_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blobs, gradient};

    #[test]
    fn distance_is_symmetric_and_bounded() {
        let pairs = [(0u64, u64::MAX), (0xF0F0, 0x0F0F), (12345, 12345), (1 << 63, 1)];
        for (a, b) in pairs {
            assert_eq!(hash_distance(a, b), hash_distance(b, a));
            assert!(hash_distance(a, b) <= 64);
            assert_eq!(hash_distance(a, a), 0);
        }
        assert_eq!(hash_distance(0, u64::MAX), 64);
        assert_eq!(hash_distance(0xF0F0, 0x0F0F), 16);
    }

    #[test]
    fn identical_images_share_a_fingerprint() {
        let image = gradient(64, 48);
        let copy = image.duplicate();
        assert_eq!(image.hash().unwrap().distance(&copy.hash().unwrap()), 0);
    }

    #[test]
    fn different_layouts_are_far_apart() {
        let left = blobs(64, 64, &[(0, 0, 32, 64)]).hash().unwrap();
        let right = blobs(64, 64, &[(32, 0, 32, 64)]).hash().unwrap();
        assert_eq!(left.distance(&right), 64);
    }

    #[test]
    fn hex_form_round_trips() {
        let fingerprint = Fingerprint(0x00ab_cdef_0123_4567);
        let text = fingerprint.to_string();
        assert_eq!(text, "00abcdef01234567");
        assert_eq!(text.parse::<Fingerprint>().unwrap(), fingerprint);
        assert_eq!("0x10".parse::<Fingerprint>().unwrap(), Fingerprint(16));
        assert!("xyz".parse::<Fingerprint>().is_err());
        assert_eq!(serde_json::to_string(&fingerprint).unwrap(), fingerprint.0.to_string());
    }
}
