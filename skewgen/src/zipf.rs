//! Zipfian rank choosers.
//!
//! This is the method of Gray et al., "Quickly Generating Billion-Record Synthetic Databases",
//! the same one YCSB uses.  Rank 0 is the most popular.
//!
//! `guacamole::Zipf` implements the same method but computes `zeta2` as `zeta(theta as u64, 2)`,
//! which is zero, and `eta` from `2^(1 - theta)` rather than `(2 / n)^(1 - theta)`.  For theta in
//! (0, 1) that makes `eta` negative and most draws land past `n`, so the YCSB constants are
//! computed here instead.

use guacamole::{FromGuacamole, Guacamole};

use super::{Error, RankChooser};

/////////////////////////////////////////////// zeta ///////////////////////////////////////////////

/// The generalized harmonic number `sum(1 / i^theta for i in 1..=n)`.
pub fn zeta(n: u64, theta: f64) -> f64 {
    let mut sum = 0.0;
    for i in 1..=n {
        sum += 1.0 / (i as f64).powf(theta);
    }
    sum
}

//////////////////////////////////////////// ZipfianRank ///////////////////////////////////////////

/// Draw ranks in `[0, n)` following a Zipfian distribution with skew `theta`.
#[derive(Clone, Debug)]
pub struct ZipfianRank {
    n: u64,
    theta: f64,
    alpha: f64,
    zetan: f64,
    eta: f64,
    half_pow_theta: f64,
}

impl ZipfianRank {
    /// Create a new Zipfian chooser.  Computing the normalizing constant is O(n).
    pub fn new(n: u64, theta: f64) -> Result<Self, Error> {
        if n == 0 {
            return Err(Error::InvalidParameter {
                what: "zipfian rank chooser needs at least one item".to_string(),
            });
        }
        if !(theta > 0.0 && theta < 1.0) {
            return Err(Error::InvalidParameter {
                what: format!("zipfian theta must be in (0, 1): {}", theta),
            });
        }
        let zetan = zeta(n, theta);
        let zeta2 = zeta(2.min(n), theta);
        let alpha = 1.0 / (1.0 - theta);
        let eta = (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta2 / zetan);
        Ok(Self {
            n,
            theta,
            alpha,
            zetan,
            eta,
            half_pow_theta: 0.5f64.powf(theta),
        })
    }

    /// The normalizing constant.
    pub fn zetan(&self) -> f64 {
        self.zetan
    }
}

impl RankChooser for ZipfianRank {
    fn rank(&self, guac: &mut Guacamole) -> u64 {
        let u = f64::from_guacamole(&mut (), guac);
        let uz = u * self.zetan;
        if uz < 1.0 {
            return 0;
        }
        if uz < 1.0 + self.half_pow_theta {
            return 1.min(self.n - 1);
        }
        let rank = (self.n as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64;
        rank.min(self.n - 1)
    }

    fn cardinality(&self) -> u64 {
        self.n
    }

    fn theta(&self) -> Option<f64> {
        Some(self.theta)
    }
}

/////////////////////////////////////// ScrambledZipfianRank ///////////////////////////////////////

const FNV_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
const FNV_PRIME_64: u64 = 1099511628211;

fn fnv_hash64(x: u64) -> u64 {
    let mut hash = FNV_OFFSET_BASIS_64;
    for byte in x.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// A Zipfian chooser whose popular ranks are scattered across the domain instead of clustered at
/// its start.
#[derive(Clone, Debug)]
pub struct ScrambledZipfianRank {
    zipf: ZipfianRank,
}

impl ScrambledZipfianRank {
    pub fn new(n: u64, theta: f64) -> Result<Self, Error> {
        Ok(Self {
            zipf: ZipfianRank::new(n, theta)?,
        })
    }
}

impl RankChooser for ScrambledZipfianRank {
    fn rank(&self, guac: &mut Guacamole) -> u64 {
        fnv_hash64(self.zipf.rank(guac)) % self.zipf.n
    }

    fn cardinality(&self) -> u64 {
        self.zipf.n
    }

    fn theta(&self) -> Option<f64> {
        self.zipf.theta()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeta_small() {
        assert_eq!(1.0, zeta(1, 0.5));
        let z = zeta(2, 0.5);
        assert!((z - (1.0 + 1.0 / 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_theta() {
        assert!(ZipfianRank::new(100, 0.0).is_err());
        assert!(ZipfianRank::new(100, 1.0).is_err());
        assert!(ZipfianRank::new(100, f64::NAN).is_err());
        assert!(ZipfianRank::new(0, 0.99).is_err());
    }

    #[test]
    fn zipfian_is_skewed() {
        let zipf = ZipfianRank::new(1000, 0.99).unwrap();
        let mut guac = Guacamole::new(1);
        let mut counts = vec![0u64; 1000];
        for _ in 0..100_000 {
            let r = zipf.rank(&mut guac);
            assert!(r < 1000);
            counts[r as usize] += 1;
        }
        assert!(counts[0] > counts[1]);
        assert!(counts[0] > counts[999] * 10);
        assert!(counts[..10].iter().sum::<u64>() > counts[990..].iter().sum::<u64>());
    }

    #[test]
    fn last_rank_is_not_a_sink() {
        // P(rank n - 1) is about 1.5e-4 here; a negative eta would push most draws to n - 1.
        let zipf = ZipfianRank::new(1000, 0.99).unwrap();
        let mut guac = Guacamole::new(9);
        let mut last = 0;
        let mut first = 0;
        for _ in 0..100_000 {
            match zipf.rank(&mut guac) {
                0 => first += 1,
                999 => last += 1,
                _ => {}
            }
        }
        assert!(last < 100, "last rank drawn {} times", last);
        // P(rank 0) = 1 / zetan
        let expected = 100_000.0 / zipf.zetan();
        assert!((first as f64 - expected).abs() < expected * 0.1);
    }

    #[test]
    fn single_item() {
        let zipf = ZipfianRank::new(1, 0.5).unwrap();
        let mut guac = Guacamole::new(3);
        for _ in 0..100 {
            assert_eq!(0, zipf.rank(&mut guac));
        }
    }

    #[test]
    fn scrambled_in_domain() {
        let zipf = ScrambledZipfianRank::new(37, 0.9).unwrap();
        let mut guac = Guacamole::new(5);
        for _ in 0..10_000 {
            assert!(zipf.rank(&mut guac) < 37);
        }
        assert_eq!(Some(0.9), zipf.theta());
    }
}
