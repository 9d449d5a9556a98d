//! skewgen generates the synthetic data that drives a storage benchmark.
//!
//! There are two generators.  [RandomValuePool] is a per-worker cycling alphabet of printable
//! bytes that is cheap to draw from.  [DistinctValueGenerator] is a sorted, immutable pool of
//! distinct values that can be shared by every worker; it selects single values with a pluggable
//! [RankChooser] and contiguous `[low, high]` ranges for selectivity-controlled range queries.
//!
//! Every random draw comes from a caller-provided [Guacamole], so identical seeds produce
//! identical pools.

use biometrics::Collector;
use guacamole::{FromGuacamole, Guacamole};

mod distinct;
mod pool;
pub mod zipf;

pub use distinct::{DistinctValueGenerator, DistinctValueOptions};
pub use pool::RandomValuePool;
pub use zipf::{ScrambledZipfianRank, ZipfianRank};

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// All Error conditions within `skewgen`.  Every one of them is a configuration error:  they are
/// raised while constructing a generator and never while drawing from one.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The selection rate must fall within (0, 1].
    SelectionRateOutOfRange {
        /// The rejected selection rate.
        selection_rate: f64,
    },
    /// A distinct value generator was built without a rank chooser.
    MissingRankChooser,
    /// The rank chooser draws from a domain larger than the pool of values.
    RankDomain {
        /// Cardinality of the rank chooser.
        cardinality: u64,
        /// Number of distinct values in the pool.
        num_distinct: usize,
    },
    /// A parameter is outside its valid range.
    InvalidParameter {
        /// What was wrong.
        what: String,
    },
}

impl Error {
    /// True iff the error arose from configuration.  Always true for skewgen.
    pub fn is_configuration(&self) -> bool {
        true
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SelectionRateOutOfRange { selection_rate } => fmt
                .debug_struct("SelectionRateOutOfRange")
                .field("selection_rate", selection_rate)
                .finish(),
            Error::MissingRankChooser => fmt.debug_struct("MissingRankChooser").finish(),
            Error::RankDomain {
                cardinality,
                num_distinct,
            } => fmt
                .debug_struct("RankDomain")
                .field("cardinality", cardinality)
                .field("num_distinct", num_distinct)
                .finish(),
            Error::InvalidParameter { what } => fmt
                .debug_struct("InvalidParameter")
                .field("what", what)
                .finish(),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////// printable_block /////////////////////////////////////////

/// The number of bytes sliced out of a single random draw.
pub const BLOCK_SIZE: usize = 6;

const SHIFTS: [u32; BLOCK_SIZE] = [0, 5, 10, 15, 20, 25];
const MASKS: [u32; BLOCK_SIZE] = [31, 63, 95, 31, 63, 95];

/// Slice `bits` into six bytes in the range `[b' ', 127]`.
pub fn printable_block(bits: u32) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    for (idx, byte) in block.iter_mut().enumerate() {
        *byte = ((bits >> SHIFTS[idx]) & MASKS[idx]) as u8 + b' ';
    }
    block
}

/// Draw a fresh printable block from `guac`.
pub fn draw_block(guac: &mut Guacamole) -> [u8; BLOCK_SIZE] {
    printable_block(u32::from_guacamole(&mut (), guac))
}

/////////////////////////////////////////// LengthChooser //////////////////////////////////////////

/// Choose the length of the next value.
pub trait LengthChooser {
    fn how_long(&mut self, guac: &mut Guacamole) -> u32;
}

/// Every value has the same length.
#[derive(Clone, Debug)]
pub struct ConstantLength {
    length: u32,
}

impl ConstantLength {
    pub fn new(length: u32) -> Self {
        Self { length }
    }
}

impl LengthChooser for ConstantLength {
    fn how_long(&mut self, _: &mut Guacamole) -> u32 {
        self.length
    }
}

/// Lengths are drawn uniformly from `[min_length, max_length]`.
#[derive(Clone, Debug)]
pub struct UniformLength {
    min_length: u32,
    max_length: u32,
}

impl UniformLength {
    pub fn new(min_length: u32, max_length: u32) -> Result<Self, Error> {
        if min_length > max_length {
            return Err(Error::InvalidParameter {
                what: format!(
                    "min_length must be <= max_length: {} > {}",
                    min_length, max_length
                ),
            });
        }
        Ok(Self {
            min_length,
            max_length,
        })
    }
}

impl LengthChooser for UniformLength {
    fn how_long(&mut self, guac: &mut Guacamole) -> u32 {
        let range = (self.max_length - self.min_length) as u64 + 1;
        let offset = u64::from_guacamole(&mut (), guac) % range;
        self.min_length + offset as u32
    }
}

//////////////////////////////////////////// RankChooser ///////////////////////////////////////////

/// Choose an integer rank in `[0, cardinality())`.
///
/// Rank choosers are immutable once constructed so that one chooser can be shared by every worker
/// thread; all mutable state lives in the [Guacamole] each caller brings.
pub trait RankChooser: Send + Sync {
    /// Draw the next rank.
    fn rank(&self, guac: &mut Guacamole) -> u64;
    /// The number of ranks this chooser draws from.
    fn cardinality(&self) -> u64;
    /// The skew of the distribution, for Zipfian choosers.
    fn theta(&self) -> Option<f64> {
        None
    }
}

/// Every rank is equally likely.
#[derive(Clone, Debug)]
pub struct UniformRank {
    n: u64,
}

impl UniformRank {
    pub fn new(n: u64) -> Result<Self, Error> {
        if n == 0 {
            return Err(Error::InvalidParameter {
                what: "uniform rank chooser needs at least one item".to_string(),
            });
        }
        Ok(Self { n })
    }
}

impl RankChooser for UniformRank {
    fn rank(&self, guac: &mut Guacamole) -> u64 {
        u64::from_guacamole(&mut (), guac) % self.n
    }

    fn cardinality(&self) -> u64 {
        self.n
    }
}

/// Construct a rank chooser over `[0, n)` by name:  "uniform", "zipfian", or "scrambled".
pub fn rank_chooser(mode: &str, n: u64, theta: f64) -> Result<Box<dyn RankChooser>, Error> {
    match mode {
        "uniform" => Ok(Box::new(UniformRank::new(n)?)),
        "zipfian" => Ok(Box::new(ZipfianRank::new(n, theta)?)),
        "scrambled" => Ok(Box::new(ScrambledZipfianRank::new(n, theta)?)),
        _ => Err(Error::InvalidParameter {
            what: format!("unknown rank mode {:?}", mode),
        }),
    }
}

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

pub fn register_biometrics(collector: &Collector) {
    distinct::register_biometrics(collector);
    pool::register_biometrics(collector);
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_block_slices() {
        assert_eq!([b' '; BLOCK_SIZE], printable_block(0));
        let block = printable_block(u32::MAX);
        assert_eq!(
            [
                b' ' + 31,
                b' ' + 63,
                b' ' + 95,
                b' ' + 31,
                b' ' + 63,
                // only seven bits remain above bit 25
                b' ' + (127 & 95),
            ],
            block
        );
        // bit 5 lands in the second byte
        assert_eq!(b' ' + 1, printable_block(1 << 5)[1]);
    }

    #[test]
    fn blocks_are_printable() {
        let mut guac = Guacamole::new(42);
        for _ in 0..1000 {
            for b in draw_block(&mut guac) {
                assert!((b' '..=127).contains(&b));
            }
        }
    }

    #[test]
    fn uniform_length_bounds() {
        let mut guac = Guacamole::new(7);
        let mut chooser = UniformLength::new(4, 9).unwrap();
        let mut seen = [false; 10];
        for _ in 0..1000 {
            let len = chooser.how_long(&mut guac);
            assert!((4..=9).contains(&len));
            seen[len as usize] = true;
        }
        assert!(seen[4..=9].iter().all(|s| *s));
        assert!(UniformLength::new(9, 4).is_err());
    }

    #[test]
    fn uniform_rank_in_domain() {
        let mut guac = Guacamole::new(0);
        let chooser = UniformRank::new(17).unwrap();
        for _ in 0..1000 {
            assert!(chooser.rank(&mut guac) < 17);
        }
        assert_eq!(None, chooser.theta());
        assert!(UniformRank::new(0).is_err());
    }

    #[test]
    fn rank_chooser_by_name() {
        assert_eq!(None, rank_chooser("uniform", 10, 0.99).unwrap().theta());
        assert_eq!(Some(0.99), rank_chooser("zipfian", 10, 0.99).unwrap().theta());
        assert_eq!(10, rank_chooser("scrambled", 10, 0.5).unwrap().cardinality());
        assert!(rank_chooser("hotspot", 10, 0.99).is_err());
    }
}
