use std::collections::BTreeSet;

use biometrics::{Collector, Counter};
use guacamole::{FromGuacamole, Guacamole};

use super::{
    draw_block, rank_chooser, ConstantLength, Error, LengthChooser, RankChooser, UniformLength,
    BLOCK_SIZE,
};
use crate::zipf::zeta;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static NEXT: Counter = Counter::new("skewgen.distinct.next");
static GET: Counter = Counter::new("skewgen.distinct.get");
static GET_ZIPFIAN: Counter = Counter::new("skewgen.distinct.get_zipfian");
static DUPLICATE: Counter = Counter::new("skewgen.distinct.duplicate");

pub(crate) fn register_biometrics(collector: &Collector) {
    collector.register_counter(&NEXT);
    collector.register_counter(&GET);
    collector.register_counter(&GET_ZIPFIAN);
    collector.register_counter(&DUPLICATE);
}

////////////////////////////////////// DistinctValueGenerator //////////////////////////////////////

/// A sorted pool of values that serves point selection and contiguous range selection.
///
/// The pool is built once and never mutated, so one generator can be shared (e.g. behind an
/// `Arc`) by every worker thread without synchronization.
pub struct DistinctValueGenerator {
    values: Vec<Vec<u8>>,
    selection_rate: f64,
    rank: Box<dyn RankChooser>,
    zipfian_tail: Option<usize>,
}

impl DistinctValueGenerator {
    /// Build `num_distinct` distinct values with lengths from `length` and sort them.  Fails when
    /// `length` cannot produce that many distinct values.
    ///
    /// `selection_rate` is the fraction of the pool a range from [DistinctValueGenerator::get]
    /// covers and must be in (0, 1].  `rank` picks values for [DistinctValueGenerator::next] and
    /// is mandatory.  When `is_zipfian` is set, ranges are always the Zipfian tail of the pool,
    /// and `rank` must expose its theta.
    pub fn new(
        num_distinct: usize,
        length: &mut dyn LengthChooser,
        selection_rate: f64,
        rank: Option<Box<dyn RankChooser>>,
        is_zipfian: bool,
        guac: &mut Guacamole,
    ) -> Result<Self, Error> {
        if num_distinct == 0 {
            return Err(Error::InvalidParameter {
                what: "distinct value generator needs at least one value".to_string(),
            });
        }
        if !(selection_rate > 0.0 && selection_rate <= 1.0) {
            return Err(Error::SelectionRateOutOfRange { selection_rate });
        }
        let rank = rank.ok_or(Error::MissingRankChooser)?;
        if rank.cardinality() > num_distinct as u64 {
            return Err(Error::RankDomain {
                cardinality: rank.cardinality(),
                num_distinct,
            });
        }
        let zipfian_tail = if is_zipfian {
            let theta = rank.theta().ok_or_else(|| Error::InvalidParameter {
                what: "zipfian ranges need a rank chooser with a theta".to_string(),
            })?;
            Some(zipfian_tail(num_distinct, theta, selection_rate))
        } else {
            None
        };
        let values = generate_values(num_distinct, length, guac)?;
        Ok(Self {
            values,
            selection_rate,
            rank,
            zipfian_tail,
        })
    }

    /// The sorted pool.
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// The number of values in the pool.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Never true; construction rejects an empty pool.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The selection rate ranges are built to cover.
    pub fn selection_rate(&self) -> f64 {
        self.selection_rate
    }

    /// The first index of the Zipfian tail, if ranges are Zipfian.
    pub fn zipfian_tail(&self) -> Option<usize> {
        self.zipfian_tail
    }

    /// Select one value using the rank chooser.
    pub fn next(&self, guac: &mut Guacamole) -> &[u8] {
        NEXT.click();
        let rank = self.rank.rank(guac) as usize;
        &self.values[rank]
    }

    /// Select a `[low, high]` range of values.
    pub fn get(&self, guac: &mut Guacamole) -> (&[u8], &[u8]) {
        let (low, high) = self.get_indices(guac);
        (&self.values[low], &self.values[high])
    }

    /// Select a range and return its pool indices, `low <= high < len()`.
    pub fn get_indices(&self, guac: &mut Guacamole) -> (usize, usize) {
        let n = self.values.len();
        if let Some(tail) = self.zipfian_tail {
            GET_ZIPFIAN.click();
            return (tail, n - 1);
        }
        GET.click();
        let span = 1.0 - self.selection_rate;
        let start = (f64::from_guacamole(&mut (), guac) * span).min(span);
        let end = start + self.selection_rate;
        let low = ((start * n as f64).round().max(0.0) as usize).min(n - 1);
        let high = ((end * n as f64).round() as usize).min(n - 1);
        (low, high)
    }
}

impl std::fmt::Debug for DistinctValueGenerator {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("DistinctValueGenerator")
            .field("values", &self.values.len())
            .field("selection_rate", &self.selection_rate)
            .field("cardinality", &self.rank.cardinality())
            .field("zipfian_tail", &self.zipfian_tail)
            .finish()
    }
}

// Duplicate draws tolerated in a row before the length distribution is declared too narrow.
const MAX_DUPLICATE_DRAWS: usize = 1 << 16;

// The block offset carries across values; a new block is drawn only when one is used up.
// Duplicates are discarded and redrawn so the pool holds exactly num_distinct distinct values.
fn generate_values(
    num_distinct: usize,
    length: &mut dyn LengthChooser,
    guac: &mut Guacamole,
) -> Result<Vec<Vec<u8>>, Error> {
    let mut values = BTreeSet::new();
    let mut block = [0u8; BLOCK_SIZE];
    let mut offset = BLOCK_SIZE;
    let mut duplicates = 0;
    while values.len() < num_distinct {
        let len = length.how_long(guac) as usize;
        let mut value = Vec::with_capacity(len);
        for _ in 0..len {
            if offset == BLOCK_SIZE {
                block = draw_block(guac);
                offset = 0;
            }
            value.push(block[offset]);
            offset += 1;
        }
        if values.insert(value) {
            duplicates = 0;
        } else {
            DUPLICATE.click();
            duplicates += 1;
            if duplicates >= MAX_DUPLICATE_DRAWS {
                return Err(Error::InvalidParameter {
                    what: format!(
                        "value lengths cannot produce {} distinct values; stuck at {}",
                        num_distinct,
                        values.len()
                    ),
                });
            }
        }
    }
    Ok(values.into_iter().collect())
}

// The start of the shortest tail whose Zipfian mass reaches selection_rate.
fn zipfian_tail(n: usize, theta: f64, selection_rate: f64) -> usize {
    let zeta_n = zeta(n as u64, theta);
    let mut cumulative = 0.0;
    for k in (1..=n).rev() {
        cumulative += (1.0 / (k as f64).powf(theta)) / zeta_n;
        if cumulative >= selection_rate {
            return k - 1;
        }
    }
    0
}

/////////////////////////////////////// DistinctValueOptions ///////////////////////////////////////

/// Options for building a [DistinctValueGenerator].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct DistinctValueOptions {
    /// Number of distinct values in the pool.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Number of distinct values to generate.", "N")
    )]
    pub num_distinct: usize,
    /// "constant" or "uniform".
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Length mode: constant or uniform.", "MODE")
    )]
    pub length_mode: String,
    /// Length of values when length_mode is constant.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Length of every value (constant mode).", "LEN")
    )]
    pub value_length: u32,
    /// Minimum length when length_mode is uniform.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Minimum value length (uniform mode).", "LEN")
    )]
    pub value_min_length: u32,
    /// Maximum length when length_mode is uniform.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Maximum value length (uniform mode).", "LEN")
    )]
    pub value_max_length: u32,
    /// Fraction of the pool a range covers.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Fraction of the pool each range covers.", "RATE")
    )]
    pub selection_rate: f64,
    /// "uniform", "zipfian", or "scrambled".
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Rank mode: uniform, zipfian, or scrambled.", "MODE")
    )]
    pub rank_mode: String,
    /// Skew of the zipfian rank modes.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Zipfian skew in (0, 1).", "THETA")
    )]
    pub zipf_theta: f64,
    /// Select the zipfian tail for every range.
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Always select the zipfian tail as the range.")
    )]
    pub zipfian_ranges: bool,
    /// Seed for building the pool.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Seed for the pool's random draws.", "SEED")
    )]
    pub seed: u64,
}

impl DistinctValueOptions {
    /// Build the generator these options describe.
    pub fn try_build(&self) -> Result<DistinctValueGenerator, Error> {
        let mut length: Box<dyn LengthChooser> = match self.length_mode.as_str() {
            "constant" => Box::new(ConstantLength::new(self.value_length)),
            "uniform" => Box::new(UniformLength::new(
                self.value_min_length,
                self.value_max_length,
            )?),
            _ => {
                return Err(Error::InvalidParameter {
                    what: format!("unknown length mode {:?}", self.length_mode),
                });
            }
        };
        let rank = rank_chooser(&self.rank_mode, self.num_distinct as u64, self.zipf_theta)?;
        let mut guac = Guacamole::new(self.seed);
        DistinctValueGenerator::new(
            self.num_distinct,
            length.as_mut(),
            self.selection_rate,
            Some(rank),
            self.zipfian_ranges,
            &mut guac,
        )
    }
}

impl Default for DistinctValueOptions {
    fn default() -> Self {
        Self {
            num_distinct: 1_000,
            length_mode: "constant".to_string(),
            value_length: 16,
            value_min_length: 8,
            value_max_length: 24,
            selection_rate: 0.01,
            rank_mode: "uniform".to_string(),
            zipf_theta: 0.99,
            zipfian_ranges: false,
            seed: 0,
        }
    }
}

impl PartialEq for DistinctValueOptions {
    fn eq(&self, other: &DistinctValueOptions) -> bool {
        fn approx_eq(lhs: f64, rhs: f64) -> bool {
            lhs * 0.999 <= rhs && lhs * 1.001 >= rhs
        }
        self.num_distinct == other.num_distinct
            && self.length_mode == other.length_mode
            && self.value_length == other.value_length
            && self.value_min_length == other.value_min_length
            && self.value_max_length == other.value_max_length
            && approx_eq(self.selection_rate, other.selection_rate)
            && self.rank_mode == other.rank_mode
            && approx_eq(self.zipf_theta, other.zipf_theta)
            && self.zipfian_ranges == other.zipfian_ranges
            && self.seed == other.seed
    }
}

impl Eq for DistinctValueOptions {}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{UniformRank, ZipfianRank};

    fn uniform(n: usize) -> Option<Box<dyn RankChooser>> {
        Some(Box::new(UniformRank::new(n as u64).unwrap()))
    }

    fn zipfian(n: usize) -> Option<Box<dyn RankChooser>> {
        Some(Box::new(ZipfianRank::new(n as u64, 0.99).unwrap()))
    }

    #[test]
    fn pool_is_sorted_with_requested_lengths() {
        let mut guac = Guacamole::new(11);
        let mut length = UniformLength::new(3, 10).unwrap();
        let dvg = DistinctValueGenerator::new(500, &mut length, 0.1, uniform(500), false, &mut guac)
            .unwrap();
        assert_eq!(500, dvg.len());
        for w in dvg.values().windows(2) {
            assert!(w[0] < w[1]);
        }
        for v in dvg.values() {
            assert!((3..=10).contains(&v.len()));
        }
    }

    #[test]
    fn narrow_lengths_still_yield_distinct_values() {
        // Two-byte values collide often at this pool size; duplicates must be redrawn.
        let mut guac = Guacamole::new(7);
        let mut length = ConstantLength::new(2);
        let dvg =
            DistinctValueGenerator::new(1_000, &mut length, 0.1, uniform(1_000), false, &mut guac)
                .unwrap();
        assert_eq!(1_000, dvg.len());
        for w in dvg.values().windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn too_few_possible_values_is_an_error() {
        // One-byte values come from an alphabet of at most 96 bytes.
        let mut guac = Guacamole::new(7);
        let mut length = ConstantLength::new(1);
        let err =
            DistinctValueGenerator::new(200, &mut length, 0.1, uniform(200), false, &mut guac)
                .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn blocks_carry_across_values() {
        // With length 4, the first two values share the first block: 4 bytes + 2 bytes.
        let mut guac = Guacamole::new(77);
        let mut expect = Guacamole::new(77);
        let first = draw_block(&mut expect);
        let second = draw_block(&mut expect);
        let values = generate_values(2, &mut ConstantLength::new(4), &mut guac).unwrap();
        let mut want = vec![
            first[..4].to_vec(),
            vec![first[4], first[5], second[0], second[1]],
        ];
        want.sort();
        assert_eq!(want, values);
    }

    #[test]
    fn selection_rate_bounds() {
        let mut guac = Guacamole::new(0);
        let mut length = ConstantLength::new(8);
        for rate in [0.0, -0.5, 1.0001, f64::NAN] {
            let err =
                DistinctValueGenerator::new(10, &mut length, rate, uniform(10), false, &mut guac)
                    .unwrap_err();
            assert!(matches!(err, Error::SelectionRateOutOfRange { .. }));
        }
        assert!(
            DistinctValueGenerator::new(10, &mut length, 1.0, uniform(10), false, &mut guac)
                .is_ok()
        );
    }

    #[test]
    fn rank_chooser_is_required() {
        let mut guac = Guacamole::new(0);
        let err = DistinctValueGenerator::new(
            10,
            &mut ConstantLength::new(8),
            0.5,
            None,
            false,
            &mut guac,
        )
        .unwrap_err();
        assert_eq!(Error::MissingRankChooser, err);
    }

    #[test]
    fn rank_domain_must_fit_pool() {
        let mut guac = Guacamole::new(0);
        let err = DistinctValueGenerator::new(
            10,
            &mut ConstantLength::new(8),
            0.5,
            uniform(11),
            false,
            &mut guac,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RankDomain { .. }));
    }

    #[test]
    fn zipfian_ranges_need_theta() {
        let mut guac = Guacamole::new(0);
        let err = DistinctValueGenerator::new(
            10,
            &mut ConstantLength::new(8),
            0.5,
            uniform(10),
            true,
            &mut guac,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn next_returns_pool_members() {
        let mut guac = Guacamole::new(3);
        let dvg = DistinctValueGenerator::new(
            100,
            &mut ConstantLength::new(6),
            0.1,
            zipfian(100),
            false,
            &mut guac,
        )
        .unwrap();
        for _ in 0..1000 {
            let v = dvg.next(&mut guac).to_vec();
            assert!(dvg.values().binary_search(&v).is_ok());
        }
    }

    #[test]
    fn zipfian_tail_matches_mass() {
        let n = 1000;
        let theta = 0.99;
        let rate = 0.2;
        let tail = zipfian_tail(n, theta, rate);
        let zeta_n = zeta(n as u64, theta);
        let mass = |from: usize| -> f64 {
            (from..=n)
                .map(|k| 1.0 / (k as f64).powf(theta) / zeta_n)
                .sum()
        };
        // tail is a 0-based index; rank tail + 1 is the first rank of the tail.
        assert!(mass(tail + 1) >= rate - 1e-9);
        assert!(mass(tail + 2) < rate);
    }

    #[test]
    fn zipfian_tail_is_stable() {
        let mut guac = Guacamole::new(8);
        let dvg = DistinctValueGenerator::new(
            200,
            &mut ConstantLength::new(5),
            0.05,
            zipfian(200),
            true,
            &mut guac,
        )
        .unwrap();
        let tail = dvg.zipfian_tail().unwrap();
        let (low, high) = dvg.get(&mut guac);
        let (low, high) = (low.to_vec(), high.to_vec());
        for _ in 0..100 {
            assert_eq!((tail, 199), dvg.get_indices(&mut guac));
            let (l, h) = dvg.get(&mut guac);
            assert_eq!(low, l);
            assert_eq!(high, h);
        }
    }

    #[test]
    fn full_selection_covers_pool() {
        let mut guac = Guacamole::new(8);
        let dvg = DistinctValueGenerator::new(
            50,
            &mut ConstantLength::new(5),
            1.0,
            uniform(50),
            false,
            &mut guac,
        )
        .unwrap();
        assert_eq!((0, 49), dvg.get_indices(&mut guac));
    }

    #[test]
    fn options_build() {
        let options = DistinctValueOptions {
            num_distinct: 64,
            rank_mode: "zipfian".to_string(),
            zipfian_ranges: true,
            ..Default::default()
        };
        let dvg = options.try_build().unwrap();
        assert_eq!(64, dvg.len());
        assert!(dvg.zipfian_tail().is_some());
        let options = DistinctValueOptions {
            length_mode: "exponential".to_string(),
            ..Default::default()
        };
        assert!(options.try_build().is_err());
    }
}
