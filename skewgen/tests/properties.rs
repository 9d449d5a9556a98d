use proptest::prelude::*;

use guacamole::Guacamole;

use skewgen::{ConstantLength, DistinctValueGenerator, UniformLength, UniformRank};

fn uniform_generator(n: usize, rate: f64, seed: u64) -> DistinctValueGenerator {
    let mut guac = Guacamole::new(seed);
    let mut length = UniformLength::new(1, 12).unwrap();
    DistinctValueGenerator::new(
        n,
        &mut length,
        rate,
        Some(Box::new(UniformRank::new(n as u64).unwrap())),
        false,
        &mut guac,
    )
    .unwrap()
}

proptest! {
    #[test]
    fn uniform_ranges_stay_in_bounds(n in 1usize..2_000, rate in 0.0001f64..=1.0, seed: u64) {
        let dvg = uniform_generator(n, rate, seed);
        let mut guac = Guacamole::new(seed.wrapping_add(1));
        for _ in 0..32 {
            let (low, high) = dvg.get_indices(&mut guac);
            prop_assert!(low <= high);
            prop_assert!(high < n);
            // one rounding unit at each end, plus the clamp at n - 1
            let width = (high - low) as f64 / n as f64;
            prop_assert!(width <= rate + 2.0 / n as f64);
            if (rate * n as f64) < (n - 1) as f64 {
                prop_assert!(width >= rate - 2.0 / n as f64);
            }
            let (lv, hv) = dvg.get(&mut Guacamole::new(0));
            prop_assert!(lv <= hv);
        }
    }

    #[test]
    fn pool_values_are_distinct(n in 1usize..2_000, seed: u64) {
        let dvg = uniform_generator(n, 0.5, seed);
        prop_assert_eq!(n, dvg.len());
        for w in dvg.values().windows(2) {
            prop_assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn same_seed_same_pool(n in 1usize..500, seed: u64) {
        let lhs = uniform_generator(n, 0.5, seed);
        let rhs = uniform_generator(n, 0.5, seed);
        prop_assert_eq!(lhs.values(), rhs.values());
    }
}

#[test]
fn different_seeds_differ() {
    let mut length = ConstantLength::new(12);
    let lhs = DistinctValueGenerator::new(
        100,
        &mut length,
        0.1,
        Some(Box::new(UniformRank::new(100).unwrap())),
        false,
        &mut Guacamole::new(1),
    )
    .unwrap();
    let rhs = DistinctValueGenerator::new(
        100,
        &mut length,
        0.1,
        Some(Box::new(UniformRank::new(100).unwrap())),
        false,
        &mut Guacamole::new(2),
    )
    .unwrap();
    assert_ne!(lhs.values(), rhs.values());
}
