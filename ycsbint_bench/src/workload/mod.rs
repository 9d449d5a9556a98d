use biometrics::Collector;

pub mod ycsb;

pub use ycsb::{build_key, CoreWorkload, WorkloadOptions};

pub fn register_biometrics(collector: &Collector) {
    ycsb::register_biometrics(collector);
}
