use std::time::Duration;

use biometrics::{Collector, Counter};
use ratelimit::Ratelimiter;

use ycsbint::Error;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static STALL: Counter = Counter::new("ycsbint_bench.rate_limit.stall");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&STALL);
}

///////////////////////////////////////////// split_rate ///////////////////////////////////////////

/// Split `total` ops/sec into `parts` shares that sum to `total`.  The first `total % parts`
/// shares carry one extra op/sec.  Every share must be at least one op/sec.
pub fn split_rate(total: u64, parts: u64) -> Result<Vec<u64>, Error> {
    if parts == 0 {
        return Err(Error::Configuration {
            what: "cannot split a rate across zero threads".to_string(),
        });
    }
    if total < parts {
        return Err(Error::Configuration {
            what: format!(
                "target throughput {} ops/sec is less than one op/sec for each of {} threads",
                total, parts
            ),
        });
    }
    let (share, extra) = (total / parts, total % parts);
    Ok((0..parts)
        .map(|idx| share + u64::from(idx < extra))
        .collect())
}

/// One limiter for each of `threads` threads, together allowing `total` ops/sec.
pub fn per_thread_limiters(total: u64, threads: u64) -> Result<Vec<RateLimiter>, Error> {
    split_rate(total, threads)?
        .into_iter()
        .map(|rate| RateLimiter::new(rate, 1))
        .collect()
}

/////////////////////////////////////////// RateLimiter ////////////////////////////////////////////

// Refill in nanosecond intervals, adding more than one token per refill above 1M ops/sec.
fn refill(ops_per_sec: u64) -> (u64, Duration) {
    let amount = (ops_per_sec as f64 / 1_000_000.0).ceil() as u64;
    let interval = Duration::from_nanos(1_000_000_000 / (ops_per_sec / amount));
    (amount, interval)
}

fn rate_error(err: ratelimit::Error) -> Error {
    Error::Configuration {
        what: format!("rate limiter: {}", err),
    }
}

/// A token bucket over [ratelimit::Ratelimiter] that paces one operation per token.
pub struct RateLimiter {
    limiter: Ratelimiter,
}

impl RateLimiter {
    /// Allow `ops_per_sec` sustained and `burst` at once.  A zero rate is a configuration error.
    pub fn new(ops_per_sec: u64, burst: u64) -> Result<Self, Error> {
        if ops_per_sec == 0 {
            return Err(Error::Configuration {
                what: "rate limit must be at least one op/sec".to_string(),
            });
        }
        let (amount, interval) = refill(ops_per_sec);
        let max_tokens = burst.max(amount);
        let limiter = Ratelimiter::builder(amount, interval)
            .max_tokens(max_tokens)
            .initial_available(max_tokens)
            .build()
            .map_err(rate_error)?;
        Ok(Self { limiter })
    }

    /// Take one token if one is available now.
    pub fn try_consume(&self) -> bool {
        self.limiter.try_wait().is_ok()
    }

    /// Take one token, sleeping until one is available.
    pub fn consume(&self) {
        while let Err(wait) = self.limiter.try_wait() {
            STALL.click();
            std::thread::sleep(wait);
        }
    }

    /// Change the sustained rate.  Tokens already available are kept.
    pub fn set_rate(&self, ops_per_sec: u64) -> Result<(), Error> {
        if ops_per_sec == 0 {
            return Err(Error::Configuration {
                what: "rate limit must be at least one op/sec".to_string(),
            });
        }
        let (amount, interval) = refill(ops_per_sec);
        if self.limiter.max_tokens() < amount {
            self.limiter.set_max_tokens(amount).map_err(rate_error)?;
        }
        self.limiter.set_refill_interval(interval).map_err(rate_error)?;
        self.limiter.set_refill_amount(amount).map_err(rate_error)?;
        Ok(())
    }

    /// The sustained rate in ops/sec.
    pub fn rate(&self) -> u64 {
        let nanos = self.limiter.refill_interval().as_nanos() as u64;
        self.limiter.refill_amount() * (1_000_000_000 / nanos.max(1))
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RateLimiter")
            .field("rate", &self.rate())
            .field("max_tokens", &self.limiter.max_tokens())
            .finish()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
