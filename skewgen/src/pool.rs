use biometrics::{Collector, Counter};
use guacamole::Guacamole;

use super::{draw_block, Error, BLOCK_SIZE};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static RESET: Counter = Counter::new("skewgen.pool.reset");

pub(crate) fn register_biometrics(collector: &Collector) {
    collector.register_counter(&RESET);
}

////////////////////////////////////////// RandomValuePool /////////////////////////////////////////

/// A fixed table of printable six-byte blocks that cycles byte by byte.
///
/// The pool spends one random draw per block rather than one per output byte.  It belongs to a
/// single worker; construct one per thread.
#[derive(Clone, Debug)]
pub struct RandomValuePool {
    blocks: Vec<[u8; BLOCK_SIZE]>,
    slot: usize,
    offset: usize,
}

impl RandomValuePool {
    /// Fill `count` blocks from `guac`.
    pub fn new(count: usize, guac: &mut Guacamole) -> Result<Self, Error> {
        if count == 0 {
            return Err(Error::InvalidParameter {
                what: "random value pool needs at least one block".to_string(),
            });
        }
        let blocks = (0..count).map(|_| draw_block(guac)).collect();
        Ok(Self {
            blocks,
            slot: 0,
            offset: 0,
        })
    }

    /// The number of blocks in the pool.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// A pool is never empty; see [RandomValuePool::new].
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Return the next byte of the current block, wrapping within the block.
    pub fn next(&mut self) -> u8 {
        let byte = self.blocks[self.slot][self.offset];
        self.offset = (self.offset + 1) % BLOCK_SIZE;
        byte
    }

    /// Return the byte most recently returned by `next` and rewind to the start of the block.
    pub fn last(&mut self) -> u8 {
        let byte = self.blocks[self.slot][(self.offset + BLOCK_SIZE - 1) % BLOCK_SIZE];
        self.offset = 0;
        byte
    }

    /// Move to the next block and rewind to its start.
    pub fn reset(&mut self) {
        RESET.click();
        self.offset = 0;
        self.slot = (self.slot + 1) % self.blocks.len();
    }

    /// Fill `buf` by calling `next` once per byte.
    pub fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.next();
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_within_block() {
        let mut guac = Guacamole::new(99);
        let mut pool = RandomValuePool::new(4, &mut guac).unwrap();
        let first: Vec<u8> = (0..BLOCK_SIZE).map(|_| pool.next()).collect();
        let again: Vec<u8> = (0..BLOCK_SIZE).map(|_| pool.next()).collect();
        assert_eq!(first, again);
        assert_eq!(first[BLOCK_SIZE - 1], pool.last());
        assert_eq!(first[0], pool.next());
    }

    #[test]
    fn reset_advances_and_wraps() {
        let mut guac = Guacamole::new(1234);
        let mut pool = RandomValuePool::new(3, &mut guac).unwrap();
        let mut blocks = vec![];
        for _ in 0..4 {
            pool.next();
            pool.reset();
            let mut buf = [0u8; BLOCK_SIZE];
            pool.fill(&mut buf);
            blocks.push(buf);
        }
        // three slots, so the fourth draw matches the first
        assert_eq!(blocks[0], blocks[3]);
    }

    #[test]
    fn deterministic() {
        let mut a = RandomValuePool::new(16, &mut Guacamole::new(5)).unwrap();
        let mut b = RandomValuePool::new(16, &mut Guacamole::new(5)).unwrap();
        let mut x = [0u8; 64];
        let mut y = [0u8; 64];
        a.fill(&mut x);
        b.fill(&mut y);
        assert_eq!(x, y);
    }

    #[test]
    fn empty_is_an_error() {
        assert!(RandomValuePool::new(0, &mut Guacamole::new(0)).is_err());
    }
}
