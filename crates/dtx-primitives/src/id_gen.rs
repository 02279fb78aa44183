//! Snowflake-style transaction id generator
//!
//! Layout of a generated id (most significant bit first):
//!
//! ```text
//! +---+----------------------+-----------------+-----------------+
//! | 0 | millis since epoch   | reserved (10)   | sequence (13)   |
//! +---+----------------------+-----------------+-----------------+
//! ```
//!
//! The epoch is 2017-01-01 00:00 at UTC+8.

use crate::ids::TxnId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of reserved bits between the timestamp and the sequence
pub const RESERVED_BITS: u32 = 10;

/// Number of bits of the per-millisecond sequence
pub const COUNTER_BITS: u32 = 13;

/// Epoch of the timestamp field, in unix milliseconds
pub const DTX_EPOCH_MS: u64 = 1_483_200_000_000;

const COUNTER_MAX: u64 = (1 << COUNTER_BITS) - 1;
const TIMESTAMP_SHIFT: u32 = RESERVED_BITS + COUNTER_BITS;

/// Source of wall-clock time for the generator
pub trait Clock: Send + Sync {
    /// Current unix time in milliseconds
    fn now_millis(&self) -> u64;

    /// Block the calling thread
    fn sleep(&self, duration: Duration);
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug)]
struct GeneratorState {
    last_millis: u64,
    counter: u64,
}

/// Monotonic 64-bit id generator
pub struct UniqueIdGenerator {
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl UniqueIdGenerator {
    /// Create a generator using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a generator with a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(GeneratorState {
                last_millis: 0,
                counter: 0,
            }),
        }
    }

    /// Produce the next id
    ///
    /// Ids are strictly increasing. When the sequence of the current
    /// millisecond is exhausted the call spins until the clock advances; when
    /// the clock runs backwards it sleeps until the last used millisecond.
    pub fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        let mut now = self.clock.now_millis();

        if now < state.last_millis {
            self.clock
                .sleep(Duration::from_millis(state.last_millis - now));
            now = self.clock.now_millis().max(state.last_millis);
        }

        if now == state.last_millis {
            state.counter += 1;
            if state.counter > COUNTER_MAX {
                while now <= state.last_millis {
                    std::hint::spin_loop();
                    now = self.clock.now_millis();
                }
                state.counter = 0;
            }
        } else {
            state.counter = 0;
        }

        state.last_millis = now;
        Self::make_id(now, state.counter)
    }

    /// Produce the next id as a transaction id
    pub fn next_txn_id(&self) -> TxnId {
        TxnId::new(self.next_id())
    }

    /// Assemble an id from a unix millisecond timestamp and a sequence
    pub fn make_id(millis: u64, sequence: u64) -> u64 {
        (millis.saturating_sub(DTX_EPOCH_MS) << TIMESTAMP_SHIFT) | (sequence & COUNTER_MAX)
    }

    /// Unix millisecond timestamp encoded in an id
    pub fn timestamp_of(id: u64) -> u64 {
        (id >> TIMESTAMP_SHIFT) + DTX_EPOCH_MS
    }

    /// Per-millisecond sequence encoded in an id
    pub fn sequence_of(id: u64) -> u64 {
        id & COUNTER_MAX
    }
}

impl Default for UniqueIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
