//! Monotonic 64-bit ids for chat messages.
//!
//! Every server instance owns a distinct worker id, so ids minted on different
//! instances never collide and still sort by creation time. History pagination
//! relies on that ordering.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

/// 2026-01-01T00:00:00Z in milliseconds since the Unix epoch.
const READALONG_EPOCH_MS: u64 = 1_767_225_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_WORKER_ID: u64 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnowflakeError {
    WorkerIdOutOfRange(u16),
}

impl fmt::Display for SnowflakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerIdOutOfRange(id) => {
                write!(f, "worker id {id} does not fit in {WORKER_BITS} bits (max {MAX_WORKER_ID})")
            }
        }
    }
}

impl std::error::Error for SnowflakeError {}

struct Clock {
    last_ms: u64,
    sequence: u64,
}

/// Snowflake generator.
///
/// Layout (MSB → LSB): 42 bits of milliseconds since the readalong epoch,
/// 10 bits of worker id, 12 bits of per-millisecond sequence.
///
/// If the wall clock steps backwards the generator keeps counting from the
/// last millisecond it issued, so ids stay strictly increasing per worker.
pub struct SnowflakeGenerator {
    worker_id: u64,
    clock: Mutex<Clock>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Result<Self, SnowflakeError> {
        if u64::from(worker_id) > MAX_WORKER_ID {
            return Err(SnowflakeError::WorkerIdOutOfRange(worker_id));
        }
        Ok(Self {
            worker_id: u64::from(worker_id),
            clock: Mutex::new(Clock {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    pub fn generate(&self) -> i64 {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);

        let now_ms = current_ms().max(clock.last_ms);
        if now_ms == clock.last_ms {
            clock.sequence = (clock.sequence + 1) & SEQUENCE_MASK;
            if clock.sequence == 0 {
                // Sequence exhausted: borrow the next millisecond.
                clock.last_ms += 1;
            }
        } else {
            clock.last_ms = now_ms;
            clock.sequence = 0;
        }

        let ts = clock.last_ms.saturating_sub(READALONG_EPOCH_MS);
        ((ts << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | clock.sequence)
            as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(READALONG_EPOCH_MS)
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_created_at(id: i64) -> DateTime<Utc> {
    let ms = ((id as u64) >> (WORKER_BITS + SEQUENCE_BITS)) + READALONG_EPOCH_MS;
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}
