use std::time::Duration;

use tokio::sync::Mutex;

/// Standard Twitter epoch, 2010-11-04T01:42:54.657Z.
pub const DEFAULT_EPOCH_MS: i64 = 1_288_834_974_657;

const WORKER_SHIFT: u8 = 12;
const TIMESTAMP_SHIFT: u8 = 22;
const MAX_SEQUENCE: u16 = 0xFFF;
const MAX_WORKER_ID: u16 = 0x3FF;

struct ClockState {
    last_ms: i64,
    sequence: u16,
}

/// Monotonic 64-bit ID generator.
///
/// Layout: 1 reserved sign bit (0), 41 bits of milliseconds since the epoch,
/// 10 bits of worker identity, 12 bits of intra-millisecond sequence. IDs
/// from one instance are strictly increasing; sequence overflow and
/// wall-clock regressions both stall until the clock moves forward.
pub struct SnowflakeGenerator {
    epoch_ms: i64,
    worker_id: u16,
    state: Mutex<ClockState>,
}

impl SnowflakeGenerator {
    pub fn new(epoch_ms: i64, worker_id: u16) -> Self {
        Self {
            epoch_ms,
            worker_id: worker_id & MAX_WORKER_ID,
            state: Mutex::new(ClockState {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn with_default_epoch() -> Self {
        Self::new(DEFAULT_EPOCH_MS, 0)
    }

    /// Generate the next ID. Exactly one `generate` makes progress at a
    /// time; the mutex serializes concurrent callers.
    pub async fn generate(&self) -> i64 {
        let mut state = self.state.lock().await;
        loop {
            let now = now_ms();

            if now < state.last_ms {
                // NTP stepped the clock backwards; wait it out.
                let behind = (state.last_ms - now) as u64;
                tokio::time::sleep(Duration::from_millis(behind.max(1))).await;
                continue;
            }

            if now == state.last_ms {
                if state.sequence >= MAX_SEQUENCE {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    continue;
                }
                state.sequence += 1;
            } else {
                state.last_ms = now;
                state.sequence = 0;
            }

            let elapsed = state.last_ms - self.epoch_ms;
            return (elapsed << TIMESTAMP_SHIFT)
                | ((self.worker_id as i64) << WORKER_SHIFT)
                | state.sequence as i64;
        }
    }

    /// Recover the wall-clock millisecond an ID was minted at.
    pub fn timestamp_of(&self, id: i64) -> i64 {
        (id >> TIMESTAMP_SHIFT) + self.epoch_ms
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let gen = SnowflakeGenerator::with_default_epoch();
        let mut previous = 0i64;
        for _ in 0..10_000 {
            let id = gen.generate().await;
            assert!(id > previous, "{id} should exceed {previous}");
            previous = id;
        }
    }

    #[tokio::test]
    async fn ids_are_positive() {
        let gen = SnowflakeGenerator::with_default_epoch();
        let id = gen.generate().await;
        assert!(id > 0);
    }

    #[tokio::test]
    async fn timestamp_is_recoverable() {
        let gen = SnowflakeGenerator::with_default_epoch();
        let before = now_ms();
        let id = gen.generate().await;
        let after = now_ms();

        let minted = gen.timestamp_of(id);
        assert!(minted >= before && minted <= after);
    }

    #[tokio::test]
    async fn worker_bits_land_in_the_middle() {
        let gen = SnowflakeGenerator::new(DEFAULT_EPOCH_MS, 0x2A5);
        let id = gen.generate().await;
        assert_eq!((id >> 12) & 0x3FF, 0x2A5);
    }

    #[tokio::test]
    async fn concurrent_callers_never_collide() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let gen = Arc::new(SnowflakeGenerator::with_default_epoch());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gen = gen.clone();
                tokio::spawn(async move {
                    let mut ids = Vec::with_capacity(500);
                    for _ in 0..500 {
                        ids.push(gen.generate().await);
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            for id in task.await.unwrap() {
                assert!(seen.insert(id), "duplicate snowflake {id}");
            }
        }
        assert_eq!(seen.len(), 4_000);
    }
}
