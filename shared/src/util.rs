use std::sync::atomic::{AtomicI64, Ordering};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random start, then monotonic within the process
///
/// Ids handed out by one process are strictly increasing, so a burst of
/// inserts within the same millisecond never collides.
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let ts = (now_millis() - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x800); // 11 bits, leaves headroom
    let candidate = (ts << 12) | rand_bits;

    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = candidate.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_ids_are_unique_in_a_burst() {
        let ids: Vec<i64> = (0..10_000).map(|_| snowflake_id()).collect();
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert!(ids.iter().all(|id| *id > 0 && *id < (1i64 << 53)));
    }
}
