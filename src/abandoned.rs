//! Abandonment Detector (spec §4.5 — component C5).
//!
//! The scan itself is pure and synchronous so it can run under the pool's
//! primary lock without awaiting anything; [`crate::single::SinglePool`]
//! wraps it with the factory/event/log side effects that need the
//! instance the scan cannot see (it has moved out to the caller, per the
//! Open Question noted in the design ledger).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::record::RecordMeta;

/// Walk `allocated`, marking every record whose last use predates `now -
/// timeout` as `Abandoned` (spec §4.5 step 1). Returns the reclaimed
/// `(id, meta)` pairs for the caller to log/emit/count; entries stay in
/// `allocated` (now `Abandoned`) so a later legitimate return or
/// invalidate is recognized as a no-op rather than an unknown id.
pub(crate) fn scan_for_abandoned(
    allocated: &mut HashMap<u64, RecordMeta>,
    now: Instant,
    timeout: Duration,
) -> Vec<(u64, RecordMeta)> {
    let mut reclaimed = Vec::new();
    for (&id, meta) in allocated.iter_mut() {
        if meta.since_last_use(now) > timeout && meta.mark_abandoned() {
            reclaimed.push((id, meta.clone()));
        }
    }
    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PooledObject;
    use std::thread::sleep;

    fn allocated_meta() -> RecordMeta {
        let mut rec = PooledObject::new(());
        rec.allocate(Instant::now()).unwrap();
        rec.split().1
    }

    #[test]
    fn records_past_timeout_are_reclaimed() {
        let mut map = HashMap::new();
        map.insert(1, allocated_meta());
        sleep(Duration::from_millis(10));

        let reclaimed = scan_for_abandoned(&mut map, Instant::now(), Duration::from_millis(5));
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].0, 1);
        assert_eq!(map.get(&1).unwrap().state, crate::record::State::Abandoned);
    }

    #[test]
    fn records_within_timeout_are_left_alone() {
        let mut map = HashMap::new();
        map.insert(1, allocated_meta());

        let reclaimed = scan_for_abandoned(&mut map, Instant::now(), Duration::from_secs(60));
        assert!(reclaimed.is_empty());
        assert_eq!(map.get(&1).unwrap().state, crate::record::State::Allocated);
    }

    #[test]
    fn already_abandoned_records_are_not_reclaimed_twice() {
        let mut map = HashMap::new();
        map.insert(1, allocated_meta());
        sleep(Duration::from_millis(10));

        let first = scan_for_abandoned(&mut map, Instant::now(), Duration::from_millis(5));
        assert_eq!(first.len(), 1);
        let second = scan_for_abandoned(&mut map, Instant::now(), Duration::from_millis(5));
        assert!(second.is_empty());
    }

    #[test]
    fn multiple_records_are_all_scanned() {
        let mut map = HashMap::new();
        for i in 0..5 {
            map.insert(i, allocated_meta());
        }
        sleep(Duration::from_millis(10));
        let reclaimed = scan_for_abandoned(&mut map, Instant::now(), Duration::from_millis(5));
        assert_eq!(reclaimed.len(), 5);
    }
}
