//! Version vectors for detecting concurrent edits.
//!
//! Timestamps order writes, but they cannot tell a stale overwrite apart from
//! two devices editing the same record without seeing each other. A version
//! vector counts, per device, the writes incorporated into a value. Two
//! vectors where neither dominates the other mark concurrent versions.

use crate::{resolve::ConflictResolver, DeviceId, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Causal relationship between two version vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    /// Identical counters in every dimension
    Equal,
    /// `self` happened before `other`
    Before,
    /// `self` is a successor of `other`
    After,
    /// Neither dominates the other
    Concurrent,
}

/// Mapping from device id to a monotonically increasing write counter.
///
/// Backed by a `BTreeMap` so serialized vectors are deterministic. A missing
/// device reads as zero, and zero entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<DeviceId, u64>);

impl VersionVector {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Counter for a device, zero when absent.
    pub fn get(&self, device_id: &str) -> u64 {
        self.0.get(device_id).copied().unwrap_or(0)
    }

    /// Set a device's counter. Setting zero removes the entry.
    pub fn set(&mut self, device_id: impl Into<DeviceId>, counter: u64) {
        let device_id = device_id.into();
        if counter == 0 {
            self.0.remove(&device_id);
        } else {
            self.0.insert(device_id, counter);
        }
    }

    /// Increment a device's counter by one and return the new value.
    pub fn increment(&mut self, device_id: impl Into<DeviceId>) -> u64 {
        let counter = self.0.entry(device_id.into()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Pointwise maximum with another vector, in place.
    pub fn merge(&mut self, other: &VersionVector) {
        for (device_id, &counter) in &other.0 {
            let entry = self.0.entry(device_id.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Pointwise maximum of two vectors.
    pub fn merged(&self, other: &VersionVector) -> VersionVector {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// True iff `self` dominates `other`: at least as large in every
    /// dimension of `other` and strictly larger in at least one dimension,
    /// counting dimensions only `self` has.
    pub fn is_successor(&self, other: &VersionVector) -> bool {
        let covers = other
            .0
            .iter()
            .all(|(device_id, &counter)| self.get(device_id) >= counter);
        let exceeds = self
            .0
            .iter()
            .any(|(device_id, &counter)| counter > other.get(device_id));
        covers && exceeds
    }

    /// Classify the causal relationship of `self` relative to `other`.
    pub fn compare(&self, other: &VersionVector) -> Causality {
        if self.is_successor(other) {
            Causality::After
        } else if other.is_successor(self) {
            Causality::Before
        } else if self == other {
            Causality::Equal
        } else {
            Causality::Concurrent
        }
    }

    /// Number of devices with a non-zero counter.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(device_id, counter)` pairs in device order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &u64)> {
        self.0.iter()
    }

    pub(crate) fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(*v)))
                .collect(),
        )
    }
}

impl<D: Into<DeviceId>> FromIterator<(D, u64)> for VersionVector {
    fn from_iter<I: IntoIterator<Item = (D, u64)>>(iter: I) -> Self {
        let mut vector = VersionVector::new();
        for (device_id, counter) in iter {
            vector.set(device_id, counter);
        }
        vector
    }
}

/// True iff `v1` is a successor of `v2`.
pub fn is_successor(v1: &VersionVector, v2: &VersionVector) -> bool {
    v1.is_successor(v2)
}

/// True iff the two records carry incomparable (concurrent) version vectors.
pub fn has_conflict(r1: &Record, r2: &Record) -> bool {
    let (v1, v2) = (r1.version_vector(), r2.version_vector());
    !v1.is_successor(&v2) && !v2.is_successor(&v1)
}

/// Fold one incoming write into the stored version of a record.
///
/// The writing device's counter becomes one more than the larger of the
/// incoming and stored counters, so it counts every write the device made
/// even when the client did not send its vector back. Concurrent versions
/// go through `resolver`; otherwise the successor's value is kept. The stored
/// vector is always the pointwise maximum of both sides.
///
/// A resolver failure keeps the stored value.
pub fn merge_write(
    existing: Option<&Record>,
    mut incoming: Record,
    device_id: &str,
    resolver: &dyn ConflictResolver,
) -> Record {
    let stored_vector = existing.map(Record::version_vector).unwrap_or_default();
    let mut incoming_vector = incoming.version_vector();
    let next = incoming_vector.get(device_id).max(stored_vector.get(device_id)) + 1;
    incoming_vector.set(device_id, next);
    incoming.set_version_vector(&incoming_vector);

    let Some(stored) = existing else {
        return incoming;
    };

    let merged = stored_vector.merged(&incoming_vector);
    let mut winner = match incoming_vector.compare(&stored_vector) {
        Causality::Concurrent => match resolver.resolve(stored, &incoming) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(
                    record_id = %stored.id,
                    device_id,
                    error = %err,
                    "Resolver failed on concurrent write, keeping stored version"
                );
                stored.clone()
            }
        },
        Causality::Before => stored.clone(),
        Causality::After | Causality::Equal => incoming,
    };
    winner.set_version_vector(&merged);
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LastWriteWins, ResolveError};
    use chrono::Duration;
    use serde_json::json;

    fn vv(pairs: &[(&str, u64)]) -> VersionVector {
        pairs.iter().map(|(d, c)| (d.to_string(), *c)).collect()
    }

    fn record_with(vector: &VersionVector, value: i64, offset_secs: i64) -> Record {
        let mut record = Record::new("r1", "counter", json!({ "value": value }))
            .updated_at(crate::epoch() + Duration::seconds(offset_secs));
        record.set_version_vector(vector);
        record
    }

    #[test]
    fn missing_device_reads_zero() {
        let vector = VersionVector::new();
        assert_eq!(vector.get("device-a"), 0);
    }

    #[test]
    fn increment_starts_at_one() {
        let mut vector = VersionVector::new();
        assert_eq!(vector.increment("device-a"), 1);
        assert_eq!(vector.increment("device-a"), 2);
        assert_eq!(vector.len(), 1);
    }

    #[test]
    fn successor_requires_strict_growth() {
        let a = vv(&[("a", 2), ("b", 1)]);
        let b = vv(&[("a", 1), ("b", 1)]);
        assert!(a.is_successor(&b));
        assert!(!b.is_successor(&a));
        assert!(!a.is_successor(&a));
    }

    #[test]
    fn successor_counts_extra_dimensions() {
        let a = vv(&[("a", 1), ("b", 1)]);
        let b = vv(&[("a", 1)]);
        assert!(a.is_successor(&b));
        assert!(is_successor(&a, &VersionVector::new()));
    }

    #[test]
    fn compare_classifies() {
        let a = vv(&[("a", 1)]);
        let b = vv(&[("b", 1)]);
        assert_eq!(a.compare(&b), Causality::Concurrent);
        assert_eq!(a.compare(&a.clone()), Causality::Equal);
        assert_eq!(a.compare(&a.merged(&b)), Causality::Before);
        assert_eq!(a.merged(&b).compare(&a), Causality::After);
    }

    #[test]
    fn merge_takes_pointwise_max() {
        let mut a = vv(&[("a", 3), ("b", 1)]);
        a.merge(&vv(&[("b", 4), ("c", 2)]));
        assert_eq!(a, vv(&[("a", 3), ("b", 4), ("c", 2)]));
    }

    #[test]
    fn has_conflict_on_records() {
        let left = record_with(&vv(&[("a", 1)]), 1, 0);
        let right = record_with(&vv(&[("b", 1)]), 2, 0);
        assert!(has_conflict(&left, &right));

        let newer = record_with(&vv(&[("a", 1), ("b", 1)]), 3, 0);
        assert!(!has_conflict(&left, &newer));
    }

    #[test]
    fn equal_vectors_conflict() {
        let left = record_with(&vv(&[("a", 1)]), 1, 0);
        let right = record_with(&vv(&[("a", 1)]), 2, 0);
        assert!(has_conflict(&left, &right));
    }

    #[test]
    fn serialization_is_a_plain_map() {
        let vector = vv(&[("b", 2), ("a", 1)]);
        let json = serde_json::to_string(&vector).unwrap();
        assert_eq!(json, r#"{"a":1,"b":2}"#);
        assert_eq!(vector.to_value(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_write_first_write_counts_one() {
        let incoming = Record::new("r1", "t", json!({}));
        let stored = merge_write(None, incoming, "device-a", &LastWriteWins);
        assert_eq!(stored.version_vector(), vv(&[("device-a", 1)]));
    }

    #[test]
    fn merge_write_counts_from_stored_vector() {
        let stored = record_with(&vv(&[("a", 1)]), 1, 0);
        let incoming = record_with(&VersionVector::new(), 2, 10);

        let out = merge_write(Some(&stored), incoming, "a", &LastWriteWins);
        assert_eq!(out.version_vector(), vv(&[("a", 2)]));
        assert_eq!(out.data["value"], 2);
    }

    #[test]
    fn merge_write_concurrent_uses_resolver() {
        // b never saw a's write and writes with an older timestamp
        let stored = record_with(&vv(&[("a", 1)]), 1, 20);
        let incoming = record_with(&VersionVector::new(), 2, 10);

        let out = merge_write(Some(&stored), incoming, "b", &LastWriteWins);
        assert_eq!(out.data["value"], 1);
        assert_eq!(out.version_vector(), vv(&[("a", 1), ("b", 1)]));
    }

    #[test]
    fn merge_write_successor_overrides_older_timestamp() {
        // incoming saw the stored write, so it wins even with an older clock
        let stored = record_with(&vv(&[("a", 1)]), 1, 20);
        let incoming = record_with(&vv(&[("a", 1)]), 2, 10);

        let out = merge_write(Some(&stored), incoming, "b", &LastWriteWins);
        assert_eq!(out.data["value"], 2);
        assert_eq!(out.version_vector(), vv(&[("a", 1), ("b", 1)]));
    }

    #[test]
    fn merge_write_resolver_failure_keeps_stored() {
        let failing = |_: &Record, incoming: &Record| -> Result<Record, ResolveError> {
            Err(ResolveError::new(&incoming.id, "manual review"))
        };
        let stored = record_with(&vv(&[("a", 1)]), 1, 0);
        let incoming = record_with(&VersionVector::new(), 2, 10);

        let out = merge_write(Some(&stored), incoming, "b", &failing);
        assert_eq!(out.data["value"], 1);
        assert_eq!(out.version_vector(), vv(&[("a", 1), ("b", 1)]));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_vector() -> impl Strategy<Value = VersionVector> {
            proptest::collection::btree_map(
                prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())],
                0u64..4,
                0..4,
            )
            .prop_map(|map| map.into_iter().collect())
        }

        proptest! {
            #[test]
            fn prop_conflict_is_symmetric(a in arb_vector(), b in arb_vector()) {
                let left = record_with(&a, 1, 0);
                let right = record_with(&b, 2, 0);
                prop_assert_eq!(has_conflict(&left, &right), has_conflict(&right, &left));
            }

            #[test]
            fn prop_successor_is_antisymmetric(a in arb_vector(), b in arb_vector()) {
                prop_assert!(!(a.is_successor(&b) && b.is_successor(&a)));
            }

            #[test]
            fn prop_merge_dominates_both(a in arb_vector(), b in arb_vector()) {
                let m = a.merged(&b);
                prop_assert!(m == a || m.is_successor(&a));
                prop_assert!(m == b || m.is_successor(&b));
            }

            #[test]
            fn prop_writer_counter_tracks_write_count(
                writers in proptest::collection::vec(0usize..3, 1..40),
            ) {
                let devices = ["a", "b", "c"];
                let mut counts = [0u64; 3];
                let mut stored: Option<Record> = None;

                for (i, w) in writers.into_iter().enumerate() {
                    counts[w] += 1;
                    let incoming = Record::new("r1", "t", json!({ "i": i }))
                        .updated_at(crate::epoch() + Duration::seconds(i as i64));
                    let next = merge_write(stored.as_ref(), incoming, devices[w], &LastWriteWins);

                    let vector = next.version_vector();
                    prop_assert_eq!(vector.get(devices[w]), counts[w]);
                    if let Some(prev) = &stored {
                        for d in devices {
                            prop_assert!(vector.get(d) >= prev.version_vector().get(d));
                        }
                    }
                    stored = Some(next);
                }
            }
        }
    }
}
