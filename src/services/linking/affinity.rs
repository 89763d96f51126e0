//! Learned vendor-affinity cache.
//!
//! Process-wide read-through cache keyed by vendor hash. Readers take no
//! global lock; writers go through the shard entry with a short critical
//! section. The backing signal is the count of accepted/changed link
//! decisions per `(vendor, object_type)`, normalized per vendor: the
//! vendor's most-confirmed object type always earns the full cap, lesser
//! types scale down relative to it.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::services::database::SearchDatabase;

use super::score::VENDOR_AFFINITY_CAP;

#[derive(Default)]
pub struct VendorAffinityCache {
    /// Raw accept/change counts per object type, keyed by vendor hash.
    inner: DashMap<String, HashMap<String, i64>>,
}

impl VendorAffinityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Affinity bonuses per object type for one vendor, loading the decision
    /// counts on first sight of the hash.
    pub async fn bonuses_for(
        &self,
        db: &Arc<dyn SearchDatabase>,
        yacht_id: Uuid,
        vendor_hash: &str,
    ) -> HashMap<String, i32> {
        if let Some(entry) = self.inner.get(vendor_hash) {
            return normalize(entry.value());
        }

        let counts: HashMap<String, i64> = match db
            .vendor_accept_counts(yacht_id, vendor_hash)
            .await
        {
            Ok(counts) => counts.into_iter().collect(),
            Err(e) => {
                tracing::debug!("vendor affinity load failed for {vendor_hash}: {e}");
                HashMap::new()
            },
        };

        let bonuses = normalize(&counts);
        self.inner.insert(vendor_hash.to_string(), counts);
        bonuses
    }

    /// Bump the count after an accepted or changed decision.
    pub fn record_accept(&self, vendor_hash: &str, object_type: &str) {
        let mut entry = self.inner.entry(vendor_hash.to_string()).or_default();
        *entry.entry(object_type.to_string()).or_insert(0) += 1;
    }

    /// Drop a vendor's cached counts (used when decisions are unwound).
    pub fn invalidate(&self, vendor_hash: &str) {
        self.inner.remove(vendor_hash);
    }
}

/// Normalize raw counts to the point scale: each object type scores
/// `min(cap, cap * count / max_count)`, so the vendor's dominant type gets
/// the full cap and the rest scale down proportionally.
fn normalize(counts: &HashMap<String, i64>) -> HashMap<String, i32> {
    let max_count = counts.values().copied().max().unwrap_or(0);
    if max_count <= 0 {
        return HashMap::new();
    }

    counts
        .iter()
        .map(|(object_type, count)| {
            let scaled = i64::from(VENDOR_AFFINITY_CAP) * count / max_count;
            let bonus = i32::try_from(scaled).unwrap_or(VENDOR_AFFINITY_CAP).min(VENDOR_AFFINITY_CAP);
            (object_type.clone(), bonus)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonuses_scale_relative_to_the_dominant_type() {
        let counts: HashMap<String, i64> =
            [("work_order".to_string(), 10), ("part".to_string(), 2)].into_iter().collect();
        let bonuses = normalize(&counts);
        assert_eq!(bonuses.get("work_order"), Some(&VENDOR_AFFINITY_CAP));
        assert_eq!(bonuses.get("part"), Some(&3));
    }

    #[test]
    fn single_type_always_earns_the_cap() {
        let counts: HashMap<String, i64> = [("work_order".to_string(), 1)].into_iter().collect();
        assert_eq!(normalize(&counts).get("work_order"), Some(&VENDOR_AFFINITY_CAP));
    }

    #[test]
    fn empty_counts_yield_no_bonuses() {
        assert!(normalize(&HashMap::new()).is_empty());
    }

    #[test]
    fn accepts_accumulate_counts() {
        let cache = VendorAffinityCache::new();
        for _ in 0..4 {
            cache.record_accept("hash-a", "work_order");
        }
        cache.record_accept("hash-a", "part");

        let entry = cache.inner.get("hash-a").unwrap();
        assert_eq!(entry.get("work_order"), Some(&4));
        assert_eq!(entry.get("part"), Some(&1));

        let bonuses = normalize(entry.value());
        assert_eq!(bonuses.get("work_order"), Some(&VENDOR_AFFINITY_CAP));
        assert_eq!(bonuses.get("part"), Some(&3));
    }

    #[test]
    fn invalidate_clears_vendor() {
        let cache = VendorAffinityCache::new();
        cache.record_accept("hash-b", "part");
        cache.invalidate("hash-b");
        assert!(cache.inner.get("hash-b").is_none());
    }
}
