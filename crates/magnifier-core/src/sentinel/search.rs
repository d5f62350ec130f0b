//! The sentinel search itself.
//!
//! Grounded on `original_source/simulations/common/find_sentinels.py`'s
//! `Sentinel.sentinel_search`: sweep prefix lengths from widest to
//! narrowest, and at each length group not-yet-matched records by their
//! masked prefix. A group is accepted as a sentinel once the number of
//! distinct ingress routers observed within it is at most `num_stop`
//! (always `1` in current use: a sentinel must point unambiguously at one
//! router). Matched records are excluded from every subsequent, narrower
//! length, which is what guarantees the output set is pairwise-disjoint
//! and as wide (maximal) as possible.

use std::collections::HashMap;

use crate::ip::{mask, Prefix};
use crate::store::PacketRecord;
use crate::MAX_BORDER_ROUTERS;

use super::{Sentinel, SentinelSet};

/// A fixed-size bitset over ingress indices, sized for
/// [`MAX_BORDER_ROUTERS`]. A hand-rolled array beats pulling in a crate
/// since the domain size is small and known at compile time.
#[derive(Debug, Clone, Copy)]
struct IngressBitset {
    words: [u32; MAX_BORDER_ROUTERS / 32],
}

impl IngressBitset {
    fn empty() -> Self {
        IngressBitset {
            words: [0; MAX_BORDER_ROUTERS / 32],
        }
    }

    fn insert(&mut self, ingress: u16) {
        let idx = ingress as usize;
        self.words[idx / 32] |= 1 << (idx % 32);
    }

    fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The sole set bit's index, valid only when `count() == 1`.
    fn single(&self) -> u16 {
        for (word_idx, word) in self.words.iter().enumerate() {
            if *word != 0 {
                return (word_idx * 32 + word.trailing_zeros() as usize) as u16;
            }
        }
        unreachable!("single() called on an empty bitset")
    }
}

/// Runs the sentinel search over `records`, considering prefix lengths from
/// `s_start` (widest, smallest length) through `s_end` (narrowest, largest
/// length) inclusive. `num_stop` is the maximum number of distinct
/// ingresses a group may show and still be accepted (the simulator always
/// passes `1`).
///
/// # Panics
/// Panics if `s_start > s_end` or `s_end > 32`.
pub fn search_sentinels(
    records: &[PacketRecord],
    s_start: u8,
    s_end: u8,
    num_stop: usize,
) -> SentinelSet {
    assert!(s_start <= s_end, "s_start must not be narrower than s_end");
    assert!(s_end <= 32, "prefix length out of range");

    let mut found = vec![false; records.len()];
    let mut sentinels = SentinelSet::new();

    for len in s_start..=s_end {
        let mut groups: HashMap<u32, IngressBitset> = HashMap::new();
        for (idx, rec) in records.iter().enumerate() {
            if found[idx] {
                continue;
            }
            let key = mask(rec.src_ip, len);
            groups.entry(key).or_insert_with(IngressBitset::empty).insert(rec.ingress);
        }

        let mut accepted_keys: Vec<u32> = Vec::new();
        for (key, bitset) in &groups {
            if bitset.count() <= num_stop && bitset.count() >= 1 {
                accepted_keys.push(*key);
            }
        }
        // Stable ordering independent of the HashMap's iteration order, so
        // the resulting vector is deterministic.
        accepted_keys.sort_unstable();

        for key in accepted_keys {
            let bitset = groups[&key];
            if bitset.count() != 1 {
                // num_stop > 1 is not currently exercised by the driver,
                // but the original only ever records a sentinel's ingress
                // when the group is unambiguous; wider tolerances would
                // need a defined "which ingress" rule we don't have yet.
                continue;
            }
            let ingress = bitset.single();
            let prefix = Prefix::new(key, len).expect("len already validated");
            sentinels.push(Sentinel { prefix, ingress });
            for (idx, rec) in records.iter().enumerate() {
                if !found[idx] && mask(rec.src_ip, len) == key {
                    found[idx] = true;
                }
            }
        }
    }

    sentinels
}

/// Shards the per-level group-by across threads. Merge order is fixed by
/// sorting the accepted keys (same as the serial path), so output is
/// bytewise identical regardless of thread scheduling.
#[cfg(feature = "parallel-search")]
pub fn search_sentinels_parallel(
    records: &[PacketRecord],
    s_start: u8,
    s_end: u8,
    num_stop: usize,
) -> SentinelSet {
    use rayon::prelude::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    assert!(s_start <= s_end, "s_start must not be narrower than s_end");
    assert!(s_end <= 32, "prefix length out of range");

    let mut found = vec![false; records.len()];
    let mut sentinels = SentinelSet::new();

    for len in s_start..=s_end {
        let remaining: Vec<(usize, &PacketRecord)> = records
            .iter()
            .enumerate()
            .filter(|(idx, _)| !found[*idx])
            .collect();

        let groups: Mutex<StdHashMap<u32, IngressBitset>> = Mutex::new(StdHashMap::new());
        remaining.par_iter().for_each(|(_, rec)| {
            let key = mask(rec.src_ip, len);
            let mut groups = groups.lock().unwrap();
            groups.entry(key).or_insert_with(IngressBitset::empty).insert(rec.ingress);
        });
        let groups = groups.into_inner().unwrap();

        let mut accepted_keys: Vec<u32> = groups
            .iter()
            .filter(|(_, bitset)| bitset.count() == 1 && num_stop >= 1)
            .map(|(key, _)| *key)
            .collect();
        accepted_keys.sort_unstable();

        for key in accepted_keys {
            let bitset = groups[&key];
            let ingress = bitset.single();
            let prefix = Prefix::new(key, len).expect("len already validated");
            sentinels.push(Sentinel { prefix, ingress });
            for (idx, rec) in records.iter().enumerate() {
                if !found[idx] && mask(rec.src_ip, len) == key {
                    found[idx] = true;
                }
            }
        }
    }

    sentinels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::parse_ipv4;

    fn pkt(ip: &str, ingress: u16) -> PacketRecord {
        PacketRecord::new(parse_ipv4(ip).unwrap(), ingress, false, 0.0)
    }

    /// Seed scenario S1: a /22 with a single ingress plus two narrower /24s
    /// under it that disagree with the wider router and each other.
    fn s1_records() -> Vec<PacketRecord> {
        vec![
            pkt("1.2.0.1", 1),
            pkt("1.2.1.1", 1),
            pkt("1.2.2.1", 1),
            pkt("1.2.4.1", 2),
            pkt("1.2.4.2", 2),
            pkt("1.2.5.1", 3),
            pkt("1.2.5.2", 3),
        ]
    }

    #[test]
    fn default_search_finds_the_wide_sentinel_and_the_two_narrow_overrides() {
        let sentinels = search_sentinels(&s1_records(), 16, 24, 1);
        let mut got: Vec<(String, u16)> = sentinels
            .iter()
            .map(|s| (s.prefix.to_string(), s.ingress))
            .collect();
        got.sort();
        assert_eq!(
            got,
            vec![
                ("1.2.0.0/22".to_string(), 1),
                ("1.2.4.0/24".to_string(), 2),
                ("1.2.5.0/24".to_string(), 3),
            ]
        );
    }

    #[test]
    fn narrowing_past_24_only_adds_more_specific_splits_when_needed() {
        let sentinels = search_sentinels(&s1_records(), 16, 32, 1);
        // Every record already resolves to a disjoint sentinel by /24, so
        // searching further to /32 changes nothing.
        assert_eq!(sentinels.len(), 3);
    }

    #[test]
    fn wide_open_search_from_0_still_finds_the_same_three_sentinels() {
        let sentinels = search_sentinels(&s1_records(), 0, 24, 1);
        assert_eq!(sentinels.len(), 3);
    }

    #[test]
    fn ambiguous_groups_are_never_emitted_as_sentinels() {
        let records = vec![pkt("9.9.9.1", 1), pkt("9.9.9.2", 2)];
        let sentinels = search_sentinels(&records, 24, 32, 1);
        // /24 sees two ingresses (rejected); /32 splits them into two
        // singleton, unambiguous sentinels.
        assert_eq!(sentinels.len(), 2);
        assert!(sentinels.iter().all(|s| s.prefix.len() == 32));
    }
}
