//! Evaluation against ground truth.
//!
//! Grounded on `original_source/simulations/sim_results.py`:
//! `get_results_ground_truth_sampling` (sampling-only baseline),
//! `get_results_ground_truth` (sentinel accuracy, with an optional strict
//! "drop any sentinel covering a wrong or non-unique `/24`" mode), and
//! `get_results_ground_truth_invalidated_sentinels` (scoring how much
//! coverage a mirroring-invalidated sentinel set lost).

use std::collections::HashSet;

use magnifier_core::ground_truth::GroundTruth;
use magnifier_core::ip::Prefix;
use magnifier_core::sentinel::{Sentinel, SentinelSet};
use magnifier_core::store::PacketRecord;

/// Coverage of the raw trace's ground truth by a plain sample (no
/// sentinel/mirroring prediction involved): did any of the sampled packets
/// for a `/24` land in that `/24`, and was the `/24` itself unique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingResults {
    pub covered: usize,
    pub covered_unique: usize,
    pub covered_not_unique: usize,
    pub not_covered: usize,
    pub not_covered_unique: usize,
    pub not_covered_not_unique: usize,
    pub pkt_count_covered: u64,
    pub pkt_count_not_covered: u64,
    pub count_all_unique_pkts: u64,
}

pub fn eval_sampling_only(gt: &GroundTruth, samples: &[PacketRecord]) -> SamplingResults {
    let sampled_24s: HashSet<Prefix> = samples.iter().map(|p| p.src_24).collect();
    let mut r = SamplingResults::default();

    for (prefix, entry) in gt {
        let covered = sampled_24s.contains(prefix);
        if entry.is_unique() {
            r.count_all_unique_pkts += entry.pkt_count;
        }
        if covered {
            r.covered += 1;
            r.pkt_count_covered += entry.pkt_count;
            if entry.is_unique() {
                r.covered_unique += 1;
            } else {
                r.covered_not_unique += 1;
            }
        } else {
            r.not_covered += 1;
            r.pkt_count_not_covered += entry.pkt_count;
            if entry.is_unique() {
                r.not_covered_unique += 1;
            } else {
                r.not_covered_not_unique += 1;
            }
        }
    }

    r
}

/// Sentinel accuracy against ground truth: for each `/24` covered by a
/// sentinel, is the sentinel's ingress a member of the `/24`'s ground-truth
/// ingress set (`correct`), or not (`wrong`)? `covered_not_unique` is a
/// subset tag on `correct`: it fires when the `/24` is correct but its
/// ground-truth ingress set has more than one member. `/24`s with no
/// sentinel coverage are `not_covered`/`not_covered_not_unique`. A
/// sentinel whose own group never appeared in ground truth at all (no
/// traffic observed for it yet) counts as `not_active`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentinelResults {
    pub covered_correct: usize,
    pub covered_wrong: usize,
    pub covered_not_active: usize,
    pub not_covered: usize,
    pub covered_not_unique: usize,
    pub not_covered_not_unique: usize,
    pub pkt_count_correct: u64,
    pub covered_correct_count: u64,
    pub covered_wrong_count: u64,
    pub covered_not_unique_count: u64,
    pub not_covered_count: u64,
    pub not_covered_not_unique_count: u64,
    pub count_all_unique_pkts: u64,
    /// Retained only when `remove_invalid` was set: the sentinels that
    /// survived strict filtering.
    pub surviving_sentinels: SentinelSet,
}

pub fn eval_sentinel_vs_ground_truth(
    gt: &GroundTruth,
    sentinels: &SentinelSet,
    remove_invalid: bool,
) -> SentinelResults {
    let mut r = SentinelResults::default();
    let mut covered_24s: HashSet<Prefix> = HashSet::new();

    for sentinel in sentinels {
        let mut any_seen = false;

        for sub in sentinel.prefix.enumerate_24() {
            covered_24s.insert(sub);
            let Some(entry) = gt.get(&sub) else {
                continue;
            };
            any_seen = true;
            let correct = entry.ingress_set.contains(&sentinel.ingress);
            if correct {
                r.covered_correct += 1;
                r.covered_correct_count += entry.pkt_count;
                r.pkt_count_correct += entry.pkt_count;
                if !entry.is_unique() {
                    r.covered_not_unique += 1;
                    r.covered_not_unique_count += entry.pkt_count;
                }
            } else {
                r.covered_wrong += 1;
                r.covered_wrong_count += entry.pkt_count;
            }
        }

        if !any_seen {
            r.covered_not_active += 1;
        }
    }

    for (prefix, entry) in gt {
        if entry.is_unique() {
            r.count_all_unique_pkts += entry.pkt_count;
        }
        if !covered_24s.contains(prefix) {
            r.not_covered += 1;
            r.not_covered_count += entry.pkt_count;
            if !entry.is_unique() {
                r.not_covered_not_unique += 1;
                r.not_covered_not_unique_count += entry.pkt_count;
            }
        }
    }

    r.surviving_sentinels = if remove_invalid {
        sentinels
            .iter()
            .copied()
            .filter(|s| !sentinel_is_invalid(s, gt))
            .collect()
    } else {
        sentinels.clone()
    };

    r
}

/// A sentinel is invalid (dropped under strict filtering) when at least
/// one `/24` beneath it is present in ground truth AND is either
/// non-unique or attributed to a different ingress. A sentinel none of
/// whose `/24`s have appeared in ground truth yet survives: absence of
/// evidence is not evidence of wrongness.
fn sentinel_is_invalid(sentinel: &Sentinel, gt: &GroundTruth) -> bool {
    sentinel.prefix.enumerate_24().any(|sub| match gt.get(&sub) {
        None => false,
        Some(entry) => !entry.is_unique() || !entry.ingress_set.contains(&sentinel.ingress),
    })
}

/// How much coverage a mirroring-invalidated sentinel set lost, relative
/// to ground truth. `removed` is the set of sentinel prefixes evicted by
/// mirroring during the iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationResults {
    pub prefix_lost: usize,
    pub prefix_lost_not_unique: usize,
    pub prefix_lost_not_active: usize,
    pub pkt_lost: u64,
    pub pkt_lost_not_unique: u64,
}

pub fn eval_invalidated_sentinels(
    sentinels: &SentinelSet,
    removed: &HashSet<Prefix>,
    gt: &GroundTruth,
) -> (SentinelSet, InvalidationResults) {
    let still_valid: SentinelSet = sentinels
        .iter()
        .copied()
        .filter(|s| !removed.contains(&s.prefix))
        .collect();

    let mut stats = InvalidationResults::default();
    for sentinel in sentinels {
        if !removed.contains(&sentinel.prefix) {
            continue;
        }
        let mut any_seen = false;
        for sub in sentinel.prefix.enumerate_24() {
            let Some(entry) = gt.get(&sub) else {
                continue;
            };
            any_seen = true;
            stats.prefix_lost += 1;
            stats.pkt_lost += entry.pkt_count;
            if !entry.is_unique() {
                stats.prefix_lost_not_unique += 1;
                stats.pkt_lost_not_unique += entry.pkt_count;
            }
        }
        if !any_seen {
            stats.prefix_lost_not_active += 1;
        }
    }

    (still_valid, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnifier_core::ground_truth::build_ground_truth;
    use magnifier_core::ip::parse_ipv4;

    fn pkt(ip: &str, ingress: u16) -> PacketRecord {
        PacketRecord::new(parse_ipv4(ip).unwrap(), ingress, false, 0.0)
    }

    fn sentinel(prefix: &str, len: u8, ingress: u16) -> Sentinel {
        Sentinel {
            prefix: Prefix::new(parse_ipv4(prefix).unwrap(), len).unwrap(),
            ingress,
        }
    }

    /// Seed scenario S3/S4-style ground truth: one correct sentinel, one
    /// wrong sentinel, one not-covered /24.
    #[test]
    fn classifies_correct_wrong_and_uncovered() {
        let pkts = vec![
            pkt("1.2.0.1", 1),
            pkt("1.2.0.2", 1),
            pkt("1.2.4.1", 2),
            pkt("1.2.4.2", 2),
            pkt("1.2.9.1", 9),
        ];
        let gt = build_ground_truth(&pkts);
        let sentinels = vec![
            sentinel("1.2.0.0", 24, 1), // correct
            sentinel("1.2.4.0", 24, 99), // wrong
        ];
        let r = eval_sentinel_vs_ground_truth(&gt, &sentinels, false);
        assert_eq!(r.covered_correct, 1);
        assert_eq!(r.covered_wrong, 1);
        assert_eq!(r.not_covered, 1); // 1.2.9.0/24
    }

    #[test]
    fn strict_mode_drops_sentinels_with_any_wrong_or_ambiguous_24() {
        let pkts = vec![pkt("1.2.4.1", 2), pkt("1.2.4.2", 3)]; // not unique
        let gt = build_ground_truth(&pkts);
        let sentinels = vec![sentinel("1.2.4.0", 24, 2)];
        let r = eval_sentinel_vs_ground_truth(&gt, &sentinels, true);
        assert!(r.surviving_sentinels.is_empty());
    }

    #[test]
    fn strict_mode_keeps_sentinels_with_no_ground_truth_evidence_yet() {
        let gt = GroundTruth::new();
        let sentinels = vec![sentinel("9.9.9.0", 24, 1)];
        let r = eval_sentinel_vs_ground_truth(&gt, &sentinels, true);
        assert_eq!(r.surviving_sentinels.len(), 1);
        assert_eq!(r.covered_not_active, 1);
    }

    /// Seed scenario S2 applied to the evaluator: after mirroring evicts
    /// all three sentinels, the invalidation stats report the lost
    /// coverage and the surviving set is empty.
    #[test]
    fn invalidated_sentinels_report_lost_coverage() {
        let pkts = vec![pkt("1.2.1.1", 1), pkt("1.2.4.1", 2), pkt("1.2.5.1", 3)];
        let gt = build_ground_truth(&pkts);
        let sentinels = vec![
            sentinel("1.2.0.0", 22, 1),
            sentinel("1.2.4.0", 24, 2),
            sentinel("1.2.5.0", 24, 3),
        ];
        let removed: HashSet<Prefix> = sentinels.iter().map(|s| s.prefix).collect();
        let (still_valid, stats) = eval_invalidated_sentinels(&sentinels, &removed, &gt);
        assert!(still_valid.is_empty());
        assert_eq!(stats.prefix_lost, 3);
    }
}
