//! Ground-truth construction: per-`/24` observed ingress set and packet
//! count, built from the full (unsampled) trace.
//!
//! Grounded on `original_source/simulations/sim_util.py::gt_init` and
//! `get_ground_truth`.

use std::collections::{BTreeSet, HashMap};

use crate::ip::Prefix;
use crate::store::PacketRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundTruthEntry {
    pub ingress_set: BTreeSet<u16>,
    pub pkt_count: u64,
}

impl GroundTruthEntry {
    /// A `/24` is "unique" when every packet observed under it entered
    /// through the same router.
    pub fn is_unique(&self) -> bool {
        self.ingress_set.len() == 1
    }
}

pub type GroundTruth = HashMap<Prefix, GroundTruthEntry>;

/// Builds ground truth from `pkts`. Order-invariant: the result depends
/// only on the multiset of packets, never on their arrival order.
pub fn build_ground_truth(pkts: &[PacketRecord]) -> GroundTruth {
    let mut gt: GroundTruth = HashMap::new();
    for pkt in pkts {
        let entry = gt.entry(pkt.src_24).or_default();
        entry.ingress_set.insert(pkt.ingress);
        entry.pkt_count += 1;
    }
    gt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::parse_ipv4;

    fn pkt(ip: &str, ingress: u16) -> PacketRecord {
        PacketRecord::new(parse_ipv4(ip).unwrap(), ingress, false, 0.0)
    }

    /// Seed scenario S3.
    #[test]
    fn builds_per_24_ingress_sets_and_counts() {
        let pkts = vec![
            pkt("1.2.0.1", 1),
            pkt("1.2.0.2", 1),
            pkt("1.2.1.1", 1),
            pkt("1.2.4.1", 2),
            pkt("1.2.4.2", 2),
            pkt("1.2.5.1", 3),
            pkt("1.2.5.2", 4), // not unique: two ingresses for this /24
        ];
        let gt = build_ground_truth(&pkts);

        let e = |ip: &str| gt.get(&Prefix::slash_24(parse_ipv4(ip).unwrap())).unwrap();

        assert_eq!(e("1.2.0.0").pkt_count, 2);
        assert!(e("1.2.0.0").is_unique());
        assert_eq!(e("1.2.1.0").pkt_count, 1);
        assert_eq!(e("1.2.4.0").pkt_count, 2);
        assert!(e("1.2.4.0").is_unique());
        assert_eq!(e("1.2.5.0").pkt_count, 2);
        assert!(!e("1.2.5.0").is_unique());
    }

    #[test]
    fn order_of_input_does_not_affect_the_result() {
        let mut pkts = vec![pkt("1.2.5.1", 3), pkt("1.2.5.2", 4), pkt("1.2.0.1", 1)];
        let gt_a = build_ground_truth(&pkts);
        pkts.reverse();
        let gt_b = build_ground_truth(&pkts);
        assert_eq!(gt_a, gt_b);
    }
}
