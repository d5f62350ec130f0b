//! Ordering and top-k selection of sentinels for mirroring-rule
//! installation.
//!
//! Grounded on `original_source/simulations/sim_util.py`:
//! `enhance_sentinels` (computes per-sentinel activity/size using a
//! longest-prefix-match count over the observed packets) and
//! `order_sentinels` (sorts by activity descending, or by prefix length
//! ascending — widest, i.e. largest address span, first).

use std::collections::HashMap;

use crate::ip::mask;
use crate::store::PacketRecord;

use super::{Sentinel, SentinelSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ordering {
    Activity,
    Size,
    Full,
}

#[derive(Debug, Clone, Copy)]
pub struct EnhancedSentinel {
    pub sentinel: Sentinel,
    pub activity: u64,
    pub size: u32,
}

/// Computes activity (packet count under the sentinel's prefix) and size
/// (number of addresses covered, `2^(32-len)`) for every sentinel.
///
/// This does a longest-prefix-match count: a packet is attributed to the
/// single longest (narrowest) sentinel that contains it, matching
/// `enhance_sentinels`'s use of a Patricia-style longest-match lookup.
pub fn enhance(sentinels: &SentinelSet, pkts: &[PacketRecord]) -> Vec<EnhancedSentinel> {
    // Group sentinels by (len, masked base) for quick longest-match lookup,
    // checked narrowest-first.
    let mut by_len: Vec<(u8, HashMap<u32, usize>)> = Vec::new();
    for len in 0..=32u8 {
        let mut map = HashMap::new();
        for (idx, s) in sentinels.iter().enumerate() {
            if s.prefix.len() == len {
                map.insert(s.prefix.base(), idx);
            }
        }
        by_len.push((len, map));
    }

    let mut activity = vec![0u64; sentinels.len()];
    for pkt in pkts {
        for len in (0..=32u8).rev() {
            let key = mask(pkt.src_ip, len);
            if let Some(idx) = by_len[len as usize].1.get(&key) {
                activity[*idx] += 1;
                break;
            }
        }
    }

    sentinels
        .iter()
        .zip(activity)
        .map(|(s, activity)| EnhancedSentinel {
            sentinel: *s,
            activity,
            size: 1u32.checked_shl((32 - s.prefix.len()) as u32).unwrap_or(u32::MAX),
        })
        .collect()
}

/// Orders `enhanced` per `ordering` and truncates to `top_k` entries
/// (`None` keeps everything, matching the driver's "full" variant).
pub fn order_and_truncate(
    mut enhanced: Vec<EnhancedSentinel>,
    ordering: Ordering,
    top_k: Option<usize>,
) -> Vec<EnhancedSentinel> {
    match ordering {
        Ordering::Activity => {
            enhanced.sort_by(|a, b| {
                b.activity
                    .cmp(&a.activity)
                    .then_with(|| a.sentinel.prefix.cmp(&b.sentinel.prefix))
            });
        }
        Ordering::Size => {
            enhanced.sort_by(|a, b| {
                a.sentinel
                    .prefix
                    .len()
                    .cmp(&b.sentinel.prefix.len())
                    .then_with(|| a.sentinel.prefix.cmp(&b.sentinel.prefix))
            });
        }
        Ordering::Full => {
            enhanced.sort_by(|a, b| a.sentinel.prefix.cmp(&b.sentinel.prefix));
        }
    }
    if let Some(k) = top_k {
        enhanced.truncate(k);
    }
    enhanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::{parse_ipv4, Prefix};

    fn sentinel(prefix: &str, len: u8, ingress: u16) -> Sentinel {
        Sentinel {
            prefix: Prefix::new(parse_ipv4(prefix).unwrap(), len).unwrap(),
            ingress,
        }
    }

    fn pkt(ip: &str) -> PacketRecord {
        PacketRecord::new(parse_ipv4(ip).unwrap(), 0, false, 0.0)
    }

    #[test]
    fn activity_counts_packets_by_longest_match() {
        let sentinels = vec![
            sentinel("1.2.0.0", 22, 1),
            sentinel("1.2.4.0", 24, 2),
        ];
        let pkts = vec![
            pkt("1.2.1.1"),
            pkt("1.2.1.2"),
            pkt("1.2.4.1"),
        ];
        let enhanced = enhance(&sentinels, &pkts);
        let activity_for = |prefix: &str| {
            enhanced
                .iter()
                .find(|e| e.sentinel.prefix.to_string().starts_with(prefix))
                .unwrap()
                .activity
        };
        assert_eq!(activity_for("1.2.0.0"), 2);
        assert_eq!(activity_for("1.2.4.0"), 1);
    }

    #[test]
    fn size_ordering_prefers_wider_prefixes_first() {
        let sentinels = vec![sentinel("1.2.0.0", 22, 1), sentinel("1.2.4.0", 24, 2)];
        let enhanced = enhance(&sentinels, &[]);
        let ordered = order_and_truncate(enhanced, Ordering::Size, None);
        assert_eq!(ordered[0].sentinel.prefix.len(), 22);
        assert_eq!(ordered[1].sentinel.prefix.len(), 24);
    }

    #[test]
    fn top_k_truncates_after_ordering() {
        let sentinels = vec![
            sentinel("1.2.0.0", 22, 1),
            sentinel("1.2.4.0", 24, 2),
            sentinel("1.2.5.0", 24, 3),
        ];
        let pkts = vec![pkt("1.2.5.1"), pkt("1.2.5.2"), pkt("1.2.5.3")];
        let enhanced = enhance(&sentinels, &pkts);
        let ordered = order_and_truncate(enhanced, Ordering::Activity, Some(1));
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].sentinel.prefix.to_string(), "1.2.5.0/24");
    }
}
