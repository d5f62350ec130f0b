//! Longest-prefix-match mirroring rule tree with remove-on-hit semantics.
//!
//! Grounded on `original_source/simulations/sim_mirroring.py`:
//! `get_mirroring_rules` builds a `pytricia.PyTricia()` keyed by sentinel
//! prefix -> expected ingress; `get_mirrored_packets` mirrors a packet
//! whenever its source IP matches a rule whose recorded ingress disagrees
//! with the packet's actual ingress, and (when `remove_rules` is set)
//! deletes the matched rule so it can never mirror again. A hand-rolled
//! binary trie over the 32-bit address reproduces the same longest-match
//! and in-place-delete behavior without a dependency the rest of the pack
//! doesn't otherwise pull in.

use std::collections::HashSet;

use crate::ip::Prefix;
use crate::sentinel::SentinelSet;
use crate::store::PacketRecord;

#[derive(Debug, Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    rule: Option<u16>,
}

/// A longest-prefix-match table of `Prefix -> ingress`.
#[derive(Debug, Default)]
pub struct RuleTree {
    root: Node,
    len: usize,
}

impl RuleTree {
    pub fn new() -> Self {
        RuleTree::default()
    }

    pub fn from_sentinels(sentinels: &SentinelSet) -> Self {
        let mut tree = RuleTree::new();
        for s in sentinels {
            tree.insert(s.prefix, s.ingress);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, prefix: Prefix, ingress: u16) {
        let mut node = &mut self.root;
        for bit in 0..prefix.len() as u32 {
            let b = ((prefix.base() >> (31 - bit)) & 1) as usize;
            node = node.children[b].get_or_insert_with(|| Box::new(Node::default()));
        }
        if node.rule.is_none() {
            self.len += 1;
        }
        node.rule = Some(ingress);
    }

    /// Removes the rule for exactly `prefix` (not anything it contains or
    /// is contained by). Matches `del rules[sentinel]` in the original.
    pub fn remove(&mut self, prefix: Prefix) {
        let mut node = &mut self.root;
        for bit in 0..prefix.len() as u32 {
            let b = ((prefix.base() >> (31 - bit)) & 1) as usize;
            match node.children[b].as_mut() {
                Some(child) => node = child,
                None => return,
            }
        }
        if node.rule.take().is_some() {
            self.len -= 1;
        }
    }

    /// Looks up the longest matching rule for `ip`, returning the matched
    /// prefix length and ingress.
    pub fn lookup(&self, ip: u32) -> Option<(u8, u16)> {
        let mut node = &self.root;
        let mut best: Option<(u8, u16)> = node.rule.map(|r| (0, r));
        for bit in 0..32u32 {
            let b = ((ip >> (31 - bit)) & 1) as usize;
            match node.children[b].as_ref() {
                Some(child) => {
                    node = child;
                    if let Some(rule) = node.rule {
                        best = Some(((bit + 1) as u8, rule));
                    }
                }
                None => break,
            }
        }
        best
    }
}

/// Applies `rules` to `pkts`. A packet mirrors when it matches a rule whose
/// recorded ingress differs from the packet's own ingress. When
/// `remove_on_hit` is set, a matched rule is deleted from `rules` on its
/// first mirroring hit and its prefix recorded in the returned set —
/// matching the original's "a sentinel survives only until it is proven
/// wrong once" mirroring lifecycle.
pub fn apply(
    rules: &mut RuleTree,
    pkts: &[PacketRecord],
    remove_on_hit: bool,
) -> (Vec<PacketRecord>, HashSet<Prefix>) {
    let mut mirrored = Vec::new();
    let mut removed = HashSet::new();

    for pkt in pkts {
        let Some((len, expected_ingress)) = rules.lookup(pkt.src_ip) else {
            continue;
        };
        if expected_ingress == pkt.ingress {
            continue;
        }
        mirrored.push(*pkt);
        if remove_on_hit {
            let prefix = Prefix::new(pkt.src_ip, len).expect("length from a successful lookup");
            if !removed.contains(&prefix) {
                rules.remove(prefix);
                removed.insert(prefix);
            }
        }
    }

    (mirrored, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::parse_ipv4;
    use crate::sentinel::Sentinel;

    fn sentinel(prefix: &str, len: u8, ingress: u16) -> Sentinel {
        Sentinel {
            prefix: Prefix::new(parse_ipv4(prefix).unwrap(), len).unwrap(),
            ingress,
        }
    }

    fn pkt(ip: &str, ingress: u16) -> PacketRecord {
        PacketRecord::new(parse_ipv4(ip).unwrap(), ingress, false, 0.0)
    }

    /// Seed scenario S2: sentinels `1.2.0.0/22 -> 1`, `1.2.4.0/24 -> 2`,
    /// `1.2.5.0/24 -> 3`; three packets each disagree with their matched
    /// sentinel and each causes that sentinel's removal.
    #[test]
    fn mismatched_packets_mirror_and_evict_their_sentinel() {
        let sentinels: SentinelSet = vec![
            sentinel("1.2.0.0", 22, 1),
            sentinel("1.2.4.0", 24, 2),
            sentinel("1.2.5.0", 24, 3),
        ];
        let mut rules = RuleTree::from_sentinels(&sentinels);
        assert_eq!(rules.len(), 3);

        let pkts = vec![
            pkt("1.2.1.1", 1),  // matches /22, agrees, no mirror
            pkt("1.2.1.2", 9),  // matches /22, disagrees, mirrors + evicts
            pkt("1.2.4.5", 2),  // matches /24, agrees, no mirror
            pkt("1.2.4.6", 9),  // matches /24, disagrees, mirrors + evicts
            pkt("1.2.5.5", 9),  // matches last /24, disagrees, mirrors + evicts
            pkt("1.2.1.3", 5),  // sentinel already evicted, no match, no mirror
        ];
        let (mirrored, removed) = apply(&mut rules, &pkts, true);

        assert_eq!(mirrored.len(), 3);
        assert_eq!(removed.len(), 3);
        assert!(rules.is_empty());
    }

    #[test]
    fn without_removal_a_rule_keeps_mirroring() {
        let sentinels: SentinelSet = vec![sentinel("1.2.0.0", 22, 1)];
        let mut rules = RuleTree::from_sentinels(&sentinels);
        let pkts = vec![pkt("1.2.1.1", 9), pkt("1.2.1.2", 9)];
        let (mirrored, removed) = apply(&mut rules, &pkts, false);
        assert_eq!(mirrored.len(), 2);
        assert!(removed.is_empty());
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn longest_prefix_wins_over_a_wider_covering_rule() {
        let sentinels: SentinelSet =
            vec![sentinel("1.2.0.0", 16, 1), sentinel("1.2.3.0", 24, 2)];
        let rules = RuleTree::from_sentinels(&sentinels);
        assert_eq!(rules.lookup(parse_ipv4("1.2.3.5").unwrap()), Some((24, 2)));
        assert_eq!(rules.lookup(parse_ipv4("1.2.9.5").unwrap()), Some((16, 1)));
    }
}
