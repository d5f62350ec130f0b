//! Ingress-router mapping policies.
//!
//! Grounded on `original_source/simulations/sim_pkts.py::prepare_permutations`
//! and the precomputed `rnd_*`/`per_*` input columns it builds: `Random`
//! maps a destination-slice hash straight to a router; `Persistent` fixes
//! the first-seen mapping for a `/24` for the rest of the run; `Permutation`
//! takes a `Persistent` mapping and shifts `pct%` of prefixes by one router
//! (mod `n_border`).

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use crate::ip::Prefix;

#[derive(Debug, Clone)]
pub enum IngressMapper {
    Random {
        n_border: u16,
        seed: u64,
    },
    Persistent {
        n_border: u16,
        seed: u64,
        seen: HashMap<Prefix, u16>,
    },
    Permuted {
        n_border: u16,
        base: HashMap<Prefix, u16>,
        shifted: HashSet<Prefix>,
    },
}

impl IngressMapper {
    pub fn random(n_border: u16, seed: u64) -> Self {
        IngressMapper::Random { n_border, seed }
    }

    pub fn persistent(n_border: u16, seed: u64) -> Self {
        IngressMapper::Persistent {
            n_border,
            seed,
            seen: HashMap::new(),
        }
    }

    /// Builds a `Permuted` mapper: starts from a `Persistent` mapping over
    /// every `/24` in `all_prefixes`, then shifts `pct` percent of them by
    /// one router, matching `prepare_permutations`'s
    /// `(router + n % (n_routers - 1)) % n_routers + 1` rotation (expressed
    /// here in zero-based router indices as `(router + 1) % n_border`).
    pub fn build_permuted(
        pct: f64,
        all_prefixes: &[Prefix],
        n_border: u16,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let mut base = HashMap::with_capacity(all_prefixes.len());
        for prefix in all_prefixes {
            let router = rng.gen_range(0..n_border);
            base.insert(*prefix, router);
        }

        let n_shift = ((all_prefixes.len() as f64) * pct / 100.0).round() as usize;
        let mut shuffled: Vec<Prefix> = all_prefixes.to_vec();
        shuffled.shuffle(&mut rng);
        let shifted: HashSet<Prefix> = shuffled.into_iter().take(n_shift).collect();

        IngressMapper::Permuted {
            n_border,
            base,
            shifted,
        }
    }

    pub fn n_border(&self) -> u16 {
        match self {
            IngressMapper::Random { n_border, .. } => *n_border,
            IngressMapper::Persistent { n_border, .. } => *n_border,
            IngressMapper::Permuted { n_border, .. } => *n_border,
        }
    }

    /// Resolves the ingress router for a source IP. `Random` is a pure
    /// function of the address (so repeated calls agree without state);
    /// `Persistent` and `Permuted` key off the enclosing `/24`.
    pub fn resolve(&mut self, src_ip: u32) -> u16 {
        let prefix = Prefix::slash_24(src_ip);
        match self {
            IngressMapper::Random { n_border, seed } => {
                random_ingress(src_ip, *seed, *n_border)
            }
            IngressMapper::Persistent {
                n_border,
                seed,
                seen,
            } => *seen
                .entry(prefix)
                .or_insert_with(|| random_ingress(prefix.base(), *seed, *n_border)),
            IngressMapper::Permuted {
                n_border,
                base,
                shifted,
            } => {
                let router = *base
                    .get(&prefix)
                    .unwrap_or(&random_ingress(prefix.base(), 0, *n_border));
                if shifted.contains(&prefix) {
                    (router + 1) % *n_border
                } else {
                    router
                }
            }
        }
    }
}

/// A pure, seed-dependent hash of an address into `0..n_border`, standing
/// in for the original's precomputed `rnd_*` columns (which were built by
/// hashing a destination-address slice through a fixed PRNG draw per
/// prefix). Deterministic and stateless so `IngressMapper::Random` never
/// needs to remember anything between calls.
fn random_ingress(ip: u32, seed: u64, n_border: u16) -> u16 {
    let mut rng = ChaCha12Rng::seed_from_u64(seed ^ (ip as u64));
    rng.gen_range(0..n_border)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::parse_ipv4;

    #[test]
    fn random_mapping_is_a_pure_function_of_the_address() {
        let mut m1 = IngressMapper::random(4, 7);
        let mut m2 = IngressMapper::random(4, 7);
        let ip = parse_ipv4("1.2.3.4").unwrap();
        assert_eq!(m1.resolve(ip), m2.resolve(ip));
    }

    #[test]
    fn persistent_mapping_is_fixed_per_24() {
        let mut mapper = IngressMapper::persistent(8, 1);
        let ip1 = parse_ipv4("1.2.3.1").unwrap();
        let ip2 = parse_ipv4("1.2.3.254").unwrap();
        let r1 = mapper.resolve(ip1);
        let r2 = mapper.resolve(ip2);
        assert_eq!(r1, r2, "same /24 must map to the same ingress");
    }

    #[test]
    fn permuted_mapping_shifts_only_selected_prefixes() {
        let prefixes: Vec<Prefix> = (0..50)
            .map(|i| Prefix::new(i << 8, 24).unwrap())
            .collect();
        let mapper = IngressMapper::build_permuted(100.0, &prefixes, 4, 3);
        if let IngressMapper::Permuted { base, shifted, .. } = &mapper {
            assert_eq!(shifted.len(), prefixes.len());
            assert_eq!(base.len(), prefixes.len());
        } else {
            panic!("expected a Permuted mapper");
        }
    }
}
