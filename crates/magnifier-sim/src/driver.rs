//! The iteration driver: pulls windows from a packet source, samples them,
//! searches for sentinels, scores sentinel accuracy with and without
//! mirroring, and maintains nine parallel `(ordering, top_k)` variants.
//!
//! Grounded on `original_source/simulations/simulation.py`
//! (`make_sim_magnifier`/`make_sim_everflow`): the `i >= 3` floor before
//! scoring begins (the first three iterations only prime the three-deep
//! sample/mirrored-packet history), the `TOP_K = [100, 500, 1000, 5000]`
//! and `ORDERING = ["activity", "size", "full"]` fan-out (full has no
//! top-k truncation, giving `2*4 + 1 = 9` variants), and the rebuild of
//! mirroring rules from the current ordered/truncated sentinel set on
//! every iteration.

use std::collections::HashSet;

use magnifier_core::ground_truth::{build_ground_truth, GroundTruth};
use magnifier_core::ip::Prefix;
use magnifier_core::mapper::IngressMapper;
use magnifier_core::mirror::{apply as apply_mirroring, RuleTree};
use magnifier_core::sampler::{EverflowSampler, UniformSampler};
use magnifier_core::sentinel::order::{enhance, order_and_truncate};
use magnifier_core::sentinel::{search_sentinels, search_sentinels_parallel, Ordering, SentinelSet};
use magnifier_core::store::{ObservationWindow, PacketRecord, PacketSource, WindowBoundary};

use crate::eval::{
    eval_invalidated_sentinels, eval_sampling_only, eval_sentinel_vs_ground_truth,
    InvalidationResults, SamplingResults, SentinelResults,
};

pub const TOP_K: [usize; 4] = [100, 500, 1000, 5000];
pub const ORDERINGS: [Ordering; 2] = [Ordering::Activity, Ordering::Size];

/// One of the nine `(ordering, top_k)` combinations the driver tracks in
/// parallel, plus the untruncated "full" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Full,
    Top(Ordering, usize),
}

impl Variant {
    pub fn all() -> Vec<Variant> {
        let mut v = vec![Variant::Full];
        for ordering in ORDERINGS {
            for top_k in TOP_K {
                v.push(Variant::Top(ordering, top_k));
            }
        }
        v
    }

    fn ordering(&self) -> Ordering {
        match self {
            Variant::Full => Ordering::Full,
            Variant::Top(o, _) => *o,
        }
    }

    fn top_k(&self) -> Option<usize> {
        match self {
            Variant::Full => None,
            Variant::Top(_, k) => Some(*k),
        }
    }
}

/// A fixed-depth-3 history ring: `cur`, `prev`, `prev2`. Shifting drops the
/// oldest entry, matching the original's
/// `sampled_pkts_n_2 = sampled_pkts_n_1; sampled_pkts_n_1 = sampled_pkts`
/// rotation.
#[derive(Debug, Clone, Default)]
pub struct History3<T> {
    pub cur: Option<T>,
    pub prev: Option<T>,
    pub prev2: Option<T>,
}

impl<T> History3<T> {
    pub fn shift_in(&mut self, value: T) {
        self.prev2 = self.prev.take();
        self.prev = self.cur.take();
        self.cur = Some(value);
    }

    pub fn is_primed(&self) -> bool {
        self.prev2.is_some()
    }
}

impl<T: Clone> History3<Vec<T>> {
    pub fn merged(&self) -> Vec<T> {
        let mut out = Vec::new();
        for part in [&self.prev2, &self.prev, &self.cur] {
            if let Some(part) = part {
                out.extend(part.iter().cloned());
            }
        }
        out
    }

    /// The two most recently shifted-in generations, oldest first —
    /// `samples_{n-1} + samples_{n-2}` in the original's naming, excluding
    /// whatever was just shifted in as `cur` this iteration.
    pub fn prev_two_merged(&self) -> Vec<T> {
        let mut out = Vec::new();
        for part in [&self.prev2, &self.prev] {
            if let Some(part) = part {
                out.extend(part.iter().cloned());
            }
        }
        out
    }
}

pub struct VariantState {
    pub rules: RuleTree,
    pub sentinels: SentinelSet,
    pub mirrored_history: History3<Vec<PacketRecord>>,
}

impl VariantState {
    fn new() -> Self {
        VariantState {
            rules: RuleTree::new(),
            sentinels: SentinelSet::new(),
            mirrored_history: History3::default(),
        }
    }
}

pub struct VariantOutcome {
    pub variant: Variant,
    pub mirrored: Vec<PacketRecord>,
    pub invalidation: InvalidationResults,
    pub surviving_sentinels: SentinelSet,
}

pub enum IterationOutcome {
    /// Bootstrap iterations (the first three) only ingest and sample.
    Priming { iteration: usize },
    /// Scoring begins at iteration `>= 3`.
    Scored {
        iteration: usize,
        /// Timestamp of the last packet in this iteration's window, used to
        /// build the `iteration_end_ts` output metric.
        end_ts: f64,
        sampling: SamplingResults,
        sentinels_raw: SentinelResults,
        sentinels_strict: SentinelResults,
        variants: Vec<VariantOutcome>,
    },
    /// The packet source is exhausted.
    Terminated,
}

pub struct SimulationDriverConfig {
    pub n_border: u16,
    pub s_start: u8,
    pub s_end: u8,
    pub sample_frequency: usize,
    pub boundary: WindowBoundary,
    pub seed: u64,
    /// Selects the Magnifier (uniform) sampler when `true`, the Everflow
    /// sampler (flagged packets always kept) when `false`.
    pub magnifier_sampler: bool,
    /// Shard the sentinel search across threads via rayon. Preserves
    /// bytewise-deterministic output (see `search_sentinels_parallel`).
    pub parallel_search: bool,
}

enum SamplerKind {
    Uniform(UniformSampler),
    Everflow(EverflowSampler),
}

impl SamplerKind {
    fn sample(&mut self, window: &ObservationWindow) -> Vec<PacketRecord> {
        match self {
            SamplerKind::Uniform(s) => s.sample(window),
            SamplerKind::Everflow(s) => s.sample(window).0,
        }
    }
}

/// Owns all per-variant state and runs the phase sequence
/// (shift -> ingest -> sample -> score-no-mirror -> sentinels -> mirror ->
/// score-with-mirror) once per call to [`run_iteration`].
pub struct SimulationDriver {
    config: SimulationDriverConfig,
    sampler: SamplerKind,
    mapper: Option<IngressMapper>,
    sample_history: History3<Vec<PacketRecord>>,
    raw_history: History3<Vec<PacketRecord>>,
    variants: Vec<(Variant, VariantState)>,
    iteration: usize,
}

impl SimulationDriver {
    pub fn new(config: SimulationDriverConfig, mapper: Option<IngressMapper>) -> Self {
        let sampler = if config.magnifier_sampler {
            SamplerKind::Uniform(UniformSampler::new(
                config.n_border as usize,
                config.sample_frequency,
                config.seed,
            ))
        } else {
            SamplerKind::Everflow(EverflowSampler::new(
                config.n_border as usize,
                config.sample_frequency,
                config.seed,
            ))
        };
        let variants = Variant::all()
            .into_iter()
            .map(|v| (v, VariantState::new()))
            .collect();
        SimulationDriver {
            config,
            sampler,
            mapper,
            sample_history: History3::default(),
            raw_history: History3::default(),
            variants,
            iteration: 0,
        }
    }

    pub fn run_iteration(&mut self, source: &mut impl PacketSource) -> IterationOutcome {
        let mut window =
            source.next_window(self.config.boundary, self.config.n_border as usize);
        if window.is_empty() {
            return IterationOutcome::Terminated;
        }

        if let Some(mapper) = self.mapper.as_mut() {
            window = remap_ingress(window, mapper, self.config.n_border as usize);
        }

        let end_ts = window.pkts.last().map(|p| p.ts).unwrap_or(0.0);

        let sampled = self.sampler.sample(&window);
        self.sample_history.shift_in(sampled);
        self.raw_history.shift_in(window.pkts.clone());

        let iteration = self.iteration;
        self.iteration += 1;

        if iteration < 3 {
            return IterationOutcome::Priming { iteration };
        }

        // `samples_{n-1} + samples_{n-2}`: the two prior generations, never
        // this iteration's own freshly-sampled packets (just shifted in
        // above, and sitting in `cur`).
        let merged_samples = self.sample_history.prev_two_merged();

        let gt: GroundTruth = build_ground_truth(&window.pkts);
        let sampling = eval_sampling_only(&gt, &merged_samples);

        let sentinels = self.search(&merged_samples);
        let sentinels_raw = eval_sentinel_vs_ground_truth(&gt, &sentinels, false);
        let sentinels_strict = eval_sentinel_vs_ground_truth(&gt, &sentinels, true);

        let merged_raw = self.raw_history.merged();

        let parallel_search = self.config.parallel_search;
        let s_start = self.config.s_start;
        let s_end = self.config.s_end;

        let mut outcomes = Vec::with_capacity(self.variants.len());
        for (variant, state) in &mut self.variants {
            // Per-variant search input: the shared sample history plus this
            // variant's own mirrored-packet history, since each variant's
            // mirroring rules (and hence mirrored traffic) differ.
            let mut variant_history = merged_samples.clone();
            variant_history.extend(state.mirrored_history.merged());

            let variant_sentinels = if parallel_search {
                search_sentinels_parallel(&variant_history, s_start, s_end, 1)
            } else {
                search_sentinels(&variant_history, s_start, s_end, 1)
            };
            let enhanced = enhance(&variant_sentinels, &variant_history);
            let ordered = order_and_truncate(enhanced, variant.ordering(), variant.top_k());
            let ordered_set: SentinelSet = ordered.iter().map(|e| e.sentinel).collect();

            state.rules = RuleTree::from_sentinels(&ordered_set);
            state.sentinels = ordered_set.clone();

            let (mirrored, removed) = apply_mirroring(&mut state.rules, &merged_raw, true);
            state.mirrored_history.shift_in(mirrored.clone());

            let (surviving, invalidation) = eval_invalidated_sentinels(&ordered_set, &removed, &gt);

            outcomes.push(VariantOutcome {
                variant: *variant,
                mirrored,
                invalidation,
                surviving_sentinels: surviving,
            });
        }

        IterationOutcome::Scored {
            iteration,
            end_ts,
            sampling,
            sentinels_raw,
            sentinels_strict,
            variants: outcomes,
        }
    }

    fn search(&self, records: &[PacketRecord]) -> SentinelSet {
        if self.config.parallel_search {
            search_sentinels_parallel(records, self.config.s_start, self.config.s_end, 1)
        } else {
            search_sentinels(records, self.config.s_start, self.config.s_end, 1)
        }
    }
}

fn remap_ingress(
    mut window: ObservationWindow,
    mapper: &mut IngressMapper,
    n_border: usize,
) -> ObservationWindow {
    let mut remapped = ObservationWindow::new(n_border);
    for mut pkt in window.pkts.drain(..) {
        pkt.ingress = mapper.resolve(pkt.src_ip);
        remapped.push(pkt);
    }
    remapped
}

/// Distinct prefixes touched by any packet in `pkts`, used to pre-seed
/// permutation-mapper state from the full all-prefixes file rather than
/// from any single window.
pub fn distinct_24_prefixes(pkts: &[PacketRecord]) -> HashSet<Prefix> {
    pkts.iter().map(|p| p.src_24).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnifier_core::ip::parse_ipv4;
    use magnifier_core::store::VecPacketSource;

    fn pkt(ip: &str, ingress: u16, ts: f64) -> PacketRecord {
        PacketRecord::new(parse_ipv4(ip).unwrap(), ingress, false, ts)
    }

    fn make_config() -> SimulationDriverConfig {
        SimulationDriverConfig {
            n_border: 4,
            s_start: 16,
            s_end: 24,
            sample_frequency: 1,
            boundary: WindowBoundary::PacketCount(3),
            seed: 0,
            magnifier_sampler: true,
            parallel_search: false,
        }
    }

    /// The first three iterations only prime the history ring; scoring
    /// does not start until the fourth.
    #[test]
    fn first_three_iterations_are_priming_only() {
        let records: Vec<PacketRecord> = (0..12)
            .map(|i| pkt("1.2.3.1", (i % 4) as u16, i as f64))
            .collect();
        let mut source = VecPacketSource::new(records);
        let mut driver = SimulationDriver::new(make_config(), None);

        for _ in 0..3 {
            match driver.run_iteration(&mut source) {
                IterationOutcome::Priming { .. } => {}
                _ => panic!("expected a priming outcome"),
            }
        }
        match driver.run_iteration(&mut source) {
            IterationOutcome::Scored { iteration, .. } => assert_eq!(iteration, 3),
            _ => panic!("expected scoring to begin at iteration 3"),
        }
    }

    #[test]
    fn terminates_cleanly_when_the_source_is_exhausted() {
        let records = vec![pkt("1.2.3.1", 0, 0.0), pkt("1.2.3.2", 1, 1.0)];
        let mut source = VecPacketSource::new(records);
        let mut driver = SimulationDriver::new(make_config(), None);
        driver.run_iteration(&mut source); // consumes both records into one short window
        assert!(matches!(
            driver.run_iteration(&mut source),
            IterationOutcome::Terminated
        ));
    }

    #[test]
    fn nine_variants_are_tracked_once_scoring_starts() {
        let records: Vec<PacketRecord> = (0..20)
            .map(|i| pkt("1.2.3.1", (i % 4) as u16, i as f64))
            .collect();
        let mut source = VecPacketSource::new(records);
        let mut driver = SimulationDriver::new(make_config(), None);
        for _ in 0..3 {
            driver.run_iteration(&mut source);
        }
        match driver.run_iteration(&mut source) {
            IterationOutcome::Scored { variants, .. } => assert_eq!(variants.len(), 9),
            _ => panic!("expected a scored iteration"),
        }
    }
}
