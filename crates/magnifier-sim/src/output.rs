//! Output metrics file writer.
//!
//! One line per metric, `metric_name,val_iter_0,val_iter_1,…` — a wide,
//! metric-major CSV rather than the teacher's usual one-`serde`-row-per-record
//! shape, because the reported numbers are themselves "a dictionary of
//! parallel sequences, one CSV row per metric, one column per iteration".
//! Values accumulate in memory across the run (see `record_iteration`/
//! `record_variant`) and are written once the run completes, via
//! `csv::Writer` with `flexible(true)` since rows have no fixed width.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context as _, Result};

use crate::driver::Variant;
use crate::eval::{InvalidationResults, SamplingResults, SentinelResults};
use magnifier_core::sentinel::Ordering;

fn variant_label(variant: Variant) -> String {
    match variant {
        Variant::Full => "full".to_string(),
        Variant::Top(Ordering::Activity, k) => format!("activity_{k}"),
        Variant::Top(Ordering::Size, k) => format!("size_{k}"),
        Variant::Top(Ordering::Full, k) => format!("full_{k}"),
    }
}

pub struct OutputWriter {
    path: PathBuf,
    order: Vec<String>,
    values: HashMap<String, Vec<String>>,
    first_end_ts: Option<f64>,
}

impl OutputWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(OutputWriter {
            path: path.to_path_buf(),
            order: Vec::new(),
            values: HashMap::new(),
            first_end_ts: None,
        })
    }

    /// Records the metrics shared by every variant in a scored iteration:
    /// the rebased window end timestamp and the pre-mirroring sampling/
    /// sentinel scores.
    pub fn record_iteration(
        &mut self,
        end_ts: f64,
        sampling: &SamplingResults,
        sentinels_raw: &SentinelResults,
        sentinels_strict: &SentinelResults,
    ) {
        let first = *self.first_end_ts.get_or_insert(end_ts);
        self.push("iteration_end_ts", (end_ts - first).to_string());
        self.push("sampling_covered", sampling.covered.to_string());
        self.push("sampling_not_covered", sampling.not_covered.to_string());
        self.push(
            "sentinel_covered_correct_raw",
            sentinels_raw.covered_correct.to_string(),
        );
        self.push(
            "sentinel_covered_wrong_raw",
            sentinels_raw.covered_wrong.to_string(),
        );
        self.push(
            "sentinel_covered_correct_strict",
            sentinels_strict.covered_correct.to_string(),
        );
        self.push(
            "sentinel_covered_wrong_strict",
            sentinels_strict.covered_wrong.to_string(),
        );
    }

    /// Records the metrics specific to one `(order, top_k)` variant in a
    /// scored iteration: mirroring output and invalidation stats.
    pub fn record_variant(
        &mut self,
        variant: Variant,
        mirrored_count: usize,
        invalidation: &InvalidationResults,
    ) {
        let label = variant_label(variant);
        self.push(
            &format!("{label}_mirrored_pkt_count"),
            mirrored_count.to_string(),
        );
        self.push(
            &format!("{label}_prefix_lost"),
            invalidation.prefix_lost.to_string(),
        );
        self.push(
            &format!("{label}_pkt_lost"),
            invalidation.pkt_lost.to_string(),
        );
    }

    fn push(&mut self, metric: &str, value: String) {
        if !self.values.contains_key(metric) {
            self.order.push(metric.to_string());
            self.values.insert(metric.to_string(), Vec::new());
        }
        self.values.get_mut(metric).unwrap().push(value);
    }

    pub fn finish(self) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("creating output file {}", self.path.display()))?;
        for metric in &self.order {
            let mut record = vec![metric.clone()];
            record.extend(self.values[metric].iter().cloned());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
