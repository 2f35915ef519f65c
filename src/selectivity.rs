//! Row-count estimation from catalog statistics and sample histograms
//! (§4.5).

use crate::catalog::{Histogram, IndexDescriptor};
use crate::cost::Cost;
use crate::expr::{Expr, Literal};

/// Produces row-count estimates for b-tree access paths. A thin, stateless
/// wrapper around [`IndexDescriptor`]/[`Histogram`] so the loop enumerator
/// has one place to call for "how many rows will this candidate visit".
pub struct SelectivityOracle;

impl SelectivityOracle {
    /// `equal_scan_est`: rows matching `value` on the index's leading
    /// (post-prefix) column. Falls back to "divide by 4" when no histogram
    /// is present, except for a full-unique-key equality, which is 1 row.
    pub fn equal_scan_est(index: &IndexDescriptor, n_eq_before: usize, value: &Expr) -> u64 {
        if index.unique && n_eq_before + 1 == index.columns.len() {
            return 1;
        }
        let base = index.row_estimate_after(n_eq_before).max(1);
        match index.histogram.as_ref() {
            Some(hist) => match encode(value) {
                Some(enc) => equal_from_histogram(hist, &enc).unwrap_or(base.max(1)),
                None => base,
            },
            None => base,
        }
    }

    /// `range_scan_est`: rows between `lo` (exclusive of tighter bound
    /// semantics are the emitter's concern, not the estimator's) and `hi`.
    /// Each present endpoint without histogram support divides the current
    /// estimate by 4 (§4.5 "Absence of samples").
    pub fn range_scan_est(
        index: &IndexDescriptor,
        n_eq_before: usize,
        lo: Option<&Expr>,
        hi: Option<&Expr>,
    ) -> u64 {
        let base = index.row_estimate_after(n_eq_before).max(1);
        if let Some(hist) = index.histogram.as_ref() {
            if let (Some(lo_enc), Some(hi_enc)) = (lo.and_then(encode), hi.and_then(encode)) {
                let lo_pos = n_lt_from_histogram(hist, &lo_enc);
                let hi_pos = n_lt_from_histogram(hist, &hi_enc);
                if hi_pos > lo_pos {
                    return (hi_pos - lo_pos).max(1);
                }
                return 1;
            }
        }
        let mut est = base;
        if lo.is_some() {
            est = (est / 4).max(1);
        }
        if hi.is_some() {
            est = (est / 4).max(1);
        }
        est
    }

    /// `in_scan_est`: sum of `equal_scan_est` across an `IN` value list,
    /// clamped to the table's total row count.
    pub fn in_scan_est(index: &IndexDescriptor, n_eq_before: usize, values: &[Expr]) -> u64 {
        let total = index.row_est_buckets.first().copied().unwrap_or(u64::MAX);
        let sum: u64 = values
            .iter()
            .map(|v| Self::equal_scan_est(index, n_eq_before, v))
            .fold(0u64, |acc, n| acc.saturating_add(n));
        sum.min(total.max(1))
    }

    pub fn cost_of_rows(n: u64) -> Cost {
        Cost::from_rows(n)
    }
}

fn encode(expr: &Expr) -> Option<Vec<u8>> {
    match expr {
        Expr::Literal(Literal::Text(s)) => Some(s.clone().into_bytes()),
        Expr::Literal(Literal::Integer(i)) => Some(i.to_be_bytes().to_vec()),
        Expr::Literal(Literal::Blob(b)) => Some(b.clone()),
        _ => None,
    }
}

fn equal_from_histogram(hist: &Histogram, value: &[u8]) -> Option<u64> {
    match hist.samples.binary_search_by(|s| s.value.as_slice().cmp(value)) {
        Ok(idx) => Some(hist.samples[idx].n_eq.max(1)),
        Err(idx) => {
            // Interpolate between adjacent n_lt, as the spec prescribes
            // ("else interpolate between adjacent n_lt").
            let lo = if idx == 0 { 0 } else { hist.samples[idx - 1].n_lt };
            let hi = hist
                .samples
                .get(idx)
                .map(|s| s.n_lt)
                .unwrap_or(lo.saturating_add(1));
            Some(((hi.saturating_sub(lo)) / 2).max(1))
        }
    }
}

fn n_lt_from_histogram(hist: &Histogram, value: &[u8]) -> u64 {
    match hist.samples.binary_search_by(|s| s.value.as_slice().cmp(value)) {
        Ok(idx) => hist.samples[idx].n_lt,
        Err(idx) => {
            if idx == 0 {
                0
            } else {
                hist.samples[idx - 1].n_lt + hist.samples[idx - 1].n_eq
            }
        }
    }
}
