use crate::core::crossmatch::{MatchResult, MatchedPair};
use crate::core::stats::SummaryStats;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative frequency difference below which no spectral correction is applied
const SAME_FREQUENCY_RTOL: f64 = 1e-9;

/// Offset statistics parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetConfig {
    /// Total or peak flux for the flux ratio
    pub flux_kind: FluxKind,
    /// Assumed spectral index, S ∝ ν^-α
    pub alpha: f64,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            flux_kind: FluxKind::Total,
            alpha: 0.8,
        }
    }
}

impl OffsetConfig {
    pub fn validate(&self) -> CatalogResult<()> {
        if !self.alpha.is_finite() {
            return Err(CatalogError::Tolerance(format!(
                "spectral index must be finite, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Per-pair residuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairOffset {
    pub reference_id: u64,
    pub candidate_id: u64,
    pub d_ra_arcsec: f64,
    pub d_dec_arcsec: f64,
    pub separation_arcsec: f64,
    /// `None` when the corrected candidate flux is zero or not finite
    pub flux_ratio: Option<f64>,
    /// Distance of the reference from its pointing center, degrees
    pub center_separation_deg: Option<f64>,
    pub n_within: usize,
    pub unique: bool,
}

/// Aggregates for one group of pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetSummary {
    pub d_ra: Measured<SummaryStats>,
    pub d_dec: Measured<SummaryStats>,
    pub flux_ratio: Measured<SummaryStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetStatistics {
    /// Every pair, unique and rejected, in match order
    pub offsets: Vec<PairOffset>,
    /// Aggregates over all unique pairs
    pub all: OffsetSummary,
    /// Aggregates of unique pairs grouped by how many candidates were in radius
    pub by_multiplicity: BTreeMap<usize, OffsetSummary>,
    /// Factor (ν_ref/ν_cand)^-α applied to candidate fluxes
    pub spectral_factor: f64,
    pub config: OffsetConfig,
}

impl OffsetStatistics {
    /// Compute residuals and aggregates for a cross-match result
    pub fn compute(result: &MatchResult, config: &OffsetConfig) -> CatalogResult<Self> {
        config.validate()?;

        let spectral_factor = spectral_factor(result.reference_freq_mhz, result.candidate_freq_mhz, config.alpha)?;
        if spectral_factor != 1.0 {
            log::info!(
                "Scaling candidate fluxes from {:.1} MHz to {:.1} MHz with alpha = {} (factor {:.4})",
                result.candidate_freq_mhz,
                result.reference_freq_mhz,
                config.alpha,
                spectral_factor
            );
        }

        let offsets: Vec<PairOffset> = result
            .all_pairs()
            .map(|pair| pair_offset(pair, result, config.flux_kind, spectral_factor))
            .collect();

        let unique: Vec<&PairOffset> = offsets.iter().filter(|o| o.unique).collect();
        let all = summarize(&unique, "offset statistics");

        let mut classes: BTreeMap<usize, Vec<&PairOffset>> = BTreeMap::new();
        for offset in &unique {
            classes.entry(offset.n_within).or_default().push(offset);
        }
        let by_multiplicity = classes
            .into_iter()
            .map(|(n, group)| (n, summarize(&group, "offset statistics by multiplicity")))
            .collect();

        if let Some(stats) = all.d_ra.value() {
            log::info!("RA offset: median {:.3} arcsec, robust std {:.3}", stats.median, stats.robust_std);
        }
        if let Some(stats) = all.d_dec.value() {
            log::info!("Dec offset: median {:.3} arcsec, robust std {:.3}", stats.median, stats.robust_std);
        }
        if let Some(stats) = all.flux_ratio.value() {
            log::info!("Flux ratio: median {:.3}, robust std {:.3}", stats.median, stats.robust_std);
        }

        Ok(Self {
            offsets,
            all,
            by_multiplicity,
            spectral_factor,
            config: config.clone(),
        })
    }

    /// Whether there were no unique pairs to aggregate
    pub fn is_empty(&self) -> bool {
        self.all.d_ra.is_no_data()
    }
}

/// (ν_ref/ν_cand)^-α, or exactly 1 when the frequencies agree
pub fn spectral_factor(freq_ref_mhz: f64, freq_cand_mhz: f64, alpha: f64) -> CatalogResult<f64> {
    if !(freq_ref_mhz > 0.0 && freq_cand_mhz > 0.0 && freq_ref_mhz.is_finite() && freq_cand_mhz.is_finite()) {
        return Err(CatalogError::Schema(format!(
            "flux ratio needs both reference frequencies, got {} and {} MHz",
            freq_ref_mhz, freq_cand_mhz
        )));
    }
    if ((freq_ref_mhz - freq_cand_mhz) / freq_ref_mhz).abs() <= SAME_FREQUENCY_RTOL {
        return Ok(1.0);
    }
    Ok((freq_ref_mhz / freq_cand_mhz).powf(-alpha))
}

fn pair_offset(pair: &MatchedPair, result: &MatchResult, kind: FluxKind, spectral_factor: f64) -> PairOffset {
    let (d_ra_arcsec, d_dec_arcsec) = pair.reference.position.offsets_arcsec(&pair.candidate.position);
    let corrected = pair.candidate.flux(kind).value * spectral_factor;
    let flux_ratio = if corrected != 0.0 && corrected.is_finite() {
        Some(pair.reference.flux(kind).value / corrected)
    } else {
        None
    };

    PairOffset {
        reference_id: pair.reference.id,
        candidate_id: pair.candidate.id,
        d_ra_arcsec,
        d_dec_arcsec,
        separation_arcsec: pair.separation_arcsec,
        flux_ratio,
        center_separation_deg: result.center_separation_deg(&pair.reference),
        n_within: pair.n_within,
        unique: pair.uniqueness,
    }
}

fn summarize(group: &[&PairOffset], stage: &str) -> OffsetSummary {
    let measure = |values: Vec<f64>, what: &str| match SummaryStats::from_values(&values) {
        Some(stats) => Measured::Value(stats),
        None => Measured::NoData(EmptyResultWarning::emit(stage, format!("no matched pairs for {}", what))),
    };

    OffsetSummary {
        d_ra: measure(group.iter().map(|o| o.d_ra_arcsec).collect(), "RA offset"),
        d_dec: measure(group.iter().map(|o| o.d_dec_arcsec).collect(), "Dec offset"),
        flux_ratio: measure(group.iter().filter_map(|o| o.flux_ratio).collect(), "flux ratio"),
    }
}
