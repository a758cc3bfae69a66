use crate::core::catalog::Catalog;
use crate::types::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Square degrees per steradian
const DEG2_PER_SR: f64 = (180.0 / PI) * (180.0 / PI);

/// Rings and azimuth steps used to sample each pointing footprint
const FOOTPRINT_RINGS: usize = 60;
const FOOTPRINT_AZIMUTHS: usize = 120;

/// One completeness bin, flux in catalog units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletenessBin {
    pub flux_low: f64,
    pub flux_high: f64,
    /// Detection probability in [0, 1]
    pub completeness: f64,
}

/// Ordered, non-overlapping completeness bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessTable {
    bins: Vec<CompletenessBin>,
}

impl CompletenessTable {
    pub fn new(bins: Vec<CompletenessBin>) -> CatalogResult<Self> {
        if bins.is_empty() {
            return Err(CatalogError::Schema("completeness table has no bins".to_string()));
        }
        for (i, bin) in bins.iter().enumerate() {
            if !(bin.flux_low.is_finite() && bin.flux_high.is_finite() && bin.flux_low < bin.flux_high) {
                return Err(CatalogError::Schema(format!(
                    "completeness bin {} has invalid edges [{}, {})",
                    i, bin.flux_low, bin.flux_high
                )));
            }
            if !(0.0..=1.0).contains(&bin.completeness) {
                return Err(CatalogError::Schema(format!(
                    "completeness bin {} has fraction {} outside [0, 1]",
                    i, bin.completeness
                )));
            }
            if i > 0 && bin.flux_low < bins[i - 1].flux_high {
                return Err(CatalogError::Schema(format!(
                    "completeness bins {} and {} overlap or are out of order",
                    i - 1,
                    i
                )));
            }
        }
        Ok(Self { bins })
    }

    pub fn bins(&self) -> &[CompletenessBin] {
        &self.bins
    }

    /// Completeness of the bin containing `flux`; the last bin includes its upper edge
    pub fn fraction_at(&self, flux: f64) -> Option<f64> {
        let last = self.bins.len() - 1;
        self.bins
            .iter()
            .enumerate()
            .find(|(i, b)| flux >= b.flux_low && (flux < b.flux_high || (*i == last && flux == b.flux_high)))
            .map(|(_, b)| b.completeness)
    }
}

/// Noise map in catalog flux units per beam
#[derive(Debug, Clone)]
pub struct RmsMap {
    pub data: Array2<f32>,
    pub pixel_area_deg2: f64,
}

impl RmsMap {
    pub fn new(data: Array2<f32>, pixel_area_deg2: f64) -> CatalogResult<Self> {
        check_tolerance("rms map pixel area", pixel_area_deg2)?;
        Ok(Self { data, pixel_area_deg2 })
    }

    /// Area (deg²) over which a source of `flux` is detected at `detection_sigma`
    pub fn detectable_area_deg2(&self, flux: f64, detection_sigma: f64) -> f64 {
        let pixels = self
            .data
            .iter()
            .filter(|&&rms| rms.is_finite() && rms > 0.0 && detection_sigma * rms as f64 <= flux)
            .count();
        pixels as f64 * self.pixel_area_deg2
    }
}

/// Number-count parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberCountConfig {
    pub flux_kind: FluxKind,
    pub n_bins: usize,
    /// Detection threshold in units of local rms
    pub detection_sigma: f64,
    /// Fitted-minus-deconvolved major axis significance that counts as resolved
    pub resolved_sigma: f64,
    /// Total survey area for the completeness path; `None` derives it from pointings
    pub survey_area_deg2: Option<f64>,
}

impl Default for NumberCountConfig {
    fn default() -> Self {
        Self {
            flux_kind: FluxKind::Total,
            n_bins: 10,
            detection_sigma: 5.0,
            resolved_sigma: 3.0,
            survey_area_deg2: None,
        }
    }
}

impl NumberCountConfig {
    pub fn validate(&self) -> CatalogResult<()> {
        if self.n_bins == 0 {
            return Err(CatalogError::Tolerance("number of flux bins must be positive".to_string()));
        }
        check_tolerance("detection sigma", self.detection_sigma)?;
        check_tolerance("resolved sigma", self.resolved_sigma)?;
        if let Some(area) = self.survey_area_deg2 {
            check_tolerance("survey area", area)?;
        }
        Ok(())
    }
}

/// Where the effective area of each bin came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaSource {
    Completeness,
    RmsMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxBin {
    pub low: f64,
    pub high: f64,
    /// Geometric centre
    pub center: f64,
    pub count: usize,
    /// Effective area in steradians
    pub area_sr: f64,
    /// dN/dS per steradian
    pub differential: f64,
    /// Poisson uncertainty of `differential`
    pub error: f64,
    /// S^2.5 · dN/dS
    pub euclidean: f64,
    pub euclidean_error: f64,
    pub resolved: usize,
    /// `None` for empty bins
    pub resolved_fraction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberCounts {
    /// Bins with usable area, in increasing flux
    pub bins: Vec<FluxBin>,
    /// All n_bins + 1 logarithmic edges
    pub edges: Vec<f64>,
    /// Raw counts per bin, including bins dropped for lack of area
    pub raw_counts: Vec<usize>,
    pub area_source: AreaSource,
    pub excluded_bins: usize,
}

pub struct NumberCountAnalyzer {
    config: NumberCountConfig,
}

impl NumberCountAnalyzer {
    pub fn new(config: NumberCountConfig) -> CatalogResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn analyze(
        &self,
        catalog: &Catalog,
        rms_map: Option<&RmsMap>,
        completeness: Option<&CompletenessTable>,
    ) -> CatalogResult<Measured<NumberCounts>> {
        let area_source = match (completeness, rms_map) {
            (Some(_), Some(_)) => {
                log::info!("Completeness table supplied, ignoring the rms map");
                AreaSource::Completeness
            }
            (Some(_), None) => AreaSource::Completeness,
            (None, Some(_)) => AreaSource::RmsMap,
            (None, None) => {
                return Err(CatalogError::Schema(
                    "number counts need an rms map or a completeness table".to_string(),
                ));
            }
        };

        let survey_area_deg2 = match area_source {
            AreaSource::Completeness => Some(self.survey_area_deg2(catalog)?),
            AreaSource::RmsMap => None,
        };

        let sources: Vec<&SourceRecord> = catalog
            .usable()
            .filter(|r| {
                let s = r.flux(self.config.flux_kind).value;
                s.is_finite() && s > 0.0
            })
            .collect();
        if sources.is_empty() {
            return Ok(Measured::NoData(EmptyResultWarning::emit(
                "number counts",
                format!("catalog '{}' has no usable records with positive flux", catalog.name),
            )));
        }

        let edges = self.edges(&sources);
        let n_bins = self.config.n_bins;
        let log_lo = edges[0].ln();
        let dlog = (edges[n_bins].ln() - log_lo) / n_bins as f64;

        let mut raw_counts = vec![0usize; n_bins];
        let mut resolved = vec![0usize; n_bins];
        for record in &sources {
            let s = record.flux(self.config.flux_kind).value;
            let bin = (((s.ln() - log_lo) / dlog).floor().max(0.0) as usize).min(n_bins - 1);
            raw_counts[bin] += 1;
            let (excess, sigma) = record.fit_excess();
            if excess > self.config.resolved_sigma * sigma {
                resolved[bin] += 1;
            }
        }

        let mut bins = Vec::new();
        let mut excluded_bins = 0;
        for b in 0..n_bins {
            let (low, high) = (edges[b], edges[b + 1]);
            let center = (low * high).sqrt();
            let area_deg2 = match (area_source, survey_area_deg2) {
                (AreaSource::Completeness, Some(total)) => {
                    completeness.and_then(|t| t.fraction_at(center)).unwrap_or(0.0) * total
                }
                _ => rms_map
                    .map(|m| m.detectable_area_deg2(center, self.config.detection_sigma))
                    .unwrap_or(0.0),
            };
            if !(area_deg2 > 0.0) {
                log::debug!("Dropping bin [{:.4e}, {:.4e}): no effective area", low, high);
                excluded_bins += 1;
                continue;
            }

            let count = raw_counts[b];
            let area_sr = area_deg2 / DEG2_PER_SR;
            let norm = (high - low) * area_sr;
            let differential = count as f64 / norm;
            let error = (count as f64).sqrt() / norm;
            let euclid = center.powf(2.5);
            bins.push(FluxBin {
                low,
                high,
                center,
                count,
                area_sr,
                differential,
                error,
                euclidean: euclid * differential,
                euclidean_error: euclid * error,
                resolved: resolved[b],
                resolved_fraction: (count > 0).then(|| resolved[b] as f64 / count as f64),
            });
        }

        if bins.iter().all(|b| b.count == 0) {
            return Ok(Measured::NoData(EmptyResultWarning::emit(
                "number counts",
                format!("no flux bin of '{}' has both sources and effective area", catalog.name),
            )));
        }

        log::info!(
            "Number counts for '{}': {} sources in {} bins ({} dropped, area from {:?})",
            catalog.name,
            sources.len(),
            bins.len(),
            excluded_bins,
            area_source
        );

        Ok(Measured::Value(NumberCounts { bins, edges, raw_counts, area_source, excluded_bins }))
    }

    fn edges(&self, sources: &[&SourceRecord]) -> Vec<f64> {
        let fluxes = sources.iter().map(|r| r.flux(self.config.flux_kind).value);
        let mut lo = fluxes.clone().fold(f64::INFINITY, f64::min);
        let mut hi = fluxes.fold(f64::NEG_INFINITY, f64::max);
        if hi <= lo {
            lo *= 0.99;
            hi *= 1.01;
        }
        let n = self.config.n_bins;
        let step = (hi.ln() - lo.ln()) / n as f64;
        let mut edges: Vec<f64> = (0..=n).map(|i| (lo.ln() + step * i as f64).exp()).collect();
        // Exact observed extremes so the largest flux never falls outside
        edges[0] = lo;
        edges[n] = hi;
        edges
    }

    /// Explicit survey area; else the union of footprints for a stacked
    /// catalog, or the footprint of a single pointing
    fn survey_area_deg2(&self, catalog: &Catalog) -> CatalogResult<f64> {
        if let Some(area) = self.config.survey_area_deg2 {
            return Ok(area);
        }
        let footprints: Vec<(SkyPosition, f64)> = catalog.pointings.iter().filter_map(Pointing::footprint).collect();
        match footprints.as_slice() {
            [] => Err(CatalogError::Schema(format!(
                "catalog '{}' has no pointing footprints and no survey area was given",
                catalog.name
            ))),
            [single] => Ok(footprint_union_deg2(std::slice::from_ref(single))),
            _ if catalog.stacked => {
                log::debug!("Stacked catalog: area from the union of {} footprints", footprints.len());
                Ok(footprint_union_deg2(&footprints))
            }
            _ => Err(CatalogError::Schema(format!(
                "catalog '{}' is not stacked but has {} pointing footprints; give a survey area",
                catalog.name,
                footprints.len()
            ))),
        }
    }
}

/// Area (deg²) of the union of circular footprints `(center, radius_deg)`.
///
/// Each footprint is sampled with equal-area points; a point counts only when
/// no earlier footprint already covers it. A single footprint is exact.
pub fn footprint_union_deg2(footprints: &[(SkyPosition, f64)]) -> f64 {
    let mut total = 0.0;
    for (i, &(center, radius)) in footprints.iter().enumerate() {
        let cap_sr = 2.0 * PI * (1.0 - radius.to_radians().cos());
        if i == 0 {
            total += cap_sr;
            continue;
        }
        let one_minus_cos = 1.0 - radius.to_radians().cos();
        let mut uncovered = 0usize;
        for ring in 0..FOOTPRINT_RINGS {
            let frac = (ring as f64 + 0.5) / FOOTPRINT_RINGS as f64;
            let rho = (1.0 - frac * one_minus_cos).acos().to_degrees();
            for step in 0..FOOTPRINT_AZIMUTHS {
                let bearing = 2.0 * PI * (step as f64 + 0.5) / FOOTPRINT_AZIMUTHS as f64;
                let point = center.offset_by(rho, bearing);
                if !footprints[..i].iter().any(|(c, r)| c.separation_deg(&point) <= *r) {
                    uncovered += 1;
                }
            }
        }
        total += cap_sr * uncovered as f64 / (FOOTPRINT_RINGS * FOOTPRINT_AZIMUTHS) as f64;
    }
    total * DEG2_PER_SR
}
