use crate::core::catalog::Catalog;
use crate::core::spatial_index::{nearest, BruteForceIndex, SkyGridIndex, SpatialIndex};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Gaussian FWHM to sigma conversion, 2·sqrt(2·ln 2)
const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// How large an angular distance still counts as a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatchRadius {
    /// Fixed radius in arcseconds
    Fixed { arcsec: f64 },
    /// Radius from the fitted sizes of both sources:
    /// `sigma_extent / FWHM_PER_SIGMA * (maj_a/2 + maj_b/2) + search_dist`
    SourceExtent { sigma_extent: f64, search_dist_arcsec: f64 },
}

impl MatchRadius {
    pub fn validate(&self) -> CatalogResult<()> {
        match *self {
            MatchRadius::Fixed { arcsec } => {
                check_tolerance("match radius (arcsec)", arcsec)?;
            }
            MatchRadius::SourceExtent { sigma_extent, search_dist_arcsec } => {
                check_tolerance("sigma extent", sigma_extent)?;
                if !search_dist_arcsec.is_finite() || search_dist_arcsec < 0.0 {
                    return Err(CatalogError::Tolerance(format!(
                        "search distance must be finite and non-negative, got {}",
                        search_dist_arcsec
                    )));
                }
            }
        }
        Ok(())
    }

    /// Radius in degrees for a pair with the given fitted major axes (degrees)
    pub fn pair_radius_deg(&self, maj_a: f64, maj_b: f64) -> f64 {
        match *self {
            MatchRadius::Fixed { arcsec } => arcsec / ARCSEC_PER_DEG,
            MatchRadius::SourceExtent { sigma_extent, search_dist_arcsec } => {
                sigma_extent / FWHM_PER_SIGMA * (maj_a / 2.0 + maj_b / 2.0)
                    + search_dist_arcsec / ARCSEC_PER_DEG
            }
        }
    }
}

/// Which [`SpatialIndex`] implementation backs the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexKind {
    BruteForce,
    #[default]
    SkyGrid,
}

/// Cross-matching parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// `None` uses the reference catalog's beam major axis as a fixed radius
    pub radius: Option<MatchRadius>,
    pub index: IndexKind,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            radius: None,
            index: IndexKind::SkyGrid,
        }
    }
}

impl MatchConfig {
    pub fn with_radius_arcsec(arcsec: f64) -> Self {
        Self {
            radius: Some(MatchRadius::Fixed { arcsec }),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(radius) = &self.radius {
            radius.validate()?;
        }
        Ok(())
    }

    /// The configured radius, or the reference beam when none was given
    pub fn resolve_radius(&self, reference: &Catalog) -> CatalogResult<MatchRadius> {
        let radius = match self.radius {
            Some(radius) => radius,
            None => {
                log::debug!(
                    "No match radius configured, using beam of '{}' ({:.2} arcsec)",
                    reference.name,
                    reference.beam.major_arcsec()
                );
                MatchRadius::Fixed { arcsec: reference.beam.major_arcsec() }
            }
        };
        radius.validate()?;
        Ok(radius)
    }
}

/// One reference/candidate association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub reference: SourceRecord,
    pub candidate: SourceRecord,
    pub separation_arcsec: f64,
    /// False when a closer reference claimed the same candidate
    pub uniqueness: bool,
    /// Candidates inside the reference's match radius
    pub n_within: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchCounts {
    pub reference_usable: usize,
    pub candidate_usable: usize,
    pub matched: usize,
    pub non_unique: usize,
}

/// Output of one cross-match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Unique pairs, ordered by reference id
    pub pairs: Vec<MatchedPair>,
    /// Collisions that lost the tie-break, ordered by reference id
    pub rejected: Vec<MatchedPair>,
    pub counts: MatchCounts,
    pub radius: MatchRadius,
    pub reference_name: String,
    pub candidate_name: String,
    pub reference_freq_mhz: f64,
    pub candidate_freq_mhz: f64,
    pub reference_pointings: Vec<Pointing>,
    pub warning: Option<EmptyResultWarning>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Unique and rejected pairs together, for inspection
    pub fn all_pairs(&self) -> impl Iterator<Item = &MatchedPair> {
        self.pairs.iter().chain(self.rejected.iter())
    }

    /// Unique pairs as (reference id, candidate id)
    pub fn id_pairs(&self) -> BTreeSet<(u64, u64)> {
        self.pairs.iter().map(|p| (p.reference.id, p.candidate.id)).collect()
    }

    /// Separation of a reference record from its pointing center, degrees
    pub fn center_separation_deg(&self, reference: &SourceRecord) -> Option<f64> {
        self.reference_pointings
            .iter()
            .find(|p| p.id == reference.pointing_id)
            .or_else(|| if self.reference_pointings.len() == 1 { self.reference_pointings.first() } else { None })
            .and_then(|p| p.center)
            .map(|c| c.separation_deg(&reference.position))
    }
}

/// Proposal of one side: nearest partner index, separation (deg), partners in radius
type Proposal = Option<(usize, f64, usize)>;

/// Cross-matcher
pub struct CrossMatcher {
    config: MatchConfig,
}

impl CrossMatcher {
    pub fn new(config: MatchConfig) -> CatalogResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match every usable reference record against the usable candidate records
    pub fn match_catalogs(&self, reference: &Catalog, candidate: &Catalog) -> CatalogResult<MatchResult> {
        let radius = self.config.resolve_radius(reference)?;

        let mut refs: Vec<&SourceRecord> = reference.usable().collect();
        let mut cands: Vec<&SourceRecord> = candidate.usable().collect();
        refs.sort_by_key(|r| r.id);
        cands.sort_by_key(|r| r.id);

        log::info!(
            "Matching {} usable sources in '{}' against {} usable sources in '{}'",
            refs.len(),
            reference.name,
            cands.len(),
            candidate.name
        );
        log::debug!("Match radius: {:?}, index: {:?}", radius, self.config.index);

        let mut result = MatchResult {
            pairs: Vec::new(),
            rejected: Vec::new(),
            counts: MatchCounts {
                reference_usable: refs.len(),
                candidate_usable: cands.len(),
                ..Default::default()
            },
            radius,
            reference_name: reference.name.clone(),
            candidate_name: candidate.name.clone(),
            reference_freq_mhz: reference.freq_mhz,
            candidate_freq_mhz: candidate.freq_mhz,
            reference_pointings: reference.pointings.clone(),
            warning: None,
        };

        if refs.is_empty() || cands.is_empty() {
            let side = if refs.is_empty() { &reference.name } else { &candidate.name };
            result.warning = Some(EmptyResultWarning::emit(
                "cross-match",
                format!("catalog '{}' has no usable records", side),
            ));
            return Ok(result);
        }

        let cand_index = self.build_index(&cands, &radius);
        let forward = propose(&refs, &cands, cand_index.as_ref(), &radius);

        // Claimants of each candidate: the closest wins, equal separations go to the lower id
        let mut winner: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
        for (i, proposal) in forward.iter().enumerate() {
            let Some((j, sep, _)) = *proposal else { continue };
            winner
                .entry(j)
                .and_modify(|best| {
                    if sep < best.1 || (sep == best.1 && refs[i].id < refs[best.0].id) {
                        *best = (i, sep);
                    }
                })
                .or_insert((i, sep));
        }

        for (i, proposal) in forward.into_iter().enumerate() {
            let Some((j, sep_deg, n_within)) = proposal else { continue };
            let pair = MatchedPair {
                reference: refs[i].clone(),
                candidate: cands[j].clone(),
                separation_arcsec: sep_deg * ARCSEC_PER_DEG,
                uniqueness: winner.get(&j).map(|w| w.0) == Some(i),
                n_within,
            };
            if pair.uniqueness {
                result.pairs.push(pair);
            } else {
                log::debug!(
                    "Reference {} lost candidate {} to a closer reference",
                    pair.reference.id,
                    pair.candidate.id
                );
                result.rejected.push(pair);
            }
        }

        result.counts.matched = result.pairs.len();
        result.counts.non_unique = result.rejected.len();

        log::info!(
            "Matched {} of {} reference sources ({} non-unique rejected)",
            result.counts.matched,
            result.counts.reference_usable,
            result.counts.non_unique
        );

        if result.pairs.is_empty() {
            result.warning = Some(EmptyResultWarning::emit(
                "cross-match",
                format!(
                    "no matches between '{}' and '{}' within {:?}",
                    reference.name, candidate.name, radius
                ),
            ));
        }

        Ok(result)
    }

    fn build_index(&self, records: &[&SourceRecord], radius: &MatchRadius) -> Box<dyn SpatialIndex> {
        let points: Vec<SkyPosition> = records.iter().map(|r| r.position).collect();
        match self.config.index {
            IndexKind::BruteForce => Box::new(BruteForceIndex::new(points)),
            IndexKind::SkyGrid => {
                let max_major = records.iter().map(|r| r.shape_fit.major).fold(0.0, f64::max);
                let cell = radius.pair_radius_deg(max_major, max_major) * 2.0;
                Box::new(SkyGridIndex::new(points, cell))
            }
        }
    }
}

/// For each source, its nearest target within the pair radius
fn propose(
    sources: &[&SourceRecord],
    targets: &[&SourceRecord],
    index: &dyn SpatialIndex,
    radius: &MatchRadius,
) -> Vec<Proposal> {
    let max_target_major = targets.iter().map(|r| r.shape_fit.major).fold(0.0, f64::max);

    let search = |source: &&SourceRecord| -> Proposal {
        let query_radius = radius.pair_radius_deg(source.shape_fit.major, max_target_major);
        let hits: Vec<(usize, f64)> = index
            .within(&source.position, query_radius)
            .into_iter()
            .filter(|&(t, sep)| sep <= radius.pair_radius_deg(source.shape_fit.major, targets[t].shape_fit.major))
            .collect();
        let n_within = hits.len();
        nearest(hits).map(|(t, sep)| (t, sep, n_within))
    };

    #[cfg(feature = "parallel")]
    let proposals = {
        use rayon::prelude::*;
        sources.par_iter().map(search).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let proposals = sources.iter().map(search).collect();

    proposals
}
