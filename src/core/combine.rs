use crate::core::catalog::{Catalog, CatalogKind};
use crate::core::crossmatch::{CrossMatcher, IndexKind, MatchConfig, MatchRadius};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Catalog combination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineConfig {
    /// `None` uses the beam of the first catalog of each pair
    pub radius: Option<MatchRadius>,
    /// Duplicates must agree in flux within this many combined sigma
    pub flux_sigma: f64,
    pub flux_kind: FluxKind,
    pub index: IndexKind,
    /// Name of the combined catalog
    pub name: String,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            radius: None,
            flux_sigma: 3.0,
            flux_kind: FluxKind::Total,
            index: IndexKind::SkyGrid,
            name: "combined".to_string(),
        }
    }
}

impl CombineConfig {
    pub fn validate(&self) -> CatalogResult<()> {
        check_tolerance("flux consistency sigma", self.flux_sigma)?;
        self.match_config().validate()
    }

    fn match_config(&self) -> MatchConfig {
        MatchConfig { radius: self.radius, index: self.index }
    }
}

/// One physical source detected in several pointings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Global id of the surviving record
    pub kept_id: u64,
    pub kept_pointing: String,
    pub discarded: Vec<DiscardedDetection>,
}

#[derive(Debug, Clone)]
pub struct CombinedCatalog {
    pub catalog: Catalog,
    pub duplicates_removed: usize,
    pub groups: Vec<DuplicateGroup>,
}

/// Disjoint-set forest over record slots, tracking the catalogs inside each set
struct UnionFind {
    parent: Vec<usize>,
    catalogs: Vec<BTreeSet<usize>>,
}

impl UnionFind {
    fn new(catalog_of: &[usize]) -> Self {
        Self {
            parent: (0..catalog_of.len()).collect(),
            catalogs: catalog_of.iter().map(|&c| BTreeSet::from([c])).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Join two sets unless that would put two records of one catalog together
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return true;
        }
        if !self.catalogs[ra].is_disjoint(&self.catalogs[rb]) {
            return false;
        }
        // Lower slot becomes the root
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi] = lo;
        let moved = std::mem::take(&mut self.catalogs[hi]);
        self.catalogs[lo].extend(moved);
        true
    }
}

pub struct CatalogCombiner {
    config: CombineConfig,
}

impl CatalogCombiner {
    pub fn new(config: CombineConfig) -> CatalogResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn combine(&self, catalogs: &[Catalog]) -> CatalogResult<CombinedCatalog> {
        let first = catalogs
            .first()
            .ok_or_else(|| CatalogError::InvalidInput("no catalogs to combine".to_string()))?;
        log::info!("Combining {} catalogs into '{}'", catalogs.len(), self.config.name);

        // Global slot of each record: offset of its catalog plus its index
        let offsets: Vec<usize> = catalogs
            .iter()
            .scan(0, |acc, c| {
                let start = *acc;
                *acc += c.len();
                Some(start)
            })
            .collect();
        let total: usize = catalogs.iter().map(Catalog::len).sum();
        let slot_of: Vec<HashMap<u64, usize>> = catalogs
            .iter()
            .zip(&offsets)
            .map(|(c, &off)| c.records().iter().enumerate().map(|(i, r)| (r.id, off + i)).collect())
            .collect();

        let catalog_of: Vec<usize> = catalogs
            .iter()
            .enumerate()
            .flat_map(|(c, cat)| std::iter::repeat(c).take(cat.len()))
            .collect();

        let matcher = CrossMatcher::new(self.config.match_config())?;
        let mut edges: Vec<(f64, usize, usize)> = Vec::new();
        for a in 0..catalogs.len() {
            for b in (a + 1)..catalogs.len() {
                let result = matcher.match_catalogs(&catalogs[a], &catalogs[b])?;
                for pair in &result.pairs {
                    if !self.fluxes_consistent(&pair.reference, &pair.candidate) {
                        log::debug!(
                            "Positional match {} / {} rejected as duplicate: fluxes differ",
                            pair.reference.id,
                            pair.candidate.id
                        );
                        continue;
                    }
                    if let (Some(&sa), Some(&sb)) = (slot_of[a].get(&pair.reference.id), slot_of[b].get(&pair.candidate.id)) {
                        edges.push((pair.separation_arcsec, sa, sb));
                    }
                }
            }
        }
        edges.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

        // Closest edges join first; a set never holds two detections of one pointing
        let mut groups = UnionFind::new(&catalog_of);
        let mut refused = 0usize;
        for &(_, sa, sb) in &edges {
            if !groups.union(sa, sb) {
                refused += 1;
            }
        }
        log::debug!(
            "{} duplicate edges between pointings, {} refused to keep same-pointing sources apart",
            edges.len(),
            refused
        );

        // Flattened view of every input record
        let slots: Vec<(usize, &SourceRecord)> = catalogs
            .iter()
            .enumerate()
            .flat_map(|(c, cat)| cat.records().iter().map(move |r| (c, r)))
            .collect();

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for slot in 0..total {
            members.entry(groups.find(slot)).or_default().push(slot);
        }

        let mut winner_of: HashMap<usize, usize> = HashMap::new();
        let mut discarded_by: HashMap<usize, Vec<DiscardedDetection>> = HashMap::new();
        for group in members.values().filter(|g| g.len() > 1) {
            let winner = *group
                .iter()
                .max_by(|&&x, &&y| {
                    let (cx, rx) = slots[x];
                    let (cy, ry) = slots[y];
                    self.significance(rx)
                        .total_cmp(&self.significance(ry))
                        .then(cy.cmp(&cx))
                        .then(ry.id.cmp(&rx.id))
                })
                .unwrap_or(&group[0]);
            let mut lost = Vec::new();
            for &slot in group.iter().filter(|&&s| s != winner) {
                let (c, record) = slots[slot];
                winner_of.insert(slot, winner);
                lost.push(DiscardedDetection {
                    pointing_id: pointing_of(&catalogs[c], record),
                    original_id: record.id,
                    significance: self.significance(record),
                });
            }
            discarded_by.insert(winner, lost);
        }

        let mut records = Vec::with_capacity(total - winner_of.len());
        let mut issued: HashSet<u64> = HashSet::with_capacity(total);
        let mut result_groups = Vec::new();
        for (slot, &(c, record)) in slots.iter().enumerate() {
            if winner_of.contains_key(&slot) {
                continue;
            }
            let id = records.len() as u64 + 1;
            if !issued.insert(id) {
                return Err(CatalogError::IdCollision(id));
            }

            let mut merged = record.clone();
            merged.id = id;
            merged.pointing_id = pointing_of(&catalogs[c], record);
            merged.provenance.original_id = Some(record.id);
            if let Some(lost) = discarded_by.remove(&slot) {
                result_groups.push(DuplicateGroup {
                    kept_id: id,
                    kept_pointing: merged.pointing_id.clone(),
                    discarded: lost.clone(),
                });
                merged.provenance.discarded.extend(lost);
            }
            records.push(merged);
        }

        let duplicates_removed = winner_of.len();
        let catalog = self.build_catalog(catalogs, first, records)?;
        log::info!(
            "Combined catalog '{}': {} records, {} duplicates removed in {} groups",
            catalog.name,
            catalog.len(),
            duplicates_removed,
            result_groups.len()
        );

        Ok(CombinedCatalog { catalog, duplicates_removed, groups: result_groups })
    }

    fn significance(&self, record: &SourceRecord) -> f64 {
        record.flux(self.config.flux_kind).significance()
    }

    fn fluxes_consistent(&self, a: &SourceRecord, b: &SourceRecord) -> bool {
        let (fa, fb) = (a.flux(self.config.flux_kind), b.flux(self.config.flux_kind));
        (fa.value - fb.value).abs() <= self.config.flux_sigma * fa.error.hypot(fb.error)
    }

    fn build_catalog(&self, catalogs: &[Catalog], first: &Catalog, records: Vec<SourceRecord>) -> CatalogResult<Catalog> {
        let beam = catalogs
            .iter()
            .map(|c| c.beam)
            .max_by(|a, b| a.major.total_cmp(&b.major))
            .unwrap_or(first.beam);
        if catalogs.iter().any(|c| (c.freq_mhz - first.freq_mhz).abs() > 1e-9 * first.freq_mhz) {
            log::warn!(
                "Input catalogs have different frequencies; combined catalog uses {:.3} MHz from '{}'",
                first.freq_mhz,
                first.name
            );
        }

        let mut pointings: Vec<Pointing> = Vec::new();
        for pointing in catalogs.iter().flat_map(|c| c.pointings.iter()) {
            if !pointings.iter().any(|p| p.id == pointing.id) {
                pointings.push(pointing.clone());
            }
        }

        let mut catalog = Catalog::new(&self.config.name, CatalogKind::Internal, beam, first.freq_mhz, records)?
            .with_pointings(pointings);
        catalog.stacked = true;
        catalog.flux_unit = first.flux_unit.clone();
        Ok(catalog)
    }
}

/// Pointing id of a record, falling back to its catalog's pointing or name
fn pointing_of(catalog: &Catalog, record: &SourceRecord) -> String {
    if !record.pointing_id.is_empty() {
        return record.pointing_id.clone();
    }
    match catalog.pointings.first() {
        Some(p) => p.id.clone(),
        None => catalog.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: u64, ra: f64, dec: f64, flux: f64, err: f64) -> SourceRecord {
        let mut r = SourceRecord::new(id, SkyPosition::new(ra, dec));
        r.flux_total = Measurement::new(flux, err);
        r.flux_peak = Measurement::new(flux, err);
        r
    }

    fn pointing_catalog(name: &str, ra: f64, records: Vec<SourceRecord>) -> Catalog {
        let mut pointing = Pointing::new(name);
        pointing.center = Some(SkyPosition::new(ra, 40.0));
        pointing.fov_deg = Some(4.0);
        let records = records
            .into_iter()
            .map(|mut r| {
                r.pointing_id = name.to_string();
                r
            })
            .collect();
        Catalog::new(name, CatalogKind::Internal, Beam::new(15.0 / 3600.0, 15.0 / 3600.0, 0.0), 54.0, records)
            .unwrap()
            .with_pointings(vec![pointing])
    }

    fn combiner() -> CatalogCombiner {
        CatalogCombiner::new(CombineConfig {
            radius: Some(MatchRadius::Fixed { arcsec: 10.0 }),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_keeps_most_significant_duplicate() {
        let p1 = pointing_catalog("PT-1", 100.0, vec![source(1, 101.0, 40.0, 8.0, 1.0), source(2, 99.0, 40.0, 3.0, 0.3)]);
        let p2 = pointing_catalog("PT-2", 102.0, vec![source(1, 101.0005, 40.0, 5.0, 1.0), source(2, 103.0, 40.0, 2.0, 0.2)]);

        let combined = combiner().combine(&[p1, p2]).unwrap();
        let cat = &combined.catalog;
        assert_eq!(cat.len(), 3);
        assert_eq!(combined.duplicates_removed, 1);
        assert!(cat.stacked);
        assert_eq!(cat.pointings.len(), 2);
        assert_eq!(cat.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let kept = &cat.records()[0];
        assert_eq!(kept.flux_total.value, 8.0);
        assert_eq!(kept.pointing_id, "PT-1");
        assert_eq!(kept.provenance.original_id, Some(1));
        assert_eq!(kept.provenance.discarded.len(), 1);
        assert_eq!(kept.provenance.discarded[0].pointing_id, "PT-2");
        assert_eq!(kept.provenance.discarded[0].original_id, 1);
        assert_eq!(combined.groups[0].kept_id, 1);
    }

    #[test]
    fn test_inconsistent_flux_not_merged() {
        let p1 = pointing_catalog("PT-1", 100.0, vec![source(1, 101.0, 40.0, 8.0, 0.1)]);
        let p2 = pointing_catalog("PT-2", 102.0, vec![source(1, 101.0, 40.0, 2.0, 0.1)]);
        let combined = combiner().combine(&[p1, p2]).unwrap();
        assert_eq!(combined.catalog.len(), 2);
        assert_eq!(combined.duplicates_removed, 0);
    }

    #[test]
    fn test_three_pointings_form_one_group() {
        let p1 = pointing_catalog("PT-1", 100.0, vec![source(1, 101.0, 40.0, 5.0, 1.0)]);
        let p2 = pointing_catalog("PT-2", 102.0, vec![source(1, 101.0, 40.0005, 6.0, 1.0)]);
        let p3 = pointing_catalog("PT-3", 101.0, vec![source(1, 101.0, 39.9995, 9.0, 1.0)]);
        let combined = combiner().combine(&[p1, p2, p3]).unwrap();
        assert_eq!(combined.catalog.len(), 1);
        let kept = &combined.catalog.records()[0];
        assert_eq!(kept.pointing_id, "PT-3");
        let mut lost: Vec<&str> = kept.provenance.discarded.iter().map(|d| d.pointing_id.as_str()).collect();
        lost.sort_unstable();
        assert_eq!(lost, vec!["PT-1", "PT-2"]);
    }

    #[test]
    fn test_chain_across_pointings_keeps_same_pointing_sources_apart() {
        // PT-1 sees two sources 7" apart; PT-2 and PT-3 each see one in between
        let arcsec = 1.0 / 3600.0;
        let p1 = pointing_catalog(
            "PT-1",
            100.0,
            vec![source(1, 101.0, 40.0, 5.0, 1.0), source(2, 101.0, 40.0 + 7.0 * arcsec, 5.0, 1.0)],
        );
        let p2 = pointing_catalog("PT-2", 102.0, vec![source(1, 101.0, 40.0 + 2.0 * arcsec, 5.0, 1.0)]);
        let p3 = pointing_catalog("PT-3", 101.0, vec![source(1, 101.0, 40.0 + 5.0 * arcsec, 5.0, 1.0)]);

        let combiner = CatalogCombiner::new(CombineConfig {
            radius: Some(MatchRadius::Fixed { arcsec: 4.0 }),
            ..Default::default()
        })
        .unwrap();
        let combined = combiner.combine(&[p1, p2, p3]).unwrap();

        let cat = &combined.catalog;
        assert_eq!(cat.len(), 2);
        assert_eq!(combined.duplicates_removed, 2);
        assert_eq!(combined.groups.len(), 2);
        for (record, original) in cat.records().iter().zip([1, 2]) {
            assert_eq!(record.pointing_id, "PT-1");
            assert_eq!(record.provenance.original_id, Some(original));
            assert_eq!(record.provenance.discarded.len(), 1);
        }
        assert_eq!(cat.records()[0].provenance.discarded[0].pointing_id, "PT-2");
        assert_eq!(cat.records()[1].provenance.discarded[0].pointing_id, "PT-3");
    }

    #[test]
    fn test_equal_significance_prefers_first_catalog() {
        let p1 = pointing_catalog("PT-1", 100.0, vec![source(1, 101.0, 40.0, 5.0, 1.0)]);
        let p2 = pointing_catalog("PT-2", 102.0, vec![source(1, 101.0, 40.0, 5.0, 1.0)]);
        let combined = combiner().combine(&[p1, p2]).unwrap();
        assert_eq!(combined.catalog.records()[0].pointing_id, "PT-1");
    }

    #[test]
    fn test_unusable_records_carried_through() {
        let mut p1 = pointing_catalog("PT-1", 100.0, vec![source(1, 101.0, 40.0, 5.0, 1.0)]);
        p1.set_quality_flag(0, false).unwrap();
        let p2 = pointing_catalog("PT-2", 102.0, vec![source(1, 101.0, 40.0, 5.0, 1.0)]);
        let combined = combiner().combine(&[p1, p2]).unwrap();
        assert_eq!(combined.catalog.len(), 2);
        assert_eq!(combined.catalog.usable_count(), 1);
    }

    #[test]
    fn test_empty_input_and_bad_sigma() {
        assert!(matches!(combiner().combine(&[]), Err(CatalogError::InvalidInput(_))));
        let config = CombineConfig { flux_sigma: 0.0, ..Default::default() };
        assert!(matches!(CatalogCombiner::new(config), Err(CatalogError::Tolerance(_))));
    }
}
