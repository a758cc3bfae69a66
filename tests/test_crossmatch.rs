use approx::assert_relative_eq;
use radcat::core::catalog::{Catalog, CatalogKind};
use radcat::core::crossmatch::{CrossMatcher, IndexKind, MatchConfig, MatchRadius, MatchResult};
use radcat::core::offsets::{OffsetConfig, OffsetStatistics};
use radcat::types::*;
use std::collections::BTreeSet;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn record(id: u64, ra: f64, dec: f64, flux: f64, err: f64) -> SourceRecord {
    let mut r = SourceRecord::new(id, SkyPosition::new(ra, dec));
    r.flux_total = Measurement::new(flux, err);
    r.flux_peak = Measurement::new(flux, err);
    r
}

fn catalog(name: &str, freq_mhz: f64, records: Vec<SourceRecord>) -> Catalog {
    Catalog::new(name, CatalogKind::Internal, Beam::new(5.0 / 3600.0, 5.0 / 3600.0, 0.0), freq_mhz, records)
        .expect("Failed to build catalog")
}

/// Deterministic scatter of `n` sources in a one degree patch around (ra0, dec0)
fn scatter(n: usize, seed: u64, ra0: f64, dec0: f64) -> Vec<SourceRecord> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|i| {
            let ra = (ra0 + next() - 0.5).rem_euclid(360.0);
            let dec = dec0 + next() - 0.5;
            record(i as u64 + 1, ra, dec, 1.0 + next(), 0.1)
        })
        .collect()
}

/// Second catalog: perturbed copies of most of `base` plus unrelated sources
fn perturbed(base: &[SourceRecord], seed: u64) -> Vec<SourceRecord> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    let mut out = Vec::new();
    for r in base.iter().filter(|r| r.id % 4 != 0) {
        let jitter = 3.0 / 3600.0;
        out.push(record(
            r.id + 1000,
            (r.position.ra + (next() - 0.5) * jitter).rem_euclid(360.0),
            r.position.dec + (next() - 0.5) * jitter,
            r.flux_total.value,
            0.1,
        ));
    }
    out.extend(scatter(40, seed ^ 0xABCD, base[0].position.ra, base[0].position.dec).into_iter().map(|mut r| {
        r.id += 5000;
        r
    }));
    out
}

fn id_pairs(result: &MatchResult) -> BTreeSet<(u64, u64)> {
    result.id_pairs()
}

fn pair_values(result: &MatchResult) -> Vec<(u64, u64, f64, bool, usize)> {
    result
        .all_pairs()
        .map(|p| (p.reference.id, p.candidate.id, p.separation_arcsec, p.uniqueness, p.n_within))
        .collect()
}

#[test]
fn test_scenario_single_pair_offsets_and_ratio() {
    init_logging();
    let reference = catalog("ref", 144.0, vec![record(1, 10.0, 20.0, 5.0, 0.1)]);
    let candidate = catalog("cand", 144.0, vec![record(1, 10.0001, 20.0001, 4.8, 0.1)]);

    let matcher = CrossMatcher::new(MatchConfig::with_radius_arcsec(5.0)).expect("Invalid config");
    let result = matcher.match_catalogs(&reference, &candidate).expect("Match failed");
    assert_eq!(result.pairs.len(), 1);
    assert_eq!(result.counts.reference_usable, 1);
    assert_eq!(result.counts.non_unique, 0);
    assert_relative_eq!(result.pairs[0].separation_arcsec, 0.494, epsilon = 1e-3);

    let stats = OffsetStatistics::compute(&result, &OffsetConfig::default()).expect("Offsets failed");
    assert_eq!(stats.spectral_factor, 1.0);
    let ratio = stats.all.flux_ratio.value().expect("ratio missing");
    assert_relative_eq!(ratio.median, 5.0 / 4.8, epsilon = 1e-12);
    assert_relative_eq!(ratio.median, 1.0417, epsilon = 1e-4);

    let d_ra = stats.all.d_ra.value().expect("RA offset missing");
    assert_relative_eq!(d_ra.median, 0.0001 * 3600.0 * 20f64.to_radians().cos(), epsilon = 1e-9);
    let d_dec = stats.all.d_dec.value().expect("Dec offset missing");
    assert_relative_eq!(d_dec.median, 0.36, epsilon = 1e-9);
}

#[test]
fn test_scenario_collision_excluded_from_aggregates() {
    init_logging();
    let reference = catalog(
        "ref",
        144.0,
        vec![record(1, 10.0, 20.0, 5.0, 0.1), record(2, 10.0, 20.0009, 9.0, 0.1)],
    );
    let candidate = catalog("cand", 144.0, vec![record(7, 10.0, 20.0003, 5.0, 0.1)]);

    let matcher = CrossMatcher::new(MatchConfig::with_radius_arcsec(5.0)).expect("Invalid config");
    let result = matcher.match_catalogs(&reference, &candidate).expect("Match failed");
    assert_eq!(id_pairs(&result), [(1, 7)].into_iter().collect());
    assert_eq!(result.counts.matched, 1);
    assert_eq!(result.counts.non_unique, 1);
    assert_eq!(result.rejected[0].reference.id, 2);

    let stats = OffsetStatistics::compute(&result, &OffsetConfig::default()).expect("Offsets failed");
    // Both pairs listed, only the unique one aggregated
    assert_eq!(stats.offsets.len(), 2);
    let ratio = stats.all.flux_ratio.value().expect("ratio missing");
    assert_eq!(ratio.count, 1);
    assert_relative_eq!(ratio.median, 1.0);
}

#[test]
fn test_matching_is_symmetric() {
    init_logging();
    let a_records = scatter(300, 42, 0.2, 30.0);
    let b_records = perturbed(&a_records, 7);
    let a = catalog("A", 144.0, a_records);
    let b = catalog("B", 144.0, b_records);

    let matcher = CrossMatcher::new(MatchConfig::with_radius_arcsec(6.0)).expect("Invalid config");
    let ab = matcher.match_catalogs(&a, &b).expect("A->B failed");
    let ba = matcher.match_catalogs(&b, &a).expect("B->A failed");

    // Records that took part in a collision in either direction may pair differently
    let contested_a: BTreeSet<u64> = ab
        .rejected
        .iter()
        .map(|p| p.reference.id)
        .chain(ba.rejected.iter().map(|p| p.candidate.id))
        .collect();
    let contested_b: BTreeSet<u64> = ab
        .rejected
        .iter()
        .map(|p| p.candidate.id)
        .chain(ba.rejected.iter().map(|p| p.reference.id))
        .collect();
    let settled = |pairs: BTreeSet<(u64, u64)>| -> BTreeSet<(u64, u64)> {
        pairs
            .into_iter()
            .filter(|(a, b)| !contested_a.contains(a) && !contested_b.contains(b))
            .collect()
    };

    let forward = settled(id_pairs(&ab));
    let backward = settled(id_pairs(&ba).into_iter().map(|(x, y)| (y, x)).collect());
    assert!(!forward.is_empty());
    assert_eq!(forward, backward);
    println!(
        "{} symmetric pairs, {} collisions A->B, {} collisions B->A",
        forward.len(),
        ab.counts.non_unique,
        ba.counts.non_unique
    );
}

#[test]
fn test_sole_claimant_survives_closer_unrelated_reference() {
    init_logging();
    let arcsec = 1.0 / 3600.0;
    let reference = catalog(
        "ref",
        144.0,
        vec![record(1, 10.0, 20.0 - 2.0 * arcsec, 1.0, 0.1), record(2, 10.0, 20.0 + arcsec, 1.0, 0.1)],
    );
    let candidate = catalog(
        "cand",
        144.0,
        vec![record(10, 10.0, 20.0, 1.0, 0.1), record(11, 10.0, 20.0 + 1.5 * arcsec, 1.0, 0.1)],
    );

    let matcher = CrossMatcher::new(MatchConfig::with_radius_arcsec(5.0)).expect("Invalid config");
    let result = matcher.match_catalogs(&reference, &candidate).expect("Match failed");
    assert_eq!(id_pairs(&result), [(1, 10), (2, 11)].into_iter().collect());
    assert_eq!(result.counts.matched, 2);
    assert_eq!(result.counts.non_unique, 0);

    let stats = OffsetStatistics::compute(&result, &OffsetConfig::default()).expect("Offsets failed");
    assert_eq!(stats.all.flux_ratio.value().expect("ratio missing").count, 2);
}

#[test]
fn test_matching_is_order_and_index_independent() {
    init_logging();
    let a_records = scatter(250, 3, 359.8, -10.0);
    let b_records = perturbed(&a_records, 11);

    let a = catalog("A", 144.0, a_records.clone());
    let b = catalog("B", 144.0, b_records.clone());

    let mut a_shuffled = a_records;
    a_shuffled.reverse();
    a_shuffled.rotate_left(17);
    let mut b_shuffled = b_records;
    b_shuffled.rotate_right(29);
    let a2 = catalog("A", 144.0, a_shuffled);
    let b2 = catalog("B", 144.0, b_shuffled);

    let grid = CrossMatcher::new(MatchConfig::with_radius_arcsec(6.0)).expect("Invalid config");
    let brute = CrossMatcher::new(MatchConfig {
        radius: Some(MatchRadius::Fixed { arcsec: 6.0 }),
        index: IndexKind::BruteForce,
    })
    .expect("Invalid config");

    let baseline = pair_values(&grid.match_catalogs(&a, &b).expect("Match failed"));
    assert_eq!(baseline, pair_values(&grid.match_catalogs(&a, &b).expect("Match failed")));
    assert_eq!(baseline, pair_values(&grid.match_catalogs(&a2, &b2).expect("Match failed")));
    assert_eq!(baseline, pair_values(&brute.match_catalogs(&a2, &b2).expect("Match failed")));
}

#[test]
fn test_source_extent_radius_matches_extended_sources() {
    init_logging();
    let mut big = record(1, 50.0, 10.0, 2.0, 0.1);
    big.shape_fit = Shape::new(30.0 / 3600.0, 20.0 / 3600.0, 0.0);
    let mut other = record(2, 50.0, 10.0 + 12.0 / 3600.0, 2.0, 0.1);
    other.shape_fit = Shape::new(20.0 / 3600.0, 10.0 / 3600.0, 0.0);

    let reference = catalog("ref", 54.0, vec![big]);
    let candidate = catalog("cand", 54.0, vec![other]);

    let fixed = CrossMatcher::new(MatchConfig::with_radius_arcsec(5.0)).expect("Invalid config");
    assert!(fixed.match_catalogs(&reference, &candidate).expect("Match failed").is_empty());

    // 3 / 2.3548 * (15 + 10) arcsec = 31.8 arcsec
    let extent = CrossMatcher::new(MatchConfig {
        radius: Some(MatchRadius::SourceExtent { sigma_extent: 3.0, search_dist_arcsec: 0.0 }),
        index: IndexKind::SkyGrid,
    })
    .expect("Invalid config");
    assert_eq!(extent.match_catalogs(&reference, &candidate).expect("Match failed").pairs.len(), 1);
}

#[test]
fn test_all_flagged_reference_warns() {
    init_logging();
    let mut reference = catalog("ref", 144.0, vec![record(1, 10.0, 20.0, 1.0, 0.1)]);
    reference.set_quality_flags(&[false]).expect("flag update failed");
    let candidate = catalog("cand", 144.0, vec![record(1, 10.0, 20.0, 1.0, 0.1)]);

    let result = CrossMatcher::new(MatchConfig::default())
        .expect("Invalid config")
        .match_catalogs(&reference, &candidate)
        .expect("Match failed");
    assert!(result.is_empty());
    let warning = result.warning.as_ref().expect("expected a no-data warning");
    assert_eq!(warning.stage, "cross-match");

    let stats = OffsetStatistics::compute(&result, &OffsetConfig::default()).expect("Offsets failed");
    assert!(stats.all.d_ra.is_no_data());
}
