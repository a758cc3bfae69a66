//! radcat: post-processing for radio source catalogs
//!
//! This library turns the tables written by a source finder into validated,
//! cross-matched and statistically characterised catalogs: rule-based quality
//! flagging, nearest-neighbour cross-matching, astrometric and flux offsets,
//! merging of overlapping pointings and differential source counts.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Beam, CatalogError, CatalogResult, EmptyResultWarning, ExternalCatalogSpec, FluxKind, Measured,
    Measurement, Pointing, SkyPosition, SourceRecord, SourceType,
};

pub use io::{CatalogReader, CatalogWriter, Table};
pub use crate::core::{
    Catalog, CatalogCombiner, CrossMatcher, MatchConfig, NumberCountAnalyzer, OffsetStatistics, Selector,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::catalog::{Catalog, CatalogKind};
    use crate::core::crossmatch::{CrossMatcher, MatchConfig};
    use crate::types::{Beam, SkyPosition, SourceRecord, ARCSEC_PER_DEG};
    use numpy::{PyArray1, PyReadonlyArray1};
    use pyo3::prelude::*;

    fn runtime_error(e: impl std::fmt::Display) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    fn positions(name: &str, ra: &[f64], dec: &[f64], radius_deg: f64) -> PyResult<Catalog> {
        if ra.len() != dec.len() {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "{}: ra and dec have different lengths ({} and {})",
                name,
                ra.len(),
                dec.len()
            )));
        }
        let records = ra
            .iter()
            .zip(dec)
            .enumerate()
            .map(|(i, (&ra, &dec))| SourceRecord::new(i as u64, SkyPosition::new(ra, dec)))
            .collect();
        Catalog::new(name, CatalogKind::External, Beam::new(radius_deg, radius_deg, 0.0), 1.0, records)
            .map_err(runtime_error)
    }

    /// Great-circle separation in arcseconds
    #[pyfunction]
    fn angular_separation_arcsec(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
        SkyPosition::new(ra1, dec1).separation_arcsec(&SkyPosition::new(ra2, dec2))
    }

    /// Unique nearest-neighbour matches as (reference index, candidate index, separation arcsec)
    #[pyfunction]
    fn crossmatch<'py>(
        py: Python<'py>,
        ra1: PyReadonlyArray1<'py, f64>,
        dec1: PyReadonlyArray1<'py, f64>,
        ra2: PyReadonlyArray1<'py, f64>,
        dec2: PyReadonlyArray1<'py, f64>,
        radius_arcsec: f64,
    ) -> PyResult<(&'py PyArray1<i64>, &'py PyArray1<i64>, &'py PyArray1<f64>)> {
        let radius_deg = radius_arcsec / ARCSEC_PER_DEG;
        let reference = positions("reference", ra1.as_slice()?, dec1.as_slice()?, radius_deg)?;
        let candidate = positions("candidate", ra2.as_slice()?, dec2.as_slice()?, radius_deg)?;

        let matcher = CrossMatcher::new(MatchConfig::with_radius_arcsec(radius_arcsec)).map_err(runtime_error)?;
        let result = matcher.match_catalogs(&reference, &candidate).map_err(runtime_error)?;

        let ref_idx: Vec<i64> = result.pairs.iter().map(|p| p.reference.id as i64).collect();
        let cand_idx: Vec<i64> = result.pairs.iter().map(|p| p.candidate.id as i64).collect();
        let seps: Vec<f64> = result.pairs.iter().map(|p| p.separation_arcsec).collect();
        Ok((
            PyArray1::from_vec(py, ref_idx),
            PyArray1::from_vec(py, cand_idx),
            PyArray1::from_vec(py, seps),
        ))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(angular_separation_arcsec, m)?)?;
        m.add_function(wrap_pyfunction!(crossmatch, m)?)?;
        Ok(())
    }
}
