use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How the catalog was identified when it was loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogKind {
    /// Written by the source finder, self-describing
    Internal,
    /// Interpreted through a user supplied column mapping
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub kind: CatalogKind,
    pub beam: Beam,
    /// Reference frequency in MHz
    pub freq_mhz: f64,
    pub pointings: Vec<Pointing>,
    /// Set when the catalog was stacked from several pointings
    pub stacked: bool,
    pub flux_unit: Option<String>,
    pub meta: BTreeMap<String, String>,
    mapping: ColumnMapping,
    records: Vec<SourceRecord>,
}

impl Catalog {
    /// Create a catalog, checking id uniqueness, uncertainties and metadata
    pub fn new(
        name: impl Into<String>,
        kind: CatalogKind,
        beam: Beam,
        freq_mhz: f64,
        records: Vec<SourceRecord>,
    ) -> CatalogResult<Self> {
        let name = name.into();
        beam.validate()?;
        if !(freq_mhz.is_finite() && freq_mhz > 0.0) {
            return Err(CatalogError::Schema(format!(
                "Catalog '{}' has no valid reference frequency ({} MHz)",
                name, freq_mhz
            )));
        }

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id) {
                return Err(CatalogError::Schema(format!(
                    "Catalog '{}' contains id {} more than once",
                    name, record.id
                )));
            }
            check_uncertainties(record)?;
        }

        log::debug!("Created catalog '{}' with {} records", name, records.len());

        Ok(Self {
            name,
            kind,
            beam,
            freq_mhz,
            pointings: Vec::new(),
            stacked: false,
            flux_unit: None,
            meta: BTreeMap::new(),
            mapping: ColumnMapping::internal(),
            records,
        })
    }

    pub fn with_pointings(mut self, pointings: Vec<Pointing>) -> Self {
        self.pointings = pointings;
        self
    }

    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SourceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records passing the quality gate
    pub fn usable(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.iter().filter(|r| r.quality_flag)
    }

    pub fn usable_count(&self) -> usize {
        self.usable().count()
    }

    pub fn record_by_id(&self, id: u64) -> Option<&SourceRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn quality_flags(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.quality_flag).collect()
    }

    pub fn set_quality_flag(&mut self, index: usize, usable: bool) -> CatalogResult<()> {
        let len = self.records.len();
        let record = self.records.get_mut(index).ok_or_else(|| {
            CatalogError::InvalidInput(format!("Record index {} out of range ({} records)", index, len))
        })?;
        record.quality_flag = usable;
        Ok(())
    }

    pub fn set_quality_flags(&mut self, flags: &[bool]) -> CatalogResult<()> {
        if flags.len() != self.records.len() {
            return Err(CatalogError::Schema(format!(
                "Got {} quality flags for {} records",
                flags.len(),
                self.records.len()
            )));
        }
        for (record, flag) in self.records.iter_mut().zip(flags) {
            record.quality_flag = *flag;
        }
        Ok(())
    }

    /// Mark every record usable again
    pub fn reset_quality_flags(&mut self) {
        for record in &mut self.records {
            record.quality_flag = true;
        }
    }

    /// Canonical field name for a table column or canonical name
    pub fn resolve_column(&self, name: &str) -> String {
        if CANONICAL_FIELDS.contains(&name) {
            return name.to_string();
        }
        self.mapping
            .canonical_for(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string())
    }

    /// Whether the column exists on this catalog
    pub fn has_column(&self, name: &str) -> bool {
        let canonical = self.resolve_column(name);
        CANONICAL_FIELDS.contains(&canonical.as_str())
            || self.records.iter().any(|r| r.extra.contains_key(&canonical))
    }

    /// Values of one column in record order; missing cells fail
    pub fn column(&self, name: &str) -> CatalogResult<Vec<FieldValue>> {
        if !self.has_column(name) {
            return Err(CatalogError::Schema(format!(
                "Catalog '{}' has no column '{}'",
                self.name, name
            )));
        }
        let canonical = self.resolve_column(name);
        self.records
            .iter()
            .map(|r| {
                r.field(&canonical).ok_or_else(|| {
                    CatalogError::Schema(format!(
                        "Record {} in '{}' has no value for column '{}'",
                        r.id, self.name, name
                    ))
                })
            })
            .collect()
    }

    /// Overwrite a writable column: the quality flag or a carried-through column
    pub fn set_column(&mut self, name: &str, values: &[FieldValue]) -> CatalogResult<()> {
        if values.len() != self.records.len() {
            return Err(CatalogError::Schema(format!(
                "Got {} values for column '{}' but catalog has {} records",
                values.len(),
                name,
                self.records.len()
            )));
        }

        let canonical = self.resolve_column(name);
        if canonical == "quality_flag" {
            let flags = values
                .iter()
                .map(|v| match v.as_f64() {
                    Some(x) => Ok(x != 0.0),
                    None => Err(CatalogError::Parse(format!("Invalid quality flag '{}'", v))),
                })
                .collect::<CatalogResult<Vec<bool>>>()?;
            return self.set_quality_flags(&flags);
        }

        if CANONICAL_FIELDS.contains(&canonical.as_str()) {
            return Err(CatalogError::Schema(format!(
                "Column '{}' is read-only; only quality flags and extra columns can be edited",
                name
            )));
        }

        for (record, value) in self.records.iter_mut().zip(values) {
            record.extra.insert(canonical.clone(), value.clone());
        }
        Ok(())
    }

    /// Pointing a record was observed in, if known
    pub fn pointing_of(&self, record: &SourceRecord) -> Option<&Pointing> {
        self.pointings
            .iter()
            .find(|p| p.id == record.pointing_id)
            .or_else(|| if self.pointings.len() == 1 { self.pointings.first() } else { None })
    }

    /// Separation of a record from its pointing center, degrees
    pub fn separation_from_center(&self, record: &SourceRecord) -> Option<f64> {
        self.pointing_of(record)
            .and_then(|p| p.center)
            .map(|center| center.separation_deg(&record.position))
    }

    /// Assign IAU-style names to every record
    pub fn assign_iau_names(&mut self, survey: Option<&str>) {
        for record in &mut self.records {
            record.name = Some(crate::core::naming::iau_name(&record.position, survey));
        }
    }
}

fn check_uncertainties(record: &SourceRecord) -> CatalogResult<()> {
    let errors = [
        ("e_ra", record.position.e_ra),
        ("e_dec", record.position.e_dec),
        ("e_flux_total", record.flux_total.error),
        ("e_flux_peak", record.flux_peak.error),
        ("e_maj", record.shape_fit.e_major),
        ("e_min", record.shape_fit.e_minor),
        ("e_dc_maj", record.shape_deconvolved.e_major),
        ("e_dc_min", record.shape_deconvolved.e_minor),
        ("e_island_flux", record.island_flux.error),
    ];
    for (name, value) in errors {
        if value < 0.0 || value.is_nan() {
            return Err(CatalogError::Schema(format!(
                "Record {} has invalid uncertainty {} = {}",
                record.id, name, value
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beam() -> Beam {
        Beam::new(5.0 / 3600.0, 5.0 / 3600.0, 0.0)
    }

    fn catalog() -> Catalog {
        let records = (1..=3)
            .map(|i| SourceRecord::new(i, SkyPosition::new(10.0 + i as f64 * 0.01, 20.0)))
            .collect();
        Catalog::new("test", CatalogKind::Internal, beam(), 144.0, records).unwrap()
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![
            SourceRecord::new(1, SkyPosition::new(0.0, 0.0)),
            SourceRecord::new(1, SkyPosition::new(1.0, 0.0)),
        ];
        let result = Catalog::new("dup", CatalogKind::Internal, beam(), 144.0, records);
        assert!(matches!(result, Err(CatalogError::Schema(_))));
    }

    #[test]
    fn test_negative_uncertainty_rejected() {
        let mut record = SourceRecord::new(1, SkyPosition::new(0.0, 0.0));
        record.flux_total = Measurement::new(1.0, -0.1);
        let result = Catalog::new("neg", CatalogKind::Internal, beam(), 144.0, vec![record]);
        assert!(matches!(result, Err(CatalogError::Schema(_))));
    }

    #[test]
    fn test_missing_frequency_rejected() {
        let result = Catalog::new("nofreq", CatalogKind::External, beam(), f64::NAN, Vec::new());
        assert!(matches!(result, Err(CatalogError::Schema(_))));
    }

    #[test]
    fn test_column_access_by_table_name() {
        let cat = catalog();
        let ra = cat.column("RA").unwrap();
        assert_eq!(ra.len(), 3);
        assert!((ra[0].as_f64().unwrap() - 10.01).abs() < 1e-12);
        assert!(cat.column("NoSuchColumn").is_err());
    }

    #[test]
    fn test_geometry_columns_are_read_only() {
        let mut cat = catalog();
        let values = vec![FieldValue::Float(0.0); 3];
        assert!(cat.set_column("RA", &values).is_err());

        let flags = vec![FieldValue::Int(1), FieldValue::Int(0), FieldValue::Int(1)];
        cat.set_column("Quality_flag", &flags).unwrap();
        assert_eq!(cat.quality_flags(), vec![true, false, true]);
        assert_eq!(cat.usable_count(), 2);
    }

    #[test]
    fn test_extra_column_write() {
        let mut cat = catalog();
        let values = vec![FieldValue::Text("a".into()), FieldValue::Text("b".into()), FieldValue::Text("c".into())];
        cat.set_column("Note", &values).unwrap();
        assert!(cat.has_column("Note"));
        assert_eq!(cat.column("Note").unwrap(), values);
    }

    #[test]
    fn test_separation_from_center() {
        let mut pointing = Pointing::new("PT-A");
        pointing.center = Some(SkyPosition::new(10.0, 20.0));
        pointing.fov_deg = Some(2.0);
        let cat = catalog().with_pointings(vec![pointing]);
        let sep = cat.separation_from_center(&cat.records()[0]).unwrap();
        assert!((sep - 0.01 * 20f64.to_radians().cos()).abs() < 1e-6);
    }
}
