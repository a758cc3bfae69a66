use crate::core::catalog::{Catalog, CatalogKind};
use crate::core::naming;
use crate::io::table::{Column, ColumnData, Table};
use crate::types::*;
use regex::Regex;
use std::collections::BTreeSet;

/// Columns an internal catalog must carry
const INTERNAL_REQUIRED: &[&str] = &[
    "id", "ra", "e_ra", "dec", "e_dec", "flux_total", "e_flux_total", "flux_peak", "e_flux_peak",
    "maj", "min", "pa", "dc_maj", "dc_min", "dc_pa", "source_type",
];

/// Columns an external catalog must map
const EXTERNAL_REQUIRED: &[&str] = &["ra", "dec", "flux_total"];

const POSITION_FIELDS: &[&str] = &["ra", "e_ra", "dec", "e_dec"];
const FLUX_FIELDS: &[&str] = &[
    "flux_total", "e_flux_total", "flux_peak", "e_flux_peak", "island_flux", "e_island_flux",
];
const SHAPE_FIELDS: &[&str] = &[
    "maj", "e_maj", "min", "e_min", "dc_maj", "e_dc_maj", "dc_min", "e_dc_min",
];

/// Provenance columns written for combined catalogs
const ORIGINAL_ID_COLUMN: &str = "Orig_Source_id";
const DISCARDED_COLUMN: &str = "Discarded_from";

/// Builds catalogs from tables
pub struct CatalogReader;

impl CatalogReader {
    /// Whether the table identifies itself as a source-finder catalog
    pub fn is_internal(table: &Table) -> bool {
        let marker = Regex::new(r"(?i)bdsfcat").map(|re| re.is_match(&table.name)).unwrap_or(false);
        marker || table.meta.contains_key("SF_BMAJ")
    }

    /// Load a catalog. An explicit external description always wins; without one
    /// the table must be internal.
    pub fn load(table: &Table, external: Option<&ExternalCatalogSpec>) -> CatalogResult<Catalog> {
        match external {
            Some(spec) => Self::load_external(table, spec),
            None if Self::is_internal(table) => Self::load_internal(table),
            None => Err(CatalogError::Schema(format!(
                "Table '{}' is not a source-finder catalog and no column mapping and beam were supplied",
                table.name
            ))),
        }
    }

    pub fn load_internal(table: &Table) -> CatalogResult<Catalog> {
        log::info!("Loading internal catalog '{}' ({} rows)", table.name, table.n_rows());
        let mapping = ColumnMapping::internal();

        let beam = Beam::new(
            required_meta(table, "SF_BMAJ")?,
            required_meta(table, "SF_BMIN")?,
            table.meta_f64("SF_BPA")?.unwrap_or(0.0),
        );
        let freq_mhz = Self::reference_frequency(table)?.ok_or_else(|| {
            CatalogError::Schema(format!("Catalog '{}' has no frequency axis in its header", table.name))
        })?;
        let pointings = Self::pointings(table)?;
        log::debug!("Beam {:?}, frequency {:.3} MHz, {} pointing(s)", beam, freq_mhz, pointings.len());

        let default_pointing = pointings.first().map(|p| p.id.clone()).unwrap_or_else(|| table.name.clone());
        let records = read_records(table, &mapping, INTERNAL_REQUIRED, &default_pointing)?;

        let stacked = table.meta_value("STACKED").map(|v| v == "T").unwrap_or(false) || pointings.len() > 1;
        let mut catalog = Catalog::new(&table.name, CatalogKind::Internal, beam, freq_mhz, records)?
            .with_pointings(pointings)
            .with_mapping(mapping.clone());
        catalog.stacked = stacked;
        catalog.flux_unit = shared_unit(table, &mapping, FLUX_FIELDS, "flux")?;
        catalog.meta = table.meta.clone();
        Ok(catalog)
    }

    pub fn load_external(table: &Table, spec: &ExternalCatalogSpec) -> CatalogResult<Catalog> {
        log::info!("Loading external catalog '{}' ({} rows)", table.name, table.n_rows());
        let records = read_records(table, &spec.columns, EXTERNAL_REQUIRED, &table.name)?;

        let mut catalog = Catalog::new(&table.name, CatalogKind::External, spec.beam, spec.freq_mhz, records)?
            .with_mapping(spec.columns.clone());
        catalog.flux_unit = shared_unit(table, &spec.columns, FLUX_FIELDS, "flux")?;
        catalog.meta = table.meta.clone();
        Ok(catalog)
    }

    /// `CRVALn` of the `CTYPEn` axis that is a frequency axis, in MHz
    fn reference_frequency(table: &Table) -> CatalogResult<Option<f64>> {
        for (key, value) in &table.meta {
            let Some(axis) = key.strip_prefix("CTYPE") else { continue };
            if !value.to_ascii_uppercase().contains("FREQ") {
                continue;
            }
            if let Some(hz) = table.meta_f64(&format!("CRVAL{}", axis))? {
                return Ok(Some(hz / 1e6));
            }
        }
        Ok(None)
    }

    /// Pointing footprints from `PNTn_*` keys, or from the image WCS
    fn pointings(table: &Table) -> CatalogResult<Vec<Pointing>> {
        if let Some(n) = table.meta_f64("NPOINT")? {
            let mut pointings = Vec::new();
            for i in 1..=(n as usize) {
                let id = table
                    .meta_value(&format!("PNT{}_ID", i))
                    .ok_or_else(|| CatalogError::Schema(format!("Header lists {} pointings but PNT{}_ID is missing", n, i)))?;
                let mut pointing = Pointing::new(id);
                if let (Some(ra), Some(dec)) = (
                    table.meta_f64(&format!("PNT{}_RA", i))?,
                    table.meta_f64(&format!("PNT{}_DEC", i))?,
                ) {
                    pointing.center = Some(SkyPosition::new(ra, dec));
                }
                pointing.fov_deg = table.meta_f64(&format!("PNT{}_FOV", i))?;
                pointings.push(pointing);
            }
            return Ok(pointings);
        }

        let id = match table.meta_value("OBJECT") {
            Some(object) if !object.is_empty() => naming::pointing_id(object),
            _ => table.name.clone(),
        };
        let mut pointing = Pointing::new(id);
        if let (Some(ra), Some(dec)) = (table.meta_f64("CRVAL1")?, table.meta_f64("CRVAL2")?) {
            pointing.center = Some(SkyPosition::new(ra, dec));
            if let (Some(cdelt), Some(crpix)) = (table.meta_f64("CDELT1")?, table.meta_f64("CRPIX1")?) {
                pointing.fov_deg = Some(cdelt.abs() * crpix * 2.0 / dec.to_radians().cos());
            }
        }
        Ok(vec![pointing])
    }
}

fn required_meta(table: &Table, key: &str) -> CatalogResult<f64> {
    table.meta_f64(key)?.ok_or_else(|| {
        CatalogError::Schema(format!("Catalog '{}' is missing header keyword {}", table.name, key))
    })
}

/// The unit shared by every declared column in a group; peak fluxes per beam
/// count as the same unit as integrated fluxes
fn shared_unit(table: &Table, mapping: &ColumnMapping, fields: &[&str], what: &str) -> CatalogResult<Option<String>> {
    let units: BTreeSet<&str> = fields
        .iter()
        .filter_map(|f| mapping.get(f))
        .filter_map(|name| table.column(name))
        .filter_map(|c| c.unit.as_deref())
        .map(|u| u.trim().trim_end_matches("/beam"))
        .filter(|u| !u.is_empty())
        .collect();
    if units.len() > 1 {
        return Err(CatalogError::Schema(format!(
            "Catalog '{}' mixes {} units: {:?}",
            table.name, what, units
        )));
    }
    Ok(units.into_iter().next().map(str::to_string))
}

/// Factor turning shape columns into degrees
fn shape_scale(table: &Table, mapping: &ColumnMapping) -> CatalogResult<f64> {
    match shared_unit(table, mapping, SHAPE_FIELDS, "shape")?.as_deref() {
        None | Some("deg") => Ok(1.0),
        Some("arcsec") => Ok(1.0 / ARCSEC_PER_DEG),
        Some(other) => Err(CatalogError::Schema(format!(
            "Catalog '{}' has shape columns in unsupported unit '{}'",
            table.name, other
        ))),
    }
}

fn check_position_units(table: &Table, mapping: &ColumnMapping) -> CatalogResult<()> {
    for field in POSITION_FIELDS {
        let Some(column) = mapping.get(field).and_then(|name| table.column(name)) else { continue };
        if let Some(unit) = column.unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            if unit != "deg" {
                return Err(CatalogError::Schema(format!(
                    "Column '{}' of '{}' must be in deg, found '{}'",
                    column.name, table.name, unit
                )));
            }
        }
    }
    Ok(())
}

/// Typed access to one row through a column mapping
struct RowReader<'a> {
    table: &'a Table,
    mapping: &'a ColumnMapping,
}

impl<'a> RowReader<'a> {
    fn column(&self, field: &str) -> Option<&'a Column> {
        self.mapping.get(field).and_then(|name| self.table.column(name))
    }

    fn float(&self, field: &str, row: usize) -> CatalogResult<Option<f64>> {
        let Some(column) = self.column(field) else { return Ok(None) };
        match column.data.float(row) {
            Some(v) => Ok(Some(v)),
            None => Err(CatalogError::Parse(format!(
                "Row {} of column '{}' in '{}' is not numeric",
                row, column.name, self.table.name
            ))),
        }
    }

    fn float_or(&self, field: &str, row: usize, default: f64) -> CatalogResult<f64> {
        Ok(self.float(field, row)?.unwrap_or(default))
    }

    fn text(&self, field: &str, row: usize) -> Option<String> {
        self.column(field).and_then(|c| c.data.text(row))
    }
}

fn read_records(
    table: &Table,
    mapping: &ColumnMapping,
    required: &[&str],
    default_pointing: &str,
) -> CatalogResult<Vec<SourceRecord>> {
    let missing: Vec<String> = required
        .iter()
        .filter(|f| mapping.get(f).and_then(|name| table.column(name)).is_none())
        .map(|f| mapping.get(f).unwrap_or(*f).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CatalogError::Schema(format!(
            "Catalog '{}' is missing required column(s): {}",
            table.name,
            missing.join(", ")
        )));
    }
    check_position_units(table, mapping)?;
    let shape = shape_scale(table, mapping)?;

    let reader = RowReader { table, mapping };
    let mapped: BTreeSet<&str> = mapping.iter().map(|(_, column)| column).collect();
    let extra_columns: Vec<&Column> = table
        .columns()
        .iter()
        .filter(|c| !mapped.contains(c.name.as_str()))
        .filter(|c| c.name != ORIGINAL_ID_COLUMN && c.name != DISCARDED_COLUMN)
        .collect();

    let mut records = Vec::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        let id = match reader.float("id", row)? {
            Some(v) if v >= 0.0 && v.fract() == 0.0 => v as u64,
            Some(v) => {
                return Err(CatalogError::Parse(format!("Row {} of '{}' has invalid id {}", row, table.name, v)));
            }
            None => row as u64 + 1,
        };

        let mut position = SkyPosition::new(reader.float_or("ra", row, f64::NAN)?, reader.float_or("dec", row, f64::NAN)?);
        position.e_ra = reader.float_or("e_ra", row, 0.0)?;
        position.e_dec = reader.float_or("e_dec", row, 0.0)?;
        if !(position.ra.is_finite() && position.dec.is_finite()) {
            return Err(CatalogError::Parse(format!("Row {} of '{}' has no valid position", row, table.name)));
        }

        let mut record = SourceRecord::new(id, position);
        record.name = reader.text("name", row).filter(|n| !n.is_empty());
        record.flux_total = Measurement::new(reader.float_or("flux_total", row, 0.0)?, reader.float_or("e_flux_total", row, 0.0)?);
        record.flux_peak = match reader.float("flux_peak", row)? {
            Some(peak) => Measurement::new(peak, reader.float_or("e_flux_peak", row, 0.0)?),
            None => record.flux_total,
        };
        record.shape_fit = Shape {
            major: reader.float_or("maj", row, 0.0)? * shape,
            minor: reader.float_or("min", row, 0.0)? * shape,
            pa: reader.float_or("pa", row, 0.0)?,
            e_major: reader.float_or("e_maj", row, 0.0)? * shape,
            e_minor: reader.float_or("e_min", row, 0.0)? * shape,
            e_pa: reader.float_or("e_pa", row, 0.0)?,
        };
        record.shape_deconvolved = Shape {
            major: reader.float_or("dc_maj", row, 0.0)? * shape,
            minor: reader.float_or("dc_min", row, 0.0)? * shape,
            pa: reader.float_or("dc_pa", row, 0.0)?,
            e_major: reader.float_or("e_dc_maj", row, 0.0)? * shape,
            e_minor: reader.float_or("e_dc_min", row, 0.0)? * shape,
            e_pa: reader.float_or("e_dc_pa", row, 0.0)?,
        };
        record.island_flux = match reader.float("island_flux", row)? {
            Some(isl) => Measurement::new(isl, reader.float_or("e_island_flux", row, 0.0)?),
            None => record.flux_total,
        };
        if let Some(code) = reader.text("source_type", row) {
            record.source_type = SourceType::from_code(&code);
        }
        record.quality_flag = reader.float("quality_flag", row)?.map(|q| q != 0.0).unwrap_or(true);
        record.pointing_id = reader
            .text("pointing_id", row)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| default_pointing.to_string());
        record.provenance = read_provenance(table, row)?;

        for column in &extra_columns {
            if let Some(value) = column.data.get(row) {
                record.extra.insert(column.name.clone(), value);
            }
        }
        records.push(record);
    }

    log::debug!("Read {} records, {} carried-through columns", records.len(), extra_columns.len());
    Ok(records)
}

fn read_provenance(table: &Table, row: usize) -> CatalogResult<Provenance> {
    let mut provenance = Provenance::default();
    if let Some(id) = table.column(ORIGINAL_ID_COLUMN).and_then(|c| c.data.float(row)) {
        if id >= 0.0 {
            provenance.original_id = Some(id as u64);
        }
    }
    if let Some(text) = table.column(DISCARDED_COLUMN).and_then(|c| c.data.text(row)) {
        for entry in text.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.rsplitn(3, ':').collect();
            let [significance, original_id, pointing_id] = parts[..] else {
                return Err(CatalogError::Parse(format!("Invalid discard entry '{}'", entry)));
            };
            provenance.discarded.push(DiscardedDetection {
                pointing_id: pointing_id.to_string(),
                original_id: original_id
                    .parse()
                    .map_err(|_| CatalogError::Parse(format!("Invalid discarded id in '{}'", entry)))?,
                significance: significance
                    .parse()
                    .map_err(|_| CatalogError::Parse(format!("Invalid significance in '{}'", entry)))?,
            });
        }
    }
    Ok(provenance)
}

/// Serialises catalogs back to tables with the source-finder column names
pub struct CatalogWriter;

impl CatalogWriter {
    pub fn to_table(catalog: &Catalog) -> CatalogResult<Table> {
        let internal = ColumnMapping::internal();
        let records = catalog.records();
        let mut table = Table::new(&catalog.name);
        table.meta = catalog.meta.clone();
        // WCS keys of the source image no longer describe a written catalog
        table.meta.retain(|k, _| !k.starts_with("CTYPE") && !k.starts_with("CRVAL") && !k.starts_with("PNT"));

        table.meta.insert("SF_BMAJ".into(), catalog.beam.major.to_string());
        table.meta.insert("SF_BMIN".into(), catalog.beam.minor.to_string());
        table.meta.insert("SF_BPA".into(), catalog.beam.pa.to_string());
        table.meta.insert("CTYPE3".into(), "FREQ".into());
        table.meta.insert("CRVAL3".into(), (catalog.freq_mhz * 1e6).to_string());
        table.meta.insert("STACKED".into(), if catalog.stacked { "T" } else { "F" }.into());
        table.meta.insert("NPOINT".into(), catalog.pointings.len().to_string());
        for (i, pointing) in catalog.pointings.iter().enumerate() {
            let n = i + 1;
            table.meta.insert(format!("PNT{}_ID", n), pointing.id.clone());
            if let Some(center) = pointing.center {
                table.meta.insert(format!("PNT{}_RA", n), center.ra.to_string());
                table.meta.insert(format!("PNT{}_DEC", n), center.dec.to_string());
            }
            if let Some(fov) = pointing.fov_deg {
                table.meta.insert(format!("PNT{}_FOV", n), fov.to_string());
            }
        }

        for &field in CANONICAL_FIELDS {
            let Some(name) = internal.get(field) else { continue };
            if field == "name" && records.iter().all(|r| r.name.is_none()) {
                continue;
            }
            let values: Vec<FieldValue> = records
                .iter()
                .map(|r| r.field(field).unwrap_or_else(|| FieldValue::Text(String::new())))
                .collect();
            let mut column = Column::new(name, ColumnData::from_values(&values));
            if POSITION_FIELDS.contains(&field) || SHAPE_FIELDS.contains(&field) {
                column = column.with_unit("deg");
            } else if FLUX_FIELDS.contains(&field) {
                if let Some(unit) = &catalog.flux_unit {
                    column = column.with_unit(unit.clone());
                }
            }
            table.add_column(column)?;
        }

        let extra_names: BTreeSet<&str> = records.iter().flat_map(|r| r.extra.keys().map(String::as_str)).collect();
        for name in extra_names {
            let values: Vec<FieldValue> = records
                .iter()
                .map(|r| r.extra.get(name).cloned().unwrap_or_else(|| FieldValue::Text(String::new())))
                .collect();
            table.add_column(Column::new(name, ColumnData::from_values(&values)))?;
        }

        if records.iter().any(|r| r.provenance != Provenance::default()) {
            let original: Vec<i64> = records
                .iter()
                .map(|r| r.provenance.original_id.map(|id| id as i64).unwrap_or(-1))
                .collect();
            table.add_column(Column::new(ORIGINAL_ID_COLUMN, ColumnData::Int(original)))?;
            let discarded: Vec<String> = records.iter().map(|r| discard_text(&r.provenance)).collect();
            table.add_column(Column::new(DISCARDED_COLUMN, ColumnData::Text(discarded)))?;
        }

        log::debug!("Serialised '{}' into {} columns", catalog.name, table.columns().len());
        Ok(table)
    }
}

fn discard_text(provenance: &Provenance) -> String {
    provenance
        .discarded
        .iter()
        .map(|d| format!("{}:{}:{}", d.pointing_id, d.original_id, d.significance))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal_table() -> Table {
        let f = |v: Vec<f64>| ColumnData::Float(v);
        let mut table = Table::new("A2256.pybdsf.bdsfcat")
            .with_meta("SF_BMAJ", "0.0015")
            .with_meta("SF_BMIN", "0.0012")
            .with_meta("SF_BPA", "30.0")
            .with_meta("CTYPE3", "'FREQ'")
            .with_meta("CRVAL3", "54000000.0")
            .with_meta("CRVAL1", "256.0")
            .with_meta("CRVAL2", "78.6")
            .with_meta("OBJECT", "'A2256'");
        let columns = vec![
            Column::new("Source_id", ColumnData::Int(vec![0, 1])),
            Column::new("RA", f(vec![256.1, 255.9])).with_unit("deg"),
            Column::new("E_RA", f(vec![0.0001, 0.0002])).with_unit("deg"),
            Column::new("DEC", f(vec![78.5, 78.7])).with_unit("deg"),
            Column::new("E_DEC", f(vec![0.0001, 0.0002])).with_unit("deg"),
            Column::new("Total_flux", f(vec![1.2, 0.4])).with_unit("Jy"),
            Column::new("E_Total_flux", f(vec![0.1, 0.05])).with_unit("Jy"),
            Column::new("Peak_flux", f(vec![1.0, 0.4])).with_unit("Jy/beam"),
            Column::new("E_Peak_flux", f(vec![0.1, 0.05])).with_unit("Jy/beam"),
            Column::new("Maj", f(vec![0.002, 0.0015])),
            Column::new("Min", f(vec![0.0015, 0.0012])),
            Column::new("PA", f(vec![10.0, 20.0])),
            Column::new("DC_Maj", f(vec![0.001, 0.0])),
            Column::new("DC_Min", f(vec![0.0005, 0.0])),
            Column::new("DC_PA", f(vec![10.0, 0.0])),
            Column::new("S_Code", ColumnData::Text(vec!["S".into(), "M".into()])),
            Column::new("Isl_id", ColumnData::Int(vec![4, 4])),
        ];
        for column in columns {
            table.add_column(column).unwrap();
        }
        table
    }

    #[test]
    fn test_detects_internal_format() {
        assert!(CatalogReader::is_internal(&internal_table()));
        assert!(CatalogReader::is_internal(&Table::new("x").with_meta("SF_BMAJ", "0.001")));
        assert!(!CatalogReader::is_internal(&Table::new("nvss.fits")));
    }

    #[test]
    fn test_mixed_flux_units_rejected() {
        let mut table = Table::new("mixed.bdsfcat");
        table.meta = internal_table().meta.clone();
        for column in internal_table().columns() {
            let mut column = column.clone();
            if column.name == "E_Total_flux" {
                column.unit = Some("mJy".into());
            }
            table.add_column(column).unwrap();
        }
        assert!(matches!(CatalogReader::load(&table, None), Err(CatalogError::Schema(_))));
    }

    #[test]
    fn test_load_internal_metadata() {
        let cat = CatalogReader::load(&internal_table(), None).unwrap();
        assert_eq!(cat.kind, CatalogKind::Internal);
        assert_eq!(cat.len(), 2);
        assert!((cat.freq_mhz - 54.0).abs() < 1e-9);
        assert!((cat.beam.major - 0.0015).abs() < 1e-12);
        assert_eq!(cat.pointings[0].id, "PT-A2256");
        assert_eq!(cat.records()[0].pointing_id, "PT-A2256");
        assert_eq!(cat.records()[1].source_type, SourceType::Multiple);
        assert_eq!(cat.records()[0].extra["Isl_id"], FieldValue::Int(4));
        assert_eq!(cat.flux_unit.as_deref(), Some("Jy"));
        // Island flux falls back to the total when the column is absent
        assert_eq!(cat.records()[0].island_flux, cat.records()[0].flux_total);
    }

    #[test]
    fn test_missing_required_column() {
        let mut table = Table::new("broken.bdsfcat").with_meta("SF_BMAJ", "0.001").with_meta("SF_BMIN", "0.001");
        table.meta.insert("CTYPE3".into(), "FREQ".into());
        table.meta.insert("CRVAL3".into(), "1.4e9".into());
        table.add_column(Column::new("RA", ColumnData::Float(vec![1.0]))).unwrap();
        let err = CatalogReader::load(&table, None).unwrap_err();
        assert!(matches!(err, CatalogError::Schema(ref msg) if msg.contains("DEC")));
    }

    #[test]
    fn test_unknown_table_without_mapping_fails() {
        let table = Table::new("nvss.fits")
            .with_column(Column::new("RAJ2000", ColumnData::Float(vec![1.0])))
            .unwrap();
        assert!(matches!(CatalogReader::load(&table, None), Err(CatalogError::Schema(_))));
    }

    #[test]
    fn test_load_external_with_mapping() {
        let table = Table::new("nvss.fits")
            .with_column(Column::new("RAJ2000", ColumnData::Float(vec![10.0, 11.0])).with_unit("deg"))
            .and_then(|t| t.with_column(Column::new("DEJ2000", ColumnData::Float(vec![20.0, 21.0])).with_unit("deg")))
            .and_then(|t| t.with_column(Column::new("S1.4", ColumnData::Float(vec![5.0, 6.0])).with_unit("mJy")))
            .and_then(|t| t.with_column(Column::new("e_S1.4", ColumnData::Float(vec![0.5, 0.4])).with_unit("mJy")))
            .unwrap();
        let mut columns = ColumnMapping::new();
        columns.insert("ra", "RAJ2000").insert("dec", "DEJ2000").insert("flux_total", "S1.4").insert("e_flux_total", "e_S1.4");
        let spec = ExternalCatalogSpec { columns, beam: Beam::new(45.0 / 3600.0, 45.0 / 3600.0, 0.0), freq_mhz: 1400.0 };

        let cat = CatalogReader::load(&table, Some(&spec)).unwrap();
        assert_eq!(cat.kind, CatalogKind::External);
        assert_eq!(cat.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(cat.records()[1].flux_peak.value, 6.0);
        assert_eq!(cat.resolve_column("S1.4"), "flux_total");
    }

    #[test]
    fn test_write_and_reload() {
        let mut cat = CatalogReader::load(&internal_table(), None).unwrap();
        cat.set_quality_flag(1, false).unwrap();
        cat.assign_iau_names(Some("LoLSS"));

        let table = CatalogWriter::to_table(&cat).unwrap();
        assert!(table.column("Source_name").is_some());
        assert_eq!(table.meta_value("STACKED"), Some("F"));
        assert_eq!(table.meta_value("NPOINT"), Some("1"));

        let reloaded = CatalogReader::load(&table, None).unwrap();
        assert_eq!(reloaded.records(), cat.records());
        assert_eq!(reloaded.pointings, cat.pointings);
        assert_eq!(reloaded.freq_mhz, cat.freq_mhz);
    }
}
