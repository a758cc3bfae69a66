use crate::core::catalog::Catalog;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Column values keyed by record id, as read back from a listing. Values stay
/// as text until they are applied to a catalog column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnListing {
    pub column: String,
    pub rows: Vec<(u64, String)>,
}

/// Write one column of the catalog as a listing
pub fn export_column<W: Write>(catalog: &Catalog, column: &str, writer: W) -> CatalogResult<()> {
    let values = catalog.column(column)?;
    let mut writer = BufWriter::new(writer);
    writeln!(writer, "# id\t{}", column)?;
    for (record, value) in catalog.records().iter().zip(&values) {
        writeln!(writer, "{}\t{}", record.id, value)?;
    }
    writer.flush()?;
    log::debug!("Exported column '{}' of '{}' ({} rows)", column, catalog.name, values.len());
    Ok(())
}

pub fn export_column_to_file(catalog: &Catalog, column: &str, path: &Path) -> CatalogResult<()> {
    let file = File::create(path)?;
    export_column(catalog, column, file)?;
    log::info!("Wrote column '{}' listing to {}", column, path.display());
    Ok(())
}

/// Parse a listing; the column name comes from the header line
pub fn read_listing<R: BufRead>(reader: R) -> CatalogResult<ColumnListing> {
    let mut column: Option<String> = None;
    let mut rows = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('#') {
            if column.is_none() {
                let mut fields = header.split_whitespace();
                if fields.next() == Some("id") {
                    column = fields.next().map(str::to_string);
                }
            }
            continue;
        }

        let (id, value) = trimmed
            .split_once('\t')
            .or_else(|| trimmed.split_once(char::is_whitespace))
            .ok_or_else(|| CatalogError::Parse(format!("line {}: expected 'id value', got '{}'", line_no + 1, trimmed)))?;
        let id: u64 = id
            .trim()
            .parse()
            .map_err(|_| CatalogError::Parse(format!("line {}: invalid id '{}'", line_no + 1, id.trim())))?;
        rows.push((id, value.trim().to_string()));
    }

    let column = column.ok_or_else(|| CatalogError::Parse("listing has no '# id <column>' header".to_string()))?;
    Ok(ColumnListing { column, rows })
}

pub fn read_listing_file(path: &Path) -> CatalogResult<ColumnListing> {
    read_listing(BufReader::new(File::open(path)?))
}

/// Apply an edited listing back onto the catalog, matching rows by id
pub fn import_column(catalog: &mut Catalog, listing: &ColumnListing) -> CatalogResult<()> {
    if listing.rows.len() != catalog.len() {
        return Err(CatalogError::Schema(format!(
            "Listing for '{}' has {} rows but catalog '{}' has {} records",
            listing.column,
            listing.rows.len(),
            catalog.name,
            catalog.len()
        )));
    }

    let mut by_id: HashMap<u64, &str> = HashMap::with_capacity(listing.rows.len());
    for (id, value) in &listing.rows {
        if by_id.insert(*id, value.as_str()).is_some() {
            return Err(CatalogError::Schema(format!("Listing repeats id {}", id)));
        }
    }

    let catalog_ids: HashSet<u64> = catalog.records().iter().map(|r| r.id).collect();
    let listing_ids: HashSet<u64> = by_id.keys().copied().collect();
    if catalog_ids != listing_ids {
        let mut missing: Vec<u64> = catalog_ids.symmetric_difference(&listing_ids).copied().collect();
        missing.sort_unstable();
        return Err(CatalogError::Schema(format!(
            "Listing ids differ from catalog '{}' ids: {:?}",
            catalog.name, missing
        )));
    }

    // Existing cells keep their type
    let canonical = catalog.resolve_column(&listing.column);
    let values: Vec<FieldValue> = catalog
        .records()
        .iter()
        .filter_map(|r| {
            by_id.get(&r.id).map(|text| match r.field(&canonical) {
                Some(current) => FieldValue::parse_like(text, &current),
                None => FieldValue::parse(text),
            })
        })
        .collect();
    catalog.set_column(&listing.column, &values)?;

    log::info!("Re-applied column '{}' to '{}'", listing.column, catalog.name);
    Ok(())
}

pub fn import_column_from_file(catalog: &mut Catalog, path: &Path) -> CatalogResult<()> {
    let listing = read_listing_file(path)?;
    import_column(catalog, &listing)
}
