use crate::types::{CatalogError, CatalogResult, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
    Bool(Vec<bool>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<FieldValue> {
        match self {
            ColumnData::Float(v) => v.get(row).map(|x| FieldValue::Float(*x)),
            ColumnData::Int(v) => v.get(row).map(|x| FieldValue::Int(*x)),
            ColumnData::Text(v) => v.get(row).map(|x| FieldValue::Text(x.clone())),
            ColumnData::Bool(v) => v.get(row).map(|x| FieldValue::Bool(*x)),
        }
    }

    /// Numeric view of a cell; text cells are parsed
    pub fn float(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Float(v) => v.get(row).copied(),
            ColumnData::Int(v) => v.get(row).map(|x| *x as f64),
            ColumnData::Bool(v) => v.get(row).map(|x| if *x { 1.0 } else { 0.0 }),
            ColumnData::Text(v) => v.get(row).and_then(|x| x.trim().parse().ok()),
        }
    }

    /// Text view of a cell
    pub fn text(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Text(v) => v.get(row).map(|x| x.trim().to_string()),
            _ => self.get(row).map(|x| x.to_string()),
        }
    }

    /// Build a column from values, choosing the narrowest storage that fits all of them
    pub fn from_values(values: &[FieldValue]) -> ColumnData {
        if values.iter().all(|v| matches!(v, FieldValue::Int(_))) {
            ColumnData::Int(values.iter().filter_map(|v| v.as_f64().map(|x| x as i64)).collect())
        } else if values.iter().all(|v| matches!(v, FieldValue::Bool(_))) {
            ColumnData::Bool(values.iter().map(|v| matches!(v, FieldValue::Bool(true))).collect())
        } else if values.iter().all(|v| v.as_f64().is_some()) {
            ColumnData::Float(values.iter().filter_map(FieldValue::as_f64).collect())
        } else {
            ColumnData::Text(values.iter().map(|v| v.to_string()).collect())
        }
    }
}

/// One named column with an optional unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub unit: Option<String>,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self { name: name.into(), unit: None, data }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Named columns of equal length plus header metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Table or file name; used for format detection
    pub name: String,
    pub meta: BTreeMap<String, String>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), meta: BTreeMap::new(), columns: Vec::new() }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a column; all columns must have the same number of rows
    pub fn add_column(&mut self, column: Column) -> CatalogResult<()> {
        if let Some(first) = self.columns.first() {
            if first.data.len() != column.data.len() {
                return Err(CatalogError::Schema(format!(
                    "Column '{}' has {} rows, table '{}' has {}",
                    column.name,
                    column.data.len(),
                    self.name,
                    first.data.len()
                )));
            }
        }
        if self.column(&column.name).is_some() {
            return Err(CatalogError::Schema(format!(
                "Duplicate column '{}' in table '{}'",
                column.name, self.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Builder form of [`Table::add_column`]
    pub fn with_column(mut self, column: Column) -> CatalogResult<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(|v| v.trim().trim_matches('\'').trim())
    }

    /// Header value parsed as a float
    pub fn meta_f64(&self, key: &str) -> CatalogResult<Option<f64>> {
        match self.meta_value(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| {
                CatalogError::Parse(format!(
                    "Header keyword {} = '{}' in '{}' is not a number",
                    key, raw, self.name
                ))
            }),
        }
    }
}
