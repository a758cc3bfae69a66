//! Tabular record sets and catalog (de)serialisation

pub mod table;
pub mod catalog_io;
pub mod column_listing;

pub use table::{Column, ColumnData, Table};
pub use catalog_io::{CatalogReader, CatalogWriter};
pub use column_listing::{export_column, import_column, read_listing, ColumnListing};
