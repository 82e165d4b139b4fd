//! Metadata table identifiers, column schemas and index sizing.
//!
//! The table layer answers the sizing questions of the `#~` stream: which tables are present,
//! how wide a table, heap or coded index is, and where every table starts within the table data.
//! Row contents are accessed through [`crate::metadata::streams::TablesHeader`].
//!
//! # Key Components
//!
//! - [`crate::metadata::tables::TableId`] - Table numbers of ECMA-335 and Portable PDB
//! - [`crate::metadata::tables::CodedIndexType`] - Multi-table references with tag bits
//! - [`crate::metadata::tables::ColumnKind`] - Column schema of each table
//! - [`crate::metadata::tables::TableInfo`] - Row counts, index widths and table layouts

mod codedindex;
mod schema;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use schema::{name_column, ColumnKind};
pub use tableid::TableId;
pub use tableinfo::{HeapSizes, TableInfo, TableInfoRef, TableLayout, TableRowInfo};
