//! The `#~` (and uncompressed `#-`) table stream.
//!
//! The stream starts with a fixed header: version, heap size flags and two 64-bit masks naming
//! the present and the sorted tables. A row count for every present table follows, in ascending
//! table order, and then the table data itself, each table a dense array of fixed-size rows.
//!
//! [`TablesHeader`] parses that header into a shared [`crate::metadata::tables::TableInfo`] and
//! gives bounds-checked access to rows and individual column values. The write direction is
//! covered by [`encode_tables_header`] and [`encode_row`].
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.6 - `#~` stream

use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::{
    file::{
        buffer::ByteBuffer,
        io::read_le_at_dyn,
        parser::Parser,
    },
    metadata::tables::{CodedIndex, ColumnKind, HeapSizes, TableId, TableInfo, TableInfoRef},
    Result,
};

/// Size of the fixed part of the `#~` header, up to and including the `sorted` mask.
const FIXED_HEADER_SIZE: usize = 24;

/// Parsed `#~` stream: header fields, sizing information and the table data.
pub struct TablesHeader<'a> {
    /// Major version of the table schema, 2 for ECMA-335
    pub major_version: u8,
    /// Minor version of the table schema
    pub minor_version: u8,
    /// Bitmask of present tables
    pub valid: u64,
    /// Bitmask of sorted tables
    pub sorted: u64,
    /// Row counts, index widths and table layouts
    pub info: TableInfoRef,
    tables: &'a [u8],
}

/// Row count of one present table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSummary {
    /// The table
    pub table_id: TableId,
    /// Its number of rows
    pub row_count: u32,
}

impl<'a> TablesHeader<'a> {
    /// Parse the `#~` stream in `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header or the table data is truncated, or
    /// [`crate::Error::Malformed`] if no tables are present or a `valid` bit names an unknown
    /// table.
    pub fn from(data: &'a [u8]) -> Result<TablesHeader<'a>> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(data);
        let _reserved = parser.read_le::<u32>()?;
        let major_version = parser.read_le::<u8>()?;
        let minor_version = parser.read_le::<u8>()?;
        let heap_sizes = HeapSizes::from_bits_truncate(parser.read_le::<u8>()?);
        let _reserved = parser.read_le::<u8>()?;
        let valid = parser.read_le::<u64>()?;
        let sorted = parser.read_le::<u64>()?;

        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        let mut row_counts = Vec::with_capacity(valid.count_ones() as usize);
        for bit in 0..64_u8 {
            if valid & (1_u64 << bit) == 0 {
                continue;
            }

            let Some(table) = TableId::from_u8(bit) else {
                return Err(malformed_error!("Unknown table present in #~ - {:#04x}", bit));
            };

            row_counts.push((table, parser.read_le::<u32>()?));
        }

        if heap_sizes.contains(HeapSizes::EXTRA_DATA) {
            parser.advance_by(4)?;
        }

        let info = TableInfo::new(valid, &row_counts, heap_sizes);
        let tables = &data[parser.pos()..];
        if info.tables_size() > tables.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(TablesHeader {
            major_version,
            minor_version,
            valid,
            sorted,
            info: Arc::new(info),
            tables,
        })
    }

    /// Number of present tables.
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.count_ones()
    }

    /// Returns `true` if `table` is present and sorted.
    #[must_use]
    pub fn is_sorted(&self, table: TableId) -> bool {
        self.sorted & self.valid & table.mask() != 0
    }

    /// Number of rows in `table`, 0 if absent.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.info.rows(table)
    }

    /// Present tables with their row counts, in table order.
    #[must_use]
    pub fn table_summary(&self) -> Vec<TableSummary> {
        TableId::iter()
            .filter(|table| self.info.is_present(*table))
            .map(|table_id| TableSummary {
                table_id,
                row_count: self.info.rows(table_id),
            })
            .collect()
    }

    /// Raw bytes of the 1-based `row` of `table`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row does not exist.
    pub fn row(&self, table: TableId, row: u32) -> Result<&'a [u8]> {
        if row == 0 || row > self.info.rows(table) {
            return Err(out_of_bounds_error!());
        }

        let layout = self.info.layout(table);
        let start = layout.offset + (row as usize - 1) * layout.row_size as usize;
        crate::file::checked_slice(self.tables, start, layout.row_size as usize)
    }

    /// Value of column `column` in the 1-based `row` of `table`, widened to `u32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row or the column does not exist.
    pub fn column(&self, table: TableId, row: u32, column: usize) -> Result<u32> {
        let data = self.row(table, row)?;
        let columns = table.columns();
        if column >= columns.len() {
            return Err(out_of_bounds_error!());
        }

        let mut offset: usize = columns[..column]
            .iter()
            .map(|kind| usize::from(self.info.column_size(*kind)))
            .sum();

        let is_large = self.info.column_size(columns[column]) == 4;
        read_le_at_dyn(data, &mut offset, is_large)
    }

    /// Value of a coded index column, split into table and row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the column is not a coded index or carries an
    /// invalid tag, or [`crate::Error::OutOfBounds`] if the row or column does not exist.
    pub fn coded_column(&self, table: TableId, row: u32, column: usize) -> Result<CodedIndex> {
        let Some(ColumnKind::Coded(kind)) = table.columns().get(column).copied() else {
            return Err(malformed_error!(
                "Column {} of {:?} is not a coded index",
                column,
                table
            ));
        };

        let value = self.column(table, row, column)?;
        self.info.decode_coded_index(value, kind)
    }
}

/// Encode the header of a `#~` stream for the tables described by `info`.
///
/// The `EXTRA_DATA` flag is never written.
///
/// # Errors
/// Returns an error if writing to `buffer` fails.
pub fn encode_tables_header(info: &TableInfo, sorted: u64, buffer: &mut ByteBuffer) -> Result<()> {
    buffer.write_u32(0)?;
    buffer.write_u8(2)?;
    buffer.write_u8(0)?;
    buffer.write_u8((info.heap_sizes() - HeapSizes::EXTRA_DATA).bits())?;
    buffer.write_u8(1)?;
    buffer.write_le::<u64>(info.valid())?;
    buffer.write_le::<u64>(sorted & info.valid())?;

    for table in TableId::iter() {
        if info.is_present(table) {
            buffer.write_u32(info.rows(table))?;
        }
    }

    Ok(())
}

/// Encode one row of `table` from its column values.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `values` does not match the column count of `table` or
/// a value does not fit its column width.
pub fn encode_row(info: &TableInfo, table: TableId, values: &[u32], buffer: &mut ByteBuffer) -> Result<()> {
    let columns = table.columns();
    if values.len() != columns.len() {
        return Err(malformed_error!(
            "{:?} has {} columns, {} values given",
            table,
            columns.len(),
            values.len()
        ));
    }

    for (kind, value) in columns.iter().zip(values) {
        match info.column_size(*kind) {
            4 => buffer.write_u32(*value)?,
            _ => {
                let Ok(small) = u16::try_from(*value) else {
                    return Err(malformed_error!(
                        "Value {:#X} does not fit a 2 byte column of {:?}",
                        value,
                        table
                    ));
                };
                buffer.write_u16(small)?;
            }
        }
    }

    Ok(())
}
