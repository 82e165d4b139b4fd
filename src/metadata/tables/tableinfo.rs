//! Row-count driven sizing of metadata tables.
//!
//! [`TableInfo`] is built once per image (read path) or once per write pass from the `valid`
//! bitmask, the row count of every present table and the heap size flags. It answers every
//! width question the `#~` stream poses:
//!
//! - a table index is 2 bytes iff the referenced table has fewer than 65536 rows
//! - a heap index is 2 bytes unless the matching heap size flag is set
//! - a coded index is 2 bytes iff the largest row count among its tables fits into the
//!   `16 - tag_bits` bits left next to the tag
//!
//! From these widths it derives the offset, length and row size of each table within the table
//! data. Coded index widths are computed on first use and memoized per kind for the lifetime of
//! the `TableInfo`.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::metadata::tables::{HeapSizes, TableId, TableInfo};
//!
//! let info = TableInfo::for_write(&[(TableId::TypeDef, 65535), (TableId::Field, 65536)], HeapSizes::empty());
//! assert_eq!(info.table_index_bytes(TableId::TypeDef), 2);
//! assert_eq!(info.table_index_bytes(TableId::Field), 4);
//! assert!(!info.is_present(TableId::MethodDef));
//! ```

use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use strum::{EnumCount, IntoEnumIterator};

use crate::{
    metadata::tables::{CodedIndex, CodedIndexType, ColumnKind, TableId},
    Result,
};

/// Number of table slots addressable by the 64-bit `valid` mask.
const TABLE_SLOTS: usize = 64;

bitflags! {
    /// The `HeapSizes` byte of the `#~` stream header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeapSizes: u8 {
        /// `#Strings` indices are 4 bytes wide
        const LARGE_STRINGS = 0x01;
        /// `#GUID` indices are 4 bytes wide
        const LARGE_GUID = 0x02;
        /// `#Blob` indices are 4 bytes wide
        const LARGE_BLOB = 0x04;
        /// An extra 4-byte value follows the row counts
        const EXTRA_DATA = 0x40;
    }
}

impl HeapSizes {
    /// Flags required for heaps of the given sizes.
    ///
    /// `guid_count` is the number of GUIDs, since `#GUID` indices count entries rather than bytes.
    #[must_use]
    pub fn for_heaps(strings_len: usize, guid_count: usize, blob_len: usize) -> Self {
        let mut flags = HeapSizes::empty();
        if strings_len > usize::from(u16::MAX) {
            flags |= HeapSizes::LARGE_STRINGS;
        }
        if guid_count > usize::from(u16::MAX) {
            flags |= HeapSizes::LARGE_GUID;
        }
        if blob_len > usize::from(u16::MAX) {
            flags |= HeapSizes::LARGE_BLOB;
        }
        flags
    }
}

/// Row count of a single table and the width of indices referencing it.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// `true` if indices into this table need 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Create a new `TableRowInfo` for a table with `rows` rows
    #[must_use]
    pub fn new(rows: u32) -> Self {
        Self {
            rows,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Placement of one table within the table data of a `#~` stream.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct TableLayout {
    /// Byte offset of the first row, relative to the start of the table data
    pub offset: usize,
    /// Total size in bytes (`rows * row_size`)
    pub length: usize,
    /// Size of one row in bytes
    pub row_size: u32,
}

/// Per-image sizing information of all metadata tables.
#[derive(Clone, Debug)]
pub struct TableInfo {
    valid: u64,
    rows: Vec<TableRowInfo>,
    layouts: Vec<TableLayout>,
    coded_indexes: [OnceLock<u8>; CodedIndexType::COUNT],
    heap_sizes: HeapSizes,
}

/// Shared handle to a [`TableInfo`]
pub type TableInfoRef = Arc<TableInfo>;

impl TableInfo {
    /// Build the sizing information from a `valid` mask and the row counts of present tables.
    ///
    /// Row counts for tables whose bit is clear in `valid` are ignored.
    ///
    /// # Arguments
    /// * `valid`       - The `valid` bitmask of the `#~` header
    /// * `row_counts`  - Row count per table
    /// * `heap_sizes`  - The `HeapSizes` flags of the `#~` header
    #[must_use]
    pub fn new(valid: u64, row_counts: &[(TableId, u32)], heap_sizes: HeapSizes) -> Self {
        let mut rows = vec![TableRowInfo::default(); TABLE_SLOTS];
        for (table, count) in row_counts {
            if valid & table.mask() != 0 {
                rows[*table as usize] = TableRowInfo::new(*count);
            }
        }

        let mut info = TableInfo {
            valid,
            rows,
            layouts: vec![TableLayout::default(); TABLE_SLOTS],
            coded_indexes: std::array::from_fn(|_| OnceLock::new()),
            heap_sizes,
        };

        info.layouts = info.compute_layouts();
        info
    }

    /// Build sizing information for a write pass; every table with at least one row is present.
    #[must_use]
    pub fn for_write(row_counts: &[(TableId, u32)], heap_sizes: HeapSizes) -> Self {
        let valid = row_counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .fold(0_u64, |mask, (table, _)| mask | table.mask());

        Self::new(valid, row_counts, heap_sizes)
    }

    fn compute_layouts(&self) -> Vec<TableLayout> {
        let mut layouts = vec![TableLayout::default(); TABLE_SLOTS];
        let mut offset = 0_usize;

        for table in TableId::iter() {
            if !self.is_present(table) {
                continue;
            }

            let row_size = self.row_size(table);
            let length = self.rows(table) as usize * row_size as usize;
            layouts[table as usize] = TableLayout {
                offset,
                length,
                row_size,
            };
            offset += length;
        }

        layouts
    }

    /// The `valid` bitmask.
    #[must_use]
    pub fn valid(&self) -> u64 {
        self.valid
    }

    /// The heap size flags.
    #[must_use]
    pub fn heap_sizes(&self) -> HeapSizes {
        self.heap_sizes
    }

    /// Returns `true` if the `valid` bit of `table` is set.
    #[must_use]
    pub fn is_present(&self, table: TableId) -> bool {
        self.valid & table.mask() != 0
    }

    /// Number of rows of `table`, 0 if absent.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// Row information of `table`.
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Returns `true` if indices into `table` need 4 bytes.
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows[table as usize].is_large
    }

    /// Width of a plain index into `table`.
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u8 {
        if self.is_large(table) {
            4
        } else {
            2
        }
    }

    /// Width of a `#Strings` index.
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.heap_sizes.contains(HeapSizes::LARGE_STRINGS) {
            4
        } else {
            2
        }
    }

    /// Width of a `#GUID` index.
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.heap_sizes.contains(HeapSizes::LARGE_GUID) {
            4
        } else {
            2
        }
    }

    /// Width of a `#Blob` index.
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.heap_sizes.contains(HeapSizes::LARGE_BLOB) {
            4
        } else {
            2
        }
    }

    /// Width of a coded index of kind `coded_index_type`.
    ///
    /// The width is computed on the first call for each kind and reused afterwards.
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        *self.coded_indexes[coded_index_type as usize]
            .get_or_init(|| self.calculate_coded_index_bytes(coded_index_type))
    }

    fn calculate_coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        let max_rows = coded_index_type
            .tables()
            .iter()
            .map(|table| self.rows(*table))
            .max()
            .unwrap_or(0);

        let limit = 1_u64 << (16 - u32::from(coded_index_type.tag_bits()));
        if u64::from(max_rows) < limit {
            2
        } else {
            4
        }
    }

    /// Width of a column of the given kind.
    #[must_use]
    pub fn column_size(&self, column: ColumnKind) -> u8 {
        match column {
            ColumnKind::U16 => 2,
            ColumnKind::U32 => 4,
            ColumnKind::Str => self.str_bytes(),
            ColumnKind::Guid => self.guid_bytes(),
            ColumnKind::Blob => self.blob_bytes(),
            ColumnKind::Table(table) => self.table_index_bytes(table),
            ColumnKind::Coded(kind) => self.coded_index_bytes(kind),
        }
    }

    /// Size in bytes of one row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> u32 {
        table
            .columns()
            .iter()
            .map(|column| u32::from(self.column_size(*column)))
            .sum()
    }

    /// Offset, length and row size of `table` within the table data.
    #[must_use]
    pub fn layout(&self, table: TableId) -> TableLayout {
        self.layouts[table as usize]
    }

    /// Total size of all table data.
    #[must_use]
    pub fn tables_size(&self) -> usize {
        self.layouts
            .iter()
            .map(|layout| layout.offset + layout.length)
            .max()
            .unwrap_or(0)
    }

    /// Split a raw coded index value into its table and row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag does not name a table of this kind.
    pub fn decode_coded_index(
        &self,
        value: u32,
        coded_index_type: CodedIndexType,
    ) -> Result<CodedIndex> {
        let tables = coded_index_type.tables();
        let tag_bits = coded_index_type.tag_bits();
        let tag_mask = (1_u32 << tag_bits) - 1;

        let tag = (value & tag_mask) as usize;
        let Some(table) = tables.get(tag) else {
            return Err(malformed_error!(
                "Invalid tag {} for coded index {:?}",
                tag,
                coded_index_type
            ));
        };

        Ok(CodedIndex::new(*table, value >> tag_bits))
    }

    /// Combine a table and row into a raw coded index value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `table` is not part of `coded_index_type`.
    pub fn encode_coded_index(
        &self,
        table: TableId,
        row: u32,
        coded_index_type: CodedIndexType,
    ) -> Result<u32> {
        let Some(tag) = coded_index_type.tag_of(table) else {
            return Err(malformed_error!(
                "Table {:?} is not part of coded index {:?}",
                table,
                coded_index_type
            ));
        };

        Ok((row << coded_index_type.tag_bits()) | tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_index_width_threshold() {
        let info = TableInfo::for_write(
            &[(TableId::TypeDef, 65535), (TableId::MethodDef, 65536)],
            HeapSizes::empty(),
        );

        assert_eq!(info.table_index_bytes(TableId::TypeDef), 2);
        assert_eq!(info.table_index_bytes(TableId::MethodDef), 4);
        assert_eq!(info.table_index_bytes(TableId::Field), 2);
    }

    #[test]
    fn presence_follows_valid_mask() {
        let info = TableInfo::new(
            TableId::Module.mask() | TableId::TypeDef.mask(),
            &[(TableId::Module, 1), (TableId::TypeDef, 3), (TableId::Field, 9)],
            HeapSizes::empty(),
        );

        assert!(info.is_present(TableId::Module));
        assert!(info.is_present(TableId::TypeDef));
        assert!(!info.is_present(TableId::Field));
        assert_eq!(info.rows(TableId::Field), 0);
    }

    #[test]
    fn coded_index_width() {
        // TypeDefOrRef has 2 tag bits, leaving 14 bits for the row
        let small = TableInfo::for_write(&[(TableId::TypeRef, 0x3FFF)], HeapSizes::empty());
        assert_eq!(small.coded_index_bytes(CodedIndexType::TypeDefOrRef), 2);

        let large = TableInfo::for_write(&[(TableId::TypeRef, 0x4000)], HeapSizes::empty());
        assert_eq!(large.coded_index_bytes(CodedIndexType::TypeDefOrRef), 4);
        assert_eq!(large.coded_index_bytes(CodedIndexType::TypeDefOrRef), 4);

        // HasCustomAttribute has 5 tag bits
        let attr = TableInfo::for_write(&[(TableId::Param, 0x800)], HeapSizes::empty());
        assert_eq!(attr.coded_index_bytes(CodedIndexType::HasCustomAttribute), 4);
        assert_eq!(attr.coded_index_bytes(CodedIndexType::HasFieldMarshal), 2);
    }

    #[test]
    fn heap_widths() {
        let info = TableInfo::for_write(
            &[(TableId::Module, 1)],
            HeapSizes::LARGE_STRINGS | HeapSizes::LARGE_BLOB,
        );

        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.guid_bytes(), 2);
        assert_eq!(info.blob_bytes(), 4);
        // Generation, Name, Mvid, EncId, EncBaseId
        assert_eq!(info.row_size(TableId::Module), 2 + 4 + 2 + 2 + 2);
    }

    #[test]
    fn heap_sizes_for_heaps() {
        assert_eq!(HeapSizes::for_heaps(0xFFFF, 1, 0), HeapSizes::empty());
        assert_eq!(
            HeapSizes::for_heaps(0x1_0000, 0x1_0000, 0x1_0000),
            HeapSizes::LARGE_STRINGS | HeapSizes::LARGE_GUID | HeapSizes::LARGE_BLOB
        );
    }

    #[test]
    fn layouts_are_contiguous() {
        let info = TableInfo::for_write(
            &[
                (TableId::Module, 1),
                (TableId::TypeRef, 2),
                (TableId::MethodDef, 3),
            ],
            HeapSizes::empty(),
        );

        let module = info.layout(TableId::Module);
        assert_eq!(module, TableLayout { offset: 0, length: 10, row_size: 10 });

        let typeref = info.layout(TableId::TypeRef);
        assert_eq!(typeref, TableLayout { offset: 10, length: 12, row_size: 6 });

        let methoddef = info.layout(TableId::MethodDef);
        assert_eq!(methoddef.offset, 22);
        assert_eq!(methoddef.row_size, 4 + 2 + 2 + 2 + 2 + 2);
        assert_eq!(info.tables_size(), 22 + 3 * 14);
    }

    #[test]
    fn coded_index_roundtrip() {
        let info = TableInfo::for_write(&[(TableId::TypeRef, 10)], HeapSizes::empty());

        let raw = info
            .encode_coded_index(TableId::TypeSpec, 7, CodedIndexType::TypeDefOrRef)
            .unwrap();
        assert_eq!(raw, (7 << 2) | 2);

        let decoded = info.decode_coded_index(raw, CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(decoded.tag, TableId::TypeSpec);
        assert_eq!(decoded.row, 7);

        assert!(info.decode_coded_index(3, CodedIndexType::TypeDefOrRef).is_err());
        assert!(info
            .encode_coded_index(TableId::Field, 1, CodedIndexType::TypeDefOrRef)
            .is_err());
    }
}
