//! Column schema of every metadata table.
//!
//! Each table is described as an ordered list of [`ColumnKind`]s. Fixed-width columns always
//! occupy the same number of bytes, while heap, table and coded index columns are 2 or 4 bytes
//! wide depending on the image, see [`crate::metadata::tables::TableInfo::column_size`].
//!
//! # Reference
//! * ECMA-335 Partition II, Section 22 - Metadata Tables
//! * Portable PDB v1.0 Format Specification - Metadata Tables

use crate::metadata::tables::{CodedIndexType, TableId};

/// Storage kind of a single table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Fixed 2-byte value (a 1-byte value plus padding counts as this too)
    U16,
    /// Fixed 4-byte value
    U32,
    /// Index into the `#Strings` heap
    Str,
    /// Index into the `#GUID` heap
    Guid,
    /// Index into the `#Blob` heap
    Blob,
    /// Index into a single table
    Table(TableId),
    /// Coded index into one of several tables
    Coded(CodedIndexType),
}

use ColumnKind::{Blob, Coded, Guid, Str, Table, U16, U32};

impl TableId {
    /// The ordered column layout of this table.
    #[must_use]
    pub fn columns(self) -> &'static [ColumnKind] {
        match self {
            TableId::Module => &[U16, Str, Guid, Guid, Guid],
            TableId::TypeRef => &[Coded(CodedIndexType::ResolutionScope), Str, Str],
            TableId::TypeDef => &[
                U32,
                Str,
                Str,
                Coded(CodedIndexType::TypeDefOrRef),
                Table(TableId::Field),
                Table(TableId::MethodDef),
            ],
            TableId::FieldPtr => &[Table(TableId::Field)],
            TableId::Field => &[U16, Str, Blob],
            TableId::MethodPtr => &[Table(TableId::MethodDef)],
            TableId::MethodDef => &[U32, U16, U16, Str, Blob, Table(TableId::Param)],
            TableId::ParamPtr => &[Table(TableId::Param)],
            TableId::Param => &[U16, U16, Str],
            TableId::InterfaceImpl => &[
                Table(TableId::TypeDef),
                Coded(CodedIndexType::TypeDefOrRef),
            ],
            TableId::MemberRef => &[Coded(CodedIndexType::MemberRefParent), Str, Blob],
            TableId::Constant => &[U16, Coded(CodedIndexType::HasConstant), Blob],
            TableId::CustomAttribute => &[
                Coded(CodedIndexType::HasCustomAttribute),
                Coded(CodedIndexType::CustomAttributeType),
                Blob,
            ],
            TableId::FieldMarshal => &[Coded(CodedIndexType::HasFieldMarshal), Blob],
            TableId::DeclSecurity => &[U16, Coded(CodedIndexType::HasDeclSecurity), Blob],
            TableId::ClassLayout => &[U16, U32, Table(TableId::TypeDef)],
            TableId::FieldLayout => &[U32, Table(TableId::Field)],
            TableId::StandAloneSig => &[Blob],
            TableId::EventMap => &[Table(TableId::TypeDef), Table(TableId::Event)],
            TableId::EventPtr => &[Table(TableId::Event)],
            TableId::Event => &[U16, Str, Coded(CodedIndexType::TypeDefOrRef)],
            TableId::PropertyMap => &[Table(TableId::TypeDef), Table(TableId::Property)],
            TableId::PropertyPtr => &[Table(TableId::Property)],
            TableId::Property => &[U16, Str, Blob],
            TableId::MethodSemantics => &[
                U16,
                Table(TableId::MethodDef),
                Coded(CodedIndexType::HasSemantics),
            ],
            TableId::MethodImpl => &[
                Table(TableId::TypeDef),
                Coded(CodedIndexType::MethodDefOrRef),
                Coded(CodedIndexType::MethodDefOrRef),
            ],
            TableId::ModuleRef => &[Str],
            TableId::TypeSpec => &[Blob],
            TableId::ImplMap => &[
                U16,
                Coded(CodedIndexType::MemberForwarded),
                Str,
                Table(TableId::ModuleRef),
            ],
            TableId::FieldRVA => &[U32, Table(TableId::Field)],
            TableId::EncLog => &[U32, U32],
            TableId::EncMap => &[U32],
            TableId::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            TableId::AssemblyProcessor => &[U32],
            TableId::AssemblyOS => &[U32, U32, U32],
            TableId::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            TableId::AssemblyRefProcessor => &[U32, Table(TableId::AssemblyRef)],
            TableId::AssemblyRefOS => &[U32, U32, U32, Table(TableId::AssemblyRef)],
            TableId::File => &[U32, Str, Blob],
            TableId::ExportedType => &[U32, U32, Str, Str, Coded(CodedIndexType::Implementation)],
            TableId::ManifestResource => &[U32, U32, Str, Coded(CodedIndexType::Implementation)],
            TableId::NestedClass => &[Table(TableId::TypeDef), Table(TableId::TypeDef)],
            TableId::GenericParam => &[U16, U16, Coded(CodedIndexType::TypeOrMethodDef), Str],
            TableId::MethodSpec => &[Coded(CodedIndexType::MethodDefOrRef), Blob],
            TableId::GenericParamConstraint => &[
                Table(TableId::GenericParam),
                Coded(CodedIndexType::TypeDefOrRef),
            ],
            TableId::Document => &[Blob, Guid, Blob, Guid],
            TableId::MethodDebugInformation => &[Table(TableId::Document), Blob],
            TableId::LocalScope => &[
                Table(TableId::MethodDef),
                Table(TableId::ImportScope),
                Table(TableId::LocalVariable),
                Table(TableId::LocalConstant),
                U32,
                U32,
            ],
            TableId::LocalVariable => &[U16, U16, Str],
            TableId::LocalConstant => &[Str, Blob],
            TableId::ImportScope => &[Table(TableId::ImportScope), Blob],
            TableId::StateMachineMethod => &[Table(TableId::MethodDef), Table(TableId::MethodDef)],
            TableId::CustomDebugInformation => &[
                Coded(CodedIndexType::HasCustomDebugInformation),
                Guid,
                Blob,
            ],
        }
    }
}

/// Column holding the `Name` string of the tables whose rows carry one.
#[must_use]
pub fn name_column(table: TableId) -> Option<usize> {
    match table {
        TableId::Module
        | TableId::TypeRef
        | TableId::TypeDef
        | TableId::Field
        | TableId::MemberRef
        | TableId::Event
        | TableId::Property
        | TableId::GenericParam => table
            .columns()
            .iter()
            .position(|column| *column == Str),
        TableId::Param => Some(2),
        TableId::MethodDef => Some(3),
        TableId::ModuleRef => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_table_has_columns() {
        for table in TableId::iter() {
            assert!(!table.columns().is_empty(), "{table:?} has no columns");
        }
    }

    #[test]
    fn name_columns_are_strings() {
        for table in TableId::iter() {
            if let Some(column) = name_column(table) {
                assert_eq!(table.columns()[column], Str, "{table:?}");
            }
        }

        assert_eq!(name_column(TableId::TypeDef), Some(1));
        assert_eq!(name_column(TableId::TypeRef), Some(1));
        assert_eq!(name_column(TableId::Field), Some(1));
        assert_eq!(name_column(TableId::MemberRef), Some(1));
        assert_eq!(name_column(TableId::GenericParam), Some(3));
        assert_eq!(name_column(TableId::TypeSpec), None);
    }
}
