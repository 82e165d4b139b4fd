//! Coded indices: references into one of several tables, disambiguated by low tag bits.
//!
//! A coded index stores `(row << tag_bits) | tag`, where `tag` selects a table from the list
//! returned by [`crate::metadata::tables::CodedIndexType::tables`]. Whether the value is stored in
//! 2 or 4 bytes depends on the largest row count among those tables, see
//! [`crate::metadata::tables::TableInfo::coded_index_bytes`].
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.6 - `#~` stream

use strum::{EnumCount, EnumIter};

use crate::metadata::{tables::TableId, token::Token};

/// The coded index kinds of ECMA-335 II.24.2.6 and the Portable PDB format.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Anything that can carry a custom attribute
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Constructor of a custom attribute
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef`
    ResolutionScope,
    /// `TypeDef` or `MethodDef`
    TypeOrMethodDef,
    /// Anything that can carry custom debug information
    HasCustomDebugInformation,
}

impl CodedIndexType {
    /// The tables this coded index can point into, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are reserved; they decode to the neighbouring table kinds
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
            CodedIndexType::HasCustomDebugInformation => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
                TableId::Document,
                TableId::LocalScope,
                TableId::LocalVariable,
                TableId::LocalConstant,
                TableId::ImportScope,
            ],
        }
    }

    /// Number of low bits used for the table tag.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len();
        if count <= 1 {
            0
        } else {
            // ceil(log2(count)), at most 5 for the largest kinds
            (usize::BITS - (count - 1).leading_zeros()) as u8
        }
    }

    /// Tag of `table` within this coded index, using the first matching slot.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_of(&self, table: TableId) -> Option<u32> {
        // CustomAttributeType uses the canonical tags 2 and 3
        if *self == CodedIndexType::CustomAttributeType {
            return match table {
                TableId::MethodDef => Some(2),
                TableId::MemberRef => Some(3),
                _ => None,
            };
        }

        self.tables()
            .iter()
            .position(|candidate| *candidate == table)
            .map(|tag| tag as u32)
    }
}

/// A decoded coded index value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedIndex {
    /// The table the index points into
    pub tag: TableId,
    /// 1-based row within `tag`, 0 for a nil reference
    pub row: u32,
    /// Token equivalent of `tag` and `row`
    pub token: Token,
}

impl CodedIndex {
    /// Create a new `CodedIndex`
    #[must_use]
    pub fn new(tag: TableId, row: u32) -> CodedIndex {
        CodedIndex {
            tag,
            row,
            token: Token::from_table(tag, row),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomDebugInformation.tag_bits(), 5);
    }

    #[test]
    fn tag_of_matches_table_order() {
        for kind in CodedIndexType::iter() {
            for table in kind.tables() {
                let tag = kind.tag_of(*table).unwrap();
                assert_eq!(kind.tables()[tag as usize], *table);
            }
        }

        assert_eq!(CodedIndexType::CustomAttributeType.tag_of(TableId::MethodDef), Some(2));
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_of(TableId::Field), None);
    }

    #[test]
    fn coded_index_token() {
        let index = CodedIndex::new(TableId::TypeRef, 5);
        assert_eq!(index.token.value(), 0x0100_0005);
    }
}
