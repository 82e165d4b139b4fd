use strum::{EnumCount, EnumIter};

/// Identifiers for the metadata tables defined by ECMA-335 and the Portable PDB format.
///
/// The numeric values are the table numbers used in tokens and in the `valid` bitmask of the
/// `#~` stream header.
///
/// ## Table Categories
///
/// ### Core Type System
/// - **`Module`**, **`TypeRef`**, **`TypeDef`**, **`Field`**, **`MethodDef`**, **`Param`**
///
/// ### Indirection (uncompressed `#-` streams)
/// - **`FieldPtr`**, **`MethodPtr`**, **`ParamPtr`**, **`EventPtr`**, **`PropertyPtr`**
///
/// ### Members, Attributes and Signatures
/// - **`MemberRef`**, **`CustomAttribute`**, **`StandAloneSig`**, **`TypeSpec`**, **`MethodSpec`**
///
/// ### Assembly Information
/// - **`Assembly`**, **`AssemblyRef`** and their processor/OS companions
///
/// ### Portable PDB
/// - **`Document`** through **`CustomDebugInformation`** (0x30 - 0x37)
///
/// ## Reference
/// * ECMA-335 Partition II, Section 22 - Metadata Tables
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// Module definition, one row per module
    Module = 0x00,
    /// References to types defined elsewhere
    TypeRef = 0x01,
    /// Type definitions
    TypeDef = 0x02,
    /// Field indirection
    FieldPtr = 0x03,
    /// Field definitions
    Field = 0x04,
    /// Method indirection
    MethodPtr = 0x05,
    /// Method definitions
    MethodDef = 0x06,
    /// Parameter indirection
    ParamPtr = 0x07,
    /// Parameter definitions
    Param = 0x08,
    /// Interfaces implemented by types
    InterfaceImpl = 0x09,
    /// References to fields and methods of other types
    MemberRef = 0x0A,
    /// Compile-time constants
    Constant = 0x0B,
    /// Custom attribute applications
    CustomAttribute = 0x0C,
    /// Marshalling descriptors
    FieldMarshal = 0x0D,
    /// Declarative security
    DeclSecurity = 0x0E,
    /// Explicit class layout
    ClassLayout = 0x0F,
    /// Explicit field offsets
    FieldLayout = 0x10,
    /// Stand-alone signatures (locals, `calli`)
    StandAloneSig = 0x11,
    /// Type to event list mapping
    EventMap = 0x12,
    /// Event indirection
    EventPtr = 0x13,
    /// Event definitions
    Event = 0x14,
    /// Type to property list mapping
    PropertyMap = 0x15,
    /// Property indirection
    PropertyPtr = 0x16,
    /// Property definitions
    Property = 0x17,
    /// Accessor associations for events and properties
    MethodSemantics = 0x18,
    /// Explicit method overrides
    MethodImpl = 0x19,
    /// References to other modules
    ModuleRef = 0x1A,
    /// Type specifications
    TypeSpec = 0x1B,
    /// P/Invoke mappings
    ImplMap = 0x1C,
    /// Initial data for fields
    FieldRVA = 0x1D,
    /// Edit-and-continue log
    EncLog = 0x1E,
    /// Edit-and-continue map
    EncMap = 0x1F,
    /// Assembly manifest
    Assembly = 0x20,
    /// Unused processor information
    AssemblyProcessor = 0x21,
    /// Unused OS information
    AssemblyOS = 0x22,
    /// References to other assemblies
    AssemblyRef = 0x23,
    /// Unused processor information of assembly references
    AssemblyRefProcessor = 0x24,
    /// Unused OS information of assembly references
    AssemblyRefOS = 0x25,
    /// Files of a multi-file assembly
    File = 0x26,
    /// Types exported from other modules
    ExportedType = 0x27,
    /// Manifest resources
    ManifestResource = 0x28,
    /// Nesting relationships
    NestedClass = 0x29,
    /// Generic parameters
    GenericParam = 0x2A,
    /// Generic method instantiations
    MethodSpec = 0x2B,
    /// Generic parameter constraints
    GenericParamConstraint = 0x2C,
    /// Portable PDB source documents
    Document = 0x30,
    /// Portable PDB per-method sequence points
    MethodDebugInformation = 0x31,
    /// Portable PDB lexical scopes
    LocalScope = 0x32,
    /// Portable PDB local variables
    LocalVariable = 0x33,
    /// Portable PDB local constants
    LocalConstant = 0x34,
    /// Portable PDB import scopes
    ImportScope = 0x35,
    /// Portable PDB async/iterator kickoff mapping
    StateMachineMethod = 0x36,
    /// Portable PDB custom debug information
    CustomDebugInformation = 0x37,
}

impl TableId {
    /// Map a table number to its identifier, `None` for reserved or unknown numbers.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        Some(match value {
            0x00 => TableId::Module,
            0x01 => TableId::TypeRef,
            0x02 => TableId::TypeDef,
            0x03 => TableId::FieldPtr,
            0x04 => TableId::Field,
            0x05 => TableId::MethodPtr,
            0x06 => TableId::MethodDef,
            0x07 => TableId::ParamPtr,
            0x08 => TableId::Param,
            0x09 => TableId::InterfaceImpl,
            0x0A => TableId::MemberRef,
            0x0B => TableId::Constant,
            0x0C => TableId::CustomAttribute,
            0x0D => TableId::FieldMarshal,
            0x0E => TableId::DeclSecurity,
            0x0F => TableId::ClassLayout,
            0x10 => TableId::FieldLayout,
            0x11 => TableId::StandAloneSig,
            0x12 => TableId::EventMap,
            0x13 => TableId::EventPtr,
            0x14 => TableId::Event,
            0x15 => TableId::PropertyMap,
            0x16 => TableId::PropertyPtr,
            0x17 => TableId::Property,
            0x18 => TableId::MethodSemantics,
            0x19 => TableId::MethodImpl,
            0x1A => TableId::ModuleRef,
            0x1B => TableId::TypeSpec,
            0x1C => TableId::ImplMap,
            0x1D => TableId::FieldRVA,
            0x1E => TableId::EncLog,
            0x1F => TableId::EncMap,
            0x20 => TableId::Assembly,
            0x21 => TableId::AssemblyProcessor,
            0x22 => TableId::AssemblyOS,
            0x23 => TableId::AssemblyRef,
            0x24 => TableId::AssemblyRefProcessor,
            0x25 => TableId::AssemblyRefOS,
            0x26 => TableId::File,
            0x27 => TableId::ExportedType,
            0x28 => TableId::ManifestResource,
            0x29 => TableId::NestedClass,
            0x2A => TableId::GenericParam,
            0x2B => TableId::MethodSpec,
            0x2C => TableId::GenericParamConstraint,
            0x30 => TableId::Document,
            0x31 => TableId::MethodDebugInformation,
            0x32 => TableId::LocalScope,
            0x33 => TableId::LocalVariable,
            0x34 => TableId::LocalConstant,
            0x35 => TableId::ImportScope,
            0x36 => TableId::StateMachineMethod,
            0x37 => TableId::CustomDebugInformation,
            _ => return None,
        })
    }

    /// Bit of this table in the `valid` / `sorted` masks.
    #[must_use]
    pub fn mask(self) -> u64 {
        1_u64 << (self as u8)
    }
}
