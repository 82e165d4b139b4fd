//! A minimal `Hello, World!` metadata image.

use crate::{
    file::buffer::ByteBuffer,
    metadata::{
        root::{Root, CIL_HEADER_MAGIC},
        streams::{
            encode_row, encode_tables_header, BlobBuilder, GuidBuilder, StreamHeader,
            StringsBuilder, UserStringsBuilder,
        },
        tables::{CodedIndexType, HeapSizes, TableId, TableInfo},
        token::Token,
    },
};

/// `Program::Main`
pub const MAIN_METHOD: Token = Token(0x0600_0001);
/// `Program::value`
pub const VALUE_FIELD: Token = Token(0x0400_0001);
/// `Crafted.Program`
pub const PROGRAM_TYPE: Token = Token(0x0200_0002);
/// `System.Object`
pub const OBJECT_TYPE: Token = Token(0x0100_0001);
/// `System.Console`
pub const CONSOLE_TYPE: Token = Token(0x0100_0002);
/// `System.Console::WriteLine(string)`
pub const WRITELINE_METHOD: Token = Token(0x0A00_0001);
/// Local variable signature of `Main`, a single `int32`
pub const MAIN_LOCALS: Token = Token(0x1100_0001);
/// `"Hello, World!"`
pub const HELLO_STRING: Token = Token(0x7000_0001);

/// Build the metadata image.
///
/// Streams: `#~`, `#Strings`, `#US`, `#GUID` and `#Blob`. Tables: one Module, two TypeRefs
/// (`System.Object`, `System.Console`), two TypeDefs (`<Module>`, `Crafted.Program`), one Field,
/// one MethodDef (`Main`), one MemberRef (`WriteLine`) and one StandAloneSig.
pub fn crafted_metadata() -> Vec<u8> {
    crafted_metadata_with_guid_tail(&[])
}

/// Build the metadata image with `tail` appended to the `#GUID` heap.
pub fn crafted_metadata_with_guid_tail(tail: &[u8]) -> Vec<u8> {
    let mut strings = StringsBuilder::new();
    let module_name = strings.add("crafted.dll").unwrap();
    let module_type = strings.add("<Module>").unwrap();
    let program = strings.add("Program").unwrap();
    let crafted = strings.add("Crafted").unwrap();
    let main = strings.add("Main").unwrap();
    let system = strings.add("System").unwrap();
    let object = strings.add("Object").unwrap();
    let console = strings.add("Console").unwrap();
    let writeline = strings.add("WriteLine").unwrap();
    let value = strings.add("value").unwrap();

    let mut userstrings = UserStringsBuilder::new();
    assert_eq!(userstrings.add("Hello, World!").unwrap(), 1);

    let mut guids = GuidBuilder::new();
    let mvid = guids
        .add(uguid::guid!("a3e4d9c1-5b7f-4e2a-9c8d-0f1e2d3c4b5a"))
        .unwrap();

    let mut blobs = BlobBuilder::new();
    let method_sig = blobs.add(&[0x00, 0x00, 0x01]).unwrap();
    let field_sig = blobs.add(&[0x06, 0x08]).unwrap();
    let writeline_sig = blobs.add(&[0x00, 0x01, 0x01, 0x0E]).unwrap();
    let locals_sig = blobs.add(&[0x07, 0x01, 0x08]).unwrap();

    let info = TableInfo::for_write(
        &[
            (TableId::Module, 1),
            (TableId::TypeRef, 2),
            (TableId::TypeDef, 2),
            (TableId::Field, 1),
            (TableId::MethodDef, 1),
            (TableId::MemberRef, 1),
            (TableId::StandAloneSig, 1),
        ],
        HeapSizes::empty(),
    );

    let scope = info
        .encode_coded_index(TableId::Module, 1, CodedIndexType::ResolutionScope)
        .unwrap();
    let extends = info
        .encode_coded_index(TableId::TypeRef, 1, CodedIndexType::TypeDefOrRef)
        .unwrap();
    let parent = info
        .encode_coded_index(TableId::TypeRef, 2, CodedIndexType::MemberRefParent)
        .unwrap();

    let mut tables = ByteBuffer::new();
    encode_tables_header(&info, 0, &mut tables).unwrap();
    encode_row(&info, TableId::Module, &[0, module_name, mvid, 0, 0], &mut tables).unwrap();
    encode_row(&info, TableId::TypeRef, &[scope, object, system], &mut tables).unwrap();
    encode_row(&info, TableId::TypeRef, &[scope, console, system], &mut tables).unwrap();
    encode_row(&info, TableId::TypeDef, &[0, module_type, 0, 0, 1, 1], &mut tables).unwrap();
    encode_row(
        &info,
        TableId::TypeDef,
        &[0x0010_0001, program, crafted, extends, 1, 1],
        &mut tables,
    )
    .unwrap();
    encode_row(&info, TableId::Field, &[0x0011, value, field_sig], &mut tables).unwrap();
    encode_row(
        &info,
        TableId::MethodDef,
        &[0x2050, 0, 0x0096, main, method_sig, 1],
        &mut tables,
    )
    .unwrap();
    encode_row(&info, TableId::MemberRef, &[parent, writeline, writeline_sig], &mut tables).unwrap();
    encode_row(&info, TableId::StandAloneSig, &[locals_sig], &mut tables).unwrap();

    let mut tables = tables.into_vec();
    tables.resize(tables.len().next_multiple_of(4), 0);

    let streams: Vec<(&str, Vec<u8>)> = vec![
        ("#~", tables),
        ("#Strings", strings.into_bytes()),
        ("#US", userstrings.into_bytes()),
        ("#GUID", [guids.into_bytes(), tail.to_vec()].concat()),
        ("#Blob", blobs.into_bytes()),
    ];

    let mut root = Root {
        signature: CIL_HEADER_MAGIC,
        major_version: 1,
        minor_version: 1,
        reserved: 0,
        length: 0,
        version: "v4.0.30319".to_string(),
        flags: 0,
        stream_headers: streams
            .iter()
            .map(|(name, _)| StreamHeader {
                offset: 0,
                size: 0,
                name: (*name).to_string(),
            })
            .collect(),
    };

    let mut offset = root.size();
    for (header, (_, data)) in root.stream_headers.iter_mut().zip(&streams) {
        header.offset = u32::try_from(offset).unwrap();
        header.size = u32::try_from(data.len()).unwrap();
        offset += data.len();
    }

    let mut image = ByteBuffer::new();
    root.write(&mut image).unwrap();
    for (_, data) in &streams {
        image.write_bytes(data).unwrap();
    }

    image.into_vec()
}
