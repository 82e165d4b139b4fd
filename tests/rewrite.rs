//! Method body rewriting integration tests.
//!
//! Builds a small metadata image through the public heap and table writers, decodes a method
//! body against it, edits the body and verifies what the encoder writes back.

use cilweave::{
    metadata::tables::{CodedIndexType, HeapSizes},
    prelude::*,
};
use std::sync::Arc;

/// `System.Console::WriteLine(string)`
const WRITELINE: Token = Token(0x0A00_0001);
/// `"Hello, World!"`
const HELLO: Token = Token(0x7000_0001);

/// `ldstr "Hello, World!"; call WriteLine; ldc.i4.s 5; stloc.0; ret` with one `int32` local
#[rustfmt::skip]
const MAIN_BODY: [u8; 26] = [
    0x13, 0x30, 0x01, 0x00, 0x0E, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x11,
    0x72, 0x01, 0x00, 0x00, 0x70,
    0x28, 0x01, 0x00, 0x00, 0x0A,
    0x1F, 0x05,
    0x0A,
    0x2A,
];

fn build_image() -> Result<Vec<u8>> {
    let mut strings = StringsBuilder::new();
    let module = strings.add("rewrite.dll")?;
    let system = strings.add("System")?;
    let console = strings.add("Console")?;
    let writeline = strings.add("WriteLine")?;

    let mut userstrings = UserStringsBuilder::new();
    userstrings.add("Hello, World!")?;

    let mut guids = GuidBuilder::new();
    let mvid = guids.add(uguid::guid!("0b8e6c2a-3f1d-4a5e-8c7b-9d0e1f2a3b4c"))?;

    let mut blobs = BlobBuilder::new();
    let writeline_sig = blobs.add(&[0x00, 0x01, 0x01, 0x0E])?;
    let locals_sig = blobs.add(&[0x07, 0x01, 0x08])?;

    let info = TableInfo::for_write(
        &[
            (TableId::Module, 1),
            (TableId::TypeRef, 1),
            (TableId::MemberRef, 1),
            (TableId::StandAloneSig, 1),
        ],
        HeapSizes::empty(),
    );
    let scope = info.encode_coded_index(TableId::Module, 1, CodedIndexType::ResolutionScope)?;
    let parent = info.encode_coded_index(TableId::TypeRef, 1, CodedIndexType::MemberRefParent)?;

    let mut tables = ByteBuffer::new();
    cilweave::metadata::streams::encode_tables_header(&info, 0, &mut tables)?;
    for (table, row) in [
        (TableId::Module, vec![0, module, mvid, 0, 0]),
        (TableId::TypeRef, vec![scope, console, system]),
        (TableId::MemberRef, vec![parent, writeline, writeline_sig]),
        (TableId::StandAloneSig, vec![locals_sig]),
    ] {
        cilweave::metadata::streams::encode_row(&info, table, &row, &mut tables)?;
    }
    let mut tables = tables.into_vec();
    tables.resize(tables.len().next_multiple_of(4), 0);

    let streams = [
        ("#~", tables),
        ("#Strings", strings.into_bytes()),
        ("#US", userstrings.into_bytes()),
        ("#GUID", guids.into_bytes()),
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
    root.write(&mut image)?;
    for (_, data) in &streams {
        image.write_bytes(data)?;
    }
    Ok(image.into_vec())
}

fn decode_main(view: &MetadataView) -> Result<MethodBody> {
    let options = ReaderOptions::default();
    let resolver = MetadataResolver::new(view, options);
    decode_method_body(&MAIN_BODY, Parameters::new(false, 0), &resolver, &options)
}

/// Resolves against the heaps a [`HeapTokenEmitter`] produced.
struct EmittedHeaps {
    userstrings: Vec<u8>,
    signatures: Vec<Vec<u8>>,
}

impl EmittedHeaps {
    fn new(emitter: HeapTokenEmitter) -> Self {
        let (userstrings, signatures) = emitter.into_parts();
        EmittedHeaps {
            userstrings: userstrings.into_bytes(),
            signatures,
        }
    }
}

impl TokenResolver for EmittedHeaps {
    fn resolve_type(&self, token: Token) -> Result<EntityRef> {
        Ok(EntityRef::new(token))
    }

    fn resolve_method(&self, token: Token) -> Result<EntityRef> {
        Ok(EntityRef::new(token))
    }

    fn resolve_field(&self, token: Token) -> Result<EntityRef> {
        Ok(EntityRef::new(token))
    }

    fn resolve_signature(&self, token: Token) -> Result<EntityRef> {
        Ok(EntityRef::new(token))
    }

    fn resolve_string(&self, token: Token) -> Result<Arc<str>> {
        UserStrings::from(&self.userstrings)?.get_checked(token.row() as usize)
    }

    fn resolve_locals(&self, token: Token) -> Result<Variables> {
        let signature = (token.row() as usize)
            .checked_sub(1)
            .and_then(|index| self.signatures.get(index))
            .ok_or(Error::UnresolvedToken(token))?;
        Variables::parse_signature(signature)
    }
}

fn opcodes(body: &MethodBody) -> Vec<OpCode> {
    body.instructions()
        .iter()
        .map(|(_, instruction)| instruction.opcode().unwrap())
        .collect()
}

#[test]
fn decode_against_metadata() -> Result<()> {
    let view = MetadataView::from_mem(build_image()?)?;
    let body = decode_main(&view)?;

    assert_eq!(
        opcodes(&body),
        [
            OpCode::Ldstr,
            OpCode::Call,
            OpCode::LdcI4S,
            OpCode::Stloc0,
            OpCode::Ret
        ]
    );
    assert_eq!(body.code_size(), 14);
    assert!(body.init_locals);
    assert_eq!(body.local_var_sig_token, Token::new(0x1100_0001));
    assert_eq!(body.variables.len(), 1);
    assert_eq!(body.variables.iter().next().unwrap().signature(), [0x08]);

    let mut operands = body.instructions().iter().map(|(_, i)| i.operand().clone());
    assert_eq!(operands.next(), Some(Operand::String("Hello, World!".into())));
    match operands.next() {
        Some(Operand::Method(entity)) => {
            assert_eq!(entity.token, WRITELINE);
            assert_eq!(entity.name.as_deref(), Some("WriteLine"));
        }
        other => panic!("expected a method operand, got {other:?}"),
    }
    assert_eq!(operands.next(), Some(Operand::Int8(5)));
    Ok(())
}

#[test]
fn unchanged_body_is_byte_identical() -> Result<()> {
    let view = MetadataView::from_mem(build_image()?)?;
    let mut body = decode_main(&view)?;

    let mut emitter = HeapTokenEmitter::new();
    let bytes = encode_method_body(&mut body, &mut emitter, &WriterOptions::default())?;

    assert_eq!(bytes, MAIN_BODY);
    assert_eq!(emitter.userstrings().len(), 1 + 1 + 27);
    assert!(emitter.signatures().is_empty());
    assert_eq!(emitter.emit_string("Hello, World!")?, HELLO);
    Ok(())
}

#[test]
fn edited_body_round_trips() -> Result<()> {
    let view = MetadataView::from_mem(build_image()?)?;
    let mut body = decode_main(&view)?;

    let mut editor = ILEditor::new(&mut body);
    let ret = editor.body().instructions().last().unwrap();
    let greeting = editor.add_variable(&[0x0E])?;
    editor.insert_before(
        ret,
        ILEditor::create(OpCode::Ldstr, Operand::String("Goodbye".into()))?,
    )?;
    editor.insert_before(
        ret,
        ILEditor::create(OpCode::StlocS, Operand::Variable(greeting))?,
    )?;
    assert!(editor.body().local_var_sig_token.is_null());

    let mut emitter = HeapTokenEmitter::new().with_first_signature_row(2);
    let bytes = encode_method_body(&mut body, &mut emitter, &WriterOptions::default())?;
    assert_eq!(body.local_var_sig_token, Token::new(0x1100_0002));
    assert_eq!(emitter.signatures(), [vec![0x07, 0x02, 0x08, 0x0E]]);
    assert_eq!(&bytes[8..12], [0x02, 0x00, 0x00, 0x11]);

    let heaps = EmittedHeaps::new(emitter);
    let decoded = decode_method_body(
        &bytes,
        Parameters::new(false, 0),
        &heaps,
        &ReaderOptions::default(),
    )?;

    assert_eq!(
        opcodes(&decoded),
        [
            OpCode::Ldstr,
            OpCode::Call,
            OpCode::LdcI4S,
            OpCode::Stloc0,
            OpCode::Ldstr,
            OpCode::StlocS,
            OpCode::Ret
        ]
    );
    assert_eq!(decoded.code_size(), 14 + 5 + 2);
    assert_eq!(decoded.variables.len(), 2);

    let (_, stored) = decoded.instructions().iter().nth(5).unwrap();
    let Operand::Variable(local) = stored.operand() else {
        panic!("expected a variable operand");
    };
    assert_eq!(decoded.variables.index_of(*local), Some(1));

    let (_, greeting) = decoded.instructions().iter().nth(4).unwrap();
    assert_eq!(greeting.operand(), &Operand::String("Goodbye".into()));
    Ok(())
}

#[test]
fn branches_are_relaxed() -> Result<()> {
    let mut body = MethodBody::new(Parameters::new(false, 0));
    let mut editor = ILEditor::new(&mut body);
    editor.emit(OpCode::LdcI40, Operand::None)?;
    let ret = editor.emit(OpCode::Ret, Operand::None)?;
    let first_nop = editor.insert_before(ret, ILEditor::create(OpCode::Nop, Operand::None)?)?;
    for _ in 1..10 {
        editor.insert_before(ret, ILEditor::create(OpCode::Nop, Operand::None)?)?;
    }
    editor.insert_before(
        first_nop,
        ILEditor::create(OpCode::Brfalse, Operand::Branch(ret))?,
    )?;

    let mut emitter = HeapTokenEmitter::new();
    let long = encode_method_body(&mut body, &mut emitter, &WriterOptions::default())?;
    assert_eq!(long.len(), 1 + 1 + 5 + 10 + 1);
    assert_eq!(&long[1..7], [0x16, 0x39, 0x0A, 0x00, 0x00, 0x00]);

    let options = WriterOptions::default().with_shorten_branches(true);
    let short = encode_method_body(&mut body, &mut emitter, &options)?;

    #[rustfmt::skip]
    let expected: [u8; 15] = [
        0x3A,
        0x16,
        0x2C, 0x0A,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x2A,
    ];
    assert_eq!(short, expected);
    Ok(())
}

#[test]
fn handlers_follow_edits() -> Result<()> {
    let mut body = MethodBody::new(Parameters::new(false, 0));
    let mut editor = ILEditor::new(&mut body);
    let guarded = editor.emit(OpCode::Nop, Operand::None)?;
    let ret = editor.emit(OpCode::Ret, Operand::None)?;
    let leave = editor.insert_after(
        guarded,
        ILEditor::create(OpCode::LeaveS, Operand::Branch(ret))?,
    )?;
    let finally = editor.insert_after(leave, ILEditor::create(OpCode::Endfinally, Operand::None)?)?;

    body.exception_handlers.push(ExceptionHandler {
        flags: ExceptionHandlerFlags::FINALLY,
        try_start: guarded,
        try_end: Some(finally),
        handler_start: finally,
        handler_end: Some(ret),
        filter_start: None,
        catch_type: None,
    });

    // The try block now starts at the leave
    body.remove(guarded)?;
    assert_eq!(body.exception_handlers[0].try_start, leave);

    let mut emitter = HeapTokenEmitter::new();
    let bytes = encode_method_body(&mut body, &mut emitter, &WriterOptions::default())?;
    assert_eq!(bytes[0] & 0x03, 0x03);

    let decoded = decode_method_body(
        &bytes,
        Parameters::new(false, 0),
        &EmittedHeaps::new(emitter),
        &ReaderOptions::default(),
    )?;
    assert_eq!(
        opcodes(&decoded),
        [OpCode::LeaveS, OpCode::Endfinally, OpCode::Ret]
    );

    let handler = &decoded.exception_handlers[0];
    let ids: Vec<InstructionId> = decoded.instructions().ids().collect();
    assert_eq!(handler.flags, ExceptionHandlerFlags::FINALLY);
    assert_eq!(handler.try_start, ids[0]);
    assert_eq!(handler.try_end, Some(ids[1]));
    assert_eq!(handler.handler_start, ids[1]);
    assert_eq!(handler.handler_end, Some(ids[2]));
    Ok(())
}

#[test]
fn dangling_tokens_are_rejected() -> Result<()> {
    let view = MetadataView::from_mem(build_image()?)?;
    let options = ReaderOptions::default();
    let resolver = MetadataResolver::new(&view, options);

    // call 0x0A000002, a MemberRef row past the end of the table
    let code = [0x1A, 0x28, 0x02, 0x00, 0x00, 0x0A, 0x2A];
    let result = decode_method_body(&code, Parameters::new(false, 0), &resolver, &options);
    assert!(matches!(result, Err(Error::UnresolvedToken(_))));
    Ok(())
}
