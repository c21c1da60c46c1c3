//! Integration tests for VISA code generation and the image writer

use newj_bytecode::{
    Image, OpData, Opcode, Operation, DATA_START, MAGIC, PC_START, REG_RA, REG_SP,
};
use newj_ir::IrBuilder;
use newj_lexer::Lexer;
use newj_parser::Parser;
use pretty_assertions::assert_eq;

fn compile(source: &str) -> Image {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let tree = parser.parse_program();
    assert_eq!(parser.diagnostics().warning_count(), 0);
    let (program, diagnostics) = IrBuilder::new().build(&tree);
    assert_eq!(diagnostics.warning_count(), 0);
    Image::from_ir(&program)
}

fn ops_between(image: &Image, start: u64, end: u64) -> Vec<Operation> {
    let from = ((start - PC_START) / 8) as usize;
    let to = ((end - PC_START) / 8) as usize;
    image.text()[from..to].to_vec()
}

#[test]
fn add_function_body() {
    let image = compile(
        "func add(a: int32, b: int32): int32 { return a + b }\nfunc main() { print(add(2, 3)) }",
    );
    assert_eq!(image.pending_fixup_count(), 0);

    let add_start = image.label("add").expect("add label");
    let main_start = image.label("main").expect("main label");
    assert_eq!(add_start, PC_START);

    let add_ops = ops_between(&image, add_start, main_start);
    assert_eq!(
        add_ops,
        vec![
            Operation::three_reg(Opcode::Add, 20, 13, 14),
            Operation::reg_imm(Opcode::Ori, 10, 20, 0),
            Operation::three_reg(Opcode::Jr, REG_RA, 0, 0),
        ]
    );
}

#[test]
fn call_saves_the_frame_and_passes_immediates() {
    let image = compile(
        "func add(a: int32, b: int32): int32 { return a + b }\nfunc main() { print(add(2, 3)) }",
    );
    let main_start = image.label("main").unwrap();
    let main_ops = ops_between(&image, main_start, PC_START + 8 * image.text().len() as u64);

    // 24 bytes of stack: sp, fp and ra are saved around the call.
    assert_eq!(
        main_ops[0],
        Operation::reg_imm(Opcode::Addi, REG_SP, REG_SP, (-24i32) as u32)
    );
    assert_eq!(main_ops[1], Operation::reg_imm(Opcode::Sqw, 61, REG_SP, 0));
    assert_eq!(main_ops[2], Operation::reg_imm(Opcode::Sqw, 62, REG_SP, 8));
    assert_eq!(main_ops[3], Operation::reg_imm(Opcode::Sqw, 63, REG_SP, 16));

    // Arguments 2 and 3 go to r13/r14 by ori.
    assert_eq!(main_ops[4], Operation::reg_imm(Opcode::Ori, 13, 0, 2));
    assert_eq!(main_ops[5], Operation::reg_imm(Opcode::Ori, 14, 0, 3));

    // jal to add's absolute word address.
    assert_eq!(main_ops[6], Operation::single_imm(Opcode::Jal, PC_START >> 3));

    // The return value is copied out of r10, the frame restored in reverse.
    assert_eq!(main_ops[7], Operation::reg_imm(Opcode::Ori, 20, 10, 0));
    assert_eq!(main_ops[8], Operation::reg_imm(Opcode::Lqw, 63, REG_SP, 16));
    assert_eq!(main_ops[9], Operation::reg_imm(Opcode::Lqw, 62, REG_SP, 8));
    assert_eq!(main_ops[10], Operation::reg_imm(Opcode::Lqw, 61, REG_SP, 0));
    assert_eq!(main_ops[11], Operation::reg_imm(Opcode::Addi, REG_SP, REG_SP, 24));

    // print(x) for an i32 is an argument copy plus syscall 1.
    assert_eq!(main_ops[12], Operation::reg_imm(Opcode::Ori, 1, 20, 0));
    assert_eq!(main_ops[13], Operation::reg_imm(Opcode::Syscall, 1, 0, 1));

    // main exits through syscall 5.
    assert_eq!(main_ops[14], Operation::reg_imm(Opcode::Syscall, 0, 0, 5));
    assert_eq!(main_ops.len(), 15);
}

#[test]
fn while_loop_back_edge_uses_slti_jne_jmp() {
    let image = compile("func main() {\n let i: int32 = 0\n while (i < 10) { i += 1 }\n}");
    assert_eq!(image.pending_fixup_count(), 0);

    let ops = image.text().to_vec();
    assert_eq!(ops[0], Operation::reg_imm(Opcode::Ori, 20, 0, 0), "i = 0");
    // into the condition block
    let cond_addr = PC_START + 2 * 8;
    assert_eq!(ops[1], Operation::single_imm(Opcode::Jmp, cond_addr >> 3));
    // i < 10 with a constant bound is slti + jne, falling through to jmp
    assert_eq!(ops[2], Operation::reg_imm(Opcode::Slti, 1, 20, 10));
    assert_eq!(ops[3].code, Opcode::Jne);
    assert_eq!(ops[4].code, Opcode::Jmp);
    // body: i += 1, then back to the condition
    assert_eq!(ops[5], Operation::reg_imm(Opcode::Addi, 20, 20, 1));
    assert_eq!(ops[6], Operation::single_imm(Opcode::Jmp, cond_addr >> 3));
    // exit halts
    assert_eq!(ops[7], Operation::reg_imm(Opcode::Syscall, 0, 0, 5));

    // The jne skips forward to the body: (body - (jne + 8)) >> 3 words.
    let OpData::RegImm { immediate, .. } = ops[3].data else { panic!() };
    let jne_addr = PC_START + 3 * 8;
    let body_addr = PC_START + 5 * 8;
    assert_eq!(immediate, ((body_addr - (jne_addr + 8)) / 8) as u32);
}

#[test]
fn forward_references_are_all_patched() {
    let image = compile(
        "func f(x: int32): int32 {\n if (x == 0 or x == 1) { return 1 }\n return 0\n}\nfunc main() { print(f(3)) }",
    );
    assert_eq!(image.pending_fixup_count(), 0, "label closure after codegen");

    // No jump is left with a zero placeholder pointing nowhere: every
    // absolute jump lands inside the text segment.
    for op in image.text() {
        if matches!(op.code, Opcode::Jmp | Opcode::Jal) {
            let OpData::Immediate(imm) = op.data else { panic!() };
            let target = imm << 3;
            assert!(
                target >= PC_START && target <= PC_START + 8 * image.text().len() as u64,
                "jump target {:#x} outside text",
                target
            );
        }
    }
}

#[test]
fn string_literals_land_in_data_with_nul() {
    let mut image = compile("func main() { print(\"hi\") }");
    assert_eq!(image.data(), b"hi\0");

    // The address load is a lui + ori pair followed by syscall 4.
    let ops = image.text();
    assert_eq!(ops[0], Operation::reg_imm(Opcode::Lui, 1, 0, 0));
    assert_eq!(ops[1], Operation::reg_imm(Opcode::Ori, 1, 1, DATA_START as u32));
    assert_eq!(ops[2], Operation::reg_imm(Opcode::Syscall, 1, 0, 4));

    let bytes = image.to_bytes();
    assert_eq!(&bytes[..3], &MAGIC);
}

#[test]
fn image_without_main_is_empty_but_writable() {
    let mut image = compile("const K: int64 = 2 + 3");
    assert!(image.text().is_empty());
    assert!(image.data().is_empty());

    let bytes = image.to_bytes();
    assert_eq!(&bytes[..3], &MAGIC);
    // Header table holds a single .text entry of length 0.
    let header_len = u32::from_le_bytes(bytes[3..7].try_into().unwrap());
    assert_eq!(header_len, 14);
}

#[test]
fn header_table_offsets_resolve_to_sections() {
    let mut image = compile("func main() { print(\"data!\") }");
    let bytes = image.to_bytes();

    assert_eq!(&bytes[..3], &MAGIC);
    let header_len = u32::from_le_bytes(bytes[3..7].try_into().unwrap()) as usize;
    assert_eq!(header_len, 2 * 14, ".data and .text entries");

    let entry = |at: usize| {
        let name_end = bytes[at..at + 6].iter().position(|&b| b == 0).unwrap();
        let name = std::str::from_utf8(&bytes[at..at + name_end]).unwrap().to_string();
        let offset = u32::from_le_bytes(bytes[at + 6..at + 10].try_into().unwrap()) as usize;
        let length = u32::from_le_bytes(bytes[at + 10..at + 14].try_into().unwrap()) as usize;
        (name, offset, length)
    };

    let (data_name, data_offset, data_len) = entry(7);
    assert_eq!(data_name, ".data");
    assert_eq!(&bytes[data_offset..data_offset + data_len], b"data!\0");

    let (text_name, text_offset, text_len) = entry(7 + 14);
    assert_eq!(text_name, ".text");
    assert_eq!(text_len % 8, 0);
    assert_eq!(bytes.len(), text_offset + text_len);

    // First text word round-trips through the instruction decoder.
    let first = u64::from_le_bytes(bytes[text_offset..text_offset + 8].try_into().unwrap());
    let decoded = Operation::decode(first).expect("valid first instruction");
    assert_eq!(decoded.code, Opcode::Lui);
}

#[test]
fn write_to_disk_round_trips(){
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let mut image = compile("func main() { }");
    image.write_to(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes, image.to_bytes());
    assert_eq!(&bytes[..3], &MAGIC);
}

#[test]
fn too_many_parameters_skips_the_function() {
    let image = compile(
        "func big(a: int32, b: int32, c: int32, d: int32, e: int32, f: int32, g: int32, h: int32) { return }\nfunc main() { }",
    );
    assert!(image.label("big").is_none(), "the function is skipped entirely");
    assert!(image.label("main").is_some());
    assert!(image.diagnostics().warning_count() >= 1);
}

#[test]
fn bytecode_dump_lists_labels_and_mnemonics() {
    let image = compile("func main() { let x = 1 }");
    let dump = image.dump();
    assert!(dump.contains("main_entry:"));
    assert!(dump.contains("ori"));
    assert!(dump.contains("syscall"));
}
