//! End-to-end tests through the driver

use newj_cli::{compile_file, compile_source, CompileOptions};
use pretty_assertions::assert_eq;
use std::fs;
use std::io;
use std::path::PathBuf;

const MAGIC: [u8; 3] = [0x7E, b'N', b'J'];

fn write_source(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).unwrap();
    path
}

#[test]
fn compiles_to_a_bin_next_to_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_source(&dir, "hello.nj", "func main() { print(\"hello\") }");

    let outcome = compile_file(&input, &CompileOptions::default()).unwrap();
    assert_eq!(outcome.output_path, dir.path().join("hello.bin"));
    assert!(outcome.diagnostics.is_empty());

    let bytes = fs::read(&outcome.output_path).unwrap();
    assert_eq!(&bytes[..3], &MAGIC);
}

#[test]
fn end_to_end_arithmetic_program() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_source(
        &dir,
        "sum.nj",
        "func add(a: int32, b: int32): int32 { return a + b }\nfunc main() { print(add(2, 3)) }",
    );

    let outcome = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(outcome.diagnostics.is_empty());

    let bytes = fs::read(&outcome.output_path).unwrap();
    assert_eq!(&bytes[..3], &MAGIC);
    // .text only: one 14-byte header entry.
    let header_len = u32::from_le_bytes(bytes[3..7].try_into().unwrap());
    assert_eq!(header_len, 14);
}

#[test]
fn duplicate_top_level_still_produces_an_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_source(
        &dir,
        "dup.nj",
        "func f() { return }\nfunc f(x: int32) { return }\nfunc main() { }",
    );

    let outcome = compile_file(&input, &CompileOptions::default()).unwrap();
    assert_eq!(outcome.diagnostics.warning_count(), 1);
    assert!(outcome.output_path.exists());
}

#[test]
fn empty_source_still_produces_an_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_source(&dir, "empty.nj", "");

    let outcome = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(outcome.output_path.exists());
}

#[test]
fn pathological_input_does_not_crash_the_pipeline() {
    let sources = [
        "\"unterminated",
        "func",
        "func main() { let x = ",
        "}}}}",
        "@@@@ ### \n\n\n 0x 0b",
    ];
    for source in sources {
        let (mut image, _diagnostics) =
            compile_source(source, &CompileOptions::default(), &mut io::sink());
        let bytes = image.to_bytes();
        assert_eq!(&bytes[..3], &MAGIC, "source {:?}", source);
    }
}

#[test]
fn missing_input_is_a_driver_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.nj");
    assert!(compile_file(&missing, &CompileOptions::default()).is_err());
}

#[test]
fn dumps_are_written_to_the_given_sink() {
    let mut out = Vec::new();
    let options = CompileOptions {
        dump_ast: true,
        dump_ast_json: true,
        dump_ir: true,
        dump_bytecode: true,
    };
    compile_source("func main() { let x = 1 }", &options, &mut out);
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Function decl for main"), "syntax tree dump");
    assert!(text.contains("\"items\""), "JSON dump");
    assert!(text.contains("main_entry:"), "IR dump");
    assert!(text.contains("syscall"), "bytecode dump");
}
