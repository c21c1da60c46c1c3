//! NewJ compiler command-line interface

use anyhow::Result;
use clap::Parser;
use newj_cli::{compile_file, CompileOptions};
use std::path::PathBuf;

/// Whole-program compiler for the NewJ language
#[derive(Parser)]
#[command(name = "newjc")]
#[command(about = "A compiler for the NewJ language")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// The input source file to compile
    input: PathBuf,

    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Dump the parsed syntax tree to stdout
    #[arg(long = "fsyntax-tree")]
    syntax_tree: bool,

    /// Dump the parsed syntax tree as JSON
    #[arg(long = "fsyntax-json")]
    syntax_json: bool,

    /// Dump the IR after building
    #[arg(long = "fir-dump")]
    ir_dump: bool,

    /// Dump the assembled bytecode in human-readable form
    #[arg(long = "fbytecode")]
    bytecode: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let options = CompileOptions {
        dump_ast: cli.syntax_tree,
        dump_ast_json: cli.syntax_json,
        dump_ir: cli.ir_dump,
        dump_bytecode: cli.bytecode,
    };

    let outcome = compile_file(&cli.input, &options)?;
    for diagnostic in outcome.diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }

    // Reaching the end is success, diagnostics or not; a non-empty stream
    // is the caller's cue that the image may be incomplete.
    Ok(())
}
