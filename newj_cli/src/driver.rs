//! Pipeline sequencing

use log::{debug, info};
use newj_bytecode::Image;
use newj_common::{Diagnostics, NewjError, NewjResult};
use newj_ir::IrBuilder;
use newj_lexer::Lexer;
use newj_parser::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Which intermediate representations to dump along the way.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub dump_ast: bool,
    pub dump_ast_json: bool,
    pub dump_ir: bool,
    pub dump_bytecode: bool,
}

/// The result of a complete run: where the image went and everything the
/// pipeline had to say about the input.
#[derive(Debug)]
pub struct CompileOutcome {
    pub output_path: PathBuf,
    pub diagnostics: Diagnostics,
}

/// Run the pipeline over in-memory source. Dumps requested in `options`
/// are written to `out`.
pub fn compile_source(
    source: &str,
    options: &CompileOptions,
    out: &mut dyn Write,
) -> (Image, Diagnostics) {
    let mut diagnostics = Diagnostics::new();

    let mut lexer = Lexer::new(source, 0);
    let tokens = lexer.tokenize();
    diagnostics.extend(lexer.take_diagnostics());
    debug!("lexed {} tokens", tokens.len());

    let mut parser = Parser::new(tokens);
    let tree = parser.parse_program();
    diagnostics.extend(parser.take_diagnostics());
    if options.dump_ast {
        let _ = out.write_all(newj_parser::pretty_print(&tree).as_bytes());
    }
    if options.dump_ast_json {
        let _ = writeln!(out, "{}", newj_parser::printer::to_json(&tree));
    }

    let (program, ir_diagnostics) = IrBuilder::new().build(&tree);
    diagnostics.extend(ir_diagnostics);
    if options.dump_ir {
        let _ = out.write_all(program.dump().as_bytes());
    }

    let mut image = Image::from_ir(&program);
    diagnostics.extend(image.take_diagnostics());
    if options.dump_bytecode {
        let _ = out.write_all(image.dump().as_bytes());
    }

    (image, diagnostics)
}

/// Compile `input` to `<input-stem>.bin` next to it.
///
/// Only an unreadable input or an unwritable output is an error; diagnostics
/// from the pipeline are returned in the outcome, and the image is written
/// regardless of them.
pub fn compile_file(input: &Path, options: &CompileOptions) -> NewjResult<CompileOutcome> {
    let source = fs::read_to_string(input).map_err(|cause| {
        NewjError::io_error(format!("could not read '{}': {}", input.display(), cause))
    })?;
    info!("compiling {}", input.display());

    let (mut image, diagnostics) = compile_source(&source, options, &mut io::stdout());

    let output_path = input.with_extension("bin");
    image.write_to(&output_path).map_err(|cause| {
        NewjError::io_error(format!("could not write '{}': {}", output_path.display(), cause))
    })?;
    info!("wrote {}", output_path.display());

    Ok(CompileOutcome { output_path, diagnostics })
}
