//! Command-line driver: lint, optimize, pretty-print and emit bytecode.
//!
//! The exit status is the error count; warnings never fail a build.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use railslide::pretty::{self, PrettyOptions};
use railslide::{bytecode, compile_source, CompileOptions, MangleOptions, OptimizeOptions};

#[derive(Parser, Debug)]
#[command(
    name = "railslide",
    version,
    about = "Optimizing compiler and linter for Slate virtual-world scripts"
)]
struct Cli {
    /// Input script
    script: PathBuf,

    /// Only lint the file for problems; don't print the optimized source
    #[arg(long)]
    lint: bool,

    /// Dump the tree after optimization
    #[arg(long)]
    show_tree: bool,

    /// Machine-readable diagnostics (and tree, with --show-tree)
    #[arg(long)]
    json: bool,

    /// Simplify the source by performing constant folding
    #[arg(long)]
    fold_constants: bool,

    /// Prune unused globals
    #[arg(long)]
    prune_globals: bool,

    /// Prune unused locals
    #[arg(long)]
    prune_locals: bool,

    /// Prune unused functions
    #[arg(long)]
    prune_funcs: bool,

    /// Safe optimizations only (constant folding)
    #[arg(long = "O1")]
    opt1: bool,

    /// All pruning plus folding
    #[arg(long = "O2")]
    opt2: bool,

    /// Additionally mangle global/function names and obfuscate numbers
    #[arg(long = "O3")]
    opt3: bool,

    /// Mangle and shorten global variable names
    #[arg(long)]
    mangle_globals: bool,

    /// Mangle and shorten local variable names
    #[arg(long)]
    mangle_locals: bool,

    /// Mangle and shorten function names
    #[arg(long)]
    mangle_funcs: bool,

    /// Print integer literals in hex
    #[arg(long)]
    obfuscate_numbers: bool,

    /// Minimize whitespace in the printed script
    #[arg(long)]
    minw: bool,

    /// Match the legacy VM's jump resolution and folding quirks
    #[arg(long)]
    legacy: bool,

    /// Check `// ASSERT:` comments and suppress matched diagnostics
    #[arg(long)]
    check_asserts: bool,

    /// Write the compiled bytecode image here
    #[arg(long, value_name = "PATH")]
    emit: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> (CompileOptions, PrettyOptions) {
        let mut optimize = OptimizeOptions {
            fold_constants: self.fold_constants,
            prune_unused_globals: self.prune_globals,
            prune_unused_locals: self.prune_locals,
            prune_unused_functions: self.prune_funcs,
        };
        let mut mangle = MangleOptions {
            globals: self.mangle_globals,
            locals: self.mangle_locals,
            functions: self.mangle_funcs,
        };
        let mut obfuscate_numbers = self.obfuscate_numbers;

        if self.opt1 {
            optimize.fold_constants = true;
        }
        if self.opt2 {
            optimize = OptimizeOptions::all();
        }
        if self.opt3 {
            optimize = OptimizeOptions::all();
            // name length feeds straight into bytecode size
            mangle.globals = true;
            mangle.functions = true;
            // keeps `-1` from round-tripping through a unary minus
            obfuscate_numbers = true;
        }
        (
            CompileOptions {
                optimize,
                legacy: self.legacy,
                check_assertions: self.check_asserts,
                mangle,
            },
            PrettyOptions {
                obfuscate_numbers,
                minify: self.minw,
            },
        )
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("couldn't open {}: {e}", cli.script.display());
            return ExitCode::from(1);
        }
    };

    let (opts, print_opts) = cli.options();
    let compilation = compile_source(&source, &opts);

    if cli.json {
        let mut report = serde_json::json!({
            "errors": compilation.logger.errors(),
            "warnings": compilation.logger.warnings(),
            "diagnostics": compilation.logger.diagnostics(),
        });
        if cli.show_tree {
            if let Some(root) = compilation.root {
                report["tree"] =
                    serde_json::to_value(compilation.arena.dump_record(root)).unwrap_or_default();
            }
        }
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        if let Some(root) = compilation.root {
            if !cli.lint {
                println!("{}", pretty::print(&compilation.arena, root, &print_opts));
            }
            if cli.show_tree {
                println!("Tree:");
                print!("{}", compilation.arena.dump(root));
            }
        }
        eprint!("{}", compilation.logger.report());
    }

    if compilation.errors() == 0 {
        if let (Some(root), Some(path)) = (compilation.root, cli.emit.as_ref()) {
            let image = bytecode::emit(&compilation.arena, root);
            if let Err(e) = std::fs::write(path, image) {
                eprintln!("couldn't write {}: {e}", path.display());
                return ExitCode::from(1);
            }
        }
    }

    ExitCode::from(compilation.errors().min(255) as u8)
}
