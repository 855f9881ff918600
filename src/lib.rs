//! Railslide: optimizing compiler, linter and bytecode emitter for the
//! Slate virtual-world scripting language.
//!
//! The pipeline is:
//! source → lex → parse → resolve symbols → determine types → propagate
//! constants → desugar → re-fold → prune (to fixpoint) → mangle →
//! pretty-print / emit bytecode.
//!
//! All nodes, symbols and scope tables for one compilation live in a single
//! [`ast::Arena`] and are released together; diagnostics accumulate in a
//! [`diag::Logger`]. Compilations are independent, so multiple scripts can
//! be compiled in parallel with one arena and logger each — only the
//! builtin registry is shared, read-only, process-wide.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod diag;
pub mod lexer;
pub mod parser;
pub mod passes;
pub mod pretty;
pub mod span;
pub mod symtab;
pub mod types;
pub mod value;

use ast::{Arena, NodeId};
use diag::Logger;
pub use passes::optimize::OptimizeOptions;
pub use symtab::MangleOptions;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub optimize: OptimizeOptions,
    /// Reproduce the legacy VM's jump resolution and folding quirks.
    pub legacy: bool,
    /// Consume `// ASSERT:` comments and fail on unmatched ones.
    pub check_assertions: bool,
    pub mangle: MangleOptions,
}

/// A finished compilation: the arena owning the tree, the root node (absent
/// when parsing failed), and every diagnostic produced along the way.
pub struct Compilation {
    pub arena: Arena,
    pub root: Option<NodeId>,
    pub logger: Logger,
}

impl Compilation {
    pub fn errors(&self) -> usize {
        self.logger.errors()
    }
}

/// Compile a source string through the full pipeline. Analysis only runs on
/// a fully parsed tree; optimization never runs on a tree with errors.
pub fn compile_source(source: &str, opts: &CompileOptions) -> Compilation {
    let mut arena = Arena::new();
    let mut logger = Logger::new();
    logger.set_check_assertions(opts.check_assertions);

    let lexed = lexer::lex(source, &mut logger);
    logger.add_assertions(lexed.assertions);

    let root = parser::parse(lexed.tokens, &mut arena, &mut logger);
    let Some(root) = root else {
        logger.filter_assertions();
        return Compilation {
            arena,
            root: None,
            logger,
        };
    };

    // lexical and syntax problems stop the pipeline before resolution
    if logger.errors() == 0 {
        passes::optimize::run(&mut arena, &mut logger, root, opts.optimize, opts.legacy);
    }
    logger.filter_assertions();

    if opts.mangle.any() {
        if let Some(table) = arena.get(root).table {
            symtab::set_mangled_names(&mut arena, table, opts.mangle);
        }
    }

    Compilation {
        arena,
        root: Some(root),
        logger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_clean_compile() {
        let c = compile_source(
            "integer g = 1 + 1;\ndefault { state_entry() { say(0, (string)g); } }",
            &CompileOptions {
                optimize: OptimizeOptions::all(),
                ..Default::default()
            },
        );
        assert_eq!(c.errors(), 0, "{}", c.logger.report());
        assert!(c.root.is_some());
    }

    #[test]
    fn parse_failure_stops_the_pipeline() {
        let c = compile_source("integer = ;", &CompileOptions::default());
        assert!(c.root.is_none());
        assert!(c.errors() > 0);
    }

    #[test]
    fn assertion_comments_swallow_expected_errors() {
        let c = compile_source(
            "default { state_entry() { integer x = 1.5; // ASSERT: error E10006 at line 1\n } }",
            &CompileOptions {
                check_assertions: true,
                ..Default::default()
            },
        );
        assert_eq!(c.errors(), 0, "{}", c.logger.report());
    }

    #[test]
    fn mangling_applies_after_the_pipeline() {
        let c = compile_source(
            "integer counter = 0;\ndefault { state_entry() { counter = counter + 1; } }",
            &CompileOptions {
                mangle: MangleOptions {
                    globals: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        assert_eq!(c.errors(), 0);
        let arena = &c.arena;
        let mangled = arena
            .symbol_ids()
            .any(|sid| arena.symbol(sid).mangled.is_some());
        assert!(mangled, "at least the global should carry a mangled name");
    }
}
