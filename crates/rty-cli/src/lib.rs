//! Batch driver: gather sources, run the pipeline up to the requested
//! phase, print diagnostics, produce an exit code.
//!
//! Failures during initialization propagate as a typed [`EarlyReturn`] all
//! the way to `main`, which turns it into the process exit code; nothing in
//! the driver calls `process::exit` directly, so cleanup always runs.

use clap::{Parser, ValueEnum};
use rty_core::{payload, Diagnostic, GlobalState, SourceType};
use rty_parser::ast::ParsedFile;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// Typed early termination carrying the process exit code.
#[derive(Debug, PartialEq, Eq)]
pub struct EarlyReturn(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Phase {
    Parser,
    Resolver,
    Cfg,
    Infer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PrintKind {
    /// Dump every method's control-flow graph after inference.
    Cfg,
    /// Dump the symbol table counts.
    SymbolTable,
}

/// rty: a gradual type checker for Ruby-like source.
#[derive(Debug, Parser)]
#[command(name = "rty", version, about = "Gradual type checker")]
pub struct Options {
    /// Files or directories to typecheck.
    pub paths: Vec<PathBuf>,

    /// Stop the pipeline after this phase.
    #[arg(long = "stop-after", value_enum)]
    pub stop_after: Option<Phase>,

    /// Cap the worker pool used for indexing.
    #[arg(long = "max-threads")]
    pub max_threads: Option<usize>,

    /// Do not start the filesystem watcher (server mode).
    #[arg(long = "disable-watchman")]
    pub disable_watchman: bool,

    /// Typecheck an inline expression instead of files.
    #[arg(short = 'e', value_name = "EXPR")]
    pub expr: Option<String>,

    /// Run as a language server on stdin/stdout.
    #[arg(long)]
    pub lsp: bool,

    /// Print an internal representation after the run.
    #[arg(long, value_enum)]
    pub print: Option<PrintKind>,

    /// Write a serialized payload snapshot of the final state.
    #[arg(long = "store-payload", value_name = "PATH")]
    pub store_payload: Option<PathBuf>,
}

/// Entry point used by `main` and by tests. Returns the exit code via
/// `EarlyReturn` on both the failure and success paths of server mode.
pub fn run(options: &Options) -> Result<i32, EarlyReturn> {
    if options.lsp {
        let stdin = std::io::BufReader::new(std::io::stdin());
        let stdout = std::io::stdout();
        let code = rty_lsp::run_server(
            stdin,
            stdout.lock(),
            rty_lsp::ServerOptions {
                max_threads: options.max_threads,
            },
        )
        .map_err(|err| {
            eprintln!("rty: server transport error: {err}");
            EarlyReturn(1)
        })?;
        return Ok(code);
    }

    let sources = gather_sources(options)?;
    if sources.is_empty() {
        eprintln!("rty: no input files");
        return Err(EarlyReturn(64));
    }

    if let Some(threads) = options.max_threads {
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global();
    }

    let (gs, diagnostics) = typecheck_batch(&sources, options.stop_after, options.print);

    for diag in &diagnostics {
        println!("{}", render_diagnostic(&gs, diag));
    }
    if !diagnostics.is_empty() {
        println!(
            "Errors: {}",
            diagnostics
                .iter()
                .filter(|d| d.severity == rty_core::Severity::Error)
                .count()
        );
    }

    if let Some(path) = &options.store_payload {
        let bytes = payload::serialize(&gs);
        std::fs::write(path, bytes).map_err(|err| {
            eprintln!("rty: cannot write payload: {err}");
            EarlyReturn(1)
        })?;
    }

    Ok(if diagnostics.is_empty() { 0 } else { 1 })
}

fn gather_sources(options: &Options) -> Result<Vec<(String, String)>, EarlyReturn> {
    let mut sources = Vec::new();
    if let Some(expr) = &options.expr {
        // `-e` wraps the expression in a method body so plain expressions
        // typecheck; the synthetic file is strict.
        let synthetic = format!(
            "# typed: strict\nclass RtyEval\n  sig {{ returns(T.untyped) }}\n  def eval_expression\n    T.unsafe({expr})\n  end\nend\n"
        );
        sources.push(("-e".to_string(), synthetic));
        return Ok(sources);
    }
    for path in &options.paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|err| {
                    eprintln!("rty: cannot walk {}: {err}", path.display());
                    EarlyReturn(66)
                })?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|e| e == "rb")
                {
                    sources.push(read_source(entry.path())?);
                }
            }
        } else {
            sources.push(read_source(path)?);
        }
    }
    Ok(sources)
}

fn read_source(path: &std::path::Path) -> Result<(String, String), EarlyReturn> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        eprintln!("rty: cannot read {}: {err}", path.display());
        EarlyReturn(66)
    })?;
    Ok((path.display().to_string(), contents))
}

/// The batch pipeline: enter files, parse, resolve, build CFGs, infer, then
/// drain. `stop_after` cuts the pipeline short; diagnostics produced so far
/// still drain.
pub fn typecheck_batch(
    sources: &[(String, String)],
    stop_after: Option<Phase>,
    print: Option<PrintKind>,
) -> (GlobalState, Vec<Diagnostic>) {
    let mut gs = GlobalState::new();
    let file_refs: Vec<_> = gs.with_unfrozen_files(|gs| {
        sources
            .iter()
            .map(|(path, contents)| {
                gs.enter_file(path, contents.clone(), SourceType::Normal)
            })
            .collect()
    });

    let mut trees: Vec<ParsedFile> = file_refs
        .iter()
        .map(|&file| rty_parser::parse_file(&mut gs, file))
        .collect();
    debug!(files = trees.len(), "parsed");
    if stop_after == Some(Phase::Parser) {
        let diags = gs.drain_errors();
        return (gs, diags);
    }

    rty_resolver::run(&mut gs, &mut trees);
    if stop_after == Some(Phase::Resolver) {
        let diags = gs.drain_errors();
        return (gs, diags);
    }

    let mut cfgs = Vec::new();
    for tree in &trees {
        collect_and_build(&mut gs, tree, &mut cfgs);
    }
    if stop_after == Some(Phase::Cfg) {
        let diags = gs.drain_errors();
        return (gs, diags);
    }

    for cfg in &mut cfgs {
        rty_infer::infer_cfg(&mut gs, cfg);
    }

    match print {
        Some(PrintKind::Cfg) => {
            for cfg in &cfgs {
                println!("{}", cfg.show(&gs));
            }
        }
        Some(PrintKind::SymbolTable) => {
            println!(
                "names: {} symbols: {} files: {}",
                gs.names_used(),
                gs.symbols_used(),
                gs.files_used()
            );
        }
        None => {}
    }

    let diags = gs.drain_errors();
    (gs, diags)
}

fn collect_and_build(
    gs: &mut GlobalState,
    tree: &ParsedFile,
    out: &mut Vec<rty_cfg::Cfg>,
) {
    fn visit(gs: &mut GlobalState, def: &rty_parser::ast::ClassDef, out: &mut Vec<rty_cfg::Cfg>) {
        for method in &def.methods {
            if let Some(cfg) = rty_cfg::build_for_method(gs, method) {
                out.push(cfg);
            }
        }
        for nested in &def.nested {
            visit(gs, nested, out);
        }
    }
    for def in &tree.defs {
        visit(gs, def, out);
    }
    for method in &tree.toplevel_methods {
        if let Some(cfg) = rty_cfg::build_for_method(gs, method) {
            out.push(cfg);
        }
    }
}

fn render_diagnostic(gs: &GlobalState, diag: &Diagnostic) -> String {
    let pos = diag.loc.file_pos_to_string(gs);
    let severity = match diag.severity {
        rty_core::Severity::Error => "error",
        rty_core::Severity::Warning => "warning",
        rty_core::Severity::Information => "info",
        rty_core::Severity::Hint => "hint",
    };
    format!("{pos}: {severity}: {} [{}]", diag.message, diag.code)
}

#[cfg(test)]
#[path = "tests/driver.rs"]
mod tests;
