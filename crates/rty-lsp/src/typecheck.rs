//! The incremental typechecking coordinator.
//!
//! Owns the committed global state plus a per-file cache of parsed trees,
//! fingerprints, inferred CFGs and diagnostics. Each edit batch picks one of
//! two paths:
//!
//! - **slow path** — first initialization or any structural change: rebuild
//!   a fresh state, index every file (file-parallel workers parse against
//!   sibling copies of the base state and their trees are migrated into the
//!   commit state through a name substitution), resolve, and re-infer every
//!   method;
//! - **fast path** — every changed file's *definition fingerprint* (classes,
//!   superclasses, method names/arities, signatures) is unchanged: reparse
//!   just those files against a copy of the committed state and re-infer
//!   only the methods whose body fingerprint moved. Untouched methods keep
//!   their cached diagnostics.
//!
//! Diagnostics for a file always replace that file's previous set.

use rty_core::{Diagnostic, FileRef, GlobalState, GlobalSubstitution, SourceType};
use rty_cfg::Cfg;
use rty_parser::ast::{ClassDef, MethodDef, ParsedFile};
use rustc_hash::FxHashMap;
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

pub struct FileRecord {
    pub contents: String,
    pub parsed: ParsedFile,
    pub file_ref: FileRef,
    def_fingerprint: u64,
    method_fingerprints: FxHashMap<String, u64>,
    /// Inferred CFGs, the substrate for hover/definition/references.
    pub cfgs: Vec<Cfg>,
    /// Diagnostics outside any method body (parse, resolve).
    file_diags: Vec<Diagnostic>,
    method_diags: FxHashMap<String, Vec<Diagnostic>>,
}

impl FileRecord {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = self.file_diags.clone();
        for diags in self.method_diags.values() {
            out.extend(diags.iter().cloned());
        }
        out.sort_by_key(|d| (d.loc.begin(), d.loc.end(), d.code));
        out
    }
}

/// Outcome of one edit batch, also surfaced in tests and metrics.
#[derive(Clone, Debug, Default)]
pub struct TypecheckRun {
    pub took_fast_path: bool,
    pub updated_files: Vec<String>,
    pub methods_retypechecked: usize,
}

#[derive(Default)]
pub struct Coordinator {
    pub gs: GlobalState,
    pub files: FxHashMap<String, FileRecord>,
    initialized: bool,
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator {
            gs: GlobalState::new(),
            files: FxHashMap::default(),
            initialized: false,
        }
    }

    /// Apply a merged edit batch and typecheck. Returns what happened plus
    /// the per-file diagnostics to publish.
    pub fn apply_edit(
        &mut self,
        changes: &[(String, Option<String>)],
    ) -> (TypecheckRun, Vec<(String, Vec<Diagnostic>)>) {
        // Record final contents. A close keeps the last contents; the file
        // stays part of the workspace.
        let mut changed: Vec<String> = Vec::new();
        for (uri, contents) in changes {
            if let Some(text) = contents {
                let previous = self.files.get(uri).map(|r| r.contents.as_str());
                if previous != Some(text.as_str()) {
                    changed.push(uri.clone());
                }
                match self.files.get_mut(uri) {
                    Some(record) => record.contents = text.clone(),
                    None => {
                        self.files.insert(uri.clone(), empty_record(text.clone()));
                    }
                }
            }
        }

        if changed.is_empty() && self.initialized {
            return (TypecheckRun::default(), Vec::new());
        }

        if self.initialized && self.can_take_fast_path(&changed) {
            self.run_fast_path(&changed)
        } else {
            self.run_slow_path()
        }
    }

    // =========================================================================
    // Fast path
    // =========================================================================

    /// Every changed file must already be known from an earlier run; brand
    /// new files are structural by definition. The fingerprint gate itself
    /// runs inside `run_fast_path` once the trial parses exist.
    fn can_take_fast_path(&self, changed: &[String]) -> bool {
        !changed.is_empty()
            && changed.iter().all(|uri| {
                self.files
                    .get(uri)
                    .is_some_and(|r| r.file_ref != FileRef::from_raw(u16::MAX))
            })
    }

    fn run_fast_path(
        &mut self,
        changed: &[String],
    ) -> (TypecheckRun, Vec<(String, Vec<Diagnostic>)>) {
        let mut gs = self.gs.deep_copy();
        let mut reparsed: Vec<(String, FileRef, ParsedFile)> = Vec::new();

        for uri in changed {
            let record = &self.files[uri];
            let file_ref = gs.with_unfrozen_files(|gs| {
                gs.enter_file(uri, record.contents.clone(), SourceType::Normal)
            });
            let parsed = rty_parser::parse_file(&mut gs, file_ref);
            let fingerprint = definition_fingerprint(&gs, &parsed);
            if fingerprint != record.def_fingerprint {
                // Structural change: definitions moved. The trial state is
                // dropped and the world is re-run.
                debug!(uri = %uri, "definition fingerprint changed; slow path");
                return self.run_slow_path();
            }
            reparsed.push((uri.clone(), file_ref, parsed));
        }

        info!(files = changed.len(), "typecheck: fast path");
        let mut run = TypecheckRun {
            took_fast_path: true,
            ..Default::default()
        };

        // Re-resolve references and re-infer stale methods. Definitions are
        // unchanged, so symbol entry deduplicates onto the existing table.
        // Parse errors are still buffered in `gs` and drain with the rest.
        struct PerFile {
            uri: String,
            file_ref: FileRef,
            parsed: ParsedFile,
            fingerprints: Vec<(String, u64)>,
            kept_cfgs: Vec<Cfg>,
            kept_method_diags: FxHashMap<String, Vec<Diagnostic>>,
        }
        let mut processed: Vec<PerFile> = Vec::new();

        for (uri, file_ref, mut parsed) in reparsed {
            rty_resolver::run(&mut gs, std::slice::from_mut(&mut parsed));

            let fingerprints = method_fingerprints(&gs, &parsed);
            let record = &self.files[&uri];
            let stale: Vec<String> = fingerprints
                .iter()
                .filter(|(name, fp)| record.method_fingerprints.get(name.as_str()) != Some(fp))
                .map(|(name, _)| name.clone())
                .collect();

            let mut kept_cfgs: Vec<Cfg> = Vec::new();
            let mut kept_method_diags: FxHashMap<String, Vec<Diagnostic>> =
                FxHashMap::default();
            let mut method_defs: Vec<(String, MethodDef)> = Vec::new();
            collect_methods(&parsed, &mut method_defs);
            for (full_name, def) in &method_defs {
                if stale.contains(full_name) {
                    if let Some(mut cfg) = rty_cfg::build_for_method(&mut gs, def) {
                        rty_infer::infer_cfg(&mut gs, &mut cfg);
                        kept_cfgs.push(cfg);
                    }
                    run.methods_retypechecked += 1;
                } else {
                    // Unchanged body: keep the inferred CFG (matched by the
                    // stable method symbol) and its diagnostics.
                    if let Some(old) = record
                        .cfgs
                        .iter()
                        .find(|c| Some(c.method) == def.resolved)
                    {
                        kept_cfgs.push(old.clone());
                    }
                    if let Some(diags) = record.method_diags.get(full_name) {
                        kept_method_diags.insert(full_name.clone(), diags.clone());
                    }
                }
            }
            processed.push(PerFile {
                uri,
                file_ref,
                parsed,
                fingerprints,
                kept_cfgs,
                kept_method_diags,
            });
        }

        // One drain for the batch; attribute per file, then split per
        // method so retention stays precise.
        let drained = gs.drain_errors();
        let mut by_file: FxHashMap<u16, Vec<Diagnostic>> = FxHashMap::default();
        for diag in drained {
            by_file.entry(diag.loc.file().id()).or_default().push(diag);
        }

        let mut published = Vec::new();
        for per_file in processed {
            let diags = by_file
                .remove(&per_file.file_ref.id())
                .unwrap_or_default();
            let (file_diags, fresh_method_diags) =
                split_diagnostics(&gs, &per_file.parsed, diags);
            let record = self.files.get_mut(&per_file.uri).expect("record exists");
            record.parsed = per_file.parsed;
            record.file_ref = per_file.file_ref;
            record.method_fingerprints = per_file.fingerprints.into_iter().collect();
            record.cfgs = per_file.kept_cfgs;
            record.file_diags = file_diags;
            record.method_diags = per_file.kept_method_diags;
            for (name, diags) in fresh_method_diags {
                // Unchanged methods keep their cached (complete) set; the
                // re-resolve only re-emits a subset for them. Changed
                // methods have no cached entry and take the fresh one.
                record.method_diags.entry(name).or_insert(diags);
            }
            published.push((per_file.uri.clone(), record.diagnostics()));
            run.updated_files.push(per_file.uri);
        }

        self.gs = gs;
        self.initialized = true;
        (run, published)
    }

    // =========================================================================
    // Slow path
    // =========================================================================

    fn run_slow_path(&mut self) -> (TypecheckRun, Vec<(String, Vec<Diagnostic>)>) {
        info!(files = self.files.len(), "typecheck: slow path");
        let mut base = GlobalState::new();
        let mut uris: Vec<String> = self.files.keys().cloned().collect();
        uris.sort();

        let file_refs: Vec<(String, FileRef)> = base.with_unfrozen_files(|base| {
            uris.iter()
                .map(|uri| {
                    let contents = self.files[uri].contents.clone();
                    (
                        uri.clone(),
                        base.enter_file(uri, contents, SourceType::Normal),
                    )
                })
                .collect()
        });

        // Index workers: each parses against its own sibling copy of the
        // base state; only names can diverge.
        use rayon::prelude::*;
        let worker_out: Vec<(String, FileRef, ParsedFile, GlobalState)> = file_refs
            .par_iter()
            .map(|(uri, file_ref)| {
                let mut local = base.deep_copy();
                let parsed = rty_parser::parse_file(&mut local, *file_ref);
                (uri.clone(), *file_ref, parsed, local)
            })
            .collect();

        // Join on the main thread: migrate each worker's names into the
        // commit state, then resolve the batch as one world.
        let mut gs = base;
        let mut batch: Vec<(String, FileRef, ParsedFile)> = Vec::new();
        for (uri, file_ref, mut parsed, mut local) in worker_out {
            // Worker error buffers carry their own locs; move them into the
            // commit state wholesale.
            gs.errors.absorb(&mut local.errors);
            let subst = GlobalSubstitution::new(&local, &mut gs);
            parsed.map_names(&|n| subst.substitute(n));
            batch.push((uri, file_ref, parsed));
        }

        let mut trees: Vec<ParsedFile> = batch.iter().map(|(_, _, p)| p.clone()).collect();
        rty_resolver::run(&mut gs, &mut trees);

        let mut run = TypecheckRun {
            took_fast_path: false,
            ..Default::default()
        };
        let mut published = Vec::new();
        let mut new_records: FxHashMap<String, FileRecord> = FxHashMap::default();

        for ((uri, file_ref, _), parsed) in batch.into_iter().zip(trees.into_iter()) {
            let mut method_defs: Vec<(String, MethodDef)> = Vec::new();
            collect_methods(&parsed, &mut method_defs);
            let mut cfgs = Vec::new();
            for (_, def) in &method_defs {
                if let Some(mut cfg) = rty_cfg::build_for_method(&mut gs, def) {
                    rty_infer::infer_cfg(&mut gs, &mut cfg);
                    cfgs.push(cfg);
                }
                run.methods_retypechecked += 1;
            }
            let contents = self.files[&uri].contents.clone();
            new_records.insert(
                uri.clone(),
                FileRecord {
                    contents,
                    def_fingerprint: definition_fingerprint(&gs, &parsed),
                    method_fingerprints: method_fingerprints(&gs, &parsed)
                        .into_iter()
                        .collect(),
                    parsed,
                    file_ref,
                    cfgs,
                    file_diags: Vec::new(),
                    method_diags: FxHashMap::default(),
                },
            );
            run.updated_files.push(uri);
        }

        // Drain once for the whole world and distribute per file.
        let drained = gs.drain_errors();
        let mut by_file: FxHashMap<u16, Vec<Diagnostic>> = FxHashMap::default();
        for diag in drained {
            by_file.entry(diag.loc.file().id()).or_default().push(diag);
        }
        for record in new_records.values_mut() {
            let diags = by_file.remove(&record.file_ref.id()).unwrap_or_default();
            let (file_diags, method_diags) = split_diagnostics(&gs, &record.parsed, diags);
            record.file_diags = file_diags;
            record.method_diags = method_diags.into_iter().collect();
        }

        for (uri, record) in &new_records {
            published.push((uri.clone(), record.diagnostics()));
        }
        published.sort_by(|a, b| a.0.cmp(&b.0));

        self.files = new_records;
        self.gs = gs;
        self.initialized = true;
        (run, published)
    }
}

fn empty_record(contents: String) -> FileRecord {
    FileRecord {
        contents,
        parsed: ParsedFile::default(),
        file_ref: FileRef::from_raw(u16::MAX),
        def_fingerprint: 0,
        method_fingerprints: FxHashMap::default(),
        cfgs: Vec::new(),
        file_diags: Vec::new(),
        method_diags: FxHashMap::default(),
    }
}

// =============================================================================
// Fingerprints
// =============================================================================

/// Hash of everything dispatch-visible: definitions and signatures, not
/// method bodies, not positions. Name refs are hashed by their text so the
/// fingerprint is stable across states.
pub(crate) fn definition_fingerprint(gs: &GlobalState, parsed: &ParsedFile) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    for def in &parsed.defs {
        hash_class_structure(gs, def, &mut hasher);
    }
    for method in &parsed.toplevel_methods {
        hash_method_structure(gs, method, &mut hasher);
    }
    hasher.finish()
}

fn hash_class_structure(gs: &GlobalState, def: &ClassDef, hasher: &mut impl Hasher) {
    "class".hash(hasher);
    for &name in &def.path {
        gs.name_str(name).hash(hasher);
    }
    def.is_module.hash(hasher);
    match &def.superclass {
        Some(path) => {
            for &name in &path.path {
                gs.name_str(name).hash(hasher);
            }
        }
        None => "".hash(hasher),
    }
    for field in &def.static_fields {
        "sfield".hash(hasher);
        gs.name_str(field.name).hash(hasher);
    }
    for method in &def.methods {
        hash_method_structure(gs, method, hasher);
    }
    for nested in &def.nested {
        hash_class_structure(gs, nested, hasher);
    }
}

fn hash_method_structure(gs: &GlobalState, def: &MethodDef, hasher: &mut impl Hasher) {
    "def".hash(hasher);
    gs.name_str(def.name).hash(hasher);
    def.is_private.hash(hasher);
    for param in &def.params {
        gs.name_str(param.name).hash(hasher);
        (param.kind as u8).hash(hasher);
    }
    match &def.sig {
        Some(sig) => {
            "sig".hash(hasher);
            sig.is_void.hash(hasher);
            sig.is_abstract.hash(hasher);
            sig.is_override.hash(hasher);
            sig.is_overridable.hash(hasher);
            sig.is_final.hash(hasher);
            for (name, ty) in &sig.params {
                gs.name_str(*name).hash(hasher);
                hash_type_expr(gs, ty, hasher);
            }
            if let Some(returns) = &sig.returns {
                hash_type_expr(gs, returns, hasher);
            }
            for &tp in &sig.type_params {
                gs.name_str(tp).hash(hasher);
            }
        }
        None => "nosig".hash(hasher),
    }
}

fn hash_type_expr(
    gs: &GlobalState,
    ty: &rty_parser::ast::TypeExpr,
    hasher: &mut impl Hasher,
) {
    use rty_parser::ast::TypeExpr;
    match ty {
        TypeExpr::Constant(path) => {
            "const".hash(hasher);
            for &name in &path.path {
                gs.name_str(name).hash(hasher);
            }
        }
        TypeExpr::Applied { base, args } => {
            "applied".hash(hasher);
            for &name in &base.path {
                gs.name_str(name).hash(hasher);
            }
            for arg in args {
                hash_type_expr(gs, arg, hasher);
            }
        }
        TypeExpr::Nilable(inner) => {
            "nilable".hash(hasher);
            hash_type_expr(gs, inner, hasher);
        }
        TypeExpr::AnyOf(members) => {
            "any".hash(hasher);
            for member in members {
                hash_type_expr(gs, member, hasher);
            }
        }
        TypeExpr::AllOf(members) => {
            "all".hash(hasher);
            for member in members {
                hash_type_expr(gs, member, hasher);
            }
        }
        TypeExpr::Tuple(members) => {
            "tuple".hash(hasher);
            for member in members {
                hash_type_expr(gs, member, hasher);
            }
        }
        TypeExpr::Shape(pairs) => {
            "shape".hash(hasher);
            for (key, value) in pairs {
                gs.name_str(*key).hash(hasher);
                hash_type_expr(gs, value, hasher);
            }
        }
        TypeExpr::TypeParameter(name) => {
            "tparam".hash(hasher);
            gs.name_str(*name).hash(hasher);
        }
        TypeExpr::SelfType => "self".hash(hasher),
        TypeExpr::AttachedClass => "attached".hash(hasher),
        TypeExpr::Untyped => "untyped".hash(hasher),
        TypeExpr::NoReturn => "noreturn".hash(hasher),
        TypeExpr::Anything => "anything".hash(hasher),
        TypeExpr::Boolean => "boolean".hash(hasher),
    }
}

/// Per-method body fingerprints, keyed by the method's qualified name.
/// Positions are excluded so whitespace-only motion stays on the fast path
/// with zero methods re-inferred.
pub(crate) fn method_fingerprints(
    gs: &GlobalState,
    parsed: &ParsedFile,
) -> Vec<(String, u64)> {
    let mut out = Vec::new();
    let mut defs: Vec<(String, MethodDef)> = Vec::new();
    collect_methods(parsed, &mut defs);
    for (full_name, def) in defs {
        let mut hasher = rustc_hash::FxHasher::default();
        hash_expr(gs, &def.body, &mut hasher);
        for param in &def.params {
            if let Some(default) = &param.default {
                hash_expr(gs, default, &mut hasher);
            }
        }
        out.push((full_name, hasher.finish()));
    }
    out
}

fn hash_expr(gs: &GlobalState, expr: &rty_parser::ast::Expr, hasher: &mut impl Hasher) {
    use rty_parser::ast::{Expr, LitValue};
    match expr {
        Expr::Seq { stmts, .. } => {
            "seq".hash(hasher);
            for stmt in stmts {
                hash_expr(gs, stmt, hasher);
            }
        }
        Expr::Lit { value, .. } => match value {
            LitValue::Int(v) => ("int", v).hash(hasher),
            LitValue::Float(v) => ("float", v.to_bits()).hash(hasher),
            LitValue::Str(name) => ("str", gs.name_str(*name)).hash(hasher),
            LitValue::Sym(name) => ("sym", gs.name_str(*name)).hash(hasher),
            LitValue::True => "true".hash(hasher),
            LitValue::False => "false".hash(hasher),
            LitValue::Nil => "nil".hash(hasher),
        },
        Expr::Local { name, .. } => ("local", gs.name_str(*name)).hash(hasher),
        Expr::Assign { name, value, .. } => {
            ("assign", gs.name_str(*name)).hash(hasher);
            hash_expr(gs, value, hasher);
        }
        Expr::FieldRef { name, .. } => ("fieldref", gs.name_str(*name)).hash(hasher),
        Expr::FieldAssign { name, value, .. } => {
            ("fieldassign", gs.name_str(*name)).hash(hasher);
            hash_expr(gs, value, hasher);
        }
        Expr::SelfRef { .. } => "self".hash(hasher),
        Expr::Constant(path) => {
            "constref".hash(hasher);
            for &name in &path.path {
                gs.name_str(name).hash(hasher);
            }
        }
        Expr::Send {
            recv,
            name,
            args,
            kwargs,
            block,
            is_safe,
            is_private_ok,
            ..
        } => {
            ("send", gs.name_str(*name), is_safe, is_private_ok).hash(hasher);
            hash_expr(gs, recv, hasher);
            for arg in args {
                hash_expr(gs, arg, hasher);
            }
            for (kw_name, arg) in kwargs {
                gs.name_str(*kw_name).hash(hasher);
                hash_expr(gs, arg, hasher);
            }
            if let Some(block) = block {
                "block".hash(hasher);
                for (param, _) in &block.params {
                    gs.name_str(*param).hash(hasher);
                }
                hash_expr(gs, &block.body, hasher);
            }
        }
        Expr::If {
            cond, then_, else_, ..
        } => {
            "if".hash(hasher);
            hash_expr(gs, cond, hasher);
            hash_expr(gs, then_, hasher);
            hash_expr(gs, else_, hasher);
        }
        Expr::While { cond, body, .. } => {
            "while".hash(hasher);
            hash_expr(gs, cond, hasher);
            hash_expr(gs, body, hasher);
        }
        Expr::Return { value, .. } => {
            "return".hash(hasher);
            if let Some(value) = value {
                hash_expr(gs, value, hasher);
            }
        }
        Expr::Rescue {
            body,
            handler,
            ensure,
            ..
        } => {
            "rescue".hash(hasher);
            hash_expr(gs, body, hasher);
            if let Some((binder, handler_body)) = handler {
                if let Some(binder) = binder {
                    gs.name_str(*binder).hash(hasher);
                }
                hash_expr(gs, handler_body, hasher);
            }
            if let Some(ensure) = ensure {
                hash_expr(gs, ensure, hasher);
            }
        }
        Expr::Cast {
            value,
            kind,
            type_expr,
            ..
        } => {
            ("cast", *kind as u8).hash(hasher);
            hash_expr(gs, value, hasher);
            if let Some(type_expr) = type_expr {
                hash_type_expr(gs, type_expr, hasher);
            }
        }
        Expr::Absurd { value, .. } => {
            "absurd".hash(hasher);
            hash_expr(gs, value, hasher);
        }
    }
}

// =============================================================================
// Method enumeration and diagnostic attribution
// =============================================================================

/// Flatten a file's methods with their qualified names (`A::B#m`).
pub(crate) fn collect_methods(parsed: &ParsedFile, out: &mut Vec<(String, MethodDef)>) {
    fn visit(prefix: &str, def: &ClassDef, gs_names: &dyn Fn(rty_core::NameRef) -> String, out: &mut Vec<(String, MethodDef)>) {
        let own: Vec<String> = def.path.iter().map(|&n| gs_names(n)).collect();
        let prefix = if prefix.is_empty() {
            own.join("::")
        } else {
            format!("{prefix}::{}", own.join("::"))
        };
        for method in &def.methods {
            out.push((format!("{prefix}#{}", gs_names(method.name)), method.clone()));
        }
        for nested in &def.nested {
            visit(&prefix, nested, gs_names, out);
        }
    }
    // Names render through their refs' Debug ids; stable within one state.
    let render = |n: rty_core::NameRef| format!("n{}", n.id());
    for def in &parsed.defs {
        visit("", def, &render, out);
    }
    for method in &parsed.toplevel_methods {
        out.push((format!("#{}", render(method.name)), method.clone()));
    }
}

/// Attribute drained diagnostics: inside a method's span they belong to that
/// method (and survive fast-path retention); the rest are file-level.
fn split_diagnostics(
    gs: &GlobalState,
    parsed: &ParsedFile,
    diags: Vec<Diagnostic>,
) -> (Vec<Diagnostic>, FxHashMap<String, Vec<Diagnostic>>) {
    let _ = gs;
    let mut method_spans: Vec<(String, rty_core::Loc)> = Vec::new();
    let mut defs: Vec<(String, MethodDef)> = Vec::new();
    collect_methods(parsed, &mut defs);
    for (name, def) in &defs {
        method_spans.push((name.clone(), def.loc));
    }

    let mut file_diags = Vec::new();
    let mut method_diags: FxHashMap<String, Vec<Diagnostic>> = FxHashMap::default();
    'next: for diag in diags {
        for (name, span) in &method_spans {
            if span.contains(diag.loc) {
                method_diags.entry(name.clone()).or_default().push(diag);
                continue 'next;
            }
        }
        file_diags.push(diag);
    }
    (file_diags, method_diags)
}

#[cfg(test)]
#[path = "tests/typecheck.rs"]
mod tests;
