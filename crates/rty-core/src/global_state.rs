//! The interned global state.
//!
//! One `GlobalState` owns the name, symbol and file tables plus the error
//! buffer. Every cross-reference in the pipeline is an integer id into these
//! tables, stable for the lifetime of the state (and across `deep_copy`).
//!
//! The tables are individually frozen outside of explicitly scoped unfreeze
//! regions; an `enter_*` against a frozen table is a programming error and
//! asserts. Interning itself never fails.

use crate::errors::{Diagnostic, ErrorClass, ErrorQueue};
use crate::files::{File, FileRef, SourceType, StrictnessLevel};
use crate::loc::Loc;
use crate::names::{wk, NameData, NameRef, UniqueNameKind, WELL_KNOWN_NAMES};
use crate::symbols::{symbol_flags, wk_sym, Symbol, SymbolRef};
use crate::types::Type;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

static NEXT_GLOBAL_STATE_ID: AtomicU32 = AtomicU32::new(1);

/// Lineage bookkeeping for the substitution fast path: which state this one
/// was copied from and how big the shared tables were at the fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Lineage {
    pub parent_id: u32,
    pub names_at_fork: u32,
    pub files_at_fork: u16,
}

pub struct GlobalState {
    pub(crate) gs_id: u32,
    pub(crate) lineage: Lineage,

    names: Vec<NameData>,
    names_by_utf8: FxHashMap<String, NameRef>,
    names_by_constant: FxHashMap<NameRef, NameRef>,
    names_by_unique: FxHashMap<(UniqueNameKind, NameRef, u32), NameRef>,

    symbols: Vec<Symbol>,

    files: Vec<File>,
    files_by_path: FxHashMap<String, FileRef>,

    pub errors: ErrorQueue,

    names_frozen: bool,
    symbols_frozen: bool,
    files_frozen: bool,
}

impl GlobalState {
    /// A fresh state with the well-known names, the builtin class hierarchy
    /// and the synthetic standard-library method table registered. All three
    /// tables come back frozen.
    pub fn new() -> GlobalState {
        let gs_id = NEXT_GLOBAL_STATE_ID.fetch_add(1, Ordering::Relaxed);
        let mut gs = GlobalState {
            gs_id,
            lineage: Lineage {
                parent_id: gs_id,
                names_at_fork: 0,
                files_at_fork: 0,
            },
            names: Vec::new(),
            names_by_utf8: FxHashMap::default(),
            names_by_constant: FxHashMap::default(),
            names_by_unique: FxHashMap::default(),
            symbols: Vec::new(),
            files: Vec::new(),
            files_by_path: FxHashMap::default(),
            errors: ErrorQueue::default(),
            names_frozen: false,
            symbols_frozen: false,
            files_frozen: false,
        };
        gs.bootstrap();
        gs.names_frozen = true;
        gs.symbols_frozen = true;
        gs.files_frozen = true;
        gs.lineage.names_at_fork = gs.names.len() as u32;
        gs.lineage.files_at_fork = gs.files.len() as u16;
        gs.sanity_check();
        gs
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Intern a utf8 name; returns the existing ref when already present.
    pub fn enter_name_utf8(&mut self, text: &str) -> NameRef {
        if let Some(&existing) = self.names_by_utf8.get(text) {
            return existing;
        }
        assert!(!self.names_frozen, "name table is frozen");
        let id = NameRef(self.names.len() as u32);
        self.names.push(NameData::Utf8(text.to_string()));
        self.names_by_utf8.insert(text.to_string(), id);
        id
    }

    /// Intern the constant-flavored wrapper of an existing name.
    pub fn enter_name_constant(&mut self, inner: NameRef) -> NameRef {
        if let Some(&existing) = self.names_by_constant.get(&inner) {
            return existing;
        }
        assert!(!self.names_frozen, "name table is frozen");
        let id = NameRef(self.names.len() as u32);
        self.names.push(NameData::Constant(inner));
        self.names_by_constant.insert(inner, id);
        id
    }

    /// Mint a fresh unique name. Never deduplicates; monotonic by
    /// construction. The `(kind, original, num)` triple is recorded so
    /// substitution can later locate the entry.
    pub fn fresh_name_unique(
        &mut self,
        kind: UniqueNameKind,
        original: NameRef,
        num: u32,
    ) -> NameRef {
        assert!(!self.names_frozen, "name table is frozen");
        let id = NameRef(self.names.len() as u32);
        self.names.push(NameData::Unique {
            kind,
            original,
            num,
        });
        self.names_by_unique.entry((kind, original, num)).or_insert(id);
        id
    }

    /// Locate-or-append a unique name by its identity triple. Used by
    /// substitution, which must be idempotent.
    pub(crate) fn enter_name_unique(
        &mut self,
        kind: UniqueNameKind,
        original: NameRef,
        num: u32,
    ) -> NameRef {
        if let Some(&existing) = self.names_by_unique.get(&(kind, original, num)) {
            return existing;
        }
        self.fresh_name_unique(kind, original, num)
    }

    #[inline]
    pub fn name_data(&self, name: NameRef) -> &NameData {
        &self.names[name.0 as usize]
    }

    /// Read-only lookup of a utf8 name; `None` when never interned.
    pub fn lookup_name_utf8(&self, text: &str) -> Option<NameRef> {
        self.names_by_utf8.get(text).copied()
    }

    /// Rendered form of any name kind, for diagnostics and debugging.
    pub fn name_str(&self, name: NameRef) -> String {
        match self.name_data(name) {
            NameData::Utf8(s) => s.clone(),
            NameData::Constant(inner) => self.name_str(*inner),
            NameData::Unique {
                kind,
                original,
                num,
            } => format!("{}${:?}{}", self.name_str(*original), kind, num),
        }
    }

    pub fn names_used(&self) -> u32 {
        self.names.len() as u32
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    #[inline]
    pub fn symbol_data(&self, sym: SymbolRef) -> &Symbol {
        &self.symbols[sym.0 as usize]
    }

    #[inline]
    pub fn symbol_data_mut(&mut self, sym: SymbolRef) -> &mut Symbol {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        &mut self.symbols[sym.0 as usize]
    }

    pub fn symbols_used(&self) -> u32 {
        self.symbols.len() as u32
    }

    /// `Foo::Bar` style rendering, owners outermost first, root elided.
    pub fn symbol_full_name(&self, sym: SymbolRef) -> String {
        let data = self.symbol_data(sym);
        if sym == wk_sym::ROOT {
            return "<root>".to_string();
        }
        let own = self.name_str(data.name);
        if data.owner == wk_sym::ROOT || data.owner == sym {
            own
        } else {
            format!("{}::{}", self.symbol_full_name(data.owner), own)
        }
    }

    /// Create-or-lookup a class or module symbol under `owner`.
    pub fn enter_class_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(loc, owner, name, symbol_flags::CLASS)
    }

    pub fn enter_module_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(loc, owner, name, symbol_flags::MODULE)
    }

    pub fn enter_method_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(loc, owner, name, symbol_flags::METHOD)
    }

    pub fn enter_field_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(loc, owner, name, symbol_flags::FIELD)
    }

    pub fn enter_static_field_symbol(
        &mut self,
        loc: Loc,
        owner: SymbolRef,
        name: NameRef,
    ) -> SymbolRef {
        self.enter_symbol(loc, owner, name, symbol_flags::STATIC_FIELD)
    }

    pub fn enter_type_member(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        let sym = self.enter_symbol(loc, owner, name, symbol_flags::TYPE_MEMBER);
        let owner_data = self.symbol_data_mut(owner);
        if !owner_data.type_members.contains(&sym) {
            owner_data.type_members.push(sym);
        }
        sym
    }

    pub fn enter_type_argument(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        let sym = self.enter_symbol(loc, owner, name, symbol_flags::TYPE_ARGUMENT);
        let owner_data = self.symbol_data_mut(owner);
        if !owner_data.type_members.contains(&sym) {
            owner_data.type_members.push(sym);
        }
        sym
    }

    /// Create an argument symbol owned by `method` and append it to the
    /// method's argument list.
    pub fn enter_method_argument_symbol(
        &mut self,
        loc: Loc,
        method: SymbolRef,
        name: NameRef,
    ) -> SymbolRef {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        assert!(
            self.symbol_data(method).is_method(),
            "argument owner must be a method"
        );
        let sym = SymbolRef(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(
            method,
            name,
            symbol_flags::METHOD_ARGUMENT,
            loc,
        ));
        self.symbols[method.0 as usize].arguments.push(sym);
        sym
    }

    fn enter_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef, flags: u32) -> SymbolRef {
        assert!(!self.symbols_frozen, "symbol table is frozen");
        if let Some(&existing) = self.symbol_data(owner).members.get(&name) {
            // Reopening adds a loc; a kind clash is the resolver's problem
            // to diagnose.
            self.symbols[existing.0 as usize].add_loc(loc);
            return existing;
        }
        let sym = SymbolRef(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(owner, name, flags, loc));
        self.symbols[owner.0 as usize].members.insert(name, sym);
        trace!(id = sym.0, flags, "entered symbol");
        sym
    }

    /// Whether `sub`'s linearization contains `ancestor`. Falls back to an
    /// on-the-fly walk when ancestors have not been resolved yet.
    pub fn derives_from(&self, sub: SymbolRef, ancestor: SymbolRef) -> bool {
        if sub == ancestor {
            return true;
        }
        if let Some(ancestors) = &self.symbol_data(sub).resolved_ancestors {
            return ancestors.contains(&ancestor);
        }
        let data = self.symbol_data(sub);
        data.mixins.iter().any(|&m| self.derives_from(m, ancestor))
            || data
                .superclass
                .is_some_and(|sup| self.derives_from(sup, ancestor))
    }

    /// The frozen linearization, most-specific first. Computes (but does not
    /// store) a fallback when the resolver has not finalized this class.
    pub fn linearization_of(&self, sym: SymbolRef) -> Vec<SymbolRef> {
        if let Some(ancestors) = &self.symbol_data(sym).resolved_ancestors {
            return ancestors.clone();
        }
        let mut out = Vec::new();
        self.linearize_into(sym, &mut out);
        out
    }

    pub fn linearize_into(&self, sym: SymbolRef, out: &mut Vec<SymbolRef>) {
        if out.contains(&sym) {
            return;
        }
        out.push(sym);
        let data = self.symbol_data(sym);
        for &mixin in data.mixins.iter().rev() {
            self.linearize_into(mixin, out);
        }
        if let Some(sup) = data.superclass {
            self.linearize_into(sup, out);
        }
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Intern a file by path, replacing contents if it already exists.
    pub fn enter_file(&mut self, path: &str, source: String, source_type: SourceType) -> FileRef {
        if let Some(&existing) = self.files_by_path.get(path) {
            assert!(!self.files_frozen, "file table is frozen");
            self.files[existing.0 as usize] = File::new(path.to_string(), source, source_type);
            return existing;
        }
        assert!(!self.files_frozen, "file table is frozen");
        assert!(self.files.len() < u16::MAX as usize, "file table overflow");
        let id = FileRef(self.files.len() as u16);
        self.files
            .push(File::new(path.to_string(), source, source_type));
        self.files_by_path.insert(path.to_string(), id);
        id
    }

    /// Tombstone a file: it leaves the live set but keeps its id.
    pub fn tombstone_file(&mut self, file: FileRef) {
        assert!(!self.files_frozen, "file table is frozen");
        let path = self.files[file.0 as usize].path().to_string();
        self.files[file.0 as usize] = File::tombstone(path);
    }

    #[inline]
    pub fn file_data(&self, file: FileRef) -> &File {
        &self.files[file.0 as usize]
    }

    pub fn file_by_path(&self, path: &str) -> Option<FileRef> {
        self.files_by_path.get(path).copied()
    }

    pub fn files_used(&self) -> u16 {
        self.files.len() as u16
    }

    /// Live (non-tombstoned) files.
    pub fn live_files(&self) -> impl Iterator<Item = FileRef> + '_ {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_tombstoned())
            .map(|(i, _)| FileRef(i as u16))
    }

    pub(crate) fn raw_files(&self) -> &[File] {
        &self.files
    }

    pub(crate) fn raw_names(&self) -> &[NameData] {
        &self.names
    }

    pub(crate) fn raw_symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    // =========================================================================
    // Freeze discipline
    // =========================================================================

    /// Run `f` with the name table writable; re-freezes on every exit path.
    pub fn with_unfrozen_names<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        let was = std::mem::replace(&mut self.names_frozen, false);
        let result = f(self);
        self.names_frozen = was;
        result
    }

    pub fn with_unfrozen_symbols<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        let was = std::mem::replace(&mut self.symbols_frozen, false);
        let result = f(self);
        self.symbols_frozen = was;
        result
    }

    pub fn with_unfrozen_files<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        let was = std::mem::replace(&mut self.files_frozen, false);
        let result = f(self);
        self.files_frozen = was;
        result
    }

    /// Unfreeze everything at once, for file ingest + resolution phases.
    pub fn with_unfrozen_tables<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        self.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| gs.with_unfrozen_files(f))
        })
    }

    // =========================================================================
    // Copying, checking
    // =========================================================================

    /// Structural clone with identical symbol/name/file ids. The clone
    /// records this state as its lineage parent so a later substitution can
    /// take the identity fast path.
    pub fn deep_copy(&self) -> GlobalState {
        let gs_id = NEXT_GLOBAL_STATE_ID.fetch_add(1, Ordering::Relaxed);
        GlobalState {
            gs_id,
            lineage: Lineage {
                parent_id: self.gs_id,
                names_at_fork: self.names.len() as u32,
                files_at_fork: self.files.len() as u16,
            },
            names: self.names.clone(),
            names_by_utf8: self.names_by_utf8.clone(),
            names_by_constant: self.names_by_constant.clone(),
            names_by_unique: self.names_by_unique.clone(),
            symbols: self.symbols.clone(),
            files: self.files.clone(),
            files_by_path: self.files_by_path.clone(),
            errors: ErrorQueue::default(),
            names_frozen: self.names_frozen,
            symbols_frozen: self.symbols_frozen,
            files_frozen: self.files_frozen,
        }
    }

    /// Table invariants, checked at snapshot boundaries.
    pub fn sanity_check(&self) {
        assert!(!self.symbols.is_empty(), "no root symbol");
        assert_eq!(
            self.symbol_data(wk_sym::ROOT).owner,
            wk_sym::ROOT,
            "root symbol must own itself"
        );
        for (text, &id) in &self.names_by_utf8 {
            match &self.names[id.0 as usize] {
                NameData::Utf8(s) => assert_eq!(s, text, "utf8 dedup table out of sync"),
                other => panic!("utf8 dedup table points at {other:?}"),
            }
        }
        for (&inner, &id) in &self.names_by_constant {
            match &self.names[id.0 as usize] {
                NameData::Constant(i) => {
                    assert_eq!(*i, inner, "constant dedup table out of sync")
                }
                other => panic!("constant dedup table points at {other:?}"),
            }
        }
        for (path, &id) in &self.files_by_path {
            assert_eq!(
                self.files[id.0 as usize].path(),
                path,
                "file dedup table out of sync"
            );
        }
        for (i, sym) in self.symbols.iter().enumerate() {
            assert!(
                (sym.owner.0 as usize) < self.symbols.len(),
                "symbol {i} has out-of-range owner"
            );
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    pub fn report_error(&mut self, loc: Loc, what: ErrorClass, message: String) {
        self.errors.push(what, Diagnostic::error(loc, what, message));
    }

    /// Drain buffered diagnostics, filtered by each file's strictness and
    /// sorted per file.
    pub fn drain_errors(&mut self) -> Vec<Diagnostic> {
        let levels: Vec<StrictnessLevel> =
            self.files.iter().map(File::min_error_level).collect();
        self.errors.drain(|file| {
            levels
                .get(file.id() as usize)
                .copied()
                .unwrap_or(StrictnessLevel::False)
        })
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    fn bootstrap(&mut self) {
        for (i, text) in WELL_KNOWN_NAMES.iter().enumerate() {
            let entered = self.enter_name_utf8(text);
            assert_eq!(entered.0 as usize, i, "well-known name registration drifted");
        }

        // Root owns itself; enter_symbol can't create it, so build by hand.
        self.symbols.push(Symbol::new(
            wk_sym::ROOT,
            wk::ROOT,
            symbol_flags::MODULE,
            Loc::none(FileRef(0)),
        ));

        let no_loc = Loc::none(FileRef(0));
        let root = wk_sym::ROOT;
        let classes: &[(SymbolRef, NameRef, u32)] = &[
            (wk_sym::BASIC_OBJECT, wk::BASIC_OBJECT, symbol_flags::CLASS),
            (wk_sym::OBJECT, wk::OBJECT, symbol_flags::CLASS),
            (wk_sym::KERNEL, wk::KERNEL, symbol_flags::MODULE),
            (wk_sym::COMPARABLE, wk::COMPARABLE, symbol_flags::MODULE),
            (wk_sym::NUMERIC, wk::NUMERIC, symbol_flags::CLASS),
            (wk_sym::INTEGER, wk::INTEGER, symbol_flags::CLASS),
            (wk_sym::FLOAT, wk::FLOAT, symbol_flags::CLASS),
            (wk_sym::STRING, wk::STRING, symbol_flags::CLASS),
            (wk_sym::SYMBOL, wk::SYMBOL, symbol_flags::CLASS),
            (wk_sym::NIL_CLASS, wk::NIL_CLASS, symbol_flags::CLASS),
            (wk_sym::TRUE_CLASS, wk::TRUE_CLASS, symbol_flags::CLASS),
            (wk_sym::FALSE_CLASS, wk::FALSE_CLASS, symbol_flags::CLASS),
            (wk_sym::ARRAY, wk::ARRAY, symbol_flags::CLASS),
            (wk_sym::HASH, wk::HASH, symbol_flags::CLASS),
            (wk_sym::T_MODULE, wk::T_MODULE, symbol_flags::MODULE),
        ];
        for &(expect, name, flags) in classes {
            let sym = self.enter_symbol(no_loc, root, name, flags);
            assert_eq!(sym, expect, "well-known symbol registration drifted");
        }

        let elem = self.enter_type_member(no_loc, wk_sym::ARRAY, wk::ELEM);
        assert_eq!(elem, wk_sym::ARRAY_ELEM);
        let key = self.enter_type_member(no_loc, wk_sym::HASH, wk::KEY);
        assert_eq!(key, wk_sym::HASH_K);
        let value = self.enter_type_member(no_loc, wk_sym::HASH, wk::VALUE);
        assert_eq!(value, wk_sym::HASH_V);
        for tm in [elem, key, value] {
            self.symbols[tm.0 as usize].flags |= symbol_flags::COVARIANT;
        }

        self.wire_superclasses();
        self.bootstrap_methods();

        // Freeze every class's linearization now; user classes get theirs
        // from the resolver.
        for i in 0..self.symbols.len() {
            let sym = SymbolRef(i as u32);
            if self.symbol_data(sym).is_class_or_module() {
                let mut lin = Vec::new();
                self.linearize_into(sym, &mut lin);
                self.symbols[i].resolved_ancestors = Some(lin);
            }
        }
    }

    fn wire_superclasses(&mut self) {
        let pairs: &[(SymbolRef, Option<SymbolRef>, &[SymbolRef])] = &[
            (wk_sym::BASIC_OBJECT, None, &[]),
            (wk_sym::OBJECT, Some(wk_sym::BASIC_OBJECT), &[wk_sym::KERNEL]),
            (wk_sym::NUMERIC, Some(wk_sym::OBJECT), &[wk_sym::COMPARABLE]),
            (wk_sym::INTEGER, Some(wk_sym::NUMERIC), &[]),
            (wk_sym::FLOAT, Some(wk_sym::NUMERIC), &[]),
            (wk_sym::STRING, Some(wk_sym::OBJECT), &[wk_sym::COMPARABLE]),
            (wk_sym::SYMBOL, Some(wk_sym::OBJECT), &[]),
            (wk_sym::NIL_CLASS, Some(wk_sym::OBJECT), &[]),
            (wk_sym::TRUE_CLASS, Some(wk_sym::OBJECT), &[]),
            (wk_sym::FALSE_CLASS, Some(wk_sym::OBJECT), &[]),
            (wk_sym::ARRAY, Some(wk_sym::OBJECT), &[]),
            (wk_sym::HASH, Some(wk_sym::OBJECT), &[]),
        ];
        for &(sym, superclass, mixins) in pairs {
            let data = &mut self.symbols[sym.0 as usize];
            data.superclass = superclass;
            data.mixins = mixins.to_vec();
        }
    }

    /// The synthetic standard library: enough method signatures for the
    /// checker to dispatch arithmetic, conversions, collection access and
    /// the predicate methods refinements care about.
    fn bootstrap_methods(&mut self) {
        use Type as T;
        let int = T::Class(wk_sym::INTEGER);
        let float = T::Class(wk_sym::FLOAT);
        let string = T::Class(wk_sym::STRING);
        let symbol = T::Class(wk_sym::SYMBOL);
        let nil = T::nil_class();
        let boolean = T::boolean();
        let elem = T::TypeVar(wk_sym::ARRAY_ELEM);
        let hash_k = T::TypeVar(wk_sym::HASH_K);
        let hash_v = T::TypeVar(wk_sym::HASH_V);

        // (owner, name, params, result, extra method flags)
        type Sig = (SymbolRef, NameRef, Vec<(NameRef, Type)>, Type, u32);
        let one_arg = |t: &Type| vec![(wk::TEMP, t.clone())];
        let sigs: Vec<Sig> = vec![
            (wk_sym::BASIC_OBJECT, wk::INITIALIZE, vec![], nil.clone(), symbol_flags::VOID_METHOD),
            (wk_sym::OBJECT, wk::EQ_EQ, one_arg(&T::Untyped), boolean.clone(), 0),
            (wk_sym::OBJECT, wk::NOT_EQ, one_arg(&T::Untyped), boolean.clone(), 0),
            (wk_sym::OBJECT, wk::BANG, vec![], boolean.clone(), 0),
            (wk_sym::OBJECT, wk::NIL_P, vec![], boolean.clone(), 0),
            (wk_sym::OBJECT, wk::TO_S, vec![], string.clone(), 0),
            (wk_sym::KERNEL, wk::IS_A_P, one_arg(&T::Untyped), boolean.clone(), 0),
            (wk_sym::KERNEL, wk::KIND_OF_P, one_arg(&T::Untyped), boolean.clone(), 0),
            (wk_sym::KERNEL, wk::PUTS, one_arg(&T::Untyped), nil.clone(), 0),
            (wk_sym::NIL_CLASS, wk::NIL_P, vec![], T::true_class(), 0),
            (wk_sym::INTEGER, wk::PLUS, one_arg(&int), int.clone(), 0),
            (wk_sym::INTEGER, wk::MINUS, one_arg(&int), int.clone(), 0),
            (wk_sym::INTEGER, wk::STAR, one_arg(&int), int.clone(), 0),
            (wk_sym::INTEGER, wk::SLASH, one_arg(&int), int.clone(), 0),
            (wk_sym::INTEGER, wk::LT, one_arg(&int), boolean.clone(), 0),
            (wk_sym::INTEGER, wk::GT, one_arg(&int), boolean.clone(), 0),
            (wk_sym::INTEGER, wk::LT_EQ, one_arg(&int), boolean.clone(), 0),
            (wk_sym::INTEGER, wk::GT_EQ, one_arg(&int), boolean.clone(), 0),
            (wk_sym::INTEGER, wk::TO_S, vec![], string.clone(), 0),
            (wk_sym::INTEGER, wk::ZERO_P, vec![], boolean.clone(), 0),
            (wk_sym::INTEGER, wk::TIMES, vec![], int.clone(), 0),
            (wk_sym::FLOAT, wk::PLUS, one_arg(&float), float.clone(), 0),
            (wk_sym::FLOAT, wk::MINUS, one_arg(&float), float.clone(), 0),
            (wk_sym::FLOAT, wk::STAR, one_arg(&float), float.clone(), 0),
            (wk_sym::FLOAT, wk::SLASH, one_arg(&float), float.clone(), 0),
            (wk_sym::FLOAT, wk::TO_S, vec![], string.clone(), 0),
            (wk_sym::STRING, wk::PLUS, one_arg(&string), string.clone(), 0),
            (wk_sym::STRING, wk::LENGTH, vec![], int.clone(), 0),
            (wk_sym::STRING, wk::SIZE, vec![], int.clone(), 0),
            (wk_sym::STRING, wk::EMPTY_P, vec![], boolean.clone(), 0),
            (wk_sym::STRING, wk::UPCASE, vec![], string.clone(), 0),
            (wk_sym::STRING, wk::TO_SYM, vec![], symbol.clone(), 0),
            (wk_sym::ARRAY, wk::SQUARE_BRACKETS, one_arg(&int), T::nilable(elem.clone()), 0),
            (wk_sym::ARRAY, wk::FIRST, vec![], T::nilable(elem.clone()), 0),
            (wk_sym::ARRAY, wk::FETCH, one_arg(&int), elem.clone(), 0),
            (wk_sym::ARRAY, wk::PUSH, one_arg(&elem), T::SelfTypeParam, 0),
            (wk_sym::ARRAY, wk::SIZE, vec![], int.clone(), 0),
            (wk_sym::ARRAY, wk::EMPTY_P, vec![], boolean.clone(), 0),
            (wk_sym::ARRAY, wk::EACH, vec![], T::SelfTypeParam, 0),
            (wk_sym::HASH, wk::SQUARE_BRACKETS, one_arg(&hash_k), T::nilable(hash_v.clone()), 0),
            (wk_sym::HASH, wk::KEY_P, one_arg(&hash_k), boolean.clone(), 0),
            (wk_sym::HASH, wk::SIZE, vec![], int.clone(), 0),
        ];

        let no_loc = Loc::none(FileRef(0));
        for (owner, name, params, result, extra_flags) in sigs {
            let method = self.enter_method_symbol(no_loc, owner, name);
            self.symbols[method.0 as usize].flags |= extra_flags;
            self.symbols[method.0 as usize].result_type = Some(result);
            for (param_name, param_ty) in params {
                let arg = self.enter_method_argument_symbol(no_loc, method, param_name);
                self.symbols[arg.0 as usize].result_type = Some(param_ty);
            }
        }
    }
}

impl GlobalState {
    /// Rebuild a state from deserialized payload tables, reconstructing the
    /// dedup indexes. Fails when the tables are internally inconsistent.
    pub(crate) fn from_payload_tables(
        names: Vec<NameData>,
        symbols: Vec<Symbol>,
        files: Vec<File>,
    ) -> Result<GlobalState, String> {
        if symbols.is_empty() {
            return Err("payload has no symbols".to_string());
        }
        let mut names_by_utf8 = FxHashMap::default();
        let mut names_by_constant = FxHashMap::default();
        let mut names_by_unique = FxHashMap::default();
        for (i, name) in names.iter().enumerate() {
            let id = NameRef(i as u32);
            match name {
                NameData::Utf8(s) => {
                    names_by_utf8.insert(s.clone(), id);
                }
                NameData::Constant(inner) => {
                    if inner.0 as usize >= i {
                        return Err(format!("constant name {i} wraps a later entry"));
                    }
                    names_by_constant.insert(*inner, id);
                }
                NameData::Unique {
                    kind,
                    original,
                    num,
                } => {
                    names_by_unique.entry((*kind, *original, *num)).or_insert(id);
                }
            }
        }
        let mut files_by_path = FxHashMap::default();
        for (i, file) in files.iter().enumerate() {
            files_by_path.insert(file.path().to_string(), FileRef(i as u16));
        }
        let gs_id = NEXT_GLOBAL_STATE_ID.fetch_add(1, Ordering::Relaxed);
        Ok(GlobalState {
            gs_id,
            lineage: Lineage {
                parent_id: gs_id,
                names_at_fork: names.len() as u32,
                files_at_fork: files.len() as u16,
            },
            names,
            names_by_utf8,
            names_by_constant,
            names_by_unique,
            symbols,
            files,
            files_by_path,
            errors: ErrorQueue::default(),
            names_frozen: true,
            symbols_frozen: true,
            files_frozen: true,
        })
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        GlobalState::new()
    }
}

impl std::fmt::Debug for GlobalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalState")
            .field("gs_id", &self.gs_id)
            .field("names", &self.names.len())
            .field("symbols", &self.symbols.len())
            .field("files", &self.files.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/global_state.rs"]
mod tests;
