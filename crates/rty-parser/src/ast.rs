//! The desugared tree.
//!
//! The parser lowers surface syntax straight into this compact form: case
//! statements become if-chains, short-circuit operators become conditionals
//! over minted temporaries, operator calls become ordinary sends. This tree
//! is the input contract of the resolver (which fills `resolved` slots in
//! place) and of the CFG builder.

use rty_core::{Loc, NameRef, SymbolRef, Type};

/// Everything parsed out of one file.
#[derive(Clone, Debug, Default)]
pub struct ParsedFile {
    pub defs: Vec<ClassDef>,
    /// Methods defined at the top level; they live on `Object`.
    pub toplevel_methods: Vec<MethodDef>,
}

/// A `class … end` or `module … end` definition, possibly nested.
#[derive(Clone, Debug)]
pub struct ClassDef {
    pub loc: Loc,
    pub name_loc: Loc,
    /// Constant path of the definition name (`A::B` is `[A, B]`).
    pub path: Vec<NameRef>,
    pub superclass: Option<ConstantPath>,
    pub is_module: bool,
    pub methods: Vec<MethodDef>,
    pub nested: Vec<ClassDef>,
    /// `CONST = expr` entries in the class body.
    pub static_fields: Vec<StaticFieldDef>,
    /// Filled by the resolver.
    pub resolved: Option<SymbolRef>,
}

#[derive(Clone, Debug)]
pub struct StaticFieldDef {
    pub loc: Loc,
    pub name: NameRef,
    pub value: Expr,
}

/// A reference to a constant by path, with a slot the resolver fills.
#[derive(Clone, Debug)]
pub struct ConstantPath {
    pub loc: Loc,
    pub path: Vec<NameRef>,
    pub resolved: Option<SymbolRef>,
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub loc: Loc,
    pub name_loc: Loc,
    pub name: NameRef,
    pub params: Vec<Param>,
    pub sig: Option<SigDecl>,
    pub body: Expr,
    /// Defined after a bare `private` in the class body.
    pub is_private: bool,
    /// Filled by the resolver.
    pub resolved: Option<SymbolRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Required,
    /// Has a default value (the default expression is typechecked as part of
    /// the body lowering).
    Optional,
    Keyword,
    KeywordOptional,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub loc: Loc,
    pub name: NameRef,
    pub kind: ParamKind,
    pub default: Option<Expr>,
}

/// A lowered `sig { … }` builder chain, attached to the following method.
#[derive(Clone, Debug, Default)]
pub struct SigDecl {
    pub loc: Loc,
    pub params: Vec<(NameRef, TypeExpr)>,
    pub returns: Option<TypeExpr>,
    pub is_void: bool,
    pub is_abstract: bool,
    pub is_override: bool,
    pub is_overridable: bool,
    pub is_final: bool,
    pub type_params: Vec<NameRef>,
    pub bind: Option<TypeExpr>,
}

/// Surface type syntax inside signatures; resolved to `rty_core::Type` by
/// the resolver.
#[derive(Clone, Debug)]
pub enum TypeExpr {
    Constant(ConstantPath),
    Applied {
        base: ConstantPath,
        args: Vec<TypeExpr>,
    },
    Nilable(Box<TypeExpr>),
    AnyOf(Vec<TypeExpr>),
    AllOf(Vec<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Shape(Vec<(NameRef, TypeExpr)>),
    TypeParameter(NameRef),
    SelfType,
    AttachedClass,
    Untyped,
    NoReturn,
    Anything,
    Boolean,
}

impl TypeExpr {
    pub fn loc(&self) -> Option<Loc> {
        match self {
            TypeExpr::Constant(c) | TypeExpr::Applied { base: c, .. } => Some(c.loc),
            _ => None,
        }
    }
}

/// Literal values as they appear in the tree.
#[derive(Clone, Debug, PartialEq)]
pub enum LitValue {
    Int(i64),
    Float(f64),
    Str(NameRef),
    Sym(NameRef),
    True,
    False,
    Nil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
    /// `T.let(v, X)`: ascribe and check.
    Let,
    /// `T.cast(v, X)`: assert-at-runtime, trust statically.
    Cast,
    /// `T.must(v)`: strip nilability.
    Must,
    /// `T.unsafe(v)`: give up and go to untyped.
    Unsafe,
}

/// A desugared expression. Every node carries its source loc.
#[derive(Clone, Debug)]
pub enum Expr {
    /// Statement sequence; value is the last statement's value.
    Seq { loc: Loc, stmts: Vec<Expr> },
    Lit { loc: Loc, value: LitValue },
    Local { loc: Loc, name: NameRef },
    /// `x = value`. Also minted by desugaring for temporaries.
    Assign {
        loc: Loc,
        name: NameRef,
        value: Box<Expr>,
    },
    /// `@x` read.
    FieldRef { loc: Loc, name: NameRef },
    /// `@x = value`.
    FieldAssign {
        loc: Loc,
        name: NameRef,
        value: Box<Expr>,
    },
    SelfRef { loc: Loc },
    Constant(ConstantPath),
    Send {
        loc: Loc,
        recv: Box<Expr>,
        name: NameRef,
        /// Loc of just the method name, for hover/definition queries.
        name_loc: Loc,
        args: Vec<Expr>,
        kwargs: Vec<(NameRef, Expr)>,
        block: Option<Box<BlockArg>>,
        /// `&.` send: nil receiver short-circuits to nil.
        is_safe: bool,
        /// Receiver was the implicit self; private methods are callable.
        is_private_ok: bool,
    },
    If {
        loc: Loc,
        cond: Box<Expr>,
        then_: Box<Expr>,
        else_: Box<Expr>,
    },
    While {
        loc: Loc,
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Return {
        loc: Loc,
        value: Option<Box<Expr>>,
    },
    /// `begin … rescue … ensure … end`.
    Rescue {
        loc: Loc,
        body: Box<Expr>,
        /// Optional handler: binder name and handler body.
        handler: Option<(Option<NameRef>, Box<Expr>)>,
        ensure: Option<Box<Expr>>,
    },
    Cast {
        loc: Loc,
        value: Box<Expr>,
        type_expr: Option<TypeExpr>,
        kind: CastKind,
        /// Filled by the resolver for `Let`/`Cast`.
        resolved_type: Option<Type>,
    },
    /// `T.absurd(x)`: the checker proves `x` uninhabited or errors.
    Absurd { loc: Loc, value: Box<Expr> },
}

#[derive(Clone, Debug)]
pub struct BlockArg {
    pub loc: Loc,
    pub params: Vec<(NameRef, Loc)>,
    pub body: Expr,
}

impl ParsedFile {
    /// Rewrite every name reference through `f`. Used when a tree parsed
    /// against one global state is migrated into another (the substitution
    /// returned by `GlobalSubstitution` is the usual `f`).
    pub fn map_names(&mut self, f: &impl Fn(NameRef) -> NameRef) {
        for def in &mut self.defs {
            map_class(def, f);
        }
        for method in &mut self.toplevel_methods {
            map_method(method, f);
        }
    }
}

fn map_class(def: &mut ClassDef, f: &impl Fn(NameRef) -> NameRef) {
    for name in &mut def.path {
        *name = f(*name);
    }
    if let Some(superclass) = &mut def.superclass {
        map_path(superclass, f);
    }
    for field in &mut def.static_fields {
        field.name = f(field.name);
        map_expr(&mut field.value, f);
    }
    for method in &mut def.methods {
        map_method(method, f);
    }
    for nested in &mut def.nested {
        map_class(nested, f);
    }
}

fn map_method(def: &mut MethodDef, f: &impl Fn(NameRef) -> NameRef) {
    def.name = f(def.name);
    for param in &mut def.params {
        param.name = f(param.name);
        if let Some(default) = &mut param.default {
            map_expr(default, f);
        }
    }
    if let Some(sig) = &mut def.sig {
        for (name, ty) in &mut sig.params {
            *name = f(*name);
            map_type_expr(ty, f);
        }
        if let Some(returns) = &mut sig.returns {
            map_type_expr(returns, f);
        }
        for tp in &mut sig.type_params {
            *tp = f(*tp);
        }
        if let Some(bind) = &mut sig.bind {
            map_type_expr(bind, f);
        }
    }
    map_expr(&mut def.body, f);
}

fn map_path(path: &mut ConstantPath, f: &impl Fn(NameRef) -> NameRef) {
    for name in &mut path.path {
        *name = f(*name);
    }
}

fn map_type_expr(ty: &mut TypeExpr, f: &impl Fn(NameRef) -> NameRef) {
    match ty {
        TypeExpr::Constant(path) => map_path(path, f),
        TypeExpr::Applied { base, args } => {
            map_path(base, f);
            for arg in args {
                map_type_expr(arg, f);
            }
        }
        TypeExpr::Nilable(inner) => map_type_expr(inner, f),
        TypeExpr::AnyOf(members) | TypeExpr::AllOf(members) | TypeExpr::Tuple(members) => {
            for member in members {
                map_type_expr(member, f);
            }
        }
        TypeExpr::Shape(pairs) => {
            for (key, value) in pairs {
                *key = f(*key);
                map_type_expr(value, f);
            }
        }
        TypeExpr::TypeParameter(name) => *name = f(*name),
        TypeExpr::SelfType
        | TypeExpr::AttachedClass
        | TypeExpr::Untyped
        | TypeExpr::NoReturn
        | TypeExpr::Anything
        | TypeExpr::Boolean => {}
    }
}

fn map_expr(expr: &mut Expr, f: &impl Fn(NameRef) -> NameRef) {
    match expr {
        Expr::Seq { stmts, .. } => {
            for stmt in stmts {
                map_expr(stmt, f);
            }
        }
        Expr::Lit { value, .. } => match value {
            LitValue::Str(name) | LitValue::Sym(name) => *name = f(*name),
            _ => {}
        },
        Expr::Local { name, .. } => *name = f(*name),
        Expr::Assign { name, value, .. } | Expr::FieldAssign { name, value, .. } => {
            *name = f(*name);
            map_expr(value, f);
        }
        Expr::FieldRef { name, .. } => *name = f(*name),
        Expr::SelfRef { .. } => {}
        Expr::Constant(path) => map_path(path, f),
        Expr::Send {
            recv,
            name,
            args,
            kwargs,
            block,
            ..
        } => {
            map_expr(recv, f);
            *name = f(*name);
            for arg in args {
                map_expr(arg, f);
            }
            for (kw_name, arg) in kwargs {
                *kw_name = f(*kw_name);
                map_expr(arg, f);
            }
            if let Some(block) = block {
                for (param, _) in &mut block.params {
                    *param = f(*param);
                }
                map_expr(&mut block.body, f);
            }
        }
        Expr::If {
            cond, then_, else_, ..
        } => {
            map_expr(cond, f);
            map_expr(then_, f);
            map_expr(else_, f);
        }
        Expr::While { cond, body, .. } => {
            map_expr(cond, f);
            map_expr(body, f);
        }
        Expr::Return { value, .. } => {
            if let Some(value) = value {
                map_expr(value, f);
            }
        }
        Expr::Rescue {
            body,
            handler,
            ensure,
            ..
        } => {
            map_expr(body, f);
            if let Some((binder, handler_body)) = handler {
                if let Some(binder) = binder {
                    *binder = f(*binder);
                }
                map_expr(handler_body, f);
            }
            if let Some(ensure) = ensure {
                map_expr(ensure, f);
            }
        }
        Expr::Cast {
            value, type_expr, ..
        } => {
            map_expr(value, f);
            if let Some(type_expr) = type_expr {
                map_type_expr(type_expr, f);
            }
        }
        Expr::Absurd { value, .. } => map_expr(value, f),
    }
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::Seq { loc, .. }
            | Expr::Lit { loc, .. }
            | Expr::Local { loc, .. }
            | Expr::Assign { loc, .. }
            | Expr::FieldRef { loc, .. }
            | Expr::FieldAssign { loc, .. }
            | Expr::SelfRef { loc }
            | Expr::Send { loc, .. }
            | Expr::If { loc, .. }
            | Expr::While { loc, .. }
            | Expr::Return { loc, .. }
            | Expr::Rescue { loc, .. }
            | Expr::Cast { loc, .. }
            | Expr::Absurd { loc, .. } => *loc,
            Expr::Constant(path) => path.loc,
        }
    }

    /// A nil literal, for synthesized else-branches and empty bodies.
    pub fn nil(loc: Loc) -> Expr {
        Expr::Lit {
            loc,
            value: LitValue::Nil,
        }
    }
}
