//! Recursive-descent parser producing desugared trees.
//!
//! Desugaring happens during parsing: `case` becomes an if-chain testing the
//! subject with `is_a?`/`==`, `&&`/`||` become conditionals over a minted
//! temporary, `unless`/`until` negate into `if`/`while`, and operators become
//! sends. Syntax errors are reported into the global state's error buffer and
//! the parser recovers at the next statement or definition boundary, so
//! callers always get a best-effort tree.

use crate::ast::*;
use crate::lexer::{lex, Token, TokenKind};
use rty_core::errors::parser::SYNTAX_ERROR;
use rty_core::names::wk;
use rty_core::{FileRef, GlobalState, Loc, NameRef, UniqueNameKind};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Parse one file out of the global state's file table. Interns names, so the
/// name table must be writable for new content; runs inside its own unfreeze
/// scope.
pub fn parse_file(gs: &mut GlobalState, file: FileRef) -> ParsedFile {
    let source = gs.file_data(file).source().to_string();
    let lexed = lex(&source);
    for err in &lexed.errors {
        gs.report_error(
            Loc::new(file, err.begin, err.end),
            SYNTAX_ERROR,
            err.message.clone(),
        );
    }
    gs.with_unfrozen_names(|gs| {
        let mut parser = Parser {
            gs,
            file,
            tokens: lexed.tokens,
            pos: 0,
            temp_counter: 0,
            locals: vec![FxHashSet::default()],
        };
        parser.parse_program()
    })
}

struct Parser<'gs> {
    gs: &'gs mut GlobalState,
    file: FileRef,
    tokens: Vec<Token>,
    pos: usize,
    temp_counter: u32,
    /// Stack of local-variable scopes (method, then nested blocks); decides
    /// whether a bare identifier is a local read or a self-send.
    locals: Vec<FxHashSet<NameRef>>,
}

impl<'gs> Parser<'gs> {
    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn here(&self) -> Loc {
        let tok = &self.tokens[self.pos];
        Loc::new(self.file, tok.begin, tok.end)
    }

    fn prev_loc(&self) -> Loc {
        let tok = &self.tokens[self.pos.saturating_sub(1)];
        Loc::new(self.file, tok.begin, tok.end)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            return true;
        }
        let loc = self.here();
        self.error(loc, &format!("expected {what}"));
        false
    }

    fn error(&mut self, loc: Loc, message: &str) {
        self.gs
            .report_error(loc, SYNTAX_ERROR, message.to_string());
    }

    /// Recover to the next statement boundary.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Newline | TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::KwEnd | TokenKind::Eof => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semi) {
            self.bump();
        }
    }

    fn intern(&mut self, text: &str) -> NameRef {
        self.gs.enter_name_utf8(text)
    }

    fn fresh_temp(&mut self) -> NameRef {
        self.temp_counter += 1;
        let n = self.temp_counter;
        let temp = self
            .gs
            .fresh_name_unique(UniqueNameKind::Desugar, wk::TEMP, n);
        self.locals.last_mut().unwrap().insert(temp);
        temp
    }

    fn is_local(&self, name: NameRef) -> bool {
        self.locals.iter().any(|scope| scope.contains(&name))
    }

    fn declare_local(&mut self, name: NameRef) {
        self.locals.last_mut().unwrap().insert(name);
    }

    // =========================================================================
    // Program structure
    // =========================================================================

    fn parse_program(&mut self) -> ParsedFile {
        let mut out = ParsedFile::default();
        let mut pending_sig: Option<SigDecl> = None;
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::KwClass | TokenKind::KwModule => {
                    if pending_sig.take().is_some() {
                        let loc = self.here();
                        self.error(loc, "signature is not followed by a method definition");
                    }
                    if let Some(def) = self.parse_class_def() {
                        out.defs.push(def);
                    }
                }
                TokenKind::KwDef => {
                    if let Some(def) = self.parse_method_def(pending_sig.take()) {
                        out.toplevel_methods.push(def);
                    }
                }
                TokenKind::Ident(name) if name == "sig" => {
                    pending_sig = self.parse_sig();
                }
                _ => {
                    let loc = self.here();
                    self.error(loc, "expected a class, module or method definition");
                    self.synchronize();
                }
            }
        }
        trace!(
            defs = out.defs.len(),
            methods = out.toplevel_methods.len(),
            "parsed file"
        );
        out
    }

    fn parse_constant_path(&mut self) -> Option<ConstantPath> {
        let start = self.here();
        let mut path = Vec::new();
        loop {
            match self.bump().kind {
                TokenKind::Const(text) => path.push(self.intern(&text)),
                _ => {
                    self.error(start, "expected a constant name");
                    return None;
                }
            }
            if !self.eat(&TokenKind::ColonColon) {
                break;
            }
        }
        Some(ConstantPath {
            loc: start.join(self.prev_loc()),
            path,
            resolved: None,
        })
    }

    fn parse_class_def(&mut self) -> Option<ClassDef> {
        let start = self.here();
        let is_module = matches!(self.peek(), TokenKind::KwModule);
        self.bump();
        let name = self.parse_constant_path()?;
        let superclass = if !is_module && self.eat(&TokenKind::Lt) {
            self.parse_constant_path()
        } else {
            None
        };
        let mut def = ClassDef {
            loc: start,
            name_loc: name.loc,
            path: name.path,
            superclass,
            is_module,
            methods: Vec::new(),
            nested: Vec::new(),
            static_fields: Vec::new(),
            resolved: None,
        };

        let mut pending_sig: Option<SigDecl> = None;
        let mut in_private_section = false;
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::KwEnd => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    self.error(start, "unterminated class body");
                    break;
                }
                TokenKind::KwClass | TokenKind::KwModule => {
                    if let Some(nested) = self.parse_class_def() {
                        def.nested.push(nested);
                    }
                }
                TokenKind::KwDef => {
                    if let Some(mut method) = self.parse_method_def(pending_sig.take()) {
                        method.is_private = in_private_section;
                        def.methods.push(method);
                    }
                }
                TokenKind::Ident(name) if name == "sig" => {
                    pending_sig = self.parse_sig();
                }
                TokenKind::Ident(name) if name == "private" => {
                    self.bump();
                    in_private_section = true;
                }
                TokenKind::Ident(name) if name == "public" => {
                    self.bump();
                    in_private_section = false;
                }
                TokenKind::Const(_) if *self.peek_at(1) == TokenKind::Assign => {
                    let loc = self.here();
                    let name = match self.bump().kind {
                        TokenKind::Const(text) => self.intern(&text),
                        _ => unreachable!(),
                    };
                    self.bump(); // '='
                    let value = self.parse_expr();
                    def.static_fields.push(StaticFieldDef { loc, name, value });
                }
                _ => {
                    let loc = self.here();
                    self.error(loc, "unexpected statement in class body");
                    self.synchronize();
                }
            }
        }
        def.loc = start.join(self.prev_loc());
        Some(def)
    }

    // =========================================================================
    // Signatures
    // =========================================================================

    fn parse_sig(&mut self) -> Option<SigDecl> {
        let start = self.here();
        self.bump(); // 'sig'
        if !self.expect(&TokenKind::LBrace, "'{' after sig") {
            self.synchronize();
            return None;
        }
        let mut sig = SigDecl {
            loc: start,
            ..Default::default()
        };
        loop {
            let builder_loc = self.here();
            let builder = match self.bump().kind {
                TokenKind::Ident(text) => text,
                _ => {
                    self.error(builder_loc, "expected a sig builder");
                    break;
                }
            };
            match builder.as_str() {
                "params" => {
                    if self.expect(&TokenKind::LParen, "'(' after params") {
                        loop {
                            let name = match self.bump().kind {
                                TokenKind::Ident(text) => self.intern(&text),
                                _ => {
                                    self.error(builder_loc, "expected parameter name");
                                    break;
                                }
                            };
                            self.expect(&TokenKind::Colon, "':' after parameter name");
                            if let Some(ty) = self.parse_type_expr() {
                                sig.params.push((name, ty));
                            }
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RParen, "')' closing params");
                    }
                }
                "returns" => {
                    self.expect(&TokenKind::LParen, "'(' after returns");
                    sig.returns = self.parse_type_expr();
                    self.expect(&TokenKind::RParen, "')' closing returns");
                }
                "void" => sig.is_void = true,
                "abstract" => sig.is_abstract = true,
                "override" => sig.is_override = true,
                "overridable" => sig.is_overridable = true,
                "final" => sig.is_final = true,
                "type_parameters" => {
                    self.expect(&TokenKind::LParen, "'(' after type_parameters");
                    loop {
                        match self.bump().kind {
                            TokenKind::Sym(text) => {
                                let name = self.intern(&text);
                                sig.type_params.push(name);
                            }
                            _ => {
                                self.error(builder_loc, "expected symbol in type_parameters");
                                break;
                            }
                        }
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen, "')' closing type_parameters");
                }
                "bind" => {
                    self.expect(&TokenKind::LParen, "'(' after bind");
                    sig.bind = self.parse_type_expr();
                    self.expect(&TokenKind::RParen, "')' closing bind");
                }
                other => {
                    self.error(builder_loc, &format!("unknown sig builder `{other}`"));
                }
            }
            if !self.eat(&TokenKind::Dot) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' closing sig");
        sig.loc = start.join(self.prev_loc());
        Some(sig)
    }

    fn parse_type_expr(&mut self) -> Option<TypeExpr> {
        match self.peek().clone() {
            TokenKind::Const(text) if text == "T" && *self.peek_at(1) == TokenKind::Dot => {
                self.bump(); // T
                self.bump(); // .
                let loc = self.here();
                let builder = match self.bump().kind {
                    TokenKind::Ident(text) => text,
                    _ => {
                        self.error(loc, "expected a type builder after `T.`");
                        return None;
                    }
                };
                match builder.as_str() {
                    "nilable" => {
                        self.expect(&TokenKind::LParen, "'(' after nilable");
                        let inner = self.parse_type_expr()?;
                        self.expect(&TokenKind::RParen, "')' closing nilable");
                        Some(TypeExpr::Nilable(Box::new(inner)))
                    }
                    "any" | "all" => {
                        self.expect(&TokenKind::LParen, "'(' after type combinator");
                        let mut members = Vec::new();
                        loop {
                            if let Some(member) = self.parse_type_expr() {
                                members.push(member);
                            }
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RParen, "')' closing type combinator");
                        if builder == "any" {
                            Some(TypeExpr::AnyOf(members))
                        } else {
                            Some(TypeExpr::AllOf(members))
                        }
                    }
                    "type_parameter" => {
                        self.expect(&TokenKind::LParen, "'(' after type_parameter");
                        let name = match self.bump().kind {
                            TokenKind::Sym(text) => Some(self.intern(&text)),
                            _ => {
                                self.error(loc, "expected symbol in type_parameter");
                                None
                            }
                        };
                        self.expect(&TokenKind::RParen, "')' closing type_parameter");
                        name.map(TypeExpr::TypeParameter)
                    }
                    "untyped" => Some(TypeExpr::Untyped),
                    "noreturn" => Some(TypeExpr::NoReturn),
                    "anything" => Some(TypeExpr::Anything),
                    "self_type" => Some(TypeExpr::SelfType),
                    "attached_class" => Some(TypeExpr::AttachedClass),
                    other => {
                        self.error(loc, &format!("unknown type builder `T.{other}`"));
                        None
                    }
                }
            }
            TokenKind::Const(text)
                if text == "T"
                    && *self.peek_at(1) == TokenKind::ColonColon
                    && *self.peek_at(2) == TokenKind::Const("Boolean".to_string()) =>
            {
                self.bump();
                self.bump();
                self.bump();
                Some(TypeExpr::Boolean)
            }
            TokenKind::Const(_) => {
                let base = self.parse_constant_path()?;
                if self.eat(&TokenKind::LBracket) {
                    let mut args = Vec::new();
                    loop {
                        if let Some(arg) = self.parse_type_expr() {
                            args.push(arg);
                        }
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBracket, "']' closing type arguments");
                    Some(TypeExpr::Applied { base, args })
                } else {
                    Some(TypeExpr::Constant(base))
                }
            }
            TokenKind::LBracket => {
                self.bump();
                let mut elems = Vec::new();
                loop {
                    if let Some(elem) = self.parse_type_expr() {
                        elems.push(elem);
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "']' closing tuple type");
                Some(TypeExpr::Tuple(elems))
            }
            TokenKind::LBrace => {
                self.bump();
                let mut pairs = Vec::new();
                loop {
                    let name = match self.bump().kind {
                        TokenKind::Ident(text) => self.intern(&text),
                        _ => {
                            let loc = self.prev_loc();
                            self.error(loc, "expected shape key");
                            break;
                        }
                    };
                    self.expect(&TokenKind::Colon, "':' after shape key");
                    if let Some(value) = self.parse_type_expr() {
                        pairs.push((name, value));
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}' closing shape type");
                Some(TypeExpr::Shape(pairs))
            }
            _ => {
                let loc = self.here();
                self.error(loc, "expected a type");
                self.bump();
                None
            }
        }
    }

    // =========================================================================
    // Methods
    // =========================================================================

    fn parse_method_def(&mut self, sig: Option<SigDecl>) -> Option<MethodDef> {
        let start = self.here();
        self.bump(); // 'def'
        let name_loc = self.here();
        let name = match self.bump().kind {
            TokenKind::Ident(text) => self.intern(&text),
            // Operator definitions: def +(other), def ==(other), …
            TokenKind::Plus => wk::PLUS,
            TokenKind::Minus => wk::MINUS,
            TokenKind::Star => wk::STAR,
            TokenKind::Slash => wk::SLASH,
            TokenKind::EqEq => wk::EQ_EQ,
            TokenKind::Lt => wk::LT,
            TokenKind::Gt => wk::GT,
            _ => {
                self.error(name_loc, "expected method name");
                self.synchronize();
                return None;
            }
        };

        self.locals.push(FxHashSet::default());
        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) {
            if !self.eat(&TokenKind::RParen) {
                loop {
                    if let Some(param) = self.parse_param() {
                        self.declare_local(param.name);
                        params.push(param);
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "')' closing parameter list");
            }
        }
        let body = self.parse_stmts_until(&[TokenKind::KwEnd]);
        self.expect(&TokenKind::KwEnd, "'end' closing method");
        self.locals.pop();

        Some(MethodDef {
            loc: start.join(self.prev_loc()),
            name_loc,
            name,
            params,
            sig,
            body,
            is_private: false,
            resolved: None,
        })
    }

    fn parse_param(&mut self) -> Option<Param> {
        let loc = self.here();
        let name = match self.bump().kind {
            TokenKind::Ident(text) => self.intern(&text),
            _ => {
                self.error(loc, "expected parameter name");
                return None;
            }
        };
        if self.eat(&TokenKind::Colon) {
            // Keyword parameter, with or without a default.
            if matches!(
                self.peek(),
                TokenKind::Comma | TokenKind::RParen | TokenKind::Newline
            ) {
                return Some(Param {
                    loc,
                    name,
                    kind: ParamKind::Keyword,
                    default: None,
                });
            }
            let default = self.parse_expr();
            return Some(Param {
                loc,
                name,
                kind: ParamKind::KeywordOptional,
                default: Some(default),
            });
        }
        if self.eat(&TokenKind::Assign) {
            let default = self.parse_expr();
            return Some(Param {
                loc,
                name,
                kind: ParamKind::Optional,
                default: Some(default),
            });
        }
        Some(Param {
            loc,
            name,
            kind: ParamKind::Required,
            default: None,
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Parse statements until one of `stops` (not consumed). Returns a `Seq`
    /// (or a nil literal for an empty body).
    fn parse_stmts_until(&mut self, stops: &[TokenKind]) -> Expr {
        let start = self.here();
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if stops.contains(self.peek()) || *self.peek() == TokenKind::Eof {
                break;
            }
            stmts.push(self.parse_stmt());
        }
        match stmts.len() {
            0 => Expr::nil(start.copy_with_zero_length()),
            1 => stmts.pop().unwrap(),
            _ => Expr::Seq {
                loc: start.join(self.prev_loc()),
                stmts,
            },
        }
    }

    fn parse_stmt(&mut self) -> Expr {
        match self.peek() {
            TokenKind::KwReturn => {
                let loc = self.here();
                self.bump();
                let value = if matches!(
                    self.peek(),
                    TokenKind::Newline | TokenKind::Semi | TokenKind::KwEnd | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()))
                };
                let end = value.as_ref().map(|v| v.loc()).unwrap_or(loc);
                Expr::Return {
                    loc: loc.join(end),
                    value,
                }
            }
            _ => self.parse_expr(),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        // Lookahead for `ident =` / `@ivar =` (but not `==`).
        match (self.peek().clone(), self.peek_at(1).clone()) {
            (TokenKind::Ident(text), TokenKind::Assign) => {
                let loc = self.here();
                self.bump();
                self.bump();
                let name = self.intern(&text);
                let value = self.parse_assignment();
                self.declare_local(name);
                Expr::Assign {
                    loc: loc.join(value.loc()),
                    name,
                    value: Box::new(value),
                }
            }
            (TokenKind::IVar(text), TokenKind::Assign) => {
                let loc = self.here();
                self.bump();
                self.bump();
                let name = self.intern(&text);
                let value = self.parse_assignment();
                Expr::FieldAssign {
                    loc: loc.join(value.loc()),
                    name,
                    value: Box::new(value),
                }
            }
            _ => self.parse_or(),
        }
    }

    /// `a || b` becomes `tmp = a; if tmp then tmp else b end`.
    fn parse_or(&mut self) -> Expr {
        let mut lhs = self.parse_and();
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.parse_and();
            lhs = self.short_circuit(lhs, rhs, false);
        }
        lhs
    }

    /// `a && b` becomes `tmp = a; if tmp then b else tmp end`.
    fn parse_and(&mut self) -> Expr {
        let mut lhs = self.parse_equality();
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.parse_equality();
            lhs = self.short_circuit(lhs, rhs, true);
        }
        lhs
    }

    fn short_circuit(&mut self, lhs: Expr, rhs: Expr, is_and: bool) -> Expr {
        let loc = lhs.loc().join(rhs.loc());
        let tmp = self.fresh_temp();
        let read = |loc: Loc| Expr::Local { loc, name: tmp };
        let (then_, else_) = if is_and {
            (rhs, read(loc))
        } else {
            (read(loc), rhs)
        };
        Expr::Seq {
            loc,
            stmts: vec![
                Expr::Assign {
                    loc: lhs.loc(),
                    name: tmp,
                    value: Box::new(lhs),
                },
                Expr::If {
                    loc,
                    cond: Box::new(read(loc)),
                    then_: Box::new(then_),
                    else_: Box::new(else_),
                },
            ],
        }
    }

    fn parse_equality(&mut self) -> Expr {
        let mut lhs = self.parse_comparison();
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => wk::EQ_EQ,
                TokenKind::NotEq => wk::NOT_EQ,
                _ => break,
            };
            let op_loc = self.here();
            self.bump();
            let rhs = self.parse_comparison();
            lhs = self.binary_send(lhs, op, op_loc, rhs);
        }
        lhs
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut lhs = self.parse_additive();
        loop {
            let op = match self.peek() {
                TokenKind::Lt => wk::LT,
                TokenKind::Gt => wk::GT,
                TokenKind::LtEq => wk::LT_EQ,
                TokenKind::GtEq => wk::GT_EQ,
                _ => break,
            };
            let op_loc = self.here();
            self.bump();
            let rhs = self.parse_additive();
            lhs = self.binary_send(lhs, op, op_loc, rhs);
        }
        lhs
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.peek() {
                TokenKind::Plus => wk::PLUS,
                TokenKind::Minus => wk::MINUS,
                _ => break,
            };
            let op_loc = self.here();
            self.bump();
            let rhs = self.parse_multiplicative();
            lhs = self.binary_send(lhs, op, op_loc, rhs);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.peek() {
                TokenKind::Star => wk::STAR,
                TokenKind::Slash => wk::SLASH,
                _ => break,
            };
            let op_loc = self.here();
            self.bump();
            let rhs = self.parse_unary();
            lhs = self.binary_send(lhs, op, op_loc, rhs);
        }
        lhs
    }

    fn binary_send(&mut self, lhs: Expr, op: NameRef, op_loc: Loc, rhs: Expr) -> Expr {
        Expr::Send {
            loc: lhs.loc().join(rhs.loc()),
            recv: Box::new(lhs),
            name: op,
            name_loc: op_loc,
            args: vec![rhs],
            kwargs: Vec::new(),
            block: None,
            is_safe: false,
            is_private_ok: false,
        }
    }

    fn parse_unary(&mut self) -> Expr {
        if matches!(self.peek(), TokenKind::Bang) {
            let loc = self.here();
            self.bump();
            let operand = self.parse_unary();
            return Expr::Send {
                loc: loc.join(operand.loc()),
                recv: Box::new(operand),
                name: wk::BANG,
                name_loc: loc,
                args: Vec::new(),
                kwargs: Vec::new(),
                block: None,
                is_safe: false,
                is_private_ok: false,
            };
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek() {
                TokenKind::Dot | TokenKind::SafeNav => {
                    let is_safe = matches!(self.peek(), TokenKind::SafeNav);
                    self.bump();
                    expr = self.parse_call(expr, is_safe, false);
                }
                TokenKind::LBracket => {
                    let open = self.here();
                    self.bump();
                    let (args, kwargs) = self.parse_call_args(&TokenKind::RBracket);
                    self.expect(&TokenKind::RBracket, "']' closing index");
                    expr = Expr::Send {
                        loc: expr.loc().join(self.prev_loc()),
                        recv: Box::new(expr),
                        name: wk::SQUARE_BRACKETS,
                        name_loc: open,
                        args,
                        kwargs,
                        block: None,
                        is_safe: false,
                        is_private_ok: false,
                    };
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_call(&mut self, recv: Expr, is_safe: bool, is_private_ok: bool) -> Expr {
        let name_loc = self.here();
        let name = match self.bump().kind {
            TokenKind::Ident(text) => self.intern(&text),
            TokenKind::Const(text) => self.intern(&text),
            _ => {
                self.error(name_loc, "expected method name after '.'");
                return recv;
            }
        };
        let (args, kwargs) = if self.eat(&TokenKind::LParen) {
            let parsed = self.parse_call_args(&TokenKind::RParen);
            self.expect(&TokenKind::RParen, "')' closing arguments");
            parsed
        } else {
            (Vec::new(), Vec::new())
        };
        let block = self.parse_optional_block();
        Expr::Send {
            loc: recv.loc().join(self.prev_loc()),
            recv: Box::new(recv),
            name,
            name_loc,
            args,
            kwargs,
            block,
            is_safe,
            is_private_ok,
        }
    }

    fn parse_call_args(&mut self, stop: &TokenKind) -> (Vec<Expr>, Vec<(NameRef, Expr)>) {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.peek() == stop {
            return (args, kwargs);
        }
        loop {
            // `name: expr` is a keyword argument.
            if let (TokenKind::Ident(text), TokenKind::Colon) =
                (self.peek().clone(), self.peek_at(1).clone())
            {
                self.bump();
                self.bump();
                let name = self.intern(&text);
                kwargs.push((name, self.parse_expr()));
            } else {
                args.push(self.parse_expr());
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        (args, kwargs)
    }

    fn parse_optional_block(&mut self) -> Option<Box<BlockArg>> {
        if !matches!(self.peek(), TokenKind::KwDo) {
            return None;
        }
        let start = self.here();
        self.bump();
        self.locals.push(FxHashSet::default());
        let mut params = Vec::new();
        if self.eat(&TokenKind::Pipe) {
            loop {
                let loc = self.here();
                match self.bump().kind {
                    TokenKind::Ident(text) => {
                        let name = self.intern(&text);
                        self.declare_local(name);
                        params.push((name, loc));
                    }
                    _ => {
                        self.error(loc, "expected block parameter");
                        break;
                    }
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Pipe, "'|' closing block parameters");
        }
        let body = self.parse_stmts_until(&[TokenKind::KwEnd]);
        self.expect(&TokenKind::KwEnd, "'end' closing block");
        self.locals.pop();
        Some(Box::new(BlockArg {
            loc: start.join(self.prev_loc()),
            params,
            body,
        }))
    }

    fn parse_primary(&mut self) -> Expr {
        let loc = self.here();
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.bump();
                Expr::Lit {
                    loc,
                    value: LitValue::Int(v),
                }
            }
            TokenKind::Float(v) => {
                self.bump();
                Expr::Lit {
                    loc,
                    value: LitValue::Float(v),
                }
            }
            TokenKind::Str(text) => {
                self.bump();
                let name = self.intern(&text);
                Expr::Lit {
                    loc,
                    value: LitValue::Str(name),
                }
            }
            TokenKind::Sym(text) => {
                self.bump();
                let name = self.intern(&text);
                Expr::Lit {
                    loc,
                    value: LitValue::Sym(name),
                }
            }
            TokenKind::KwTrue => {
                self.bump();
                Expr::Lit {
                    loc,
                    value: LitValue::True,
                }
            }
            TokenKind::KwFalse => {
                self.bump();
                Expr::Lit {
                    loc,
                    value: LitValue::False,
                }
            }
            TokenKind::KwNil => {
                self.bump();
                Expr::Lit {
                    loc,
                    value: LitValue::Nil,
                }
            }
            TokenKind::KwSelf => {
                self.bump();
                if self.eat(&TokenKind::Dot) {
                    // Explicit self receiver: private methods are not
                    // callable through it.
                    return self.parse_call(Expr::SelfRef { loc }, false, false);
                }
                Expr::SelfRef { loc }
            }
            TokenKind::IVar(text) => {
                self.bump();
                let name = self.intern(&text);
                Expr::FieldRef { loc, name }
            }
            TokenKind::Ident(text) => {
                self.bump();
                let name = self.intern(&text);
                let has_parens = *self.peek() == TokenKind::LParen;
                if !has_parens && self.is_local(name) {
                    return Expr::Local { loc, name };
                }
                // A bare or parenthesized call on the implicit self.
                let (args, kwargs) = if self.eat(&TokenKind::LParen) {
                    let parsed = self.parse_call_args(&TokenKind::RParen);
                    self.expect(&TokenKind::RParen, "')' closing arguments");
                    parsed
                } else {
                    (Vec::new(), Vec::new())
                };
                let block = self.parse_optional_block();
                Expr::Send {
                    loc: loc.join(self.prev_loc()),
                    recv: Box::new(Expr::SelfRef { loc }),
                    name,
                    name_loc: loc,
                    args,
                    kwargs,
                    block,
                    is_safe: false,
                    is_private_ok: true,
                }
            }
            TokenKind::Const(text) if text == "T" && *self.peek_at(1) == TokenKind::Dot => {
                self.parse_t_intrinsic()
            }
            TokenKind::Const(_) => {
                let path = self.parse_constant_path();
                match path {
                    Some(path) => {
                        if matches!(self.peek(), TokenKind::Dot | TokenKind::SafeNav) {
                            let is_safe = matches!(self.peek(), TokenKind::SafeNav);
                            self.bump();
                            self.parse_call(Expr::Constant(path), is_safe, false)
                        } else {
                            Expr::Constant(path)
                        }
                    }
                    None => Expr::nil(loc),
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr();
                self.expect(&TokenKind::RParen, "')'");
                inner
            }
            TokenKind::KwIf => self.parse_if(false),
            TokenKind::KwUnless => self.parse_if(true),
            TokenKind::KwWhile => self.parse_while(false),
            TokenKind::KwUntil => self.parse_while(true),
            TokenKind::KwCase => self.parse_case(),
            TokenKind::KwBegin => self.parse_begin(),
            _ => {
                self.error(loc, "expected an expression");
                self.synchronize();
                Expr::nil(loc)
            }
        }
    }

    // =========================================================================
    // T.* intrinsics in expression position
    // =========================================================================

    fn parse_t_intrinsic(&mut self) -> Expr {
        let start = self.here();
        self.bump(); // T
        self.bump(); // .
        let name_loc = self.here();
        let builder = match self.bump().kind {
            TokenKind::Ident(text) => text,
            _ => {
                self.error(name_loc, "expected method after `T.`");
                return Expr::nil(start);
            }
        };
        let kind = match builder.as_str() {
            "let" => Some(CastKind::Let),
            "cast" => Some(CastKind::Cast),
            "must" => Some(CastKind::Must),
            "unsafe" => Some(CastKind::Unsafe),
            "absurd" => None,
            other => {
                self.error(name_loc, &format!("unsupported `T.{other}` in expression"));
                self.synchronize();
                return Expr::nil(start);
            }
        };
        self.expect(&TokenKind::LParen, "'(' after T builder");
        let value = self.parse_expr();
        let type_expr = match kind {
            Some(CastKind::Let) | Some(CastKind::Cast) => {
                self.expect(&TokenKind::Comma, "',' before target type");
                self.parse_type_expr()
            }
            _ => None,
        };
        self.expect(&TokenKind::RParen, "')' closing T builder");
        let loc = start.join(self.prev_loc());
        match kind {
            Some(kind) => Expr::Cast {
                loc,
                value: Box::new(value),
                type_expr,
                kind,
                resolved_type: None,
            },
            None => Expr::Absurd {
                loc,
                value: Box::new(value),
            },
        }
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    fn parse_if(&mut self, negated: bool) -> Expr {
        let start = self.here();
        self.bump(); // 'if' / 'unless'
        let mut cond = self.parse_expr();
        if negated {
            cond = self.negate(cond);
        }
        self.eat(&TokenKind::KwThen);
        let then_ = self.parse_stmts_until(&[
            TokenKind::KwElsif,
            TokenKind::KwElse,
            TokenKind::KwEnd,
        ]);
        let else_ = match self.peek() {
            TokenKind::KwElsif => {
                // Reuse the if-parser by treating `elsif` as a nested `if`;
                // it consumes the shared `end`.
                return self.finish_elsif_chain(start, cond, then_);
            }
            TokenKind::KwElse => {
                self.bump();
                self.parse_stmts_until(&[TokenKind::KwEnd])
            }
            _ => Expr::nil(start.copy_with_zero_length()),
        };
        self.expect(&TokenKind::KwEnd, "'end' closing if");
        Expr::If {
            loc: start.join(self.prev_loc()),
            cond: Box::new(cond),
            then_: Box::new(then_),
            else_: Box::new(else_),
        }
    }

    fn finish_elsif_chain(&mut self, start: Loc, cond: Expr, then_: Expr) -> Expr {
        // At an `elsif`: parse it as the else-branch if.
        let else_ = self.parse_if_tail();
        Expr::If {
            loc: start.join(self.prev_loc()),
            cond: Box::new(cond),
            then_: Box::new(then_),
            else_: Box::new(else_),
        }
    }

    fn parse_if_tail(&mut self) -> Expr {
        let start = self.here();
        self.bump(); // 'elsif'
        let cond = self.parse_expr();
        self.eat(&TokenKind::KwThen);
        let then_ = self.parse_stmts_until(&[
            TokenKind::KwElsif,
            TokenKind::KwElse,
            TokenKind::KwEnd,
        ]);
        match self.peek() {
            TokenKind::KwElsif => self.finish_elsif_chain(start, cond, then_),
            TokenKind::KwElse => {
                self.bump();
                let else_ = self.parse_stmts_until(&[TokenKind::KwEnd]);
                self.expect(&TokenKind::KwEnd, "'end' closing if");
                Expr::If {
                    loc: start.join(self.prev_loc()),
                    cond: Box::new(cond),
                    then_: Box::new(then_),
                    else_: Box::new(else_),
                }
            }
            _ => {
                self.expect(&TokenKind::KwEnd, "'end' closing if");
                Expr::If {
                    loc: start.join(self.prev_loc()),
                    cond: Box::new(cond),
                    then_: Box::new(then_),
                    else_: Box::new(Expr::nil(start.copy_with_zero_length())),
                }
            }
        }
    }

    fn parse_while(&mut self, negated: bool) -> Expr {
        let start = self.here();
        self.bump(); // 'while' / 'until'
        let mut cond = self.parse_expr();
        if negated {
            cond = self.negate(cond);
        }
        self.eat(&TokenKind::KwDo);
        let body = self.parse_stmts_until(&[TokenKind::KwEnd]);
        self.expect(&TokenKind::KwEnd, "'end' closing loop");
        Expr::While {
            loc: start.join(self.prev_loc()),
            cond: Box::new(cond),
            body: Box::new(body),
        }
    }

    fn negate(&mut self, expr: Expr) -> Expr {
        let loc = expr.loc();
        Expr::Send {
            loc,
            recv: Box::new(expr),
            name: wk::BANG,
            name_loc: loc,
            args: Vec::new(),
            kwargs: Vec::new(),
            block: None,
            is_safe: false,
            is_private_ok: false,
        }
    }

    /// `case x; when A then …; when 1 then …; else …; end` lowers to an
    /// if-chain over a subject temporary: constant patterns test `is_a?`,
    /// literal patterns test `==`.
    fn parse_case(&mut self) -> Expr {
        let start = self.here();
        self.bump(); // 'case'
        let subject = self.parse_expr();
        let subject_tmp = self.fresh_temp();
        let subject_loc = subject.loc();
        self.skip_newlines();

        struct WhenClause {
            cond: Expr,
            body: Expr,
        }
        let mut clauses: Vec<WhenClause> = Vec::new();
        let mut else_body: Option<Expr> = None;
        loop {
            match self.peek() {
                TokenKind::KwWhen => {
                    self.bump();
                    let mut cond: Option<Expr> = None;
                    loop {
                        let test = self.parse_when_pattern(subject_tmp, subject_loc);
                        cond = Some(match cond {
                            None => test,
                            // Multiple patterns: `when A, B` is an or.
                            Some(prev) => self.short_circuit(prev, test, false),
                        });
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.eat(&TokenKind::KwThen);
                    let body = self.parse_stmts_until(&[
                        TokenKind::KwWhen,
                        TokenKind::KwElse,
                        TokenKind::KwEnd,
                    ]);
                    clauses.push(WhenClause {
                        cond: cond.unwrap_or_else(|| Expr::nil(subject_loc)),
                        body,
                    });
                }
                TokenKind::KwElse => {
                    self.bump();
                    else_body = Some(self.parse_stmts_until(&[TokenKind::KwEnd]));
                }
                _ => break,
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::KwEnd, "'end' closing case");
        let end_loc = self.prev_loc();

        let mut chain = else_body.unwrap_or_else(|| Expr::nil(end_loc.copy_with_zero_length()));
        for clause in clauses.into_iter().rev() {
            chain = Expr::If {
                loc: start.join(end_loc),
                cond: Box::new(clause.cond),
                then_: Box::new(clause.body),
                else_: Box::new(chain),
            };
        }
        Expr::Seq {
            loc: start.join(end_loc),
            stmts: vec![
                Expr::Assign {
                    loc: subject_loc,
                    name: subject_tmp,
                    value: Box::new(subject),
                },
                chain,
            ],
        }
    }

    fn parse_when_pattern(&mut self, subject_tmp: NameRef, subject_loc: Loc) -> Expr {
        let read = Expr::Local {
            loc: subject_loc,
            name: subject_tmp,
        };
        if matches!(self.peek(), TokenKind::Const(_)) {
            let pattern_loc = self.here();
            if let Some(path) = self.parse_constant_path() {
                return Expr::Send {
                    loc: pattern_loc,
                    recv: Box::new(read),
                    name: wk::IS_A_P,
                    name_loc: pattern_loc,
                    args: vec![Expr::Constant(path)],
                    kwargs: Vec::new(),
                    block: None,
                    is_safe: false,
                    is_private_ok: false,
                };
            }
            return Expr::nil(pattern_loc);
        }
        let pattern = self.parse_expr();
        let loc = pattern.loc();
        Expr::Send {
            loc,
            recv: Box::new(read),
            name: wk::EQ_EQ,
            name_loc: loc,
            args: vec![pattern],
            kwargs: Vec::new(),
            block: None,
            is_safe: false,
            is_private_ok: false,
        }
    }

    fn parse_begin(&mut self) -> Expr {
        let start = self.here();
        self.bump(); // 'begin'
        let body = self.parse_stmts_until(&[
            TokenKind::KwRescue,
            TokenKind::KwEnsure,
            TokenKind::KwEnd,
        ]);
        let handler = if self.eat(&TokenKind::KwRescue) {
            // `rescue SomeError => e` — the exception class list is parsed
            // and discarded (everything is an untyped StandardError here).
            if matches!(self.peek(), TokenKind::Const(_)) {
                let _ = self.parse_constant_path();
            }
            let binder = if self.eat(&TokenKind::Arrow) {
                match self.bump().kind {
                    TokenKind::Ident(text) => {
                        let name = self.intern(&text);
                        self.declare_local(name);
                        Some(name)
                    }
                    _ => {
                        let loc = self.prev_loc();
                        self.error(loc, "expected binder after '=>'");
                        None
                    }
                }
            } else {
                None
            };
            let handler_body =
                self.parse_stmts_until(&[TokenKind::KwEnsure, TokenKind::KwEnd]);
            Some((binder, Box::new(handler_body)))
        } else {
            None
        };
        let ensure = if self.eat(&TokenKind::KwEnsure) {
            Some(Box::new(self.parse_stmts_until(&[TokenKind::KwEnd])))
        } else {
            None
        };
        self.expect(&TokenKind::KwEnd, "'end' closing begin");
        Expr::Rescue {
            loc: start.join(self.prev_loc()),
            body: Box::new(body),
            handler,
            ensure,
        }
    }
}

#[cfg(test)]
#[path = "tests/parser.rs"]
mod tests;
