//! Interned names.
//!
//! Every identifier the pipeline touches is interned into the global state's
//! name table and referred to by a `NameRef` afterwards. Equality and hashing
//! are by table index, never by content.
//!
//! Three kinds of names exist:
//! - `Utf8`: a plain identifier or string payload
//! - `Constant`: the name of a constant, wrapping the identifier it spells
//! - `Unique`: a synthetic name minted for temporaries, mangled renames and
//!   other compiler-introduced entities; never deduplicated

use serde::{Deserialize, Serialize};

/// Index into the global state's name table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameRef(pub u32);

impl NameRef {
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_raw(id: u32) -> Self {
        NameRef(id)
    }
}

/// Why a `Unique` name was minted. Part of the name's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UniqueNameKind {
    /// Parser-introduced temporary (desugaring of compound expressions).
    Desugar,
    /// CFG-introduced temporary.
    Cfg,
    /// Thunk for a default argument value.
    DefaultArg,
    /// Rename applied when a definition is shadowed or reopened incompatibly.
    MangleRename,
    /// Placeholder class minted for an unresolvable constant.
    ResolverMissing,
    /// Type variable allocated for a generic method dispatch.
    TypeVar,
}

/// Payload of one name-table entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameData {
    Utf8(String),
    Constant(NameRef),
    Unique {
        kind: UniqueNameKind,
        original: NameRef,
        num: u32,
    },
}

impl NameData {
    /// The raw text of a `Utf8` name. Panics on other kinds; callers that can
    /// see constants or uniques must match on `NameData` themselves.
    pub fn utf8(&self) -> &str {
        match self {
            NameData::Utf8(s) => s,
            other => panic!("utf8() on non-utf8 name: {other:?}"),
        }
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, NameData::Unique { .. })
    }
}

macro_rules! well_known_names {
    (@consts $idx:expr,) => {};
    (@consts $idx:expr, ($konst:ident, $text:expr), $(($rkonst:ident, $rtext:expr),)*) => {
        pub const $konst: NameRef = NameRef($idx);
        well_known_names!(@consts $idx + 1, $(($rkonst, $rtext),)*);
    };
    ($(($konst:ident, $text:expr),)*) => {
        well_known_names!(@consts 0u32, $(($konst, $text),)*);

        /// Registration table, in id order. `GlobalState::new` enters these
        /// first so the constants above hold by construction.
        pub static WELL_KNOWN_NAMES: &[&str] = &[$($text),*];
    };
}

/// Compile-time ids for the names the checker itself needs to speak about.
///
/// The order here is load-bearing: it must match the registration loop in
/// `GlobalState::new`, which asserts every entry landed on its constant.
pub mod wk {
    use super::NameRef;

    well_known_names! {
        (NO_NAME, "<none>"),
        (ROOT, "<root>"),
        (SELF_, "self"),
        (TEMP, "<temp>"),
        (FINAL_RETURN, "<finalReturn>"),
        (BLOCK_TEMP, "<blockTemp>"),
        (CFG_ALIAS, "<cfgAlias>"),
        (OBJECT, "Object"),
        (BASIC_OBJECT, "BasicObject"),
        (KERNEL, "Kernel"),
        (COMPARABLE, "Comparable"),
        (NUMERIC, "Numeric"),
        (INTEGER, "Integer"),
        (FLOAT, "Float"),
        (STRING, "String"),
        (SYMBOL, "Symbol"),
        (NIL_CLASS, "NilClass"),
        (TRUE_CLASS, "TrueClass"),
        (FALSE_CLASS, "FalseClass"),
        (ARRAY, "Array"),
        (HASH, "Hash"),
        (T_MODULE, "T"),
        (ELEM, "Elem"),
        (KEY, "K"),
        (VALUE, "V"),
        (NEW, "new"),
        (INITIALIZE, "initialize"),
        (PLUS, "+"),
        (MINUS, "-"),
        (STAR, "*"),
        (SLASH, "/"),
        (EQ_EQ, "=="),
        (NOT_EQ, "!="),
        (LT, "<"),
        (GT, ">"),
        (LT_EQ, "<="),
        (GT_EQ, ">="),
        (BANG, "!"),
        (TO_S, "to_s"),
        (TO_SYM, "to_sym"),
        (LENGTH, "length"),
        (SIZE, "size"),
        (EMPTY_P, "empty?"),
        (ZERO_P, "zero?"),
        (NIL_P, "nil?"),
        (IS_A_P, "is_a?"),
        (KIND_OF_P, "kind_of?"),
        (UPCASE, "upcase"),
        (PUTS, "puts"),
        (EACH, "each"),
        (TIMES, "times"),
        (FIRST, "first"),
        (PUSH, "push"),
        (FETCH, "fetch"),
        (KEY_P, "key?"),
        (SQUARE_BRACKETS, "[]"),
        (LET, "let"),
        (CAST, "cast"),
        (MUST, "must"),
        (UNSAFE, "unsafe"),
        (ABSURD, "absurd"),
        (SIG, "sig"),
        (PARAMS, "params"),
        (RETURNS, "returns"),
        (VOID, "void"),
        (ABSTRACT, "abstract"),
        (OVERRIDE, "override"),
        (OVERRIDABLE, "overridable"),
        (FINAL, "final"),
        (TYPE_PARAMETERS, "type_parameters"),
        (TYPE_PARAMETER, "type_parameter"),
        (BIND, "bind"),
        (NILABLE, "nilable"),
        (ANY, "any"),
        (ALL, "all"),
        (UNTYPED_BUILDER, "untyped"),
        (NORETURN, "noreturn"),
        (ANYTHING, "anything"),
        (SELF_TYPE, "self_type"),
        (ATTACHED_CLASS, "attached_class"),
    }
}

pub use wk::WELL_KNOWN_NAMES;

#[cfg(test)]
#[path = "tests/names.rs"]
mod tests;
