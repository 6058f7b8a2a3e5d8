//! Name migration between global states.
//!
//! Incremental runs typecheck on a clone of the committed state. When the
//! clone's results are merged back (or a query runs against trees indexed
//! under a different state), `NameRef`s minted in one state must be mapped
//! into the other. Symbol ids are required to be identical across the two
//! states; only names and files may differ.
//!
//! The common case is that both states descend from the same parent and
//! neither has interned anything new, in which case the substitution is the
//! identity and mapping is skipped entirely.

use crate::global_state::GlobalState;
use crate::names::{NameData, NameRef};
use tracing::debug;

pub struct GlobalSubstitution {
    /// Indexed by source name id; only populated on the slow path.
    name_map: Vec<NameRef>,
    fast_path: bool,
}

impl GlobalSubstitution {
    pub fn new(from: &GlobalState, to: &mut GlobalState) -> GlobalSubstitution {
        assert_eq!(
            from.symbols_used(),
            to.symbols_used(),
            "substitution requires identical symbol tables"
        );

        // Adopt files the target has never read.
        let missing: Vec<_> = from
            .live_files()
            .filter(|&f| to.file_by_path(from.file_data(f).path()).is_none())
            .collect();
        if !missing.is_empty() {
            to.with_unfrozen_files(|to| {
                for f in &missing {
                    let data = from.file_data(*f);
                    to.enter_file(data.path(), data.source().to_string(), data.source_type);
                }
            });
        }

        if use_fast_path(from, to) {
            debug!(from = from.gs_id, to = to.gs_id, "substitution fast path");
            return GlobalSubstitution {
                name_map: Vec::new(),
                fast_path: true,
            };
        }

        debug!(
            from = from.gs_id,
            to = to.gs_id,
            names = from.names_used(),
            "substitution slow path"
        );
        let mut name_map = Vec::with_capacity(from.names_used() as usize);
        to.with_unfrozen_names(|to| {
            for id in 0..from.names_used() {
                let name = NameRef::from_raw(id);
                // Wrapped names always refer to earlier table entries, so the
                // map prefix we need is already built.
                let mapped = match from.name_data(name) {
                    NameData::Utf8(s) => to.enter_name_utf8(s),
                    NameData::Constant(inner) => {
                        let inner = name_map[inner.id() as usize];
                        to.enter_name_constant(inner)
                    }
                    NameData::Unique {
                        kind,
                        original,
                        num,
                    } => {
                        let original = name_map[original.id() as usize];
                        to.enter_name_unique(*kind, original, *num)
                    }
                };
                name_map.push(mapped);
            }
        });
        GlobalSubstitution {
            name_map,
            fast_path: false,
        }
    }

    /// Whether construction decided mapping could be skipped.
    #[inline]
    pub fn use_fast_path(&self) -> bool {
        self.fast_path
    }

    /// Total after construction; identity on the fast path.
    #[inline]
    pub fn substitute(&self, name: NameRef) -> NameRef {
        if self.fast_path {
            return name;
        }
        self.name_map[name.id() as usize]
    }
}

/// Both states record the same common parent and neither has grown its name
/// or file table past the fork point.
fn use_fast_path(from: &GlobalState, to: &GlobalState) -> bool {
    let from_lin = from.lineage;
    let to_lin = to.lineage;

    // Parent/child in either direction, or siblings of one parent.
    let share_parent = from.gs_id == to_lin.parent_id
        || to.gs_id == from_lin.parent_id
        || from_lin.parent_id == to_lin.parent_id;
    if !share_parent {
        return false;
    }

    let from_ungrown = match () {
        _ if to_lin.parent_id == from.gs_id => {
            // `from` is the parent: compare against the child's fork record.
            from.names_used() == to_lin.names_at_fork && from.files_used() == to_lin.files_at_fork
        }
        _ => {
            from.names_used() == from_lin.names_at_fork
                && from.files_used() == from_lin.files_at_fork
        }
    };
    let to_ungrown = match () {
        _ if from_lin.parent_id == to.gs_id => {
            to.names_used() == from_lin.names_at_fork && to.files_used() == from_lin.files_at_fork
        }
        _ => {
            to.names_used() == to_lin.names_at_fork && to.files_used() == to_lin.files_at_fork
        }
    };
    from_ungrown && to_ungrown
}

#[cfg(test)]
#[path = "tests/substitution.rs"]
mod tests;
