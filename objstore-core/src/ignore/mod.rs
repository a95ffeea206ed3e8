//! The ignore filter (component H): an arena of chained ignore
//! contexts (per-directory rule sets layered over their parent's,
//! never a parent-pointer tree of reference-counted nodes) plus
//! `CACHEDIR.TAG` cache-directory elision.

mod pattern;

use std::fs;
use std::path::Path;

pub use pattern::{parse_rule, Matcher};

/// The fixed prefix kopia-style cache-directory markers must start
/// with; content after it is ignored.
const CACHEDIR_TAG_SIGNATURE: &[u8] = b"Signature: 8a477f597d28d272789ec02ec6d3ea";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Included,
    Excluded,
}

/// Per-directory overrides layered onto the parent context when
/// descending into a subdirectory. `None`/empty means "inherit".
#[derive(Default, Debug, Clone)]
pub struct DirOverride {
    pub drop_parent_dot_ignore_filenames: bool,
    pub drop_parent_rules: bool,
    pub cross_filesystem: Option<bool>,
    pub max_file_size: Option<u64>,
    pub extra_dot_ignore_filenames: Vec<String>,
    pub extra_rules: Vec<String>,
}

struct IgnoreContext {
    effective_rules: Vec<Matcher>,
    effective_dot_ignore_filenames: Vec<String>,
    max_file_size: Option<u64>,
    cross_filesystem: bool,
    root_device: Option<u64>,
}

/// Owns every [`IgnoreContext`] created during a walk. Contexts are
/// addressed by integer index rather than linked by `Rc`/`Weak`
/// pointers, so the arena itself has no cycles and can be dropped in
/// one shot.
#[derive(Default)]
pub struct IgnoreArena {
    contexts: Vec<IgnoreContext>,
}

impl IgnoreArena {
    pub fn new() -> Self {
        IgnoreArena {
            contexts: Vec::new(),
        }
    }

    /// Create the root context for a walk. `root_device` is the
    /// device id of the walk root, used later to enforce
    /// `cross_filesystem = false`.
    pub fn root(&mut self, overrides: DirOverride, root_device: Option<u64>) -> usize {
        let rules = overrides
            .extra_rules
            .iter()
            .filter_map(|s| parse_rule(s))
            .collect();
        self.contexts.push(IgnoreContext {
            effective_rules: rules,
            effective_dot_ignore_filenames: overrides.extra_dot_ignore_filenames,
            max_file_size: overrides.max_file_size,
            cross_filesystem: overrides.cross_filesystem.unwrap_or(true),
            root_device,
        });
        self.contexts.len() - 1
    }

    /// Create a child context for `dir_path`, a directory whose own
    /// dot-ignore files (if any exist there) are parsed and appended
    /// on top of the inherited rule set.
    pub fn child(&mut self, parent: usize, dir_path: &Path, overrides: DirOverride) -> usize {
        let (mut dot_ignore_filenames, mut rules, max_file_size, cross_filesystem, root_device) = {
            let p = &self.contexts[parent];
            let dot_ignore_filenames = if overrides.drop_parent_dot_ignore_filenames {
                Vec::new()
            } else {
                p.effective_dot_ignore_filenames.clone()
            };
            let rules = if overrides.drop_parent_rules {
                Vec::new()
            } else {
                p.effective_rules.clone()
            };
            (
                dot_ignore_filenames,
                rules,
                overrides.max_file_size.or(p.max_file_size),
                overrides.cross_filesystem.unwrap_or(p.cross_filesystem),
                p.root_device,
            )
        };

        dot_ignore_filenames.extend(overrides.extra_dot_ignore_filenames.iter().cloned());
        for name in &dot_ignore_filenames {
            if let Ok(content) = fs::read_to_string(dir_path.join(name)) {
                rules.extend(content.lines().filter_map(parse_rule));
            }
        }
        rules.extend(overrides.extra_rules.iter().filter_map(|s| parse_rule(s)));

        self.contexts.push(IgnoreContext {
            effective_rules: rules,
            effective_dot_ignore_filenames: dot_ignore_filenames,
            max_file_size,
            cross_filesystem,
            root_device,
        });
        self.contexts.len() - 1
    }

    /// Decide whether an entry at `rel_path` (relative to the
    /// directory that owns `ctx`, `/`-separated) should be included.
    /// `size` is the file's logical size, if known; `device` is the
    /// device id the entry resides on, if known.
    pub fn classify(
        &self,
        ctx: usize,
        rel_path: &str,
        is_dir: bool,
        size: Option<u64>,
        device: Option<u64>,
    ) -> Decision {
        let ctx = &self.contexts[ctx];
        let mut decision = Decision::Included;
        for rule in &ctx.effective_rules {
            if rule.matches(rel_path, is_dir) {
                decision = if rule.negated {
                    Decision::Included
                } else {
                    Decision::Excluded
                };
            }
        }
        if decision == Decision::Excluded {
            return decision;
        }
        if let (Some(cap), Some(actual)) = (ctx.max_file_size, size) {
            if actual > cap {
                return Decision::Excluded;
            }
        }
        if !ctx.cross_filesystem {
            if let (Some(root_dev), Some(entry_dev)) = (ctx.root_device, device) {
                if root_dev != entry_dev {
                    return Decision::Excluded;
                }
            }
        }
        Decision::Included
    }
}

/// Whether `dir` contains a valid `CACHEDIR.TAG` marker (the
/// convention cache directories use to opt out of backup tools).
/// Read errors are treated as "not a cache directory", not an error:
/// a missing or unreadable tag file is the overwhelmingly common case
/// and shouldn't abort a walk.
pub fn is_cache_dir(dir: &Path) -> bool {
    match fs::read(dir.join("CACHEDIR.TAG")) {
        Ok(bytes) => bytes.starts_with(CACHEDIR_TAG_SIGNATURE),
        Err(_) => false,
    }
}
