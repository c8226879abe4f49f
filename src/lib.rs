pub mod annotation;
pub mod conditional_selection;
pub mod config;
pub mod corpus;
pub mod corpus_store;
pub mod errors;
pub mod form_config;
pub mod form_from_text;
pub mod generation;
pub mod line_spec;
pub mod poem_assembly;
pub mod poetic_forms;
pub mod rhyme_pattern;
pub mod rhyme_scheduler;
pub mod transform;
pub mod types;
pub mod util;

use std::time::Duration;

pub const CHECK_INVARIANTS: bool = cfg!(feature = "check_invariants");

/// How long a single rhyme key's search may run before we give up on it and move on to the next.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(2);

/// How many times we run the whole pipeline, with fresh randomization, before reporting that no
/// poem could be made.
pub const MAX_GENERATION_ATTEMPTS: usize = 10;

/// The string repeated once per indent level.
pub const INDENT_UNIT: &str = "  ";

/// The largest syllable count a line can be constrained to.
pub const MAX_SYLLABLES: u32 = 1000;

/// The expected maximum number of lines in a single rhyme group.
pub const MAX_GROUP_SIZE: usize = 16;
