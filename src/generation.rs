//! The generation entry point: compile, schedule, and assemble, retrying with fresh randomization
//! until a poem comes out or we run out of attempts.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GenerationSettings;
use crate::corpus::CorpusIndex;
use crate::errors::{GenerationError, PoemError};
use crate::form_config::{compile_form, FormSpec};
use crate::poem_assembly::assemble;
use crate::rhyme_scheduler::schedule;

/// What to do when a poem can't be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Malformed input and storage problems are returned as errors; a form the corpus can't
    /// satisfy gives `Ok(None)`.
    #[default]
    Raise,

    /// Every failure gives `Ok(None)`.
    ReturnAbsent,

    /// Every failure, including an unsatisfiable form, prints a message to stderr and exits the
    /// process with status 1.
    PrintAndExit,
}

pub struct Generator<C: CorpusIndex> {
    corpus: C,
    settings: GenerationSettings,
    abort: Option<Arc<AtomicBool>>,
}

impl<C: CorpusIndex> Generator<C> {
    pub fn new(corpus: C) -> Generator<C> {
        Generator::with_settings(corpus, GenerationSettings::default())
    }

    pub fn with_settings(corpus: C, settings: GenerationSettings) -> Generator<C> {
        Generator {
            corpus,
            settings,
            abort: None,
        }
    }

    /// Stop any generation in progress as soon as `abort` is set.
    #[must_use]
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Generator<C> {
        self.abort = Some(abort);
        self
    }

    /// Generate a poem, returning `Ok(None)` if the corpus can't satisfy the form.
    pub fn generate(&self, spec: &FormSpec) -> Result<Option<Vec<String>>, PoemError> {
        self.generate_with_policy(spec, ErrorPolicy::Raise)
    }

    pub fn generate_with_policy(
        &self,
        spec: &FormSpec,
        policy: ErrorPolicy,
    ) -> Result<Option<Vec<String>>, PoemError> {
        match (self.try_generate(spec), policy) {
            (Ok(poem), _) => Ok(Some(poem)),
            (Err(PoemError::Generation(_)), ErrorPolicy::Raise) => Ok(None),
            (Err(error), ErrorPolicy::Raise) => Err(error),
            (Err(_), ErrorPolicy::ReturnAbsent) => Ok(None),
            (Err(error), ErrorPolicy::PrintAndExit) => {
                eprintln!("{}", error.console_message());
                std::process::exit(1);
            }
        }
    }

    /// Run the whole pipeline up to `max_attempts` times. Only generation errors are retried; the
    /// last one is returned if every attempt fails.
    fn try_generate(&self, spec: &FormSpec) -> Result<Vec<String>, PoemError> {
        let start = Instant::now();
        let base_seed = self
            .settings
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen());
        let abort = self.abort.as_deref();

        let mut last_error = GenerationError::InsufficientData { rhyme_group: ' ' };

        for attempt in 0..self.settings.max_attempts.max(1) {
            let mut rng = SmallRng::seed_from_u64(base_seed.wrapping_add(attempt as u64));
            let form = compile_form(spec, &mut rng)?;

            let scheduled = match schedule(
                &form,
                &self.corpus,
                &mut rng,
                self.settings.search_timeout,
                abort,
            ) {
                Ok(scheduled) => scheduled,
                Err(PoemError::Generation(GenerationError::Aborted)) => {
                    return Err(GenerationError::Aborted.into());
                }
                Err(PoemError::Generation(error)) => {
                    debug!(attempt, %error, "Generation attempt failed");
                    last_error = error;
                    continue;
                }
                Err(error) => return Err(error),
            };

            if let Some(poem) = assemble(&form, scheduled.lines, &self.settings.indent_unit) {
                info!(
                    attempt,
                    states = scheduled.statistics.states,
                    backtracks = scheduled.statistics.backtracks,
                    search_time = ?scheduled.statistics.total_time,
                    total_time = ?start.elapsed(),
                    "Generated poem"
                );
                return Ok(poem);
            }
            debug!(attempt, "Assembled poem was empty");
        }

        warn!(
            attempts = self.settings.max_attempts,
            elapsed = ?start.elapsed(),
            "Couldn't generate a poem"
        );
        Err(last_error.into())
    }
}
