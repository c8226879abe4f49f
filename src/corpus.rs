//! The corpus of candidate lines that poems are assembled from, and the two queries generation
//! needs from it.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;

use crate::annotation::{annotate_lines, Annotator, ContentFilter};
use crate::errors::StorageError;
use crate::types::SyllableRange;

/// A single annotated line. A line with several possible rhyme keys is stored once per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorpusLine {
    pub text: String,
    pub syllables: u32,

    /// The lowercased last word of the line. No two lines in one rhyme group may share one.
    pub final_word: String,

    pub rhyme_key: String,
}

/// A rhyme key and how many distinct final words it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhymeKeyCount {
    pub rhyme_key: String,
    pub count: usize,
}

/// Read-only access to an annotated corpus.
pub trait CorpusIndex {
    /// Every rhyme key with at least `min_count` distinct final words, counting only lines whose
    /// syllables fall in `syllables` when it's given.
    fn rhyme_keys_with_min_endings(
        &self,
        min_count: usize,
        syllables: Option<SyllableRange>,
    ) -> Result<Vec<RhymeKeyCount>, StorageError>;

    /// Every line filed under `rhyme_key`, optionally restricted to a syllable range.
    fn lines_for_rhyme_key(
        &self,
        rhyme_key: &str,
        syllables: Option<SyllableRange>,
    ) -> Result<Vec<CorpusLine>, StorageError>;
}

fn in_range(line: &CorpusLine, syllables: Option<SyllableRange>) -> bool {
    syllables.map_or(true, |(min, max)| (min..=max).contains(&line.syllables))
}

/// A corpus held entirely in memory, indexed by rhyme key.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    lines_by_rhyme_key: BTreeMap<String, Vec<CorpusLine>>,
}

impl MemoryCorpus {
    #[must_use]
    pub fn new(lines: Vec<CorpusLine>) -> MemoryCorpus {
        let mut lines_by_rhyme_key: BTreeMap<String, Vec<CorpusLine>> = BTreeMap::new();
        for line in lines {
            lines_by_rhyme_key
                .entry(line.rhyme_key.clone())
                .or_default()
                .push(line);
        }
        MemoryCorpus { lines_by_rhyme_key }
    }

    /// Build a corpus from raw text, annotating and filtering each line.
    pub fn from_source(
        source: &CorpusSource,
        annotator: &dyn Annotator,
        filter: &dyn ContentFilter,
    ) -> Result<MemoryCorpus, StorageError> {
        let raw_lines = source.read_lines()?;
        Ok(MemoryCorpus::new(annotate_lines(
            raw_lines.iter().map(String::as_str),
            annotator,
            filter,
        )))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines_by_rhyme_key.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines_by_rhyme_key.is_empty()
    }
}

impl CorpusIndex for MemoryCorpus {
    fn rhyme_keys_with_min_endings(
        &self,
        min_count: usize,
        syllables: Option<SyllableRange>,
    ) -> Result<Vec<RhymeKeyCount>, StorageError> {
        Ok(self
            .lines_by_rhyme_key
            .iter()
            .filter_map(|(rhyme_key, lines)| {
                let count = lines
                    .iter()
                    .filter(|line| in_range(line, syllables))
                    .map(|line| line.final_word.as_str())
                    .collect::<BTreeSet<_>>()
                    .len();
                (count >= min_count && count > 0).then(|| RhymeKeyCount {
                    rhyme_key: rhyme_key.clone(),
                    count,
                })
            })
            .collect())
    }

    fn lines_for_rhyme_key(
        &self,
        rhyme_key: &str,
        syllables: Option<SyllableRange>,
    ) -> Result<Vec<CorpusLine>, StorageError> {
        Ok(self
            .lines_by_rhyme_key
            .get(rhyme_key)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|line| in_range(line, syllables))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Where the raw lines for a new corpus come from.
pub enum CorpusSource {
    Memory { lines: Vec<String> },
    File { path: OsString },
    FileContents { contents: &'static str },
}

impl CorpusSource {
    pub fn read_lines(&self) -> Result<Vec<String>, StorageError> {
        match self {
            CorpusSource::Memory { lines } => Ok(lines.clone()),
            CorpusSource::File { path } => fs::read_to_string(path)
                .map(|contents| contents.lines().map(String::from).collect())
                .map_err(|_| StorageError::Io {
                    path: path.to_string_lossy().into(),
                }),
            CorpusSource::FileContents { contents } => {
                Ok(contents.lines().map(String::from).collect())
            }
        }
    }
}
