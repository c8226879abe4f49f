//! Turning raw text lines into annotated corpus rows. The heuristics here are deliberately simple
//! English-spelling rules; anything smarter can be plugged in through the `Annotator` trait.

use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::corpus::CorpusLine;

/// What an annotator knows about a line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub syllables: u32,
    pub final_word: String,

    /// Every rhyme class the line's ending could belong to. Lines with more than one produce one
    /// corpus row per key; lines with none can't be used in rhyming positions.
    pub rhyme_keys: Vec<String>,
}

pub trait Annotator {
    fn annotate(&self, text: &str) -> Annotation;
}

/// Decides which lines are allowed into a corpus.
pub trait ContentFilter {
    fn is_clean(&self, text: &str) -> bool;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl ContentFilter for NoFilter {
    fn is_clean(&self, _text: &str) -> bool {
        true
    }
}

/// Rejects any line containing one of a set of words.
#[derive(Debug, Clone, Default)]
pub struct BlocklistFilter {
    words: HashSet<String>,
}

impl BlocklistFilter {
    pub fn new<S: AsRef<str>>(words: impl IntoIterator<Item = S>) -> BlocklistFilter {
        BlocklistFilter {
            words: words
                .into_iter()
                .map(|word| normalize_word(word.as_ref()))
                .filter(|word| !word.is_empty())
                .collect(),
        }
    }
}

impl ContentFilter for BlocklistFilter {
    fn is_clean(&self, text: &str) -> bool {
        !text
            .split_whitespace()
            .any(|word| self.words.contains(&normalize_word(word)))
    }
}

/// Lowercase a word and strip anything that isn't a letter, digit or inner apostrophe.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    word.nfc()
        .filter(|c| c.is_alphanumeric() || *c == '\'' || *c == '’')
        .collect::<String>()
        .trim_matches(['\'', '’'])
        .to_lowercase()
}

/// Clean up a raw line before it's stored: normalize Unicode, turn non-breaking spaces into plain
/// ones, and trim.
#[must_use]
pub fn normalize_line(raw: &str) -> String {
    raw.nfc()
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_vowel(c: char) -> bool {
    matches!(
        c,
        'a' | 'e' | 'i' | 'o' | 'u' | 'y' | 'à' | 'á' | 'â' | 'ä' | 'è' | 'é' | 'ê' | 'ë' | 'ì'
            | 'í' | 'î' | 'ï' | 'ò' | 'ó' | 'ô' | 'ö' | 'ù' | 'ú' | 'û' | 'ü'
    )
}

/// Start indices of each run of vowels in a word.
fn vowel_groups(chars: &[char]) -> Vec<usize> {
    let mut starts = vec![];
    let mut in_group = false;
    for (idx, &c) in chars.iter().enumerate() {
        // A leading "y" is a consonant ("yes", "young").
        let vowel = is_vowel(c) && !(c == 'y' && idx == 0);
        if vowel && !in_group {
            starts.push(idx);
        }
        in_group = vowel;
    }
    starts
}

/// Is the trailing "e" of this word silent ("make", "stone") rather than sounded ("the", "able")?
fn has_silent_e(chars: &[char], groups: &[usize]) -> bool {
    let len = chars.len();
    len > 2
        && groups.len() > 1
        && chars[len - 1] == 'e'
        && !is_vowel(chars[len - 2])
        && !(chars[len - 2] == 'l' && !is_vowel(chars[len - 3]))
}

/// Estimate the syllables in a single normalized word.
#[must_use]
pub fn word_syllables(word: &str) -> u32 {
    let chars: Vec<char> = word.chars().filter(|c| c.is_alphanumeric()).collect();
    if chars.is_empty() {
        return 0;
    }
    if chars.iter().all(char::is_ascii_digit) {
        return chars.len() as u32;
    }

    let groups = vowel_groups(&chars);
    let mut count = groups.len() as u32;
    if has_silent_e(&chars, &groups) {
        count -= 1;
    }
    count.max(1)
}

/// The ending a word rhymes on: its last sounded vowel group and everything after it.
#[must_use]
pub fn rhyme_key(word: &str) -> Option<String> {
    let chars: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if chars.is_empty() {
        return None;
    }

    let groups = vowel_groups(&chars);
    let start = match groups.len() {
        0 => 0,
        n if has_silent_e(&chars, &groups) => groups[n - 2],
        n => groups[n - 1],
    };
    Some(chars[start..].iter().collect())
}

/// Spelling-based syllable and rhyme estimates.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnnotator;

impl Annotator for HeuristicAnnotator {
    fn annotate(&self, text: &str) -> Annotation {
        let words: Vec<String> = text
            .split_whitespace()
            .map(normalize_word)
            .filter(|word| !word.is_empty())
            .collect();

        let syllables = words.iter().map(|word| word_syllables(word)).sum();
        let final_word = words.last().cloned().unwrap_or_default();

        // A line ending in a number doesn't have a spelled-out ending to rhyme on.
        let ends_in_digit = text
            .trim_end()
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_digit());
        let rhyme_keys = if ends_in_digit {
            vec![]
        } else {
            rhyme_key(&final_word).into_iter().collect()
        };

        Annotation {
            syllables,
            final_word,
            rhyme_keys,
        }
    }
}

/// Annotate raw lines into corpus rows, dropping blank lines and anything the filter rejects.
/// A line with several rhyme keys yields one row per key.
pub fn annotate_lines<'a>(
    raw_lines: impl IntoIterator<Item = &'a str>,
    annotator: &dyn Annotator,
    filter: &dyn ContentFilter,
) -> Vec<CorpusLine> {
    let mut rows = vec![];
    for raw in raw_lines {
        let text = normalize_line(raw);
        if text.is_empty() || !filter.is_clean(&text) {
            continue;
        }

        let annotation = annotator.annotate(&text);
        for rhyme_key in annotation.rhyme_keys {
            rows.push(CorpusLine {
                text: text.clone(),
                syllables: annotation.syllables,
                final_word: annotation.final_word.clone(),
                rhyme_key,
            });
        }
    }
    rows
}
