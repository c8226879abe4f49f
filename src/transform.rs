//! Per-line text transforms, run over a finished draft before indentation.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::errors::{FormError, TransformError};
use crate::types::LineNumber;

/// The signature of a caller-supplied transform: the line's current text, its 1-based position,
/// and the whole draft as it stands.
pub type TransformFn =
    dyn Fn(&str, LineNumber, &[Option<String>]) -> Result<String, String> + Send + Sync;

#[derive(Clone)]
pub enum Transform {
    Upcase,
    Downcase,
    Capitalize,
    EndSentence,
    Custom {
        name: String,
        function: Arc<TransformFn>,
    },
}

impl Debug for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Transform({})", self.name())
    }
}

impl Transform {
    pub fn from_name(name: &str) -> Result<Transform, FormError> {
        match name.trim().to_lowercase().as_str() {
            "upcase" | "uppercase" => Ok(Transform::Upcase),
            "downcase" | "lowercase" => Ok(Transform::Downcase),
            "capitalize" | "capitalise" => Ok(Transform::Capitalize),
            "end_sentence" => Ok(Transform::EndSentence),
            _ => Err(FormError::UnknownTransform(name.to_string())),
        }
    }

    pub fn custom<F>(name: &str, function: F) -> Transform
    where
        F: Fn(&str, LineNumber, &[Option<String>]) -> Result<String, String> + Send + Sync + 'static,
    {
        Transform::Custom {
            name: name.to_string(),
            function: Arc::new(function),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Transform::Upcase => "upcase",
            Transform::Downcase => "downcase",
            Transform::Capitalize => "capitalize",
            Transform::EndSentence => "end_sentence",
            Transform::Custom { name, .. } => name,
        }
    }

    pub fn apply(
        &self,
        text: &str,
        line: LineNumber,
        draft: &[Option<String>],
    ) -> Result<String, TransformError> {
        let result = match self {
            Transform::Upcase => Ok(text.to_uppercase()),
            Transform::Downcase => Ok(text.to_lowercase()),
            Transform::Capitalize => capitalize_first(text),
            Transform::EndSentence => Ok(end_the_sentence(text)),
            Transform::Custom { function, .. } => function(text, line, draft),
        };

        result.map_err(|reason| TransformError {
            name: self.name().to_string(),
            line,
            reason,
        })
    }
}

/// Unicode dashes and quotes count alongside ASCII punctuation when looking at line endings.
fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || "—–…‘’“”«»".contains(c)
}

fn capitalize_first(text: &str) -> Result<String, String> {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => Ok(first.to_uppercase().chain(chars).collect()),
        None => Err("line is empty".into()),
    }
}

/// Make a line finish like the end of a sentence. Trailing commas, colons, semicolons and hyphens
/// become a full stop and dashes are dropped; a line with no trailing punctuation gets a full
/// stop appended.
#[must_use]
pub fn end_the_sentence(text: &str) -> String {
    let body = text.trim_end_matches(is_punctuation);
    let trailing = &text[body.len()..];
    if trailing.is_empty() {
        return format!("{text}.");
    }

    let swapped: String = trailing
        .chars()
        .filter(|c| !matches!(c, '—' | '–'))
        .map(|c| if matches!(c, ',' | ':' | ';' | '-') { '.' } else { c })
        .collect();
    format!("{body}{swapped}")
}

/// Transforms keyed by line. Positive keys count from the first line and negative keys from the
/// last; `every_line` runs after the keyed transforms on each line.
#[derive(Debug, Clone, Default)]
pub struct TransformMap {
    by_line: BTreeMap<i64, Vec<Transform>>,
    every_line: Vec<Transform>,
}

impl TransformMap {
    #[must_use]
    pub fn new() -> TransformMap {
        TransformMap::default()
    }

    /// Add a transform for one line. Key `0` doesn't name a line and is ignored.
    pub fn add(&mut self, key: i64, transform: Transform) {
        if key != 0 {
            self.by_line.entry(key).or_default().push(transform);
        }
    }

    pub fn add_to_every_line(&mut self, transform: Transform) {
        self.every_line.push(transform);
    }

    /// Append another map's transforms after this one's.
    pub fn extend(&mut self, other: TransformMap) {
        for (key, transforms) in other.by_line {
            self.by_line.entry(key).or_default().extend(transforms);
        }
        self.every_line.extend(other.every_line);
    }

    /// Resolve every key against a poem of `line_count` lines. Keys that land outside the poem
    /// are dropped.
    #[must_use]
    pub fn resolve(&self, line_count: usize) -> BTreeMap<LineNumber, Vec<Transform>> {
        let mut resolved: BTreeMap<LineNumber, Vec<Transform>> = BTreeMap::new();

        for (&key, transforms) in &self.by_line {
            let line = if key > 0 {
                key
            } else {
                line_count as i64 + 1 + key
            };
            if (1..=line_count as i64).contains(&line) {
                resolved
                    .entry(line as LineNumber)
                    .or_default()
                    .extend(transforms.iter().cloned());
            }
        }

        if !self.every_line.is_empty() {
            for line in 1..=line_count {
                resolved
                    .entry(line)
                    .or_default()
                    .extend(self.every_line.iter().cloned());
            }
        }

        resolved
    }
}
