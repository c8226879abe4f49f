//! Error types. Malformed input and broken storage are errors; failing to find lines that satisfy
//! a form is not, and is reported as an absent poem instead (see `generation.rs`).

use crate::types::RhymeGroupId;

/// Problems with the shape of a form specification. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("Rhyme string is not valid: {0}")]
    RhymeFormat(String),

    #[error("Syllable string is not valid: {0}")]
    SyllableFormat(String),

    #[error("Regex string is not valid: {0}")]
    RegexFormat(String),

    #[error("No valid rhyme or form option specified")]
    MissingFormOrRhyme,

    #[error("Unknown transform: {0}")]
    UnknownTransform(String),
}

/// Problems with the corpus store itself. Retrying can't fix these.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Corpus does not exist: {path}")]
    MissingCorpus { path: String },

    #[error("Corpus contains invalid structure: {message}")]
    InvalidStructure { message: String },

    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("Can’t read file: “{path}”")]
    Io { path: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        StorageError::Sqlite {
            message: error.to_string(),
        }
    }
}

/// A single generation attempt couldn't be completed. The generator retries these with fresh
/// randomization before giving up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Not enough rhyming lines in the input for rhyme group '{rhyme_group}'")]
    InsufficientData { rhyme_group: RhymeGroupId },

    #[error("Generation was aborted")]
    Aborted,
}

/// Problems loading settings or form files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Can’t read file: “{path}”")]
    Unreadable { path: String },

    #[error("Invalid TOML in “{path}”: {message}")]
    Toml { path: String, message: String },

    #[error("Invalid JSON in “{path}”: {message}")]
    Json { path: String, message: String },

    #[error("Invalid value for “{field}”: {message}")]
    InvalidField { field: String, message: String },
}

/// A per-line transform couldn't be applied. These never escape poem assembly; the line is left
/// as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transform “{name}” failed on line {line}: {reason}")]
pub struct TransformError {
    pub name: String,
    pub line: usize,
    pub reason: String,
}

/// Any error surfaced by the library.
#[derive(Debug, thiserror::Error)]
pub enum PoemError {
    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PoemError {
    /// The longer message shown to people running the command-line tool.
    #[must_use]
    pub fn console_message(&self) -> String {
        match self {
            PoemError::Form(FormError::MissingFormOrRhyme) => [
                "ERROR: No valid rhyme or form option specified.",
                "       Try again using the -f or -r option.",
                "       Use `verse forms` to view valid forms.",
            ]
            .join("\n"),
            PoemError::Generation(GenerationError::InsufficientData { .. }) => [
                "ERROR: Not enough rhyming lines in the input.",
                "       Perhaps try again using the --no-proper option.",
            ]
            .join("\n"),
            other => format!("ERROR: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{FormError, GenerationError, PoemError, StorageError};

    #[test]
    fn test_console_messages() {
        let missing: PoemError = FormError::MissingFormOrRhyme.into();
        assert!(missing.console_message().contains("-f or -r"));

        let insufficient: PoemError = GenerationError::InsufficientData { rhyme_group: 'a' }.into();
        assert!(insufficient.console_message().starts_with("ERROR: Not enough"));

        let storage: PoemError = StorageError::MissingCorpus {
            path: "nowhere.db".into(),
        }
        .into();
        assert_eq!(
            storage.console_message(),
            "ERROR: Corpus does not exist: nowhere.db"
        );
    }
}
