//! Settings for the generator, and form specifications loaded from TOML or JSON files.

use serde::{Deserialize, Deserializer, Serializer};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{ConfigError, PoemError};
use crate::form_config::FormSpec;
use crate::transform::{Transform, TransformMap};
use crate::types::LineNumber;
use crate::{DEFAULT_SEARCH_TIMEOUT, INDENT_UNIT, MAX_GENERATION_ATTEMPTS};

/// Knobs for the generation process itself, as opposed to the form of the poem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSettings {
    /// How long to search a single rhyme key before moving on to the next one.
    #[serde(rename = "search_timeout_ms", with = "duration_millis")]
    pub search_timeout: Duration,

    pub max_attempts: usize,
    pub indent_unit: String,

    /// Fixes the randomization, so the same corpus and form always give the same poem.
    pub seed: Option<u64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            max_attempts: MAX_GENERATION_ATTEMPTS,
            indent_unit: INDENT_UNIT.to_string(),
            seed: None,
        }
    }
}

mod duration_millis {
    use super::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|_| ConfigError::Unreadable {
        path: path.display().to_string(),
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}

/// Parse a file as JSON if it has a `.json` extension, and as TOML otherwise.
fn parse_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let contents = read_file(path)?;
    let display = path.display().to_string();
    if is_json(path) {
        serde_json::from_str(&contents).map_err(|error| ConfigError::Json {
            path: display,
            message: error.to_string(),
        })
    } else {
        toml::from_str(&contents).map_err(|error| ConfigError::Toml {
            path: display,
            message: error.to_string(),
        })
    }
}

impl GenerationSettings {
    pub fn from_toml_str(contents: &str) -> Result<GenerationSettings, ConfigError> {
        toml::from_str(contents).map_err(|error| ConfigError::Toml {
            path: "<string>".into(),
            message: error.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Result<GenerationSettings, ConfigError> {
        parse_file(path)
    }
}

/// A syllable spec can be written as a bare number as well as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecText {
    Number(i64),
    Text(String),
}

impl SpecText {
    fn into_string(self) -> String {
        match self {
            SpecText::Number(number) => number.to_string(),
            SpecText::Text(text) => text,
        }
    }
}

/// One transform name or several, applied in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformNames {
    One(String),
    Many(Vec<String>),
}

impl TransformNames {
    fn names(&self) -> &[String] {
        match self {
            TransformNames::One(name) => std::slice::from_ref(name),
            TransformNames::Many(names) => names,
        }
    }
}

/// Transforms for every line, or keyed by line number (negative numbers count from the end).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformSpec {
    EveryLine(TransformNames),
    ByLine(BTreeMap<String, TransformNames>),
}

/// A form specification as written in a file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormFile {
    pub form: Option<String>,
    pub rhyme: Option<String>,
    pub syllable: Option<SpecText>,
    pub regex: Option<String>,
    pub indent: Option<String>,
    pub acrostic: Option<String>,
    pub acrostic_x: Option<String>,
    pub transform: Option<TransformSpec>,
    pub proper: Option<bool>,
    pub exact: BTreeMap<String, String>,
}

fn parse_line_key<T: std::str::FromStr>(field: &str, key: &str) -> Result<T, ConfigError> {
    key.trim().parse().map_err(|_| ConfigError::InvalidField {
        field: field.to_string(),
        message: format!("{key:?} is not a line number"),
    })
}

impl FormFile {
    pub fn from_path(path: &Path) -> Result<FormFile, ConfigError> {
        parse_file(path)
    }

    pub fn from_toml_str(contents: &str) -> Result<FormFile, ConfigError> {
        toml::from_str(contents).map_err(|error| ConfigError::Toml {
            path: "<string>".into(),
            message: error.to_string(),
        })
    }

    /// Convert into a `FormSpec`, resolving transform names. Transforms given without line
    /// numbers apply to every line.
    pub fn into_form_spec(self) -> Result<FormSpec, PoemError> {
        let mut transform = TransformMap::new();
        match &self.transform {
            None => {}
            Some(TransformSpec::EveryLine(names)) => {
                for name in names.names() {
                    transform.add_to_every_line(Transform::from_name(name)?);
                }
            }
            Some(TransformSpec::ByLine(by_line)) => {
                for (key, names) in by_line {
                    let line: i64 = parse_line_key("transform", key)?;
                    for name in names.names() {
                        transform.add(line, Transform::from_name(name)?);
                    }
                }
            }
        }

        let mut exact: BTreeMap<LineNumber, String> = BTreeMap::new();
        for (key, text) in self.exact {
            let line: LineNumber = parse_line_key("exact", &key)?;
            if line == 0 {
                return Err(ConfigError::InvalidField {
                    field: "exact".into(),
                    message: "line numbers start at 1".into(),
                }
                .into());
            }
            exact.insert(line, text);
        }

        let defaults = FormSpec::default();
        Ok(FormSpec {
            form: self.form,
            rhyme: self.rhyme,
            syllable: self.syllable.map(SpecText::into_string),
            regex: self.regex,
            indent: self.indent,
            acrostic: self.acrostic,
            acrostic_x: self.acrostic_x,
            transform,
            exact,
            proper: self.proper.unwrap_or(defaults.proper),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{FormFile, GenerationSettings, SpecText};
    use crate::errors::{ConfigError, FormError, PoemError};
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_settings_defaults_and_overrides() {
        let defaults = GenerationSettings::from_toml_str("").unwrap();
        assert_eq!(defaults, GenerationSettings::default());
        assert_eq!(defaults.search_timeout, Duration::from_secs(2));
        assert_eq!(defaults.max_attempts, 10);

        let settings = GenerationSettings::from_toml_str(
            "search_timeout_ms = 250\nmax_attempts = 3\nindent_unit = \"\\t\"\nseed = 42\n",
        )
        .unwrap();
        assert_eq!(settings.search_timeout, Duration::from_millis(250));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.indent_unit, "\t");
        assert_eq!(settings.seed, Some(42));

        assert!(matches!(
            GenerationSettings::from_toml_str("timeout = 3"),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn test_form_file_from_toml() {
        let file = FormFile::from_toml_str(
            r#"
            rhyme = "aabba"
            syllable = "{1:8,2:8,5:8}"
            proper = false

            [transform]
            1 = "upcase"
            -1 = ["end_sentence", "capitalize"]

            [exact]
            3 = "Here is a fixed line"
            "#,
        )
        .unwrap();

        let spec = file.into_form_spec().unwrap();
        assert_eq!(spec.rhyme.as_deref(), Some("aabba"));
        assert!(!spec.proper);
        assert_eq!(spec.exact[&3], "Here is a fixed line");

        let transforms = spec.transform.resolve(5);
        let names = |line: usize| -> Vec<&str> {
            transforms[&line].iter().map(|transform| transform.name()).collect()
        };
        assert_eq!(names(1), vec!["upcase"]);
        assert_eq!(names(5), vec!["end_sentence", "capitalize"]);
    }

    #[test]
    fn test_form_file_from_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"form": "sonnet", "syllable": 10, "transform": "capitalize"}}"#
        )
        .unwrap();

        let form_file = FormFile::from_path(file.path()).unwrap();
        assert_eq!(form_file.syllable, Some(SpecText::Number(10)));

        let spec = form_file.into_form_spec().unwrap();
        assert_eq!(spec.syllable.as_deref(), Some("10"));
        assert!(spec.proper);
        assert_eq!(spec.transform.resolve(14).len(), 14);
    }

    #[test]
    fn test_form_file_errors() {
        let unknown = FormFile::from_toml_str("transform = \"reverse\"")
            .unwrap()
            .into_form_spec()
            .unwrap_err();
        assert!(matches!(
            unknown,
            PoemError::Form(FormError::UnknownTransform(_))
        ));

        let bad_key = FormFile::from_toml_str("[exact]\nfirst = \"x\"")
            .unwrap()
            .into_form_spec()
            .unwrap_err();
        assert!(matches!(
            bad_key,
            PoemError::Config(ConfigError::InvalidField { .. })
        ));

        assert!(matches!(
            FormFile::from_path(std::path::Path::new("/definitely/not/here.toml")),
            Err(ConfigError::Unreadable { .. })
        ));
        assert!(matches!(
            FormFile::from_toml_str("colour = \"red\""),
            Err(ConfigError::Toml { .. })
        ));
    }
}
