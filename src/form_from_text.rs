//! Deriving a form from an existing text, such as a song lyric, so a new poem can be generated in
//! the same shape.

use std::collections::{BTreeMap, HashMap};

use crate::annotation::{normalize_line, Annotator};
use crate::errors::FormError;
use crate::form_config::FormSpec;
use crate::line_spec::{SyllableMap, SyllableSet};
use crate::types::LineNumber;
use crate::util::ordered_by_distance;

/// Letters handed out to rhyme keys, in order. Final sigma is skipped since it has no distinct
/// uppercase form for refrains.
fn rhyme_letters() -> impl Iterator<Item = char> {
    ('a'..='z').chain(('α'..='ω').filter(|&c| c != 'ς'))
}

/// Lowercase with punctuation removed, for spotting repeated lines.
fn refrain_text(line: &str) -> String {
    line.chars()
        .filter(|&c| !c.is_ascii_punctuation() && !"—–…‘’“”«»".contains(c))
        .collect::<String>()
        .to_lowercase()
}

fn is_bracketed(line: &str) -> bool {
    line.len() >= 2 && line.starts_with('[') && line.ends_with(']')
}

/// Drop runs of blank lines down to one, and drop a leading blank line entirely.
fn collapse_blank_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = vec![];
    let mut previous_blank = true;
    for line in text.lines().map(normalize_line) {
        let blank = line.is_empty();
        if !(blank && previous_blank) {
            lines.push(line);
        }
        previous_blank = blank;
    }
    lines
}

/// Pick one rhyme key per line. Where a line could rhyme several ways, prefer a key it shares with
/// the closest line that has one.
fn choose_rhyme_keys(candidates: &[Vec<String>]) -> Vec<Option<String>> {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, keys)| {
            if keys.len() <= 1 {
                return keys.first().cloned();
            }
            ordered_by_distance(candidates, idx)
                .find_map(|(_, other)| keys.iter().find(|key| other.contains(*key)))
                .or_else(|| keys.first())
                .cloned()
        })
        .collect()
}

/// Describe the shape of `text` as a form: one rhyme token per line, lines that repeat as
/// refrains, `[bracketed]` lines kept verbatim, and each line's syllable count.
pub fn form_from_text(text: &str, annotator: &dyn Annotator) -> Result<FormSpec, FormError> {
    let lines = collapse_blank_lines(text);

    let mut repeat_counts: HashMap<String, usize> = HashMap::new();
    for line in &lines {
        *repeat_counts.entry(refrain_text(line)).or_default() += 1;
    }

    let annotations: Vec<_> = lines.iter().map(|line| annotator.annotate(line)).collect();
    let rhyme_keys = choose_rhyme_keys(
        &annotations
            .iter()
            .map(|annotation| annotation.rhyme_keys.clone())
            .collect::<Vec<_>>(),
    );

    let mut letters = rhyme_letters();
    let mut letter_for_key: HashMap<String, char> = HashMap::new();
    let mut refrain_numbers: HashMap<String, usize> = HashMap::new();

    let mut rhyme = String::new();
    let mut syllables: BTreeMap<LineNumber, SyllableSet> = BTreeMap::new();
    let mut exact: BTreeMap<LineNumber, String> = BTreeMap::new();

    for (idx, line) in lines.iter().enumerate() {
        let position = idx + 1;

        if is_bracketed(line) {
            exact.insert(position, line.clone());
            rhyme.push(' ');
            continue;
        }

        let normalized = refrain_text(line);
        let key = rhyme_keys[idx].as_ref().filter(|_| !normalized.trim().is_empty());
        let Some(key) = key else {
            rhyme.push(' ');
            continue;
        };

        let letter = match letter_for_key.get(key) {
            Some(&letter) => letter,
            None => {
                let letter = letters.next().ok_or_else(|| {
                    FormError::RhymeFormat("text has more rhyme groups than available letters".into())
                })?;
                letter_for_key.insert(key.clone(), letter);
                letter
            }
        };

        if repeat_counts.get(&normalized).copied().unwrap_or(0) > 1 {
            let next_number = refrain_numbers.len() + 1;
            let number = *refrain_numbers.entry(normalized).or_insert(next_number);
            rhyme.extend(letter.to_uppercase());
            rhyme.push_str(&number.to_string());
        } else {
            rhyme.push(letter);
        }

        if annotations[idx].syllables > 0 {
            syllables.insert(position, [annotations[idx].syllables].into());
        }
    }

    Ok(FormSpec {
        rhyme: Some(rhyme),
        syllable: (!syllables.is_empty()).then(|| SyllableMap::from_lines(syllables).to_string()),
        exact,
        ..FormSpec::default()
    })
}

#[cfg(test)]
mod tests {
    use crate::annotation::{Annotation, Annotator, HeuristicAnnotator};
    use crate::errors::FormError;
    use crate::form_config::compile_form;
    use crate::form_from_text::form_from_text;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_couplets_blanks_and_exact_lines() {
        let text = "
The stars came out across the night.
I wandered far beyond the light.


A heron waited in the bay.
[Chorus]
The fishing boats had gone away.
";
        let spec = form_from_text(text, &HeuristicAnnotator).unwrap();
        assert_eq!(spec.rhyme.as_deref(), Some("aa b b"));
        assert_eq!(spec.exact[&5], "[Chorus]");
        assert!(spec.proper);

        let form = compile_form(&spec.proper(false), &mut SmallRng::seed_from_u64(0)).unwrap();
        assert_eq!(form.line_count(), 6);
        assert_eq!(form.slots[0].syllable_set, Some([8].into()));
        assert_eq!(form.slots[2].syllable_set, None);
        assert_eq!(form.slots[4].syllable_set, None);
        assert_eq!(form.slots[4].exact_text.as_deref(), Some("[Chorus]"));
    }

    #[test]
    fn test_repeated_lines_become_refrains() {
        let text = "Hold on to the night!\nWe sang in the light.\nHold on to the night.\nWe went away.";
        let spec = form_from_text(text, &HeuristicAnnotator).unwrap();
        assert_eq!(spec.rhyme.as_deref(), Some("A1aA1b"));
    }

    struct Keyed(Vec<(&'static str, Vec<&'static str>)>);

    impl Annotator for Keyed {
        fn annotate(&self, text: &str) -> Annotation {
            let keys = self
                .0
                .iter()
                .find(|(line, _)| *line == text)
                .map(|(_, keys)| keys.iter().map(|key| key.to_string()).collect())
                .unwrap_or_default();
            Annotation {
                syllables: 4,
                final_word: text.to_lowercase(),
                rhyme_keys: keys,
            }
        }
    }

    #[test]
    fn test_ambiguous_lines_follow_their_neighbours() {
        let annotator = Keyed(vec![
            ("one", vec!["x"]),
            ("two", vec!["y"]),
            ("three", vec!["z", "y"]),
            ("four", vec!["z"]),
        ]);
        // "three" could be "z" or "y"; "two" and "four" are equally close, and the line before
        // comes first.
        let spec = form_from_text("one\ntwo\nthree\nfour", &annotator).unwrap();
        assert_eq!(spec.rhyme.as_deref(), Some("abbc"));
    }

    #[test]
    fn test_too_many_rhyme_groups() {
        let lines: Vec<String> = (0..51).map(|n| format!("line {n}")).collect();
        struct Unique;
        impl Annotator for Unique {
            fn annotate(&self, text: &str) -> Annotation {
                Annotation {
                    syllables: 2,
                    final_word: text.into(),
                    rhyme_keys: vec![text.into()],
                }
            }
        }

        assert!(form_from_text(&lines[..50].join("\n"), &Unique).is_ok());
        assert!(matches!(
            form_from_text(&lines.join("\n"), &Unique),
            Err(FormError::RhymeFormat(_))
        ));
    }
}
