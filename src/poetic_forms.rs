//! Named poetic forms, plus helpers for building acrostic constraints.
//!
//! Rhyme strings use one token per line: lowercase letters rhyme with each other, uppercase
//! letters are refrains that repeat a line exactly, digits after an uppercase letter pick which
//! refrain to repeat, and a space is an empty line. Indent strings give each line's indent level
//! as a digit.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::errors::FormError;
use crate::line_spec::{LinePattern, RegexMap};
use crate::transform::{Transform, TransformMap};

/// A named form. Where a form lists more than one rhyme or indent string, one is picked at random
/// for each generation attempt.
#[derive(Debug, Clone)]
pub struct PoeticForm {
    pub rhyme: &'static [&'static str],
    pub indent: &'static [&'static str],
    pub syllable: &'static str,
    pub regex: &'static str,
}

const fn form(
    rhyme: &'static [&'static str],
    indent: &'static [&'static str],
    syllable: &'static str,
    regex: &'static str,
) -> PoeticForm {
    PoeticForm {
        rhyme,
        indent,
        syllable,
        regex,
    }
}

lazy_static! {
    static ref POETIC_FORMS: HashMap<&'static str, PoeticForm> = {
        let forms: Vec<(&str, PoeticForm)> = vec![
            ("default", form(&["a"], &["0"], "", "")),
            ("rondeau", form(&["aabba aabR aabbaR"], &[], "", "")),
            (
                "villanelle",
                form(
                    &["A1bA2 abA1 abA2 abA1 abA2 abA1A2"],
                    &["010 001 001 001 001 0011"],
                    "",
                    "",
                ),
            ),
            ("ballade", form(&["ababbcbC ababbcbC ababbcbC bcbC"], &[], "", "")),
            (
                "ballata",
                form(&["AbbaA", "AbbaAbbaA", "AbbaAbbaAbbaA"], &[], "", ""),
            ),
            ("sonnet", form(&["ababcdcdefefgg"], &[], "", "")),
            (
                "petrarchan",
                form(
                    &[
                        "abbaabbacdecde",
                        "abbaabbacdccdc",
                        "abbaabbacddcdd",
                        "abbaabbacddece",
                        "abbaabbacdcdcd",
                    ],
                    &["01100110010010", "10001000100100"],
                    "",
                    "",
                ),
            ),
            (
                "limerick",
                form(&["aabba"], &[], "{1:[8],2:[8],3:[4,5],4:[4,5],5:[8]}", ""),
            ),
            ("haiku", form(&["abc"], &[], "[5,7,5]", "")),
            ("common", form(&["abcb"], &["0101"], "[8,6,8,6]", "")),
            ("ballad", form(&["abab"], &["0101"], "[8,6,8,6]", "")),
            (
                "double_dactyl",
                form(
                    &["abcd efgd"],
                    &[],
                    "[6,6,6,4,0,6,6,6,4]",
                    r"{7=>/^\S+$/}",
                ),
            ),
        ];
        forms.into_iter().collect()
    };
}

#[must_use]
pub fn named_form(name: &str) -> Option<&'static PoeticForm> {
    POETIC_FORMS.get(name.trim().to_lowercase().as_str())
}

/// The names of every known form, sorted.
#[must_use]
pub fn form_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = POETIC_FORMS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// A pattern requiring a line to start with `letter`, in either case.
fn starts_with_letter(letter: char) -> Result<LinePattern, FormError> {
    if letter.is_alphanumeric() {
        let upper: String = letter.to_uppercase().collect();
        let lower: String = letter.to_lowercase().collect();
        LinePattern::new(&format!("^[{upper}{lower}]"))
    } else if r"\.+*?()|[]{}^$#&-~".contains(letter) {
        LinePattern::new(&format!(r"^\{letter}"))
    } else {
        LinePattern::new(&format!("^{letter}"))
    }
}

/// Regexes making the first letters of successive lines spell out `word`. Spaces in `word` skip a
/// line without constraining it.
pub fn acrostic(word: &str) -> Result<RegexMap, FormError> {
    let mut regexes = RegexMap::default();
    for (idx, letter) in word.chars().enumerate() {
        if letter != ' ' {
            regexes.push(idx + 1, starts_with_letter(letter)?);
        }
    }
    Ok(regexes)
}

/// Like `acrostic`, but an "x" is satisfied by a line starting with "ex", which is then rewritten
/// to start with a capital X ("explain" becomes "Xplain").
pub fn acrostic_x(word: &str) -> Result<(RegexMap, TransformMap), FormError> {
    let mut regexes = RegexMap::default();
    let mut transforms = TransformMap::new();

    for (idx, letter) in word.chars().enumerate() {
        let line = idx + 1;
        if letter == ' ' {
            continue;
        }
        if letter.eq_ignore_ascii_case(&'x') {
            regexes.push(line, LinePattern::new("^[Ee][Xx]")?);
            transforms.add(
                line as i64,
                Transform::custom("acrostic_x", |text, _, _| {
                    let mut chars = text.chars();
                    match (chars.next(), chars.next()) {
                        (Some('e' | 'E'), Some('x' | 'X')) => Ok(format!("X{}", chars.as_str())),
                        _ => Err(format!("{text:?} doesn't start with \"ex\"")),
                    }
                }),
            );
        } else {
            regexes.push(line, starts_with_letter(letter)?);
        }
    }

    Ok((regexes, transforms))
}

#[cfg(test)]
mod tests {
    use crate::line_spec::{RegexMap, SyllableMap};
    use crate::poetic_forms::{acrostic, acrostic_x, form_names, named_form};
    use crate::rhyme_pattern::tokenize_rhyme;

    #[test]
    fn test_every_named_form_is_well_formed() {
        for name in form_names() {
            let form = named_form(name).unwrap();
            assert!(!form.rhyme.is_empty(), "{name} has no rhyme string");

            for rhyme in form.rhyme {
                let line_count = tokenize_rhyme(rhyme)
                    .unwrap_or_else(|_| panic!("{name} has a bad rhyme string"))
                    .len();
                assert!(SyllableMap::parse(form.syllable, line_count).is_ok());
                assert!(RegexMap::parse(form.regex, line_count).is_ok());
            }
        }
    }

    #[test]
    fn test_named_form_lookup() {
        assert_eq!(named_form("Sonnet").unwrap().rhyme, &["ababcdcdefefgg"]);
        assert_eq!(named_form("ballata").unwrap().rhyme.len(), 3);
        assert!(named_form("epic").is_none());
        assert!(form_names().contains(&"villanelle"));
    }

    #[test]
    fn test_double_dactyl_constraints() {
        let form = named_form("double_dactyl").unwrap();
        let syllables = SyllableMap::parse(form.syllable, 9).unwrap();
        assert_eq!(syllables.constraint(5), None);
        assert!(syllables.constraint(4).unwrap().contains(&4));

        let regexes = RegexMap::parse(form.regex, 9).unwrap();
        assert!(regexes.patterns(7)[0].is_match("Paraheliotropic"));
        assert!(!regexes.patterns(7)[0].is_match("Para heliotropic"));
    }

    #[test]
    fn test_acrostic() {
        let regexes = acrostic("ab c").unwrap();
        assert!(regexes.patterns(1)[0].is_match("Apple"));
        assert!(regexes.patterns(2)[0].is_match("banana"));
        assert!(regexes.patterns(3).is_empty());
        assert!(regexes.patterns(4)[0].is_match("cherry"));
        assert!(!regexes.patterns(4)[0].is_match("Durian"));

        let punctuated = acrostic("a.").unwrap();
        assert!(punctuated.patterns(2)[0].is_match(". and so"));
        assert!(!punctuated.patterns(2)[0].is_match("and so"));
    }

    #[test]
    fn test_acrostic_x() {
        let (regexes, transforms) = acrostic_x("ax").unwrap();
        assert!(regexes.patterns(1)[0].is_match("a line"));
        assert!(regexes.patterns(2)[0].is_match("Explain it"));
        assert!(!regexes.patterns(2)[0].is_match("Xylophone"));

        let resolved = transforms.resolve(2);
        let transform = &resolved[&2][0];
        assert_eq!(transform.apply("explain it", 2, &[]).unwrap(), "Xplain it");
        assert!(transform.apply("plain", 2, &[]).is_err());
        assert!(!resolved.contains_key(&1));
    }
}
