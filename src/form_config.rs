use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

use crate::corpus::CorpusLine;
use crate::errors::FormError;
use crate::line_spec::{expand_indent, LinePattern, RegexMap, SyllableMap, SyllableSet};
use crate::poetic_forms::{acrostic, acrostic_x, named_form};
use crate::rhyme_pattern::{tokenize_rhyme, RhymeToken};
use crate::transform::{Transform, TransformMap};
use crate::types::{LineNumber, RefrainId, RhymeGroupId};

/// Leading words a poem isn't allowed to open with in proper mode.
const BANNED_OPENING_WORDS: [&str; 5] = ["and", "but", "or", "nor", "yet"];

/// Everything a caller can say about the poem they want. Fields left as `None` fall back to the
/// named form, if there is one.
#[derive(Debug, Clone)]
pub struct FormSpec {
    pub form: Option<String>,
    pub rhyme: Option<String>,
    pub syllable: Option<String>,
    pub regex: Option<String>,
    pub indent: Option<String>,
    pub acrostic: Option<String>,
    pub acrostic_x: Option<String>,
    pub transform: TransformMap,

    /// Lines that are written out verbatim instead of being chosen from the corpus.
    pub exact: BTreeMap<LineNumber, String>,

    /// Ban conjunctions at the start of the poem and require it to end on stop punctuation.
    pub proper: bool,
}

impl Default for FormSpec {
    fn default() -> Self {
        FormSpec {
            form: None,
            rhyme: None,
            syllable: None,
            regex: None,
            indent: None,
            acrostic: None,
            acrostic_x: None,
            transform: TransformMap::new(),
            exact: BTreeMap::new(),
            proper: true,
        }
    }
}

impl FormSpec {
    #[must_use]
    pub fn named(form: &str) -> FormSpec {
        FormSpec {
            form: Some(form.to_string()),
            ..FormSpec::default()
        }
    }

    #[must_use]
    pub fn with_rhyme(rhyme: &str) -> FormSpec {
        FormSpec {
            rhyme: Some(rhyme.to_string()),
            ..FormSpec::default()
        }
    }

    #[must_use]
    pub fn syllable(mut self, syllable: &str) -> FormSpec {
        self.syllable = Some(syllable.to_string());
        self
    }

    #[must_use]
    pub fn regex(mut self, regex: &str) -> FormSpec {
        self.regex = Some(regex.to_string());
        self
    }

    #[must_use]
    pub fn indent(mut self, indent: &str) -> FormSpec {
        self.indent = Some(indent.to_string());
        self
    }

    #[must_use]
    pub fn acrostic(mut self, word: &str) -> FormSpec {
        self.acrostic = Some(word.to_string());
        self
    }

    #[must_use]
    pub fn acrostic_x(mut self, word: &str) -> FormSpec {
        self.acrostic_x = Some(word.to_string());
        self
    }

    #[must_use]
    pub fn transform(mut self, key: i64, transform: Transform) -> FormSpec {
        self.transform.add(key, transform);
        self
    }

    #[must_use]
    pub fn exact(mut self, line: LineNumber, text: &str) -> FormSpec {
        self.exact.insert(line, text.to_string());
        self
    }

    #[must_use]
    pub fn proper(mut self, proper: bool) -> FormSpec {
        self.proper = proper;
        self
    }
}

/// The compiled constraints for one line of the poem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSlot {
    /// 1-based line number.
    pub position: LineNumber,
    pub token: RhymeToken,

    /// `None` for blank lines, which are never filled from the corpus.
    pub rhyme_group: Option<RhymeGroupId>,

    /// Is this the first line of its refrain? Only heads are searched for; the other instances
    /// are copied from them.
    pub is_refrain_head: bool,
    pub refrain_group_id: Option<RefrainId>,

    pub syllable_set: Option<SyllableSet>,
    pub regex_set: Vec<LinePattern>,
    pub exact_text: Option<String>,
}

impl ConstraintSlot {
    /// Does a corpus line satisfy this slot's own syllable and regex constraints?
    #[must_use]
    pub fn accepts(&self, line: &CorpusLine) -> bool {
        self.syllable_set
            .as_ref()
            .map_or(true, |set| set.contains(&line.syllables))
            && self.regex_set.iter().all(|pattern| pattern.is_match(&line.text))
    }

    /// Should the scheduler look for a corpus line for this slot at all?
    #[must_use]
    pub fn is_searched(&self) -> bool {
        self.rhyme_group.is_some() && self.exact_text.is_none()
    }
}

/// A form resolved down to one slot per output line, for a single generation attempt.
#[derive(Debug, Clone)]
pub struct CompiledForm {
    pub slots: Vec<ConstraintSlot>,

    /// Indent level per line.
    pub indent: Vec<usize>,

    pub transforms: BTreeMap<LineNumber, Vec<Transform>>,
}

impl CompiledForm {
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.slots.len()
    }
}

/// Pick the caller's value, or else one of the named form's alternatives.
fn resolve_field<R: Rng>(
    explicit: Option<&String>,
    alternatives: Option<&[&'static str]>,
    rng: &mut R,
) -> Option<String> {
    match explicit {
        Some(value) => Some(value.clone()),
        None => alternatives
            .and_then(|alternatives| alternatives.choose(rng))
            .map(|value| value.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Compile a form specification into constraint slots. Where a named form offers several rhyme or
/// indent strings, `rng` picks one, so compiling the same spec twice can give different forms.
pub fn compile_form<R: Rng>(spec: &FormSpec, rng: &mut R) -> Result<CompiledForm, FormError> {
    let named = spec.form.as_deref().and_then(named_form);

    let rhyme = resolve_field(spec.rhyme.as_ref(), named.map(|form| form.rhyme), rng)
        .ok_or(FormError::MissingFormOrRhyme)?;
    let tokens = tokenize_rhyme(&rhyme)?;
    if tokens.len() == 1 && tokens[0].is_blank() {
        return Err(FormError::MissingFormOrRhyme);
    }
    let line_count = tokens.len();

    let indent = non_empty(resolve_field(
        spec.indent.as_ref(),
        named.map(|form| form.indent),
        rng,
    ));
    let syllable = non_empty(
        spec.syllable
            .clone()
            .or_else(|| named.map(|form| form.syllable.to_string())),
    );
    let regex = non_empty(
        spec.regex
            .clone()
            .or_else(|| named.map(|form| form.regex.to_string())),
    );

    let syllables = match syllable {
        Some(syllable) => SyllableMap::parse(&syllable, line_count)?,
        None => SyllableMap::default(),
    };
    let mut regexes = match regex {
        Some(regex) => RegexMap::parse(&regex, line_count)?,
        None => RegexMap::default(),
    };

    // Acrostic transforms go before the caller's own, so a caller's capitalization sees "Xplain"
    // rather than "explain".
    let mut transforms = TransformMap::new();
    if let Some(word) = &spec.acrostic_x {
        let (acrostic_regexes, acrostic_transforms) = acrostic_x(word)?;
        merge_regexes(&mut regexes, &acrostic_regexes);
        transforms.extend(acrostic_transforms);
    } else if let Some(word) = &spec.acrostic {
        merge_regexes(&mut regexes, &acrostic(word)?);
    }
    transforms.extend(spec.transform.clone());

    let mut slots: Vec<ConstraintSlot> = tokens
        .into_iter()
        .enumerate()
        .map(|(idx, token)| {
            let position = idx + 1;
            let exact_text = spec.exact.get(&position).cloned();

            // Fixed text can't take part in a refrain it has no chance of matching.
            let refrain_group_id = token.refrain_id().filter(|_| exact_text.is_none());

            ConstraintSlot {
                position,
                rhyme_group: token.rhyme_group(),
                is_refrain_head: false,
                refrain_group_id,
                syllable_set: syllables.constraint(position).cloned(),
                regex_set: regexes.patterns(position).to_vec(),
                exact_text,
                token,
            }
        })
        .collect();

    if spec.proper {
        apply_proper_mode(&mut slots)?;
    }
    mark_refrain_heads(&mut slots);

    Ok(CompiledForm {
        slots,
        indent: indent.map_or_else(|| vec![0; line_count], |indent| expand_indent(&indent, line_count)),
        transforms: transforms.resolve(line_count),
    })
}

fn merge_regexes(into: &mut RegexMap, from: &RegexMap) {
    for (&line, patterns) in from.lines() {
        for pattern in patterns {
            into.push(line, pattern.clone());
        }
    }
}

/// Constrain the very first and very last slots, then give every instance of a refrain the
/// combined patterns of all its instances. Only the literal first and last positions are touched,
/// even when they belong to a refrain that shows up elsewhere; the refrain union then spreads
/// those patterns to the refrain's other lines.
fn apply_proper_mode(slots: &mut [ConstraintSlot]) -> Result<(), FormError> {
    let Some(first) = slots.first_mut() else {
        return Ok(());
    };
    for word in BANNED_OPENING_WORDS {
        push_unique(
            &mut first.regex_set,
            LinePattern::new(&format!("(?i)^((?!{word}).)"))?,
        );
    }

    if let Some(last) = slots.last_mut() {
        push_unique(&mut last.regex_set, LinePattern::new(r"[\.?!]$")?);
    }

    let mut refrain_patterns: HashMap<RefrainId, Vec<LinePattern>> = HashMap::new();
    for slot in slots.iter() {
        if let Some(refrain) = &slot.refrain_group_id {
            let patterns = refrain_patterns.entry(refrain.clone()).or_default();
            for pattern in &slot.regex_set {
                push_unique(patterns, pattern.clone());
            }
        }
    }
    for slot in slots.iter_mut() {
        if let Some(patterns) = slot
            .refrain_group_id
            .as_ref()
            .and_then(|refrain| refrain_patterns.get(refrain))
        {
            slot.regex_set = patterns.clone();
        }
    }

    Ok(())
}

fn push_unique(patterns: &mut Vec<LinePattern>, pattern: LinePattern) {
    if !patterns.contains(&pattern) {
        patterns.push(pattern);
    }
}

fn mark_refrain_heads(slots: &mut [ConstraintSlot]) {
    let mut seen: Vec<RefrainId> = vec![];
    for slot in slots.iter_mut() {
        if let Some(refrain) = &slot.refrain_group_id {
            if !seen.contains(refrain) {
                seen.push(refrain.clone());
                slot.is_refrain_head = true;
            }
        }
    }
}
