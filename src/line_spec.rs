//! This module parses the small language used to attach syllable and regex constraints to the
//! lines of a form, and expands a parsed spec into one entry per line. The accepted shapes are:
//!
//! * a plain value applied to every line: `10`, `8,9,10`, `8-10`, or (for regexes) any pattern
//! * a positional list, one item per line: `[8,6,8,6]`, `[[8,9],4-6]`, `["^a", /b$/]`
//! * a keyed map: `{1:8, -1:6}`, `{0:9, o:8, e:6}`, `{3m1: 7}`, `{7 => /^\S+$/}`
//!
//! In maps, key `0` sets the default, `o`/`e` select odd/even lines, `NmR` selects lines where
//! `line % N == R`, and negative keys count back from the last line. Later rules beat earlier
//! ones of the same kind, and explicit indices beat the selector keys.
//!
//! Inside quotes, `\\` is a backslash and a backslash before the delimiter is the delimiter.
//! Any other backslash is kept as written, so regex escapes like `\S` need no doubling.

use fancy_regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

use crate::errors::FormError;
use crate::types::LineNumber;
use crate::MAX_SYLLABLES;

/// The syllable counts a line may have. A set holding only `0` means "any count".
pub type SyllableSet = BTreeSet<u32>;

/// A compiled regex that remembers the text it came from, so specs can be rendered back out and
/// compared.
#[derive(Clone)]
pub struct LinePattern {
    source: String,
    regex: Regex,
}

impl LinePattern {
    pub fn new(source: &str) -> Result<LinePattern, FormError> {
        let regex = Regex::new(source)
            .map_err(|err| FormError::RegexFormat(format!("{source} ({err})")))?;
        Ok(LinePattern {
            source: source.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Patterns that blow the backtracking limit count as non-matching.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text).unwrap_or(false)
    }
}

impl PartialEq for LinePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for LinePattern {}

impl Debug for LinePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

/// A single value in a spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecValue {
    Int(i64),
    Range(i64, i64),
    List(Vec<SpecValue>),
    Text(String),
}

/// A map key in a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKey {
    Index(i64),
    Odd,
    Even,
    Modulo { divisor: i64, remainder: i64 },
}

impl SpecKey {
    /// Does this selector key apply to the given line? Index keys never match here; they're
    /// resolved separately since they can point past the end of the poem.
    fn selects(self, line: LineNumber) -> bool {
        let line = line as i64;
        match self {
            SpecKey::Index(_) => false,
            SpecKey::Odd => line % 2 == 1,
            SpecKey::Even => line % 2 == 0,
            // The result takes the sign of the divisor, so e.g. `-1m0` selects every line.
            SpecKey::Modulo { divisor, remainder } => {
                let modulus = line.rem_euclid(divisor);
                let modulus = if divisor < 0 && modulus != 0 {
                    modulus + divisor
                } else {
                    modulus
                };
                modulus == remainder
            }
        }
    }
}

/// The parsed form of a whole spec string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSpec {
    Empty,
    All(SpecValue),
    Positional(Vec<SpecValue>),
    Keyed(Vec<(SpecKey, SpecValue)>),
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Parser {
        Parser {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn fail<T>(&self, expected: &str) -> Result<T, String> {
        match self.peek() {
            Some(found) => Err(format!(
                "expected {expected} at position {}, found '{found}'",
                self.pos
            )),
            None => Err(format!("expected {expected}, found end of input")),
        }
    }

    fn finish(&mut self) -> Result<(), String> {
        self.skip_whitespace();
        if self.peek().is_some() {
            return self.fail("end of input");
        }
        Ok(())
    }

    fn parse_int(&mut self) -> Result<i64, String> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        if digits.is_empty() || digits == "-" {
            self.pos = start;
            return self.fail("a number");
        }
        digits
            .parse()
            .map_err(|_| format!("number out of range: {digits}"))
    }

    /// An integer, optionally followed by `-N` to make an inclusive range.
    fn parse_number(&mut self) -> Result<SpecValue, String> {
        let low = self.parse_int()?;
        if self.peek() == Some('-') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            let high = self.parse_int()?;
            if high < low {
                return Err(format!("range {low}-{high} is backwards"));
            }
            return Ok(SpecValue::Range(low, high));
        }
        Ok(SpecValue::Int(low))
    }

    /// Quoted text runs to the matching delimiter.
    fn parse_quoted(&mut self, delimiter: char) -> Result<String, String> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(format!("unterminated {delimiter}-quoted text")),
                Some('\\') if self.peek_at(1) == Some('\\') => {
                    text.push('\\');
                    self.pos += 2;
                }
                Some('\\') if self.peek_at(1) == Some(delimiter) => {
                    text.push(delimiter);
                    self.pos += 2;
                }
                Some(c) if c == delimiter => {
                    self.pos += 1;
                    return Ok(text);
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_value(&mut self) -> Result<SpecValue, String> {
        self.skip_whitespace();
        match self.peek() {
            Some('[') => Ok(SpecValue::List(self.parse_list()?)),
            Some(delimiter @ ('"' | '\'' | '/')) => Ok(SpecValue::Text(self.parse_quoted(delimiter)?)),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => self.fail("a value"),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<SpecValue>, String> {
        self.pos += 1;
        let mut items = vec![];
        self.skip_whitespace();
        if self.eat(']') {
            return Ok(items);
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();
            if self.eat(']') {
                return Ok(items);
            }
            if !self.eat(',') {
                return self.fail("',' or ']'");
            }
        }
    }

    fn parse_key(&mut self) -> Result<SpecKey, String> {
        self.skip_whitespace();
        let key = match self.peek() {
            Some('o') => {
                self.pos += 1;
                SpecKey::Odd
            }
            Some('e') => {
                self.pos += 1;
                SpecKey::Even
            }
            _ => {
                let number = self.parse_int()?;
                if self.eat('m') {
                    let remainder = self.parse_int()?;
                    if number == 0 {
                        return Err(format!("modulo key {number}m{remainder} divides by zero"));
                    }
                    SpecKey::Modulo {
                        divisor: number,
                        remainder,
                    }
                } else {
                    SpecKey::Index(number)
                }
            }
        };

        self.skip_whitespace();
        if self.eat(':') || (self.peek() == Some('=') && self.peek_at(1) == Some('>')) {
            if self.peek() == Some('=') {
                self.pos += 2;
            }
            Ok(key)
        } else {
            self.fail("':' or '=>'")
        }
    }

    fn parse_map(&mut self) -> Result<Vec<(SpecKey, SpecValue)>, String> {
        self.pos += 1;
        let mut entries = vec![];
        self.skip_whitespace();
        if self.eat('}') {
            return Ok(entries);
        }
        loop {
            let key = self.parse_key()?;
            let value = self.parse_value()?;
            entries.push((key, value));
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(entries);
            }
            if !self.eat(',') {
                return self.fail("',' or '}'");
            }
        }
    }

    /// A bracketed list or braced map filling the whole input.
    fn parse_structured(&mut self) -> Result<LineSpec, String> {
        self.skip_whitespace();
        let spec = match self.peek() {
            Some('[') => LineSpec::Positional(self.parse_list()?),
            Some('{') => LineSpec::Keyed(self.parse_map()?),
            _ => return self.fail("'[' or '{'"),
        };
        self.finish()?;
        Ok(spec)
    }

    /// A bare comma-separated run of numbers and ranges, like `8,9,10` or `4,6,8-10`.
    fn parse_plain_numbers(&mut self) -> Result<SpecValue, String> {
        let mut items = vec![];
        loop {
            self.skip_whitespace();
            items.push(self.parse_number()?);
            self.skip_whitespace();
            if !self.eat(',') {
                break;
            }
        }
        self.finish()?;
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            SpecValue::List(items)
        })
    }
}

fn is_structured(input: &str) -> bool {
    matches!(input.trim_start().chars().next(), Some('[' | '{'))
}

/// Parse a syllable spec. Blank input means "no constraint".
pub fn parse_syllable_spec(input: &str) -> Result<LineSpec, FormError> {
    if input.trim().is_empty() {
        return Ok(LineSpec::Empty);
    }
    let mut parser = Parser::new(input);
    let result = if is_structured(input) {
        parser.parse_structured()
    } else {
        parser.parse_plain_numbers().map(LineSpec::All)
    };
    result.map_err(|message| FormError::SyllableFormat(format!("{input} ({message})")))
}

/// Parse a regex spec. Input starting with `{` has to be a well-formed map. Anything else that
/// isn't a well-formed list is taken to be a single pattern for every line, so character classes
/// like `[A-Z].*` work unquoted.
pub fn parse_regex_spec(input: &str) -> Result<LineSpec, FormError> {
    if input.trim().is_empty() {
        return Ok(LineSpec::Empty);
    }
    if input.trim_start().starts_with('{') {
        return Parser::new(input)
            .parse_structured()
            .map_err(|message| FormError::RegexFormat(format!("{input} ({message})")));
    }
    if is_structured(input) {
        if let Ok(spec) = Parser::new(input).parse_structured() {
            return Ok(spec);
        }
    }
    Ok(LineSpec::All(SpecValue::Text(input.to_string())))
}

/// Resolve a parsed spec into one value per line, following the precedence rules described at the
/// top of this module. Positive keys past the last line are kept; negative keys that reach before
/// the first line are dropped.
fn expand_line_spec<T: Clone>(
    spec: &LineSpec,
    line_count: usize,
    default: T,
    mut value_of: impl FnMut(&SpecValue) -> Result<T, FormError>,
) -> Result<BTreeMap<LineNumber, T>, FormError> {
    let mut lines: BTreeMap<LineNumber, T> = BTreeMap::new();

    match spec {
        LineSpec::Empty => {
            for line in 1..=line_count {
                lines.insert(line, default.clone());
            }
        }

        LineSpec::All(value) => {
            let value = value_of(value)?;
            for line in 1..=line_count {
                lines.insert(line, value.clone());
            }
        }

        LineSpec::Positional(items) => {
            for line in 1..=line_count {
                lines.insert(line, default.clone());
            }
            for (idx, item) in items.iter().enumerate() {
                lines.insert(idx + 1, value_of(item)?);
            }
        }

        LineSpec::Keyed(entries) => {
            let mut fallback = default;
            for (key, value) in entries {
                if *key == SpecKey::Index(0) {
                    fallback = value_of(value)?;
                }
            }
            for line in 1..=line_count {
                lines.insert(line, fallback.clone());
            }

            for (key, value) in entries {
                if matches!(key, SpecKey::Index(_)) {
                    continue;
                }
                let value = value_of(value)?;
                for line in (1..=line_count).filter(|&line| key.selects(line)) {
                    lines.insert(line, value.clone());
                }
            }

            for (key, value) in entries {
                match *key {
                    SpecKey::Index(index) if index > 0 => {
                        lines.insert(index as usize, value_of(value)?);
                    }
                    _ => {}
                }
            }

            for (key, value) in entries {
                match *key {
                    SpecKey::Index(index) if index < 0 => {
                        let line = line_count as i64 + 1 + index;
                        if line >= 1 {
                            lines.insert(line as usize, value_of(value)?);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(lines)
}

fn syllable_count(value: i64) -> Result<u32, FormError> {
    u32::try_from(value)
        .ok()
        .filter(|&count| count <= MAX_SYLLABLES)
        .ok_or_else(|| FormError::SyllableFormat(format!("{value} is not a syllable count")))
}

fn collect_syllables(value: &SpecValue, into: &mut SyllableSet) -> Result<(), FormError> {
    match value {
        SpecValue::Int(count) => {
            into.insert(syllable_count(*count)?);
        }
        SpecValue::Range(low, high) => {
            for count in syllable_count(*low)?..=syllable_count(*high)? {
                into.insert(count);
            }
        }
        SpecValue::List(items) => {
            for item in items {
                collect_syllables(item, into)?;
            }
        }
        SpecValue::Text(text) => {
            let inner = Parser::new(text)
                .parse_plain_numbers()
                .map_err(|message| FormError::SyllableFormat(format!("\"{text}\" ({message})")))?;
            collect_syllables(&inner, into)?;
        }
    }
    Ok(())
}

fn syllable_set(value: &SpecValue) -> Result<SyllableSet, FormError> {
    let mut set = SyllableSet::new();
    collect_syllables(value, &mut set)?;
    if set.is_empty() {
        set.insert(0);
    }
    Ok(set)
}

fn collect_patterns(value: &SpecValue, into: &mut Vec<LinePattern>) -> Result<(), FormError> {
    match value {
        SpecValue::Text(source) => {
            let pattern = LinePattern::new(source)?;
            if !into.contains(&pattern) {
                into.push(pattern);
            }
        }
        SpecValue::List(items) => {
            for item in items {
                collect_patterns(item, into)?;
            }
        }
        SpecValue::Int(_) | SpecValue::Range(..) => {
            return Err(FormError::RegexFormat(format!(
                "{value:?} is not a pattern; quote it or wrap it in slashes"
            )));
        }
    }
    Ok(())
}

/// Per-line syllable constraints, after expansion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyllableMap(BTreeMap<LineNumber, SyllableSet>);

impl SyllableMap {
    pub fn parse(input: &str, line_count: usize) -> Result<SyllableMap, FormError> {
        let spec = parse_syllable_spec(input)?;
        let unconstrained: SyllableSet = [0].into();
        expand_line_spec(&spec, line_count, unconstrained, syllable_set).map(SyllableMap)
    }

    #[must_use]
    pub fn from_lines(lines: BTreeMap<LineNumber, SyllableSet>) -> SyllableMap {
        SyllableMap(lines)
    }

    /// The syllable counts allowed on a line, or `None` if any count will do.
    #[must_use]
    pub fn constraint(&self, line: LineNumber) -> Option<&SyllableSet> {
        self.0
            .get(&line)
            .filter(|set| !(set.len() == 1 && set.contains(&0)))
    }

    #[must_use]
    pub fn lines(&self) -> &BTreeMap<LineNumber, SyllableSet> {
        &self.0
    }
}

impl Display for SyllableMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .0
            .iter()
            .map(|(line, set)| {
                let counts: Vec<String> = set.iter().map(u32::to_string).collect();
                if counts.len() == 1 {
                    format!("{line}:{}", counts[0])
                } else {
                    format!("{line}:[{}]", counts.join(","))
                }
            })
            .collect();
        write!(f, "{{{}}}", entries.join(","))
    }
}

/// Per-line regex constraints, after expansion. Every pattern for a line has to match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegexMap(BTreeMap<LineNumber, Vec<LinePattern>>);

impl RegexMap {
    pub fn parse(input: &str, line_count: usize) -> Result<RegexMap, FormError> {
        let spec = parse_regex_spec(input)?;
        let lines = expand_line_spec(&spec, line_count, vec![], |value| {
            let mut patterns = vec![];
            collect_patterns(value, &mut patterns)?;
            Ok(patterns)
        })?;
        Ok(RegexMap(
            lines
                .into_iter()
                .filter(|(_, patterns)| !patterns.is_empty())
                .collect(),
        ))
    }

    #[must_use]
    pub fn patterns(&self, line: LineNumber) -> &[LinePattern] {
        self.0.get(&line).map_or(&[], Vec::as_slice)
    }

    /// Add a pattern to a line, unless the line already has it.
    pub fn push(&mut self, line: LineNumber, pattern: LinePattern) {
        let patterns = self.0.entry(line).or_default();
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }

    #[must_use]
    pub fn lines(&self) -> &BTreeMap<LineNumber, Vec<LinePattern>> {
        &self.0
    }
}

/// Quote a pattern with whichever delimiter it doesn't contain, escaping backslashes so the
/// parser reads back exactly `source`.
fn quote_pattern(source: &str) -> String {
    let escaped = source.replace('\\', "\\\\");
    match ['"', '/', '\''].into_iter().find(|&d| !source.contains(d)) {
        Some(delimiter) => format!("{delimiter}{escaped}{delimiter}"),
        None => format!("\"{}\"", escaped.replace('"', "\\\"")),
    }
}

impl Display for RegexMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .0
            .iter()
            .map(|(line, patterns)| {
                let quoted: Vec<String> = patterns
                    .iter()
                    .map(|pattern| quote_pattern(pattern.source()))
                    .collect();
                if quoted.len() == 1 {
                    format!("{line}:{}", quoted[0])
                } else {
                    format!("{line}:[{}]", quoted.join(","))
                }
            })
            .collect();
        write!(f, "{{{}}}", entries.join(","))
    }
}

/// Turn an indent string into an indent level per line. Each character is one line's level;
/// anything that isn't a digit counts as zero, and missing lines are zero.
#[must_use]
pub fn expand_indent(spec: &str, line_count: usize) -> Vec<usize> {
    spec.chars()
        .chain(std::iter::repeat('0'))
        .take(line_count)
        .map(|c| c.to_digit(10).unwrap_or(0) as usize)
        .collect()
}
