/// A 1-based line position in the output poem.
pub type LineNumber = usize;

/// The character identifying a rhyme group, always lowercase (e.g. `'a'` for every "a" or "A1"
/// line in "A1bA2").
pub type RhymeGroupId = char;

/// The token identifying a refrain instance, e.g. "A1" or "R". Lines sharing one of these must
/// end up with identical text.
pub type RefrainId = String;

/// An inclusive `(min, max)` syllable window pushed down to corpus queries.
pub type SyllableRange = (u32, u32);
