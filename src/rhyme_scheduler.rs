//! Fills a compiled form's slots from the corpus, one rhyme group at a time.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::conditional_selection::{find_selection, Condition, SelectionFailure, Statistics};
use crate::corpus::{CorpusIndex, CorpusLine};
use crate::errors::{GenerationError, PoemError};
use crate::form_config::{CompiledForm, ConstraintSlot};
use crate::types::{RhymeGroupId, SyllableRange};
use crate::CHECK_INVARIANTS;

/// The slots that have to rhyme with each other, with each refrain represented once.
#[derive(Debug, Clone)]
pub struct RhymeGroup<'f> {
    pub rhyme_group: RhymeGroupId,
    pub slots: Vec<&'f ConstraintSlot>,
}

/// The outcome of scheduling one generation attempt.
#[derive(Debug, Clone)]
pub struct ScheduledLines {
    /// One entry per line of the form. Lines that weren't searched for (blank lines, exact lines,
    /// repeated refrains) are `None`.
    pub lines: Vec<Option<String>>,

    /// The corpus rhyme key each rhyme group ended up using.
    pub rhyme_keys: BTreeMap<RhymeGroupId, String>,

    pub statistics: Statistics,
}

/// Group the searchable slots by rhyme letter, keeping only the first instance of each refrain,
/// and put the groups with the most lines first. Groups with the same number of lines stay in
/// order of first appearance.
#[must_use]
pub fn group_slots(slots: &[ConstraintSlot]) -> Vec<RhymeGroup<'_>> {
    let mut groups: Vec<RhymeGroup> = vec![];

    for slot in slots.iter().filter(|slot| slot.is_searched()) {
        if slot.refrain_group_id.is_some() && !slot.is_refrain_head {
            continue;
        }
        let Some(rhyme_group) = slot.rhyme_group else {
            continue;
        };

        match groups.iter_mut().find(|group| group.rhyme_group == rhyme_group) {
            Some(group) => group.slots.push(slot),
            None => groups.push(RhymeGroup {
                rhyme_group,
                slots: vec![slot],
            }),
        }
    }

    groups.sort_by(|a, b| b.slots.len().cmp(&a.slots.len()));
    groups
}

/// If every slot in a group constrains its syllables, the overall range they allow, so the
/// corpus can be queried for just those lines.
#[must_use]
pub fn syllable_range(slots: &[&ConstraintSlot]) -> Option<SyllableRange> {
    let mut range: Option<SyllableRange> = None;
    for slot in slots {
        let set = slot.syllable_set.as_ref()?;
        let (Some(&min), Some(&max)) = (set.first(), set.last()) else {
            return None;
        };
        range = Some(match range {
            Some((lo, hi)) => (lo.min(min), hi.max(max)),
            None => (min, max),
        });
    }
    range.filter(|&(_, max)| max > 0)
}

/// One condition per slot: a line mustn't share a final word with any line already chosen for
/// this group or taken by an earlier group, and has to pass the slot's own constraints.
fn conditions_for<'f>(
    slots: &[&'f ConstraintSlot],
    taken_final_words: &'f HashSet<String>,
) -> Vec<Condition<'f, CorpusLine>> {
    slots
        .iter()
        .map(|&slot| -> Condition<'f, CorpusLine> {
            Box::new(move |chosen: &[&CorpusLine], candidate: &CorpusLine| {
                !taken_final_words.contains(&candidate.final_word)
                    && !chosen
                        .iter()
                        .any(|line| line.final_word == candidate.final_word)
                    && slot.accepts(candidate)
            })
        })
        .collect()
}

/// Drop lines that couldn't satisfy the patterns of any slot in the group. This can't remove a
/// line that some slot would accept, and it cuts down the candidates the search has to wade
/// through.
fn prefilter(lines: Vec<CorpusLine>, slots: &[&ConstraintSlot]) -> Vec<CorpusLine> {
    lines
        .into_iter()
        .filter(|line| {
            slots.iter().any(|slot| {
                slot.regex_set
                    .iter()
                    .all(|pattern| pattern.is_match(&line.text))
            })
        })
        .collect()
}

fn add_statistics(total: &mut Statistics, other: &Statistics) {
    total.states += other.states;
    total.backtracks += other.backtracks;
    total.total_time += other.total_time;
}

/// Fill every searchable slot of `form` from `corpus`. Each rhyme group gets its own rhyme key and
/// final words are never repeated across the poem. Each candidate key's search is cut off after
/// `search_timeout`.
pub fn schedule<C: CorpusIndex + ?Sized, R: Rng>(
    form: &CompiledForm,
    corpus: &C,
    rng: &mut R,
    search_timeout: Duration,
    abort: Option<&AtomicBool>,
) -> Result<ScheduledLines, PoemError> {
    let mut lines: Vec<Option<String>> = vec![None; form.line_count()];
    let mut rhyme_keys: BTreeMap<RhymeGroupId, String> = BTreeMap::new();
    let mut statistics = Statistics::default();
    let mut taken_final_words: HashSet<String> = HashSet::new();

    for group in group_slots(&form.slots) {
        let range = syllable_range(&group.slots);
        let used: HashSet<&String> = rhyme_keys.values().collect();

        let mut candidate_keys: Vec<String> = corpus
            .rhyme_keys_with_min_endings(group.slots.len(), range)?
            .into_iter()
            .map(|count| count.rhyme_key)
            .filter(|key| !used.contains(key))
            .collect();
        candidate_keys.shuffle(rng);

        debug!(
            rhyme_group = %group.rhyme_group,
            slots = group.slots.len(),
            ?range,
            candidate_keys = candidate_keys.len(),
            "Scheduling rhyme group"
        );

        let conditions = conditions_for(&group.slots, &taken_final_words);
        let mut found: Option<(String, Vec<CorpusLine>)> = None;

        for rhyme_key in candidate_keys {
            let mut candidates = prefilter(corpus.lines_for_rhyme_key(&rhyme_key, range)?, &group.slots);
            candidates.shuffle(rng);

            let deadline = Instant::now() + search_timeout;
            match find_selection(&candidates, &conditions, Some(deadline), abort) {
                Ok(success) => {
                    add_statistics(&mut statistics, &success.statistics);
                    found = Some((rhyme_key, success.chosen.into_iter().cloned().collect()));
                    break;
                }
                Err(SelectionFailure::Abort) => return Err(GenerationError::Aborted.into()),
                Err(failure) => {
                    debug!(%rhyme_key, ?failure, candidates = candidates.len(), "Rhyme key failed");
                }
            }
        }

        drop(conditions);

        let Some((rhyme_key, chosen)) = found else {
            return Err(GenerationError::InsufficientData {
                rhyme_group: group.rhyme_group,
            }
            .into());
        };

        if CHECK_INVARIANTS {
            let final_words: HashSet<&str> =
                chosen.iter().map(|line| line.final_word.as_str()).collect();
            if final_words.len() != chosen.len() {
                panic!("rhyme group {} reuses a final word", group.rhyme_group);
            }
        }

        for (slot, line) in group.slots.iter().zip(chosen) {
            taken_final_words.insert(line.final_word);
            lines[slot.position - 1] = Some(line.text);
        }
        rhyme_keys.insert(group.rhyme_group, rhyme_key);
    }

    Ok(ScheduledLines {
        lines,
        rhyme_keys,
        statistics,
    })
}

#[cfg(test)]
mod tests {
    use crate::corpus::tests::{line, small_corpus, synthetic_corpus};
    use crate::corpus::MemoryCorpus;
    use crate::errors::{GenerationError, PoemError};
    use crate::form_config::{compile_form, FormSpec};
    use crate::rhyme_scheduler::{group_slots, schedule, syllable_range};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn compile(spec: &FormSpec) -> crate::form_config::CompiledForm {
        compile_form(spec, &mut SmallRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn test_group_slots_orders_by_size_and_collapses_refrains() {
        let form = compile(&FormSpec::with_rhyme("A1bA2 abA1 abA2 abA1 abA2 abA1A2").proper(false));
        let groups = group_slots(&form.slots);

        let summary: Vec<(char, usize)> = groups
            .iter()
            .map(|group| (group.rhyme_group, group.slots.len()))
            .collect();
        // Five plain "a" lines plus one representative each for A1 and A2.
        assert_eq!(summary, vec![('a', 7), ('b', 6)]);
    }

    #[test]
    fn test_group_slots_skips_blank_and_exact_lines() {
        let form = compile(&FormSpec::with_rhyme("ab ab").exact(4, "Fixed").proper(false));
        let groups = group_slots(&form.slots);
        let positions: Vec<Vec<usize>> = groups
            .iter()
            .map(|group| group.slots.iter().map(|slot| slot.position).collect())
            .collect();
        assert_eq!(positions, vec![vec![2, 5], vec![1]]);
    }

    #[test]
    fn test_syllable_range() {
        let form = compile(&FormSpec::with_rhyme("aaa").syllable("[8,[6,7],10]").proper(false));
        let slots: Vec<_> = form.slots.iter().collect();
        assert_eq!(syllable_range(&slots), Some((6, 10)));

        let partly = compile(&FormSpec::with_rhyme("aaa").syllable("{1:8}").proper(false));
        let slots: Vec<_> = partly.slots.iter().collect();
        assert_eq!(syllable_range(&slots), None);
    }

    #[test]
    fn test_schedules_distinct_rhyme_keys() {
        let corpus = synthetic_corpus(4, 4);
        let form = compile(&FormSpec::with_rhyme("aabbccdd").proper(false));

        for seed in 0..5 {
            let scheduled = schedule(
                &form,
                &corpus,
                &mut SmallRng::seed_from_u64(seed),
                Duration::from_secs(2),
                None,
            )
            .unwrap();

            assert!(scheduled.lines.iter().all(Option::is_some));
            let keys: HashSet<&String> = scheduled.rhyme_keys.values().collect();
            assert_eq!(keys.len(), 4);
        }
    }

    #[test]
    fn test_lines_in_a_group_share_a_key_but_not_a_final_word() {
        let corpus = small_corpus();
        let form = compile(&FormSpec::with_rhyme("aaaa").proper(false));
        let scheduled = schedule(
            &form,
            &corpus,
            &mut SmallRng::seed_from_u64(3),
            Duration::from_secs(2),
            None,
        )
        .unwrap();

        let lines: Vec<String> = scheduled.lines.into_iter().flatten().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.iter().collect::<HashSet<_>>().len(), 4);
        let key = &scheduled.rhyme_keys[&'a'];
        assert!(key == "ight" || key == "ay");
    }

    #[test]
    fn test_rhyme_groups_never_share_a_final_word() {
        // Lines that rhyme two ways are filed under both keys, so the same final words show up
        // in both groups of the corpus.
        let mut lines = vec![];
        for (text, word) in [
            ("Into the light", "light"),
            ("All through the night", "night"),
        ] {
            lines.push(line(text, 4, word, "ight"));
            lines.push(line(text, 4, word, "ite"));
        }
        lines.push(line("A star so bright", 3, "bright", "ight"));
        lines.push(line("We want to fight", 4, "fight", "ight"));
        lines.push(line("We flew a kite", 4, "kite", "ite"));
        lines.push(line("Far out of sight", 4, "sight", "ite"));
        let corpus = MemoryCorpus::new(lines);
        let form = compile(&FormSpec::with_rhyme("abab").proper(false));

        for seed in 0..20 {
            let scheduled = schedule(
                &form,
                &corpus,
                &mut SmallRng::seed_from_u64(seed),
                Duration::from_secs(2),
                None,
            )
            .unwrap();

            let texts: Vec<&String> = scheduled.lines.iter().flatten().collect();
            assert_eq!(texts.len(), 4);
            assert_eq!(texts.iter().collect::<HashSet<_>>().len(), 4);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let corpus = small_corpus();
        let form = compile(&FormSpec::with_rhyme("aaaaa").proper(false));
        let error = schedule(
            &form,
            &corpus,
            &mut SmallRng::seed_from_u64(0),
            Duration::from_secs(2),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            error,
            PoemError::Generation(GenerationError::InsufficientData { rhyme_group: 'a' })
        ));
    }

    #[test]
    fn test_regex_constraints_are_respected() {
        let corpus = MemoryCorpus::new(vec![
            line("The tide came in", 4, "in", "in"),
            line("A fin", 2, "fin", "in"),
            line("The pin", 2, "pin", "in"),
            line("Begin", 2, "begin", "in"),
        ]);
        let form = compile(&FormSpec::with_rhyme("aa").regex("/^The/").proper(false));
        let scheduled = schedule(
            &form,
            &corpus,
            &mut SmallRng::seed_from_u64(9),
            Duration::from_secs(2),
            None,
        )
        .unwrap();
        assert!(scheduled
            .lines
            .iter()
            .flatten()
            .all(|text| text.starts_with("The")));
    }

    #[test]
    fn test_abort_stops_scheduling() {
        let corpus = synthetic_corpus(1, 4);
        let form = compile(&FormSpec::with_rhyme("aa").proper(false));
        let abort = AtomicBool::new(true);
        let error = schedule(
            &form,
            &corpus,
            &mut SmallRng::seed_from_u64(0),
            Duration::from_secs(2),
            Some(&abort),
        )
        .unwrap_err();
        assert!(matches!(
            error,
            PoemError::Generation(GenerationError::Aborted)
        ));
    }
}
