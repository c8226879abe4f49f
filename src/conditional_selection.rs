//! This module implements the line-selection search: given a shuffled pool of candidates and one
//! condition per output slot, pick one candidate per slot so that every condition holds when it's
//! checked against the candidates chosen before it. It's a plain randomized backtracking search;
//! conditions that only fail late (or never prune at all) make it factorial in the worst case, so
//! every search runs against a deadline and can be aborted from another thread.

use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::MAX_GROUP_SIZE;

/// How many candidates should we evaluate between checks of the deadline and abort flag?
pub const INTERRUPT_FREQUENCY: usize = 10;

/// A condition for a single slot. It's given the candidates chosen for earlier slots, in order,
/// and the candidate being considered for this one.
pub type Condition<'a, T> = Box<dyn Fn(&[&T], &T) -> bool + 'a>;

/// A struct tracking stats about the selection process.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub states: usize,
    pub backtracks: usize,
    pub total_time: Duration,
}

#[derive(Debug)]
pub struct SelectionSuccess<'c, T> {
    pub chosen: Vec<&'c T>,
    pub statistics: Statistics,
}

/// Every way the search can come back empty-handed. Callers generally treat all of these the same
/// way; they're kept apart for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFailure {
    Exhausted,
    Timeout,
    Abort,
}

struct Search<'a, 'c, T> {
    candidates: &'c [T],
    conditions: &'a [Condition<'a, T>],
    deadline: Option<Instant>,
    abort: Option<&'a AtomicBool>,

    /// Which candidates are currently spoken for by a slot.
    used: Vec<bool>,

    chosen: SmallVec<[&'c T; MAX_GROUP_SIZE]>,
    statistics: Statistics,
}

impl<'a, 'c, T: PartialEq> Search<'a, 'c, T> {
    fn check_interrupts(&self) -> Result<(), SelectionFailure> {
        if self.statistics.states % INTERRUPT_FREQUENCY == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() > deadline {
                    return Err(SelectionFailure::Timeout);
                }
            }
            if let Some(abort) = self.abort {
                if abort.load(Ordering::Relaxed) {
                    return Err(SelectionFailure::Abort);
                }
            }
        }
        Ok(())
    }

    /// Fill the slot at `depth` and everything after it, returning whether we managed to.
    fn fill_from(&mut self, depth: usize) -> Result<bool, SelectionFailure> {
        let conditions = self.conditions;
        let candidates = self.candidates;

        let Some(condition) = conditions.get(depth) else {
            return Ok(true);
        };

        for idx in 0..candidates.len() {
            if self.used[idx] {
                continue;
            }

            self.check_interrupts()?;
            self.statistics.states += 1;

            let candidate = &candidates[idx];
            if !condition(self.chosen.as_slice(), candidate) {
                continue;
            }

            // The pool can hold the same value more than once, and only one copy is used up per
            // choice: the first one still available.
            let taken = (0..candidates.len())
                .find(|&other| !self.used[other] && candidates[other] == *candidate)
                .unwrap_or(idx);

            self.used[taken] = true;
            self.chosen.push(candidate);

            // A candidate that satisfies its own condition but leaves a later slot unfillable is
            // no better than one that failed outright.
            if self.fill_from(depth + 1)? {
                return Ok(true);
            }

            self.chosen.pop();
            self.used[taken] = false;
            self.statistics.backtracks += 1;
        }

        Ok(false)
    }
}

/// Choose one candidate per condition, in order, trying candidates in the order given. Returns
/// the first assignment found.
pub fn find_selection<'c, T: PartialEq>(
    candidates: &'c [T],
    conditions: &[Condition<T>],
    deadline: Option<Instant>,
    abort: Option<&AtomicBool>,
) -> Result<SelectionSuccess<'c, T>, SelectionFailure> {
    let start = Instant::now();

    if conditions.len() > candidates.len() {
        return Err(SelectionFailure::Exhausted);
    }

    let mut search = Search {
        candidates,
        conditions,
        deadline,
        abort,
        used: vec![false; candidates.len()],
        chosen: SmallVec::new(),
        statistics: Statistics::default(),
    };

    let found = search.fill_from(0)?;
    search.statistics.total_time = start.elapsed();

    if found {
        Ok(SelectionSuccess {
            chosen: search.chosen.into_vec(),
            statistics: search.statistics,
        })
    } else {
        Err(SelectionFailure::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use crate::conditional_selection::{find_selection, Condition, SelectionFailure};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    fn condition<'a>(check: impl Fn(&[&u32], &u32) -> bool + 'a) -> Condition<'a, u32> {
        Box::new(check)
    }

    fn distinct<'a>() -> Condition<'a, u32> {
        condition(|chosen, candidate| !chosen.contains(&candidate))
    }

    fn anything<'a>() -> Condition<'a, u32> {
        condition(|_, _| true)
    }

    #[test]
    fn test_picks_in_candidate_order() {
        let candidates = [5, 3, 8, 1];
        let conditions: Vec<Condition<u32>> = vec![distinct(), distinct()];

        let result = find_selection(&candidates, &conditions, None, None).unwrap();
        assert_eq!(result.chosen, vec![&5, &3]);
    }

    #[test]
    fn test_backtracks_when_a_later_slot_is_stranded() {
        // The first slot would happily take 2, but then nothing is left that's bigger than it.
        let candidates = [2, 1, 4];
        let conditions: Vec<Condition<u32>> = vec![
            condition(|_, &candidate| candidate < 4),
            condition(|chosen, &candidate| candidate > *chosen[0] && candidate < 4),
        ];

        let result = find_selection(&candidates, &conditions, None, None).unwrap();
        assert_eq!(result.chosen, vec![&1, &2]);
        assert!(result.statistics.backtracks > 0);
    }

    #[test]
    fn test_duplicate_values_are_used_once_each() {
        let candidates = [7, 7];
        let conditions: Vec<Condition<u32>> = vec![anything(), anything()];
        let result = find_selection(&candidates, &conditions, None, None).unwrap();
        assert_eq!(result.chosen, vec![&7, &7]);

        let conditions: Vec<Condition<u32>> = vec![anything(), anything(), anything()];
        assert_eq!(
            find_selection(&candidates, &conditions, None, None).unwrap_err(),
            SelectionFailure::Exhausted
        );
    }

    #[test]
    fn test_exhausts_when_nothing_fits() {
        let candidates = [1, 2, 3];
        let conditions: Vec<Condition<u32>> = vec![distinct(), condition(|_, &candidate| candidate > 10)];
        assert_eq!(
            find_selection(&candidates, &conditions, None, None).unwrap_err(),
            SelectionFailure::Exhausted
        );
    }

    #[test]
    fn test_no_conditions_is_an_empty_success() {
        let candidates: [u32; 0] = [];
        let result = find_selection(&candidates, &[], None, None).unwrap();
        assert!(result.chosen.is_empty());
    }

    #[test]
    fn test_times_out_on_a_hopeless_search() {
        // Every slot but the last accepts anything and the last accepts nothing, so without a
        // deadline this would visit every ordering of the first eleven slots.
        let candidates: Vec<u32> = (0..40).collect();
        let mut conditions: Vec<Condition<u32>> = (0..11).map(|_| distinct()).collect();
        conditions.push(condition(|_, _| false));

        let start = Instant::now();
        let result = find_selection(
            &candidates,
            &conditions,
            Some(start + Duration::from_millis(200)),
            None,
        );

        assert_eq!(result.unwrap_err(), SelectionFailure::Timeout);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_abort_flag() {
        let candidates: Vec<u32> = (0..40).collect();
        let mut conditions: Vec<Condition<u32>> = (0..11).map(|_| distinct()).collect();
        conditions.push(condition(|_, _| false));

        let abort = AtomicBool::new(true);
        assert_eq!(
            find_selection(&candidates, &conditions, None, Some(&abort)).unwrap_err(),
            SelectionFailure::Abort
        );
    }

    proptest! {
        #[test]
        fn test_chosen_values_satisfy_every_condition(
            candidates in proptest::collection::vec(0u32..12, 0..16),
            slot_count in 1usize..5,
        ) {
            let conditions: Vec<Condition<u32>> = (0..slot_count).map(|_| distinct()).collect();

            match find_selection(&candidates, &conditions, None, None) {
                Ok(success) => {
                    prop_assert_eq!(success.chosen.len(), slot_count);
                    let unique: HashSet<u32> = success.chosen.iter().map(|&&v| v).collect();
                    prop_assert_eq!(unique.len(), slot_count);
                }
                Err(failure) => {
                    prop_assert_eq!(failure, SelectionFailure::Exhausted);
                    let unique: HashSet<u32> = candidates.iter().copied().collect();
                    prop_assert!(unique.len() < slot_count);
                }
            }
        }
    }
}
