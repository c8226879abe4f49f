//! Turning a scheduled draft into the finished lines of a poem.

use std::collections::BTreeMap;
use tracing::debug;

use crate::form_config::CompiledForm;
use crate::types::{LineNumber, RefrainId};

/// Every position of each refrain, in ascending order.
fn refrain_positions(form: &CompiledForm) -> BTreeMap<&RefrainId, Vec<LineNumber>> {
    let mut positions: BTreeMap<&RefrainId, Vec<LineNumber>> = BTreeMap::new();
    for slot in &form.slots {
        if let Some(refrain) = &slot.refrain_group_id {
            positions.entry(refrain).or_default().push(slot.position);
        }
    }
    positions
}

/// Copy each refrain's first line over its later instances, then write in exact lines.
fn fill_fixed_lines(form: &CompiledForm, draft: &mut [Option<String>]) {
    for positions in refrain_positions(form).values() {
        let Some((&head, rest)) = positions.split_first() else {
            continue;
        };
        let text = draft[head - 1].clone();
        for &position in rest {
            draft[position - 1] = text.clone();
        }
    }

    for slot in &form.slots {
        if let Some(text) = &slot.exact_text {
            draft[slot.position - 1] = Some(text.clone());
        }
    }
}

/// Run each line's transforms in order. Each transform sees the draft as it stands, including
/// the results of transforms already run on earlier lines. A transform that fails leaves its
/// line as it was.
fn apply_transforms(form: &CompiledForm, draft: &mut [Option<String>]) {
    for (&line, transforms) in &form.transforms {
        let idx = line - 1;
        for transform in transforms {
            let Some(text) = draft[idx].clone() else {
                debug!(line, transform = transform.name(), "Skipping transform on empty line");
                continue;
            };
            match transform.apply(&text, line, draft) {
                Ok(result) => draft[idx] = Some(result),
                Err(error) => debug!(%error, "Ignoring failed transform"),
            }
        }
    }
}

/// Assemble a finished poem from the lines the scheduler chose. Returns `None` if the result has
/// no text at all. Otherwise there's exactly one output line per slot, with blank lines as empty
/// strings and every other line prefixed by its indent.
#[must_use]
pub fn assemble(
    form: &CompiledForm,
    mut draft: Vec<Option<String>>,
    indent_unit: &str,
) -> Option<Vec<String>> {
    draft.resize(form.line_count(), None);

    fill_fixed_lines(form, &mut draft);
    apply_transforms(form, &mut draft);

    if draft.iter().flatten().all(|text| text.is_empty()) {
        return None;
    }

    Some(
        draft
            .into_iter()
            .enumerate()
            .map(|(idx, text)| match text {
                Some(text) if !text.is_empty() => {
                    let level = form.indent.get(idx).copied().unwrap_or(0);
                    format!("{}{text}", indent_unit.repeat(level))
                }
                _ => String::new(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use crate::form_config::{compile_form, CompiledForm, FormSpec};
    use crate::poem_assembly::assemble;
    use crate::transform::Transform;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn compile(spec: &FormSpec) -> CompiledForm {
        compile_form(spec, &mut SmallRng::seed_from_u64(1)).unwrap()
    }

    fn draft(lines: &[Option<&str>]) -> Vec<Option<String>> {
        lines.iter().map(|line| line.map(String::from)).collect()
    }

    #[test]
    fn test_copies_refrains_and_pads_blank_lines() {
        let form = compile(&FormSpec::with_rhyme("AbA ").proper(false));
        let poem = assemble(&form, draft(&[Some("one"), Some("two"), None, None]), "  ").unwrap();
        assert_eq!(poem, vec!["one", "two", "one", ""]);
    }

    #[test]
    fn test_exact_lines_overwrite() {
        let form = compile(&FormSpec::with_rhyme("ab").exact(2, "Verbatim.").proper(false));
        let poem = assemble(&form, draft(&[Some("one"), None]), "  ").unwrap();
        assert_eq!(poem, vec!["one", "Verbatim."]);
    }

    #[test]
    fn test_indents_after_transforms() {
        let form = compile(
            &FormSpec::with_rhyme("aa a")
                .indent("0120")
                .transform(-1, Transform::Upcase)
                .transform(2, Transform::custom("starts", |text, _, _| {
                    if text.starts_with(' ') {
                        Err("already indented".into())
                    } else {
                        Ok(format!("{text}!"))
                    }
                }))
                .proper(false),
        );
        let poem = assemble(&form, draft(&[Some("one"), Some("two"), None, Some("four")]), "--")
            .unwrap();
        assert_eq!(poem, vec!["one", "--two!", "", "FOUR"]);
    }

    #[test]
    fn test_failed_transforms_leave_the_line_alone() {
        let form = compile(
            &FormSpec::with_rhyme("ab")
                .transform(1, Transform::custom("broken", |_, _, _| Err("nope".into())))
                .transform(1, Transform::Upcase)
                .proper(false),
        );
        let poem = assemble(&form, draft(&[Some("one"), Some("two")]), "  ").unwrap();
        assert_eq!(poem, vec!["ONE", "two"]);
    }

    #[test]
    fn test_transforms_see_the_current_draft() {
        let form = compile(
            &FormSpec::with_rhyme("ab")
                .transform(1, Transform::Upcase)
                .transform(2, Transform::custom("echo", |_, _, draft| {
                    Ok(draft[0].clone().unwrap_or_default())
                }))
                .proper(false),
        );
        let poem = assemble(&form, draft(&[Some("one"), Some("two")]), "  ").unwrap();
        assert_eq!(poem, vec!["ONE", "ONE"]);
    }

    #[test]
    fn test_empty_poem_is_absent() {
        let form = compile(&FormSpec::with_rhyme("a a").proper(false));
        assert_eq!(assemble(&form, draft(&[None, None, None]), "  "), None);
        assert_eq!(assemble(&form, draft(&[Some(""), None, None]), "  "), None);
    }
}
