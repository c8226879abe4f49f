use std::iter;

/// Iterate over every element of `items` except the one at `index`, nearest first. At each
/// distance the element before `index` comes before the one after it, so for `[a, b, c, d, e]`
/// and index 2 this yields `b, d, a, e`.
pub fn ordered_by_distance<T>(items: &[T], index: usize) -> impl Iterator<Item = (usize, &T)> {
    let mut distance = 0;

    iter::from_fn(move || {
        distance += 1;
        let below = index.checked_sub(distance).filter(|&i| i < items.len());
        let above = Some(index + distance).filter(|&i| i < items.len());

        if below.is_none() && above.is_none() {
            None
        } else {
            Some(below.into_iter().chain(above))
        }
    })
    .flatten()
    .map(move |i| (i, &items[i]))
}
