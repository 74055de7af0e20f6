//! Randomized visiting-order generation for shuffle mode.
//!
//! Pure functions producing permutations of queue positions. The key
//! property is that extending an order mid-playback never reshuffles
//! positions already behind the playhead: the already-played prefix is
//! preserved verbatim and only the unvisited remainder is redrawn.

use rand::seq::SliceRandom;

/// Produce a random permutation of `[0, n)`.
///
/// If `fixed_first` is `Some(i)` with `i < n`, index `i` occupies
/// position 0 and the remaining values are a uniform shuffle of the
/// rest. Otherwise the whole permutation is uniformly random.
pub fn compute(n: usize, fixed_first: Option<usize>) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = rand::rng();
    order.shuffle(&mut rng);

    if let Some(first) = fixed_first.filter(|&f| f < n) {
        if let Some(pos) = order.iter().position(|&i| i == first) {
            order.remove(pos);
            order.insert(0, first);
        }
    }

    order
}

/// Extend an existing visiting order to cover `new_n` positions.
///
/// The prefix of `existing` up to and including the element equal to
/// `keep_until` is preserved; the remaining slots are filled with a
/// fresh uniform shuffle of every index not yet in the kept prefix.
/// If `keep_until` does not occur in `existing`, the whole of
/// `existing` is preserved (nothing behind the playhead may be lost).
///
/// Extension only grows: returns an empty vector when
/// `new_n < existing.len()`.
pub fn extend(existing: &[usize], new_n: usize, keep_until: usize) -> Vec<usize> {
    if new_n < existing.len() {
        return Vec::new();
    }

    let kept_len = existing
        .iter()
        .position(|&i| i == keep_until)
        .map(|p| p + 1)
        .unwrap_or(existing.len());

    let mut order: Vec<usize> = existing[..kept_len].to_vec();

    let mut rest: Vec<usize> = (0..new_n).filter(|i| !order.contains(i)).collect();
    let mut rng = rand::rng();
    rest.shuffle(&mut rng);
    order.extend(rest);

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_permutation(order: &[usize], n: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn test_compute_empty() {
        assert!(compute(0, None).is_empty());
        assert!(compute(0, Some(0)).is_empty());
    }

    #[test]
    fn test_compute_single() {
        assert_eq!(compute(1, None), vec![0]);
        assert_eq!(compute(1, Some(0)), vec![0]);
    }

    #[test]
    fn test_compute_fixed_first_out_of_range_ignored() {
        let order = compute(4, Some(9));
        assert!(is_permutation(&order, 4));
    }

    #[test]
    fn test_extend_refuses_to_shrink() {
        assert!(extend(&[2, 0, 1], 2, 0).is_empty());
    }

    #[test]
    fn test_extend_missing_keep_until_preserves_whole_prefix() {
        let existing = vec![2, 0, 1];
        let order = extend(&existing, 5, 99);
        assert_eq!(&order[..3], &existing[..]);
        assert!(is_permutation(&order, 5));
    }

    proptest! {
        #[test]
        fn prop_compute_is_bijection(n in 1usize..64) {
            let order = compute(n, None);
            prop_assert!(is_permutation(&order, n));
        }

        #[test]
        fn prop_compute_pins_fixed_first(n in 1usize..64, seed in 0usize..64) {
            let fixed = seed % n;
            let order = compute(n, Some(fixed));
            prop_assert_eq!(order[0], fixed);
            prop_assert!(is_permutation(&order, n));
        }

        #[test]
        fn prop_extend_preserves_played_prefix(
            n in 2usize..32,
            grow in 0usize..16,
            cut in 0usize..32,
        ) {
            let existing = compute(n, None);
            let keep_until = existing[cut % n];
            let kept = existing.iter().position(|&i| i == keep_until).unwrap() + 1;

            let order = extend(&existing, n + grow, keep_until);
            prop_assert_eq!(&order[..kept], &existing[..kept]);
            prop_assert!(is_permutation(&order, n + grow));
        }
    }
}
