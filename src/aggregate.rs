//! Combine and group helpers shared by the pipeline stages.
//!
//! Every reduction in the pipeline is either an integer sum or an independent
//! per-group computation, so partial results may be merged in any order.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use rayon::prelude::*;

/// Associative, commutative merge of two partial aggregates.
pub trait Merge {
    fn merge(&mut self, other: Self);
}

impl<K: Eq + Hash> Merge for HashMap<K, u64> {
    fn merge(&mut self, other: Self) {
        // fold the smaller map into the larger one
        let (mut big, small) = if self.len() >= other.len() {
            (std::mem::take(self), other)
        } else {
            (other, std::mem::take(self))
        };
        for (k, n) in small {
            *big.entry(k).or_insert(0) += n;
        }
        *self = big;
    }
}

/// Folds `items` in parallel into per-worker accumulators, then merges those.
///
/// This is the in-process combiner: each rayon split pre-aggregates locally
/// and the partial results are reduced pairwise.
pub fn fold_combine<I, A, F>(items: I, fold: F) -> A
where
    I: IntoParallelIterator,
    A: Merge + Default + Send,
    F: Fn(A, I::Item) -> A + Sync + Send,
{
    items
        .into_par_iter()
        .fold(A::default, fold)
        .reduce(A::default, |mut a, b| {
            a.merge(b);
            a
        })
}

/// Groups `(key, value)` pairs by key. Keys come out sorted; values keep their input order.
pub fn group_by_key<K: Ord, V>(pairs: impl IntoIterator<Item = (K, V)>) -> BTreeMap<K, Vec<V>> {
    let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for (k, v) in pairs {
        groups.entry(k).or_default().push(v);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_counts() {
        let mut a: HashMap<&str, u64> = HashMap::from([("x", 1), ("y", 2)]);
        let b: HashMap<&str, u64> = HashMap::from([("y", 3), ("z", 4), ("w", 1)]);
        a.merge(b);
        assert_eq!(a, HashMap::from([("x", 1), ("y", 5), ("z", 4), ("w", 1)]));
    }

    #[test]
    fn fold_combine_matches_sequential_sum() {
        let words: Vec<&str> = "a b a c b a d".split(' ').collect();
        let counted: HashMap<&str, u64> =
            fold_combine(words.clone(), |mut acc: HashMap<&str, u64>, w| {
                *acc.entry(w).or_insert(0) += 1;
                acc
            });
        assert_eq!(counted, HashMap::from([("a", 3), ("b", 2), ("c", 1), ("d", 1)]));
    }

    #[test]
    fn group_by_key_sorts_keys_and_keeps_value_order() {
        let groups = group_by_key(vec![("b", 1), ("a", 2), ("b", 3), ("a", 4)]);
        let keys: Vec<_> = groups.keys().copied().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(groups["a"], vec![2, 4]);
        assert_eq!(groups["b"], vec![1, 3]);
    }
}
