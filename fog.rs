//! Tracks which prefixes of the key space remain unexplored. Immutable:
//! every mutating operation returns a new fog, leaving prior versions (and
//! any walker still holding one) valid.
use crate::error::{NotUnknown, PerfectVisibility};
use crate::nibbles::Nibbles;

/// An ordered, minimal set of unknown prefixes: no element is a strict
/// prefix of another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexaryTrieFog {
    unknown: Vec<Nibbles>,
}

impl Default for HexaryTrieFog {
    /// The empty trie's fog: everything below the root is unknown.
    fn default() -> Self {
        Self { unknown: vec![Nibbles::empty()] }
    }
}

impl HexaryTrieFog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }

    pub fn unknown_prefixes(&self) -> &[Nibbles] {
        &self.unknown
    }

    /// The unknown prefix lexicographically nearest `index_path`, breaking
    /// ties toward the smaller path. `index_path` is only a locality hint:
    /// any element of the set would be a correct answer.
    pub fn nearest_unknown(&self, index_path: &Nibbles) -> Result<Nibbles, PerfectVisibility> {
        if self.unknown.is_empty() {
            return Err(PerfectVisibility);
        }

        let idx = self.unknown.partition_point(|p| p < index_path);
        let before = idx.checked_sub(1).map(|i| &self.unknown[i]);
        let after = self.unknown.get(idx);

        let nearest = match (before, after) {
            (None, Some(a)) => a,
            (Some(b), None) => b,
            (Some(b), Some(a)) => {
                let dist_before = lexicographic_distance(b, index_path);
                let dist_after = lexicographic_distance(index_path, a);
                if dist_after < dist_before {
                    a
                } else {
                    // Equal distances, or before is closer: smaller wins ties.
                    b
                }
            }
            (None, None) => unreachable!("checked non-empty above"),
        };
        Ok(nearest.clone())
    }

    /// Replaces `old_prefix` (which must currently be in the unknown set)
    /// with `old_prefix ++ s` for each `s` in `sub_segments`. An empty
    /// `sub_segments` simply removes `old_prefix` (a terminal leaf, or a
    /// branch explored with no unexplored children).
    pub fn explore(&self, old_prefix: &Nibbles, sub_segments: &[Nibbles]) -> Result<Self, NotUnknown> {
        let idx = self
            .unknown
            .binary_search(old_prefix)
            .map_err(|_| NotUnknown(old_prefix.clone()))?;

        let mut unknown = self.unknown.clone();
        let replacements: Vec<Nibbles> = sub_segments.iter().map(|s| old_prefix.concat(s)).collect();
        unknown.splice(idx..idx + 1, replacements);
        unknown.sort();
        Ok(Self { unknown })
    }

    /// Removes every listed prefix from the unknown set unconditionally -
    /// used when a caller has learned by other means (e.g. a
    /// `TraversedPartialPath` that revealed an entire subtree inline) that
    /// these prefixes are fully explored.
    pub fn mark_all_complete(&self, prefixes: &[Nibbles]) -> Self {
        let mut unknown = self.unknown.clone();
        unknown.retain(|p| !prefixes.contains(p));
        Self { unknown }
    }
}

/// Lexicographic distance between two paths, defined over their common
/// byte-ish nibble representation: the absolute difference once both are
/// padded to the same length, compared nibble by nibble from the front.
/// Used only to compare two candidate distances against each other, so the
/// exact scale doesn't matter - only the ordering.
fn lexicographic_distance(a: &Nibbles, b: &Nibbles) -> Vec<i32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).unwrap_or(0) as i32 - b.get(i).unwrap_or(0) as i32)
        .map(|d| d.abs())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fog_is_whole_keyspace_unknown() {
        let fog = HexaryTrieFog::default();
        assert!(!fog.is_complete());
        assert_eq!(fog.nearest_unknown(&Nibbles::empty()).unwrap(), Nibbles::empty());
    }

    #[test]
    fn explore_replaces_with_sub_segments() {
        let fog = HexaryTrieFog::default();
        let children = vec![Nibbles::single(0), Nibbles::single(1)];
        let fog = fog.explore(&Nibbles::empty(), &children).unwrap();
        assert_eq!(fog.unknown_prefixes(), &[Nibbles::single(0), Nibbles::single(1)]);
    }

    #[test]
    fn explore_with_no_sub_segments_removes_prefix() {
        let fog = HexaryTrieFog::default();
        let fog = fog.explore(&Nibbles::empty(), &[]).unwrap();
        assert!(fog.is_complete());
    }

    #[test]
    fn explore_rejects_prefix_not_in_unknown_set() {
        let fog = HexaryTrieFog::default();
        let fog = fog.explore(&Nibbles::empty(), &[]).unwrap();
        let err = fog.explore(&Nibbles::empty(), &[]).unwrap_err();
        assert_eq!(err.0, Nibbles::empty());
    }

    #[test]
    fn mark_all_complete_removes_unconditionally() {
        let fog = HexaryTrieFog::default();
        let fog = fog.explore(&Nibbles::empty(), &[Nibbles::single(0), Nibbles::single(1)]).unwrap();
        let fog = fog.mark_all_complete(&[Nibbles::single(0)]);
        assert_eq!(fog.unknown_prefixes(), &[Nibbles::single(1)]);
    }

    #[test]
    fn minimality_holds_after_explore() {
        let fog = HexaryTrieFog::default();
        let fog = fog
            .explore(&Nibbles::empty(), &[Nibbles::single(0), Nibbles::single(5)])
            .unwrap();
        let fog = fog.explore(&Nibbles::single(0), &[Nibbles::from_nibbles([0, 3])]).unwrap();
        for a in fog.unknown_prefixes() {
            for b in fog.unknown_prefixes() {
                if a != b {
                    assert!(!a.is_prefix_of(b));
                }
            }
        }
    }

    #[test]
    fn nearest_unknown_breaks_ties_toward_smaller() {
        let fog = HexaryTrieFog::default();
        let fog = fog.explore(&Nibbles::empty(), &[Nibbles::single(3), Nibbles::single(9)]).unwrap();
        // index_path = 6 is equidistant from 3 and 9.
        let nearest = fog.nearest_unknown(&Nibbles::single(6)).unwrap();
        assert_eq!(nearest, Nibbles::single(3));
    }

    #[test]
    fn nearest_unknown_fails_when_complete() {
        let fog = HexaryTrieFog::default().explore(&Nibbles::empty(), &[]).unwrap();
        assert!(fog.nearest_unknown(&Nibbles::empty()).is_err());
    }
}
