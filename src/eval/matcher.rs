// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Matching of GroupKinds for queries and the preload cache.

use crate::status::GroupKind;

/// Describes which GroupKinds a query cares about.
///
/// Three modes: enumerate-in (`included` non-empty), include-all-minus
/// (`include_all` with optional `excluded`), and empty (matches nothing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupKindMatcher {
    /// Include all kinds. When set, `included` is ignored.
    pub include_all: bool,
    /// Kinds to include. Mutually exclusive with `include_all`.
    pub included: Vec<GroupKind>,
    /// Kinds to exclude. Only consulted with `include_all`.
    pub excluded: Vec<GroupKind>,
}

impl GroupKindMatcher {
    /// Matcher for a single kind.
    pub fn single(kind: GroupKind) -> Self {
        Self {
            included: vec![kind],
            ..Default::default()
        }
    }

    /// Matcher for every kind except the given ones.
    pub fn all_except(excluded: Vec<GroupKind>) -> Self {
        Self {
            include_all: true,
            excluded,
            ..Default::default()
        }
    }

    /// Matcher that matches nothing. Used by queries that must not trigger
    /// any preload (e.g. pod log queries).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matches(&self, gk: &GroupKind) -> bool {
        if !self.included.is_empty() {
            return self.included.contains(gk);
        }

        if !self.include_all {
            return false;
        }

        !self.excluded.contains(gk)
    }

    /// Union of the kinds matched by `self` and `other`.
    ///
    /// When either side includes all kinds, the result does too, and only
    /// kinds excluded by *both* sides stay excluded. A single include-all
    /// side therefore drops the other side's exclusions entirely: the
    /// narrower side implicitly accepts everything the broader side would
    /// exclude.
    pub fn merge(&self, other: &GroupKindMatcher) -> GroupKindMatcher {
        let mut include_all = false;
        let mut included = Vec::new();

        if !self.include_all && !other.include_all {
            included.extend(self.included.iter().cloned());
            included.extend(other.included.iter().cloned());
        } else {
            include_all = true;
        }

        let mut exclude_inputs = Vec::new();
        if self.include_all {
            exclude_inputs.push(&self.excluded);
        }
        if other.include_all {
            exclude_inputs.push(&other.excluded);
        }

        GroupKindMatcher {
            include_all,
            included,
            excluded: intersect(&exclude_inputs),
        }
    }

    /// Set-wise equality: same mode and set-equal include/exclude lists,
    /// regardless of ordering or duplicates.
    pub fn equal(&self, other: &GroupKindMatcher) -> bool {
        if self.include_all != other.include_all {
            return false;
        }
        set_equal(&self.included, &other.included) && set_equal(&self.excluded, &other.excluded)
    }
}

fn set_equal(a: &[GroupKind], b: &[GroupKind]) -> bool {
    a.iter().all(|gk| b.contains(gk)) && b.iter().all(|gk| a.contains(gk))
}

/// Intersection of the given sets. With a single input the set is returned
/// unchanged; with no inputs the result is empty.
fn intersect(sets: &[&Vec<GroupKind>]) -> Vec<GroupKind> {
    match sets {
        [] => Vec::new(),
        [only] => (*only).clone(),
        [first, rest @ ..] => first
            .iter()
            .filter(|gk| rest.iter().all(|set| set.contains(gk)))
            .cloned()
            .collect(),
    }
}
