//! Hierarchy validation and level calculation.
//!
//! Every write that sets or changes a parent link goes through
//! [`validate_and_level`] before anything is committed. Parent chains are
//! resolved through [`ParentLinks`], so the same gate works against the
//! committed arena and against an overlay of elements that are not saved yet.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::domain::entities::{ElementId, NetworkElement};
use crate::domain::error::{CycleError, DomainError, DomainResult};

/// What happens to descendant levels when an element moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelPolicy {
    /// Recompute every descendant's level after a parent change.
    #[default]
    Cascade,
    /// Only the moved element is relevelled; descendants keep stale levels.
    Drift,
}

impl fmt::Display for LevelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cascade => f.write_str("cascade"),
            Self::Drift => f.write_str("drift"),
        }
    }
}

/// Read access to parent pointers and stored levels.
pub trait ParentLinks {
    /// `None` if the element is unknown, otherwise its parent (possibly none).
    fn parent_of(&self, id: ElementId) -> Option<Option<ElementId>>;

    /// Stored `network_lvl` of a known element.
    fn level_of(&self, id: ElementId) -> Option<u32>;
}

/// Validate the element's parent link and write its `network_lvl`.
///
/// Fails with [`CycleError`] if the element would become its own ancestor,
/// and with [`DomainError::ElementNotFound`] if the chain references an
/// unknown element. On success only `element.network_lvl` is touched.
#[instrument(level = "debug", skip_all, fields(element = %element.id, parent = ?element.parent))]
pub fn validate_and_level<L>(links: &L, element: &mut NetworkElement) -> DomainResult<u32>
where
    L: ParentLinks + ?Sized,
{
    let level = level_for(links, element.id, element.parent)?;
    element.network_lvl = level;
    debug!(level, "validated parent link");
    Ok(level)
}

/// Level `element` gets under `proposed_parent`, after cycle checks.
pub fn level_for<L>(
    links: &L,
    element: ElementId,
    proposed_parent: Option<ElementId>,
) -> DomainResult<u32>
where
    L: ParentLinks + ?Sized,
{
    let Some(parent) = proposed_parent else {
        return Ok(0);
    };
    if parent == element {
        return Err(CycleError::SelfReference(element).into());
    }

    let mut seen = HashSet::new();
    let mut current = Some(parent);
    while let Some(ancestor) = current {
        if ancestor == element {
            return Err(CycleError::Detected { element, parent }.into());
        }
        if !seen.insert(ancestor) {
            return Err(DomainError::CorruptNetwork(format!(
                "parent chain above {parent} loops through {ancestor}"
            )));
        }
        trace!(%ancestor, "walking up");
        current = links
            .parent_of(ancestor)
            .ok_or(DomainError::ElementNotFound(ancestor))?;
    }

    let parent_level = links
        .level_of(parent)
        .ok_or(DomainError::ElementNotFound(parent))?;
    child_level(parent, parent_level)
}

/// Level directly below a parent stored at `parent_level`.
pub(crate) fn child_level(parent: ElementId, parent_level: u32) -> DomainResult<u32> {
    parent_level.checked_add(1).ok_or_else(|| {
        DomainError::CorruptNetwork(format!(
            "element {parent} has level {parent_level}, no room for children"
        ))
    })
}

/// Number of ancestors above `id`, counted from the parent chain.
///
/// Ignores stored levels, which makes it the reference for level audits.
pub fn expected_level<L>(links: &L, id: ElementId) -> DomainResult<u32>
where
    L: ParentLinks + ?Sized,
{
    let mut seen = HashSet::from([id]);
    let mut depth = 0;
    let mut current = links.parent_of(id).ok_or(DomainError::ElementNotFound(id))?;
    while let Some(ancestor) = current {
        if !seen.insert(ancestor) {
            return Err(DomainError::CorruptNetwork(format!(
                "element {id} is part of a parent cycle"
            )));
        }
        depth += 1;
        current = links
            .parent_of(ancestor)
            .ok_or(DomainError::ElementNotFound(ancestor))?;
    }
    Ok(depth)
}

/// Unsaved elements layered over a base set of links.
///
/// Pending elements shadow the base. Their levels are derived by walking up
/// to the first committed ancestor, so they never need to be stored.
pub struct PendingLinks<'a, L: ?Sized> {
    base: &'a L,
    pending: BTreeMap<ElementId, Option<ElementId>>,
}

impl<'a, L: ParentLinks + ?Sized> PendingLinks<'a, L> {
    pub fn new(base: &'a L) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    pub fn stage(&mut self, id: ElementId, parent: Option<ElementId>) {
        self.pending.insert(id, parent);
    }
}

impl<L: ParentLinks + ?Sized> ParentLinks for PendingLinks<'_, L> {
    fn parent_of(&self, id: ElementId) -> Option<Option<ElementId>> {
        match self.pending.get(&id) {
            Some(parent) => Some(*parent),
            None => self.base.parent_of(id),
        }
    }

    fn level_of(&self, id: ElementId) -> Option<u32> {
        let mut steps = 0;
        let mut seen = HashSet::new();
        let mut current = id;
        loop {
            match self.pending.get(&current) {
                None => {
                    return self
                        .base
                        .level_of(current)
                        .map(|lvl| lvl.saturating_add(steps))
                }
                Some(None) => return Some(steps),
                Some(Some(parent)) => {
                    if !seen.insert(current) {
                        return None;
                    }
                    steps += 1;
                    current = *parent;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Contact;
    use rstest::{fixture, rstest};

    /// Committed links: id -> (parent, level).
    struct Links(BTreeMap<ElementId, (Option<ElementId>, u32)>);

    impl ParentLinks for Links {
        fn parent_of(&self, id: ElementId) -> Option<Option<ElementId>> {
            self.0.get(&id).map(|(p, _)| *p)
        }
        fn level_of(&self, id: ElementId) -> Option<u32> {
            self.0.get(&id).map(|(_, l)| *l)
        }
    }

    const ROOT: ElementId = ElementId(1);
    const CHILD1: ElementId = ElementId(2);
    const CHILD2: ElementId = ElementId(3);
    const GRANDCHILD: ElementId = ElementId(4);

    /// root -> child1 -> grandchild, root -> child2
    #[fixture]
    fn links() -> Links {
        Links(BTreeMap::from([
            (ROOT, (None, 0)),
            (CHILD1, (Some(ROOT), 1)),
            (CHILD2, (Some(ROOT), 1)),
            (GRANDCHILD, (Some(CHILD1), 2)),
        ]))
    }

    fn element(id: u64, parent: Option<ElementId>) -> NetworkElement {
        NetworkElement::new(ElementId(id), Contact::default(), parent)
    }

    #[rstest]
    fn given_no_parent_when_validating_then_level_is_zero(links: Links) {
        let mut new_element = element(10, None);
        assert_eq!(validate_and_level(&links, &mut new_element).unwrap(), 0);
        assert_eq!(new_element.network_lvl, 0);
    }

    #[rstest]
    #[case(ROOT, 1)]
    #[case(CHILD1, 2)]
    #[case(GRANDCHILD, 3)]
    fn given_parent_when_validating_then_level_is_parent_plus_one(
        links: Links,
        #[case] parent: ElementId,
        #[case] expected: u32,
    ) {
        let mut new_element = element(10, Some(parent));
        validate_and_level(&links, &mut new_element).unwrap();
        assert_eq!(new_element.network_lvl, expected);
    }

    #[rstest]
    fn given_self_as_parent_when_validating_then_self_reference(links: Links) {
        let mut root = element(ROOT.0, Some(ROOT));
        let err = validate_and_level(&links, &mut root).unwrap_err();
        assert_eq!(err, DomainError::Cycle(CycleError::SelfReference(ROOT)));
        assert!(err.to_string().contains("cannot be its own parent"));
    }

    #[rstest]
    #[case(CHILD1)]
    #[case(GRANDCHILD)]
    fn given_descendant_as_parent_when_validating_then_cycle_detected(
        links: Links,
        #[case] descendant: ElementId,
    ) {
        let mut root = element(ROOT.0, Some(descendant));
        let err = validate_and_level(&links, &mut root).unwrap_err();
        assert!(err.is_cycle());
        assert!(err.to_string().contains("cycle detected"));
        // level untouched on failure
        assert_eq!(root.network_lvl, 0);
    }

    #[rstest]
    fn given_sibling_as_parent_when_validating_then_accepted(links: Links) {
        let mut child2 = element(CHILD2.0, Some(CHILD1));
        assert_eq!(validate_and_level(&links, &mut child2).unwrap(), 2);
    }

    #[rstest]
    fn given_unchanged_parent_when_revalidating_then_same_level(links: Links) {
        let mut grandchild = element(GRANDCHILD.0, Some(CHILD1));
        let first = validate_and_level(&links, &mut grandchild).unwrap();
        let second = validate_and_level(&links, &mut grandchild).unwrap();
        assert_eq!(first, 2);
        assert_eq!(first, second);
    }

    #[rstest]
    fn given_unknown_parent_when_validating_then_not_found(links: Links) {
        let mut orphan = element(10, Some(ElementId(99)));
        let err = validate_and_level(&links, &mut orphan).unwrap_err();
        assert_eq!(err, DomainError::ElementNotFound(ElementId(99)));
        assert!(err.is_not_found());
    }

    #[test]
    fn given_preexisting_loop_when_walking_then_corrupt_instead_of_hanging() {
        let links = Links(BTreeMap::from([
            (ElementId(1), (Some(ElementId(2)), 1)),
            (ElementId(2), (Some(ElementId(1)), 1)),
        ]));
        let mut outsider = element(10, Some(ElementId(1)));
        let err = validate_and_level(&links, &mut outsider).unwrap_err();
        assert!(matches!(err, DomainError::CorruptNetwork(_)));
    }

    #[test]
    fn given_parent_at_max_level_when_validating_then_corrupt_instead_of_overflow() {
        let links = Links(BTreeMap::from([(ROOT, (None, u32::MAX))]));
        let mut child = element(10, Some(ROOT));

        let err = validate_and_level(&links, &mut child).unwrap_err();

        assert!(matches!(err, DomainError::CorruptNetwork(_)));
        assert_eq!(child.network_lvl, 0);
    }

    #[test]
    fn given_pending_child_of_max_level_parent_when_validating_then_corrupt() {
        let links = Links(BTreeMap::from([(ROOT, (None, u32::MAX - 1))]));
        let mut overlay = PendingLinks::new(&links);
        overlay.stage(ElementId(10), Some(ROOT));
        overlay.stage(ElementId(11), Some(ElementId(10)));

        let mut leaf = element(11, Some(ElementId(10)));
        let err = validate_and_level(&overlay, &mut leaf).unwrap_err();

        assert!(matches!(err, DomainError::CorruptNetwork(_)));
    }

    #[rstest]
    fn given_tree_when_counting_ancestors_then_matches_depth(links: Links) {
        assert_eq!(expected_level(&links, ROOT).unwrap(), 0);
        assert_eq!(expected_level(&links, CHILD2).unwrap(), 1);
        assert_eq!(expected_level(&links, GRANDCHILD).unwrap(), 2);
    }

    #[rstest]
    fn given_pending_chain_when_validating_then_resolves_in_memory(links: Links) {
        // 10 -> 11 -> grandchild, neither 10 nor 11 committed
        let mut overlay = PendingLinks::new(&links);
        overlay.stage(ElementId(11), Some(GRANDCHILD));
        overlay.stage(ElementId(10), Some(ElementId(11)));

        let mut leaf = element(10, Some(ElementId(11)));
        assert_eq!(validate_and_level(&overlay, &mut leaf).unwrap(), 4);
        assert_eq!(overlay.parent_of(ElementId(11)), Some(Some(GRANDCHILD)));
    }

    #[rstest]
    fn given_pending_cycle_when_validating_then_cycle_detected(links: Links) {
        let mut overlay = PendingLinks::new(&links);
        overlay.stage(ElementId(10), Some(ElementId(11)));
        overlay.stage(ElementId(11), Some(ElementId(10)));

        let mut first = element(10, Some(ElementId(11)));
        let err = validate_and_level(&overlay, &mut first).unwrap_err();
        assert!(err.is_cycle());
    }

    #[rstest]
    fn given_pending_root_when_reading_level_then_zero(links: Links) {
        let mut overlay = PendingLinks::new(&links);
        overlay.stage(ElementId(10), None);
        overlay.stage(ElementId(11), Some(ElementId(10)));
        assert_eq!(overlay.level_of(ElementId(10)), Some(0));
        assert_eq!(overlay.level_of(ElementId(11)), Some(1));
        assert_eq!(overlay.level_of(CHILD1), Some(1));
    }
}
