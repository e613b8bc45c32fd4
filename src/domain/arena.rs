use std::collections::{BTreeMap, BTreeSet};

use termtree::Tree;
use tracing::{debug, instrument};

use crate::domain::entities::{ElementId, NetworkElement};
use crate::domain::error::DomainResult;
use crate::domain::hierarchy::{child_level, ParentLinks};

/// Arena of network elements indexed by id.
///
/// Parent links are stored as ids on the elements themselves; the arena keeps
/// a derived children index in sync so subtrees can be walked top-down.
#[derive(Debug, Default, Clone)]
pub struct NetworkArena {
    elements: BTreeMap<ElementId, NetworkElement>,
    children: BTreeMap<ElementId, BTreeSet<ElementId>>,
}

impl NetworkArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    #[instrument(level = "trace", skip(self, element), fields(id = %element.id))]
    pub fn insert(&mut self, element: NetworkElement) {
        let id = element.id;
        if let Some(parent) = element.parent {
            self.children.entry(parent).or_default().insert(id);
        }
        self.elements.insert(id, element);
    }

    pub fn get(&self, id: ElementId) -> Option<&NetworkElement> {
        self.elements.get(&id)
    }

    /// Mutable access for non-structural fields. Parent changes go through
    /// [`NetworkArena::reparent`].
    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut NetworkElement> {
        self.elements.get_mut(&id)
    }

    /// All elements in id order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkElement> {
        self.elements.values()
    }

    pub fn roots(&self) -> impl Iterator<Item = &NetworkElement> {
        self.elements.values().filter(|e| e.is_root())
    }

    pub fn children(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// Move `id` under `new_parent`, returning the previous parent.
    ///
    /// Does not validate; callers run the hierarchy gate first.
    #[instrument(level = "trace", skip(self))]
    pub fn reparent(
        &mut self,
        id: ElementId,
        new_parent: Option<ElementId>,
    ) -> Option<Option<ElementId>> {
        let element = self.elements.get_mut(&id)?;
        let old_parent = std::mem::replace(&mut element.parent, new_parent);
        if old_parent != new_parent {
            if let Some(old) = old_parent {
                if let Some(siblings) = self.children.get_mut(&old) {
                    siblings.remove(&id);
                    if siblings.is_empty() {
                        self.children.remove(&old);
                    }
                }
            }
            if let Some(new) = new_parent {
                self.children.entry(new).or_default().insert(id);
            }
        }
        Some(old_parent)
    }

    pub fn iter_subtree(&self, root: ElementId) -> SubtreeIterator<'_> {
        SubtreeIterator::new(self, root)
    }

    pub fn iter_subtree_postorder(&self, root: ElementId) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self, root)
    }

    /// Remove `id` with its whole subtree, children before parents.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_subtree(&mut self, id: ElementId) -> Vec<NetworkElement> {
        let doomed: Vec<ElementId> = self.iter_subtree_postorder(id).map(|e| e.id).collect();
        if let Some(parent) = self.get(id).and_then(|e| e.parent) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(&id);
                if siblings.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
        let removed: Vec<NetworkElement> = doomed
            .into_iter()
            .filter_map(|doomed_id| {
                self.children.remove(&doomed_id);
                self.elements.remove(&doomed_id)
            })
            .collect();
        debug!(count = removed.len(), "removed subtree");
        removed
    }

    /// Recompute levels below `id` from its stored level, top-down.
    ///
    /// Returns how many descendants changed.
    #[instrument(level = "debug", skip(self))]
    pub fn relevel_subtree(&mut self, id: ElementId) -> DomainResult<usize> {
        let order: Vec<ElementId> = self.iter_subtree(id).skip(1).map(|e| e.id).collect();
        let mut changed = 0;
        for child in order {
            let Some(parent) = self.get(child).and_then(|e| e.parent) else {
                continue;
            };
            let Some(parent_level) = self.level_of(parent) else {
                continue;
            };
            let level = child_level(parent, parent_level)?;
            if let Some(element) = self.get_mut(child) {
                if element.network_lvl != level {
                    element.network_lvl = level;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// One display tree per root.
    pub fn to_trees(&self) -> Vec<Tree<String>> {
        self.roots().map(|root| self.build_tree(root.id)).collect()
    }

    fn build_tree(&self, id: ElementId) -> Tree<String> {
        let label = self
            .get(id)
            .map(|e| e.to_string())
            .unwrap_or_else(|| id.to_string());
        let leaves: Vec<Tree<String>> = self.children(id).map(|c| self.build_tree(c)).collect();
        Tree::new(label).with_leaves(leaves)
    }
}

impl ParentLinks for NetworkArena {
    fn parent_of(&self, id: ElementId) -> Option<Option<ElementId>> {
        self.get(id).map(|e| e.parent)
    }

    fn level_of(&self, id: ElementId) -> Option<u32> {
        self.get(id).map(|e| e.network_lvl)
    }
}

/// Pre-order walk of one subtree, children in id order.
pub struct SubtreeIterator<'a> {
    arena: &'a NetworkArena,
    stack: Vec<ElementId>,
}

impl<'a> SubtreeIterator<'a> {
    fn new(arena: &'a NetworkArena, root: ElementId) -> Self {
        let stack = if arena.contains(root) { vec![root] } else { Vec::new() };
        Self { arena, stack }
    }
}

impl<'a> Iterator for SubtreeIterator<'a> {
    type Item = &'a NetworkElement;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(element) = self.arena.get(current) {
                // reversed so the smallest id is visited first
                let children: Vec<ElementId> = self.arena.children(current).collect();
                self.stack.extend(children.into_iter().rev());
                return Some(element);
            }
        }
        None
    }
}

/// Post-order walk of one subtree: every child before its parent.
pub struct PostOrderIterator<'a> {
    arena: &'a NetworkArena,
    stack: Vec<(ElementId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a NetworkArena, root: ElementId) -> Self {
        let stack = if arena.contains(root) {
            vec![(root, false)]
        } else {
            Vec::new()
        };
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = &'a NetworkElement;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(element) = self.arena.get(current) {
                if visited {
                    return Some(element);
                }
                self.stack.push((current, true));
                let children: Vec<ElementId> = self.arena.children(current).collect();
                for child in children.into_iter().rev() {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}
