use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::collection::{Collection, CollectionId};
use crate::engine::ParentRef;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    /// Root group follows the user's stored order; nested groups keep fetch order.
    #[default]
    Default,
    NameAsc,
    NameDesc,
    DateNewest,
    DateOldest,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::DateNewest => "date_newest",
            Self::DateOldest => "date_oldest",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown sort mode: {0}")]
pub struct UnknownSortMode(String);

impl FromStr for SortMode {
    type Err = UnknownSortMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "name_asc" => Ok(Self::NameAsc),
            "name_desc" => Ok(Self::NameDesc),
            "date_newest" => Ok(Self::DateNewest),
            "date_oldest" => Ok(Self::DateOldest),
            other => Err(UnknownSortMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    pub id: CollectionId,
    /// Parent within this tree; `None` when the item hangs off the root.
    pub parent_id: Option<CollectionId>,
    pub name: String,
    pub children: Vec<CollectionId>,
    pub is_expanded: bool,
    pub link_count: u64,
    /// Own links plus every descendant's.
    pub total_link_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeOptions<'a> {
    pub previous: Option<&'a TreeState>,
    pub root_order: &'a [CollectionId],
    pub sort: SortMode,
    pub active: Option<CollectionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatItem {
    pub id: CollectionId,
    pub depth: usize,
}

/// A collection tree ready for display. The synthetic root is implicit:
/// `root_children` are its children and it is always expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeState {
    root_children: Vec<CollectionId>,
    items: HashMap<CollectionId, TreeItem>,
}

impl TreeState {
    pub fn build(collections: &[Collection], options: &TreeOptions<'_>) -> Self {
        let (order, by_id) = dedupe(collections);
        let parents = effective_parents(&order, &by_id);

        let mut root_children = Vec::new();
        let mut groups: HashMap<CollectionId, Vec<CollectionId>> = HashMap::new();
        for id in &order {
            match parents.get(id).copied().flatten() {
                Some(parent) => groups.entry(parent).or_default().push(*id),
                None => root_children.push(*id),
            }
        }

        sort_group(&mut root_children, options.sort, Some(options.root_order), &by_id);
        for children in groups.values_mut() {
            sort_group(children, options.sort, None, &by_id);
        }

        let mut items: HashMap<CollectionId, TreeItem> = order
            .iter()
            .map(|id| {
                let collection = by_id[id];
                let is_expanded = options
                    .previous
                    .and_then(|prev| prev.items.get(id))
                    .is_some_and(|item| item.is_expanded);
                let item = TreeItem {
                    id: *id,
                    parent_id: parents.get(id).copied().flatten(),
                    name: collection.name.clone(),
                    children: groups.remove(id).unwrap_or_default(),
                    is_expanded,
                    link_count: collection.link_count,
                    total_link_count: collection.link_count,
                    created_at: collection.created_at,
                };
                (*id, item)
            })
            .collect();

        if let Some(active) = options.active {
            expand_ancestors(&mut items, active);
        }

        let mut tree = Self {
            root_children,
            items,
        };
        tree.recompute_totals();
        tree
    }

    pub fn root_children(&self) -> &[CollectionId] {
        &self.root_children
    }

    pub fn item(&self, id: CollectionId) -> Option<&TreeItem> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns false when `id` is not in the tree.
    pub fn set_expanded(&mut self, id: CollectionId, expanded: bool) -> bool {
        match self.items.get_mut(&id) {
            Some(item) => {
                item.is_expanded = expanded;
                true
            }
            None => false,
        }
    }

    /// Mirrors a committed move in the in-memory tree. Refuses unknown ids and
    /// destinations inside the moved subtree.
    pub fn move_item(
        &mut self,
        id: CollectionId,
        destination: ParentRef,
        index: Option<usize>,
    ) -> bool {
        let Some(current_parent) = self.items.get(&id).map(|item| item.parent_id) else {
            return false;
        };
        let new_parent = destination.collection_id();
        if let Some(target) = new_parent
            && (!self.items.contains_key(&target) || self.is_within(target, id))
        {
            return false;
        }

        self.siblings_mut(current_parent).retain(|c| *c != id);
        let siblings = self.siblings_mut(new_parent);
        let at = index.map_or(siblings.len(), |i| i.min(siblings.len()));
        siblings.insert(at, id);
        if let Some(item) = self.items.get_mut(&id) {
            item.parent_id = new_parent;
        }

        self.recompute_totals();
        true
    }

    /// Visible items depth first, skipping the children of collapsed items.
    pub fn flatten(&self) -> Vec<FlatItem> {
        let mut flat = Vec::with_capacity(self.items.len());
        let mut stack: Vec<(CollectionId, usize)> =
            self.root_children.iter().rev().map(|id| (*id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            flat.push(FlatItem { id, depth });
            if item.is_expanded {
                stack.extend(item.children.iter().rev().map(|c| (*c, depth + 1)));
            }
        }

        flat
    }

    fn siblings_mut(&mut self, parent: Option<CollectionId>) -> &mut Vec<CollectionId> {
        match parent.and_then(|p| self.items.get_mut(&p)) {
            Some(item) => &mut item.children,
            None => &mut self.root_children,
        }
    }

    /// True when `candidate` is `ancestor` or sits somewhere beneath it.
    fn is_within(&self, candidate: CollectionId, ancestor: CollectionId) -> bool {
        let mut current = Some(candidate);
        let mut seen = HashSet::new();
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            current = self.items.get(&id).and_then(|item| item.parent_id);
        }
        false
    }

    fn recompute_totals(&mut self) {
        let mut visit_order = Vec::with_capacity(self.items.len());
        let mut queue: VecDeque<CollectionId> = self.root_children.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if let Some(item) = self.items.get(&id) {
                visit_order.push(id);
                queue.extend(item.children.iter().copied());
            }
        }

        for id in visit_order.into_iter().rev() {
            let descendant_links: u64 = self.items[&id]
                .children
                .iter()
                .filter_map(|c| self.items.get(c))
                .map(|child| child.total_link_count)
                .sum();
            if let Some(item) = self.items.get_mut(&id) {
                item.total_link_count = item.link_count + descendant_links;
            }
        }
    }
}

/// Keeps the first-seen position of each id and the last-seen contents.
fn dedupe(collections: &[Collection]) -> (Vec<CollectionId>, HashMap<CollectionId, &Collection>) {
    let mut order = Vec::with_capacity(collections.len());
    let mut by_id = HashMap::with_capacity(collections.len());
    for collection in collections {
        if by_id.insert(collection.id, collection).is_some() {
            tracing::warn!(collection_id = %collection.id, "duplicate collection in tree input");
        } else {
            order.push(collection.id);
        }
    }
    (order, by_id)
}

/// Parent within the input set, or `None` for orphans and top-level
/// collections. Parent cycles are cut so every item stays reachable.
fn effective_parents(
    order: &[CollectionId],
    by_id: &HashMap<CollectionId, &Collection>,
) -> HashMap<CollectionId, Option<CollectionId>> {
    let mut parents: HashMap<CollectionId, Option<CollectionId>> = order
        .iter()
        .map(|id| {
            let parent = by_id[id]
                .parent_id
                .filter(|p| p != id && by_id.contains_key(p));
            (*id, parent)
        })
        .collect();

    for start in order {
        let mut seen = HashSet::new();
        let mut current = *start;
        while let Some(parent) = parents.get(&current).copied().flatten() {
            if !seen.insert(current) {
                tracing::warn!(
                    collection_id = %current,
                    "cycle in collection parents, attaching to root"
                );
                parents.insert(current, None);
                break;
            }
            current = parent;
        }
    }

    parents
}

fn sort_group(
    ids: &mut [CollectionId],
    sort: SortMode,
    custom_order: Option<&[CollectionId]>,
    by_id: &HashMap<CollectionId, &Collection>,
) {
    let name = |id: &CollectionId| by_id[id].name.to_lowercase();
    let created = |id: &CollectionId| by_id[id].created_at;

    match sort {
        SortMode::Default => {
            if let Some(custom) = custom_order {
                let position: HashMap<CollectionId, usize> =
                    custom.iter().enumerate().map(|(i, id)| (*id, i)).collect();
                ids.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            }
        }
        SortMode::NameAsc => ids.sort_by_key(name),
        SortMode::NameDesc => ids.sort_by(|a, b| name(b).cmp(&name(a))),
        SortMode::DateNewest => ids.sort_by(|a, b| created(b).cmp(&created(a))),
        SortMode::DateOldest => ids.sort_by_key(created),
    }
}

fn expand_ancestors(items: &mut HashMap<CollectionId, TreeItem>, active: CollectionId) {
    let mut seen = HashSet::new();
    let mut current = items.get(&active).and_then(|item| item.parent_id);
    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let Some(item) = items.get_mut(&id) else {
            break;
        };
        item.is_expanded = true;
        current = item.parent_id;
    }
}
