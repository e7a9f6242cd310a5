use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::collection::{Collection, CollectionId, UserId};

use super::{CollectionReader, CollectionWriter, EngineConfig, EngineError, PermissionResolver};

/// Where a collection sits: at the user's top level or under another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRef {
    Root,
    Collection(CollectionId),
}

impl ParentRef {
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    pub fn collection_id(&self) -> Option<CollectionId> {
        match self {
            Self::Root => None,
            Self::Collection(id) => Some(*id),
        }
    }
}

impl From<Option<CollectionId>> for ParentRef {
    fn from(parent_id: Option<CollectionId>) -> Self {
        parent_id.map_or(Self::Root, Self::Collection)
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Collection(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub parent: ParentRef,
    pub index: Option<usize>,
}

impl Position {
    pub fn new(parent: ParentRef, index: Option<usize>) -> Self {
        Self { parent, index }
    }
}

#[derive(Debug, Clone)]
pub struct MoveIntent {
    pub collection_id: CollectionId,
    pub source: Position,
    pub destination: Position,
}

impl MoveIntent {
    pub fn is_noop(&self) -> bool {
        self.source.parent == self.destination.parent && self.source.index == self.destination.index
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("permission denied: cannot move {0}")]
    NotOwnerOfSource(CollectionId),

    #[error("permission denied: cannot add collections to {0}")]
    NoCreateInDestination(CollectionId),

    #[error("cannot move {0} into itself or one of its descendants")]
    CircularMove(CollectionId),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl MoveError {
    /// Stable label for metrics and audit events.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotOwnerOfSource(_) => "not_owner_of_source",
            Self::NoCreateInDestination(_) => "no_create_in_destination",
            Self::CircularMove(_) => "circular_move",
            Self::Engine(_) => "engine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Unchanged,
    Moved {
        parent_changed: bool,
        root_order: Option<Vec<CollectionId>>,
    },
}

/// The writes a validated move produces. The store applies both parts or
/// neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommit {
    pub user_id: UserId,
    pub collection_id: CollectionId,
    /// `Some(None)` reparents to root; `None` leaves the parent alone.
    pub new_parent: Option<Option<CollectionId>>,
    pub root_order: Option<Vec<CollectionId>>,
}

impl MoveCommit {
    pub fn is_empty(&self) -> bool {
        self.new_parent.is_none() && self.root_order.is_none()
    }
}

pub struct MoveCoordinator<S: CollectionReader + CollectionWriter> {
    store: Arc<S>,
    resolver: PermissionResolver<S>,
    config: EngineConfig,
}

impl<S: CollectionReader + CollectionWriter> MoveCoordinator<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            resolver: PermissionResolver::new(Arc::clone(&store), config.clone()),
            store,
            config,
        }
    }

    /// Validates and applies a reparent and/or root reorder. Every check runs
    /// before the single commit, so a rejected move writes nothing.
    pub async fn move_collection(
        &self,
        user_id: UserId,
        intent: &MoveIntent,
    ) -> Result<MoveOutcome, MoveError> {
        if intent.is_noop() {
            return Ok(MoveOutcome::Unchanged);
        }

        let moved_id = intent.collection_id;
        let source_permission = self.resolver.resolve_collection(user_id, moved_id).await?;
        if !source_permission.can_relocate() {
            return Err(MoveError::NotOwnerOfSource(moved_id));
        }

        if let ParentRef::Collection(destination_id) = intent.destination.parent {
            let destination_permission = self
                .resolver
                .resolve_collection(user_id, destination_id)
                .await?;
            if !destination_permission.can_contribute() {
                return Err(MoveError::NoCreateInDestination(destination_id));
            }
            ensure_not_descendant(self.store.as_ref(), &self.config, moved_id, destination_id)
                .await?;
        }

        let Some(moved) = self.store.collection(moved_id).await? else {
            return Err(MoveError::NotOwnerOfSource(moved_id));
        };

        let commit = self.plan_commit(user_id, &moved, intent).await?;
        let parent_changed = commit.new_parent.is_some();
        if !commit.is_empty() {
            self.store.commit_move(&commit).await?;
        }

        tracing::debug!(
            %user_id,
            collection_id = %moved_id,
            from = %intent.source.parent,
            to = %intent.destination.parent,
            parent_changed,
            "collection moved"
        );

        Ok(MoveOutcome::Moved {
            parent_changed,
            root_order: commit.root_order,
        })
    }

    async fn plan_commit(
        &self,
        user_id: UserId,
        moved: &Collection,
        intent: &MoveIntent,
    ) -> Result<MoveCommit, MoveError> {
        let destination_parent = intent.destination.parent.collection_id();
        let new_parent = (moved.parent_id != destination_parent).then_some(destination_parent);

        // The stored order decides whether the id leaves the top level; a
        // shared collection can render at the top while having a parent.
        let order = self.store.root_order(user_id).await?;
        let root_order = if intent.destination.parent.is_root() {
            Some(reorder_root(&order, moved.id, intent.destination.index))
        } else {
            order
                .contains(&moved.id)
                .then(|| order.iter().copied().filter(|id| *id != moved.id).collect())
        };

        Ok(MoveCommit {
            user_id,
            collection_id: moved.id,
            new_parent,
            root_order,
        })
    }
}

/// Walks up from the destination; meeting the moved collection means the
/// move would close a loop. A chain that is already broken also fails.
pub async fn ensure_not_descendant<R: CollectionReader>(
    reader: &R,
    config: &EngineConfig,
    moved_id: CollectionId,
    destination_id: CollectionId,
) -> Result<(), MoveError> {
    let mut visited = HashSet::new();
    let mut current = Some(destination_id);

    while let Some(id) = current {
        if id == moved_id {
            return Err(MoveError::CircularMove(moved_id));
        }
        if !visited.insert(id) || visited.len() > config.max_depth {
            tracing::warn!(
                collection_id = %moved_id,
                destination = %destination_id,
                at = %id,
                "destination ancestry is cyclic or too deep, rejecting move"
            );
            return Err(MoveError::CircularMove(moved_id));
        }
        current = match reader.collection(id).await? {
            Some(collection) => collection.parent_id,
            None => None,
        };
    }

    Ok(())
}

/// Removes `id` from the order and reinserts it at `index`, clamped to the
/// end. `None` appends.
pub fn reorder_root(
    order: &[CollectionId],
    id: CollectionId,
    index: Option<usize>,
) -> Vec<CollectionId> {
    let mut reordered: Vec<CollectionId> = order.iter().copied().filter(|c| *c != id).collect();
    match index {
        Some(index) => reordered.insert(index.min(reordered.len()), id),
        None => reordered.push(id),
    }
    reordered
}

/// Keeps only ids that currently render at the top level (no parent, or a
/// parent outside the accessible set) and appends such collections that are
/// missing from the order. Anything else, including ids that were nested
/// since, is dropped so positions in the order match the rendered tree.
///
/// An empty order is seeded from the top-level collections in fetch order.
pub fn reconcile_root_order(
    order: &[CollectionId],
    accessible: &[Collection],
) -> Vec<CollectionId> {
    let present: HashSet<CollectionId> = accessible.iter().map(|c| c.id).collect();
    let top_level: Vec<CollectionId> = accessible
        .iter()
        .filter(|c| match c.parent_id {
            None => true,
            Some(parent) => !present.contains(&parent),
        })
        .map(|c| c.id)
        .collect();
    let top_level_set: HashSet<CollectionId> = top_level.iter().copied().collect();

    let mut reconciled: Vec<CollectionId> = order
        .iter()
        .copied()
        .filter(|id| top_level_set.contains(id))
        .collect();
    let mut listed: HashSet<CollectionId> = reconciled.iter().copied().collect();

    for id in top_level {
        if listed.insert(id) {
            reconciled.push(id);
        }
    }

    reconciled
}
