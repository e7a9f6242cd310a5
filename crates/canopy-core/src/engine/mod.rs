mod expand;
mod relocate;
mod resolve;

#[cfg(test)]
mod test_support;

pub use expand::AccessibleSetExpander;
pub use relocate::{
    MoveCommit, MoveCoordinator, MoveError, MoveIntent, MoveOutcome, ParentRef, Position,
    ensure_not_descendant, reconcile_root_order, reorder_root,
};
pub use resolve::{
    EffectiveGrant, EffectivePermission, PermissionResolver, ResolveRequest, ResolveTarget,
};

use std::future::Future;

use crate::collection::{Collection, CollectionId, LinkId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    StorageError(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on ancestor hops for any walk up the parent chain.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// Read access the engines need from the collection store.
pub trait CollectionReader: Send + Sync {
    fn collection(
        &self,
        id: CollectionId,
    ) -> impl Future<Output = Result<Option<Collection>, EngineError>> + Send;

    fn collection_of_link(
        &self,
        link_id: LinkId,
    ) -> impl Future<Output = Result<Option<CollectionId>, EngineError>> + Send;

    /// Collections the user owns or holds a direct membership record on.
    fn accessible_roots(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Collection>, EngineError>> + Send;

    fn children(
        &self,
        parent_id: CollectionId,
    ) -> impl Future<Output = Result<Vec<Collection>, EngineError>> + Send;
}

/// Write access the move coordinator needs.
pub trait CollectionWriter: Send + Sync {
    fn root_order(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<CollectionId>, EngineError>> + Send;

    /// Applies a reparent and root order change as one unit.
    fn commit_move(
        &self,
        commit: &MoveCommit,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;
}
