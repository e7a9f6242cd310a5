use std::collections::HashSet;
use std::sync::Arc;

use crate::collection::{CollectionId, LinkId, Rights, UserId};

use super::{CollectionReader, EngineConfig, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTarget {
    Collection(CollectionId),
    Link(LinkId),
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub user_id: UserId,
    pub target: ResolveTarget,
}

impl ResolveRequest {
    pub fn collection(user_id: UserId, collection_id: CollectionId) -> Self {
        Self {
            user_id,
            target: ResolveTarget::Collection(collection_id),
        }
    }

    pub fn link(user_id: UserId, link_id: LinkId) -> Self {
        Self {
            user_id,
            target: ResolveTarget::Link(link_id),
        }
    }
}

/// The membership record that decided a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveGrant {
    pub rights: Rights,
    pub source_collection_id: CollectionId,
    pub source_collection_name: String,
    /// True when the record sits on the collection that was asked about.
    pub direct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectivePermission {
    Owner,
    Grant(EffectiveGrant),
    None,
}

impl EffectivePermission {
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn grant(&self) -> Option<&EffectiveGrant> {
        match self {
            Self::Grant(grant) => Some(grant),
            _ => None,
        }
    }

    /// Rights the permission confers; owners hold every right.
    pub fn rights(&self) -> Option<Rights> {
        match self {
            Self::Owner => Some(Rights::all()),
            Self::Grant(grant) => Some(grant.rights),
            Self::None => None,
        }
    }

    /// Gate for adding links or sub-collections and for moving something in.
    pub fn can_contribute(&self) -> bool {
        self.rights().is_some_and(|r| r.any())
    }

    /// Gate for editing the collection's own fields.
    pub fn can_update(&self) -> bool {
        self.rights().is_some_and(|r| r.can_update)
    }

    /// Gate for moving the collection itself.
    pub fn can_relocate(&self) -> bool {
        self.rights().is_some_and(|r| r.can_update || r.can_delete)
    }
}

pub struct PermissionResolver<R: CollectionReader> {
    reader: Arc<R>,
    config: EngineConfig,
}

impl<R: CollectionReader> PermissionResolver<R> {
    pub fn new(reader: Arc<R>, config: EngineConfig) -> Self {
        Self { reader, config }
    }

    pub async fn resolve(
        &self,
        request: &ResolveRequest,
    ) -> Result<EffectivePermission, EngineError> {
        match request.target {
            ResolveTarget::Collection(collection_id) => {
                self.resolve_collection(request.user_id, collection_id)
                    .await
            }
            ResolveTarget::Link(link_id) => {
                match self.reader.collection_of_link(link_id).await? {
                    Some(collection_id) => {
                        self.resolve_collection(request.user_id, collection_id)
                            .await
                    }
                    None => {
                        tracing::debug!(%link_id, "link has no collection");
                        Ok(EffectivePermission::None)
                    }
                }
            }
        }
    }

    /// Walks from `collection_id` towards the root and returns the first
    /// owner match or membership record for `user_id`. Never merges flags
    /// across levels.
    pub async fn resolve_collection(
        &self,
        user_id: UserId,
        collection_id: CollectionId,
    ) -> Result<EffectivePermission, EngineError> {
        let mut visited = HashSet::new();
        let mut current = Some(collection_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                tracing::warn!(
                    %user_id,
                    %collection_id,
                    revisited = %id,
                    "cycle in collection ancestry, denying access"
                );
                return Ok(EffectivePermission::None);
            }
            if visited.len() > self.config.max_depth {
                tracing::warn!(
                    %user_id,
                    %collection_id,
                    max_depth = self.config.max_depth,
                    "collection ancestry exceeds max depth, denying access"
                );
                return Ok(EffectivePermission::None);
            }

            let Some(collection) = self.reader.collection(id).await? else {
                tracing::debug!(%user_id, missing = %id, "collection not found during resolution");
                return Ok(EffectivePermission::None);
            };

            if collection.is_owned_by(user_id) {
                return Ok(EffectivePermission::Owner);
            }

            if let Some(member) = collection.direct_member(user_id) {
                tracing::debug!(
                    %user_id,
                    %collection_id,
                    source = %collection.id,
                    rights = %member.rights,
                    "resolved membership"
                );
                return Ok(EffectivePermission::Grant(EffectiveGrant {
                    rights: member.rights,
                    source_collection_id: collection.id,
                    source_collection_name: collection.name,
                    direct: id == collection_id,
                }));
            }

            current = collection.parent_id;
        }

        Ok(EffectivePermission::None)
    }
}
