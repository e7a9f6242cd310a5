use std::sync::Arc;

use canopy_core::collection::{
    AccessibleCollection, Collection, CollectionId, MemberGrant, UserId,
};
use canopy_core::engine::{
    AccessibleSetExpander, EffectivePermission, EngineConfig, MoveCoordinator, MoveIntent,
    MoveOutcome, PermissionResolver, ResolveRequest, ResolveTarget, ensure_not_descendant,
    reconcile_root_order,
};
use canopy_core::tree::{SortMode, TreeOptions, TreeState};
use canopy_storage::{
    CollectionFields, CollectionStore, CollectionUpdate, Link, NewCollection, NewLink, UserStore,
};

use crate::adapter::StoreCollectionReader;
use crate::audit;
use crate::error::ApiError;
use crate::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct CreateCollectionInput {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<CollectionId>,
    pub members: Vec<MemberGrant>,
}

/// Replaces a collection's display fields. `parent_id` and `members` are
/// left as stored when `None`; `parent_id: Some(None)` moves the collection
/// to the top level.
#[derive(Debug, Clone)]
pub struct UpdateCollectionInput {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<Option<CollectionId>>,
    pub members: Option<Vec<MemberGrant>>,
}

#[derive(Debug, Clone)]
pub struct CreateLinkInput {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct TreeInput {
    pub sort: SortMode,
    pub active: Option<CollectionId>,
    pub expanded: Vec<CollectionId>,
}

pub struct CollectionService<S> {
    store: Arc<S>,
    engine_config: EngineConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<S: CollectionStore + UserStore> CollectionService<S> {
    pub fn new(store: Arc<S>, engine_config: EngineConfig) -> Self {
        Self {
            store,
            engine_config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn reader(&self) -> Arc<StoreCollectionReader<S>> {
        Arc::new(StoreCollectionReader::new(Arc::clone(&self.store)))
    }

    fn resolver(&self) -> PermissionResolver<StoreCollectionReader<S>> {
        PermissionResolver::new(self.reader(), self.engine_config.clone())
    }

    fn expander(&self) -> AccessibleSetExpander<StoreCollectionReader<S>> {
        AccessibleSetExpander::new(self.reader(), self.engine_config.clone())
    }

    pub async fn resolve_permission(
        &self,
        user_id: UserId,
        target: ResolveTarget,
    ) -> Result<EffectivePermission, ApiError> {
        let request = ResolveRequest { user_id, target };
        Ok(self.resolver().resolve(&request).await?)
    }

    pub async fn list_collections(
        &self,
        user_id: UserId,
    ) -> Result<Vec<AccessibleCollection>, ApiError> {
        let views = self.expander().expand(user_id).await?;
        let collections: Vec<Collection> = views.iter().map(|v| v.collection.clone()).collect();
        self.sync_root_order(user_id, &collections).await?;
        Ok(views)
    }

    pub async fn view_collection(
        &self,
        user_id: UserId,
        collection_id: CollectionId,
    ) -> Result<AccessibleCollection, ApiError> {
        self.expander()
            .view_collection(user_id, collection_id)
            .await?
            .ok_or(ApiError::NotFound(collection_id))
    }

    pub async fn create_collection(
        &self,
        user_id: UserId,
        input: CreateCollectionInput,
    ) -> Result<Collection, ApiError> {
        let name = validated_name(&input.name)?;

        if let Some(parent_id) = input.parent_id {
            let permission = self.resolver().resolve_collection(user_id, parent_id).await?;
            if !permission.can_contribute() {
                return Err(ApiError::Forbidden(format!(
                    "cannot add collections to {parent_id}"
                )));
            }
        }

        let created = self
            .store
            .create(NewCollection {
                name,
                description: input.description,
                color: input.color,
                icon: input.icon,
                owner_id: user_id,
                parent_id: input.parent_id,
                members: input.members,
            })
            .await?;

        if created.is_root() {
            let mut order = self.stored_root_order(user_id).await?;
            order.push(created.id);
            self.store.update_root_order(user_id, order).await?;
        }

        audit::audit_collection_created(user_id, created.id, created.parent_id);
        Ok(created)
    }

    pub async fn update_collection(
        &self,
        user_id: UserId,
        collection_id: CollectionId,
        input: UpdateCollectionInput,
    ) -> Result<Collection, ApiError> {
        let name = validated_name(&input.name)?;

        // Missing and forbidden collections get the same answer.
        let resolver = self.resolver();
        let permission = resolver.resolve_collection(user_id, collection_id).await?;
        if !permission.can_update() {
            return Err(ApiError::Forbidden(format!("cannot update {collection_id}")));
        }
        let current = self
            .store
            .get_by_id(collection_id)
            .await?
            .ok_or(ApiError::NotFound(collection_id))?;

        let new_parent = input.parent_id.filter(|parent| *parent != current.parent_id);
        if let Some(Some(parent_id)) = new_parent {
            let parent_permission = resolver.resolve_collection(user_id, parent_id).await?;
            if !parent_permission.can_contribute() {
                return Err(ApiError::Forbidden(format!(
                    "cannot add collections to {parent_id}"
                )));
            }
            ensure_not_descendant(
                self.reader().as_ref(),
                &self.engine_config,
                collection_id,
                parent_id,
            )
            .await?;
        }

        let updated = self
            .store
            .update(collection_id, CollectionUpdate {
                fields: CollectionFields {
                    name,
                    description: input.description,
                    color: input.color,
                    icon: input.icon,
                },
                parent_id: new_parent,
                members: input.members,
            })
            .await?;

        if current.is_root() != updated.is_root() {
            let mut order = self.stored_root_order(user_id).await?;
            order.retain(|id| *id != collection_id);
            if updated.is_root() {
                order.push(collection_id);
            }
            self.store.update_root_order(user_id, order).await?;
        }

        audit::audit_collection_updated(user_id, collection_id, updated.members.len());
        Ok(updated)
    }

    pub async fn create_link(
        &self,
        user_id: UserId,
        collection_id: CollectionId,
        input: CreateLinkInput,
    ) -> Result<Link, ApiError> {
        if input.url.trim().is_empty() {
            return Err(ApiError::InvalidRequest("url must not be empty".to_string()));
        }

        let permission = self
            .resolver()
            .resolve_collection(user_id, collection_id)
            .await?;
        if !permission.can_contribute() {
            return Err(ApiError::Forbidden(format!(
                "cannot add links to {collection_id}"
            )));
        }

        let link = self
            .store
            .create_link(NewLink {
                collection_id,
                name: input.name,
                url: input.url,
            })
            .await?;
        Ok(link)
    }

    pub async fn move_collection(
        &self,
        user_id: UserId,
        intent: MoveIntent,
    ) -> Result<MoveOutcome, ApiError> {
        // Client indices refer to the rendered top level, so the stored order
        // must match it before the coordinator reads it.
        if !intent.is_noop() {
            let views = self.expander().expand(user_id).await?;
            let collections: Vec<Collection> = views.into_iter().map(|v| v.collection).collect();
            self.sync_root_order(user_id, &collections).await?;
        }

        let coordinator = MoveCoordinator::new(self.reader(), self.engine_config.clone());

        match coordinator.move_collection(user_id, &intent).await {
            Ok(outcome) => {
                if let MoveOutcome::Moved { parent_changed, .. } = outcome {
                    audit::audit_collection_moved(
                        user_id,
                        intent.collection_id,
                        intent.destination.parent,
                        parent_changed,
                    );
                }
                Ok(outcome)
            }
            Err(err) => {
                audit::audit_move_rejected(user_id, intent.collection_id, &err);
                if let Some(ref metrics) = self.metrics {
                    metrics.record_move_rejected(&err);
                }
                Err(err.into())
            }
        }
    }

    pub async fn build_tree(
        &self,
        user_id: UserId,
        input: TreeInput,
    ) -> Result<TreeState, ApiError> {
        let views = self.expander().expand(user_id).await?;
        let collections: Vec<Collection> = views.into_iter().map(|v| v.collection).collect();
        let root_order = self.sync_root_order(user_id, &collections).await?;

        let mut tree = TreeState::build(
            &collections,
            &TreeOptions {
                previous: None,
                root_order: &root_order,
                sort: input.sort,
                active: input.active,
            },
        );
        for id in input.expanded {
            tree.set_expanded(id, true);
        }
        Ok(tree)
    }

    async fn stored_root_order(&self, user_id: UserId) -> Result<Vec<CollectionId>, ApiError> {
        let user = self.store.get_user(user_id).await?;
        Ok(user.map(|u| u.root_order).unwrap_or_default())
    }

    /// Prunes stale ids from the user's root order and appends missing
    /// top-level collections, writing back only when something changed.
    async fn sync_root_order(
        &self,
        user_id: UserId,
        collections: &[Collection],
    ) -> Result<Vec<CollectionId>, ApiError> {
        let stored = self.stored_root_order(user_id).await?;
        let reconciled = reconcile_root_order(&stored, collections);
        if reconciled != stored {
            tracing::debug!(
                %user_id,
                before = stored.len(),
                after = reconciled.len(),
                "root order reconciled"
            );
            self.store
                .update_root_order(user_id, reconciled.clone())
                .await?;
        }
        Ok(reconciled)
    }
}

fn validated_name(name: &str) -> Result<String, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidRequest("name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}
