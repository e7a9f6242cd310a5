use std::sync::Arc;

use canopy_core::collection::{Collection, CollectionId, LinkId, UserId};
use canopy_core::engine::{CollectionReader, CollectionWriter, EngineError, MoveCommit};
use canopy_storage::{CollectionStore, StorageError, UserStore};

fn engine_error(err: StorageError) -> EngineError {
    EngineError::StorageError(err.to_string())
}

/// Presents a concrete store to the engines through their read/write seams.
pub struct StoreCollectionReader<S> {
    store: Arc<S>,
}

impl<S> StoreCollectionReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: CollectionStore> CollectionReader for StoreCollectionReader<S> {
    async fn collection(&self, id: CollectionId) -> Result<Option<Collection>, EngineError> {
        self.store.get_by_id(id).await.map_err(engine_error)
    }

    async fn collection_of_link(
        &self,
        link_id: LinkId,
    ) -> Result<Option<CollectionId>, EngineError> {
        self.store
            .collection_of_link(link_id)
            .await
            .map_err(engine_error)
    }

    async fn accessible_roots(&self, user_id: UserId) -> Result<Vec<Collection>, EngineError> {
        self.store
            .get_by_owner_or_member(user_id)
            .await
            .map_err(engine_error)
    }

    async fn children(&self, parent_id: CollectionId) -> Result<Vec<Collection>, EngineError> {
        self.store.get_children(parent_id).await.map_err(engine_error)
    }
}

impl<S: CollectionStore + UserStore> CollectionWriter for StoreCollectionReader<S> {
    async fn root_order(&self, user_id: UserId) -> Result<Vec<CollectionId>, EngineError> {
        let user = self.store.get_user(user_id).await.map_err(engine_error)?;
        Ok(user.map(|u| u.root_order).unwrap_or_default())
    }

    async fn commit_move(&self, commit: &MoveCommit) -> Result<(), EngineError> {
        self.store.commit_move(commit).await.map_err(engine_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_storage::{InMemoryStore, NewCollection};

    #[tokio::test]
    async fn adapter_reads_collections_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let root = store
            .create(NewCollection::new("Root", UserId::new(1)))
            .await
            .unwrap();
        let child = store
            .create(NewCollection::new("Child", UserId::new(1)).with_parent(root.id))
            .await
            .unwrap();

        let adapter = StoreCollectionReader::new(Arc::clone(&store));

        let fetched = adapter.collection(root.id).await.unwrap().unwrap();
        let children = adapter.children(root.id).await.unwrap();
        assert_eq!(fetched.name, "Root");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
    }

    #[tokio::test]
    async fn adapter_defaults_root_order_for_unknown_user() {
        let store = Arc::new(InMemoryStore::new());
        let adapter = StoreCollectionReader::new(Arc::clone(&store));

        let order = adapter.root_order(UserId::new(9)).await.unwrap();

        assert!(order.is_empty());
    }

    #[tokio::test]
    async fn adapter_maps_storage_error_to_engine_error() {
        let store = Arc::new(InMemoryStore::new());
        let adapter = StoreCollectionReader::new(Arc::clone(&store));

        let err = adapter
            .commit_move(&MoveCommit {
                user_id: UserId::new(1),
                collection_id: CollectionId::new(404),
                new_parent: Some(None),
                root_order: None,
            })
            .await
            .unwrap_err();

        assert!(
            matches!(err, EngineError::StorageError(ref msg) if msg.contains("not found")),
            "expected StorageError with 'not found', got: {err}"
        );
    }
}
