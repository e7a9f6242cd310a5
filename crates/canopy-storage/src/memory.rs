use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use canopy_core::collection::{Collection, CollectionId, LinkId, MemberGrant, UserId};
use canopy_core::engine::MoveCommit;
use chrono::Utc;

use crate::traits::{
    CollectionFields, CollectionStore, CollectionUpdate, Link, NewCollection, NewLink,
    StorageError, User, UserStore,
};

#[derive(Debug, Default)]
struct InnerState {
    last_collection_id: i64,
    last_link_id: i64,
    collections: BTreeMap<CollectionId, Collection>,
    links: BTreeMap<LinkId, Link>,
    root_orders: HashMap<UserId, Vec<CollectionId>>,
}

impl InnerState {
    fn collection_mut(&mut self, id: CollectionId) -> Result<&mut Collection, StorageError> {
        self.collections
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// A parent must exist and must not sit inside the collection's own
    /// subtree. `collection` is `None` for collections not created yet.
    fn check_parent(
        &self,
        collection: Option<CollectionId>,
        parent: CollectionId,
    ) -> Result<(), StorageError> {
        let label = collection.map_or_else(|| "new collection".to_string(), |id| id.to_string());
        let invalid = |reason| StorageError::InvalidParent {
            collection: label.clone(),
            parent,
            reason,
        };

        if !self.collections.contains_key(&parent) {
            return Err(invalid("parent does not exist"));
        }
        let Some(collection) = collection else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == collection {
                return Err(invalid("parent is inside the collection's subtree"));
            }
            if !seen.insert(id) {
                return Err(invalid("parent chain is cyclic"));
            }
            current = self.collections.get(&id).and_then(|c| c.parent_id);
        }
        Ok(())
    }
}

/// One record per user, never the owner.
fn normalize_members(owner_id: UserId, members: Vec<MemberGrant>) -> Vec<MemberGrant> {
    let mut seen = HashSet::new();
    let mut unique: Vec<MemberGrant> = members
        .into_iter()
        .rev()
        .filter(|m| m.user_id != owner_id && seen.insert(m.user_id))
        .collect();
    unique.reverse();
    unique
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, InnerState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Internal("store lock poisoned".to_string()))
    }
}

impl CollectionStore for InMemoryStore {
    async fn get_by_id(&self, id: CollectionId) -> Result<Option<Collection>, StorageError> {
        let state = self.lock()?;
        Ok(state.collections.get(&id).cloned())
    }

    async fn get_by_owner_or_member(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Collection>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .collections
            .values()
            .filter(|c| c.is_owned_by(user_id) || c.direct_member(user_id).is_some())
            .cloned()
            .collect())
    }

    async fn get_children(&self, parent_id: CollectionId) -> Result<Vec<Collection>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .collections
            .values()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<Collection>, StorageError> {
        let state = self.lock()?;
        Ok(state.collections.values().cloned().collect())
    }

    async fn create(&self, new: NewCollection) -> Result<Collection, StorageError> {
        let mut state = self.lock()?;
        if let Some(parent) = new.parent_id {
            state.check_parent(None, parent)?;
        }

        state.last_collection_id += 1;
        let id = CollectionId::new(state.last_collection_id);
        let mut collection = Collection::new(id, new.name, new.owner_id);
        collection.description = new.description;
        collection.color = new.color;
        collection.icon = new.icon;
        collection.parent_id = new.parent_id;
        collection.members = normalize_members(new.owner_id, new.members);

        state.collections.insert(id, collection.clone());
        tracing::debug!(collection_id = %id, owner = %collection.owner_id, "collection stored");
        Ok(collection)
    }

    async fn update_fields(
        &self,
        id: CollectionId,
        fields: CollectionFields,
    ) -> Result<Collection, StorageError> {
        let mut state = self.lock()?;
        let collection = state.collection_mut(id)?;
        collection.name = fields.name;
        collection.description = fields.description;
        collection.color = fields.color;
        collection.icon = fields.icon;
        collection.updated_at = Utc::now();
        Ok(collection.clone())
    }

    async fn update_parent_and_members(
        &self,
        id: CollectionId,
        parent_id: Option<CollectionId>,
        members: Vec<MemberGrant>,
    ) -> Result<Collection, StorageError> {
        let mut state = self.lock()?;
        if let Some(parent) = parent_id {
            state.check_parent(Some(id), parent)?;
        }
        let collection = state.collection_mut(id)?;
        collection.parent_id = parent_id;
        collection.members = normalize_members(collection.owner_id, members);
        collection.updated_at = Utc::now();
        Ok(collection.clone())
    }

    async fn update(
        &self,
        id: CollectionId,
        update: CollectionUpdate,
    ) -> Result<Collection, StorageError> {
        let mut state = self.lock()?;
        if !state.collections.contains_key(&id) {
            return Err(StorageError::NotFound(id.to_string()));
        }
        if let Some(Some(parent)) = update.parent_id {
            state.check_parent(Some(id), parent)?;
        }

        let collection = state.collection_mut(id)?;
        let CollectionFields {
            name,
            description,
            color,
            icon,
        } = update.fields;
        collection.name = name;
        collection.description = description;
        collection.color = color;
        collection.icon = icon;
        if let Some(parent_id) = update.parent_id {
            collection.parent_id = parent_id;
        }
        if let Some(members) = update.members {
            collection.members = normalize_members(collection.owner_id, members);
        }
        collection.updated_at = Utc::now();
        Ok(collection.clone())
    }

    async fn collection_of_link(
        &self,
        link_id: LinkId,
    ) -> Result<Option<CollectionId>, StorageError> {
        let state = self.lock()?;
        Ok(state.links.get(&link_id).map(|l| l.collection_id))
    }

    async fn create_link(&self, new: NewLink) -> Result<Link, StorageError> {
        let mut state = self.lock()?;
        state.collection_mut(new.collection_id)?.link_count += 1;

        state.last_link_id += 1;
        let link = Link {
            id: LinkId::new(state.last_link_id),
            collection_id: new.collection_id,
            name: new.name,
            url: new.url,
            created_at: Utc::now(),
        };
        state.links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn commit_move(&self, commit: &MoveCommit) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        // Validate everything before the first write so a failure leaves no trace.
        if !state.collections.contains_key(&commit.collection_id) {
            return Err(StorageError::NotFound(commit.collection_id.to_string()));
        }
        if let Some(Some(parent)) = commit.new_parent {
            state.check_parent(Some(commit.collection_id), parent)?;
        }

        if let Some(parent) = commit.new_parent {
            let collection = state.collection_mut(commit.collection_id)?;
            collection.parent_id = parent;
            collection.updated_at = Utc::now();
        }
        if let Some(ref order) = commit.root_order {
            state.root_orders.insert(commit.user_id, order.clone());
        }
        Ok(())
    }
}

impl UserStore for InMemoryStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StorageError> {
        let state = self.lock()?;
        Ok(state.root_orders.get(&user_id).map(|order| User {
            id: user_id,
            root_order: order.clone(),
        }))
    }

    async fn update_root_order(
        &self,
        user_id: UserId,
        root_order: Vec<CollectionId>,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.root_orders.insert(user_id, root_order);
        Ok(())
    }
}
