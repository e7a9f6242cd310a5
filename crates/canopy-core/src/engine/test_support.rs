use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collection::{Collection, CollectionId, LinkId, UserId};

use super::{CollectionReader, CollectionWriter, EngineError, MoveCommit};

pub(crate) fn cid(id: i64) -> CollectionId {
    CollectionId::new(id)
}

pub(crate) fn uid(id: i64) -> UserId {
    UserId::new(id)
}

pub(crate) const ALICE: i64 = 1;
pub(crate) const BOB: i64 = 2;
pub(crate) const CAROL: i64 = 3;

pub(crate) struct TestStore {
    collections: Mutex<Vec<Collection>>,
    links: Vec<(LinkId, CollectionId)>,
    root_orders: Mutex<HashMap<UserId, Vec<CollectionId>>>,
    commits: Mutex<Vec<MoveCommit>>,
    reads: AtomicUsize,
}

impl TestStore {
    pub(crate) fn new(collections: Vec<Collection>) -> Self {
        Self {
            collections: Mutex::new(collections),
            links: Vec::new(),
            root_orders: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_link(mut self, link_id: i64, collection_id: i64) -> Self {
        self.links.push((LinkId::new(link_id), cid(collection_id)));
        self
    }

    pub(crate) fn with_root_order(self, user_id: UserId, order: &[i64]) -> Self {
        self.root_orders
            .lock()
            .unwrap()
            .insert(user_id, order.iter().copied().map(cid).collect());
        self
    }

    pub(crate) fn parent_of(&self, id: CollectionId) -> Option<CollectionId> {
        self.collections
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.parent_id)
    }

    pub(crate) fn stored_root_order(&self, user_id: UserId) -> Vec<CollectionId> {
        self.root_orders
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub(crate) fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CollectionReader for TestStore {
    async fn collection(&self, id: CollectionId) -> Result<Option<Collection>, EngineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .collections
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn collection_of_link(
        &self,
        link_id: LinkId,
    ) -> Result<Option<CollectionId>, EngineError> {
        Ok(self
            .links
            .iter()
            .find(|(l, _)| *l == link_id)
            .map(|(_, c)| *c))
    }

    async fn accessible_roots(&self, user_id: UserId) -> Result<Vec<Collection>, EngineError> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_owned_by(user_id) || c.direct_member(user_id).is_some())
            .cloned()
            .collect())
    }

    async fn children(&self, parent_id: CollectionId) -> Result<Vec<Collection>, EngineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .collections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }
}

impl CollectionWriter for TestStore {
    async fn root_order(&self, user_id: UserId) -> Result<Vec<CollectionId>, EngineError> {
        Ok(self.stored_root_order(user_id))
    }

    async fn commit_move(&self, commit: &MoveCommit) -> Result<(), EngineError> {
        if let Some(parent) = commit.new_parent {
            let mut collections = self.collections.lock().unwrap();
            if let Some(c) = collections.iter_mut().find(|c| c.id == commit.collection_id) {
                c.parent_id = parent;
            }
        }
        if let Some(ref order) = commit.root_order {
            self.root_orders
                .lock()
                .unwrap()
                .insert(commit.user_id, order.clone());
        }
        self.commits.lock().unwrap().push(commit.clone());
        Ok(())
    }
}
