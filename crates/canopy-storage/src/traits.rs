use canopy_core::collection::{Collection, CollectionId, LinkId, MemberGrant, UserId};
use canopy_core::engine::MoveCommit;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid parent {parent} for {collection}: {reason}")]
    InvalidParent {
        collection: String,
        parent: CollectionId,
        reason: &'static str,
    },
    #[error("internal storage error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub owner_id: UserId,
    pub parent_id: Option<CollectionId>,
    pub members: Vec<MemberGrant>,
}

impl NewCollection {
    pub fn new(name: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: None,
            icon: None,
            owner_id,
            parent_id: None,
            members: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: CollectionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_members(mut self, members: Vec<MemberGrant>) -> Self {
        self.members = members;
        self
    }
}

/// The collection's own display fields, replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFields {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// A full edit of one collection, applied as a single write. `None` in
/// `parent_id` or `members` keeps the stored value; `Some(None)` moves the
/// collection to the top level.
#[derive(Debug, Clone, Default)]
pub struct CollectionUpdate {
    pub fields: CollectionFields,
    pub parent_id: Option<Option<CollectionId>>,
    pub members: Option<Vec<MemberGrant>>,
}

#[derive(Debug, Clone)]
pub struct NewLink {
    pub collection_id: CollectionId,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub collection_id: CollectionId,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub root_order: Vec<CollectionId>,
}

pub trait CollectionStore: Send + Sync {
    fn get_by_id(
        &self,
        id: CollectionId,
    ) -> impl Future<Output = Result<Option<Collection>, StorageError>> + Send;

    /// Collections the user owns or holds a direct membership record on.
    fn get_by_owner_or_member(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Collection>, StorageError>> + Send;

    fn get_children(
        &self,
        parent_id: CollectionId,
    ) -> impl Future<Output = Result<Vec<Collection>, StorageError>> + Send;

    fn get_all(&self) -> impl Future<Output = Result<Vec<Collection>, StorageError>> + Send;

    fn create(
        &self,
        collection: NewCollection,
    ) -> impl Future<Output = Result<Collection, StorageError>> + Send;

    fn update_fields(
        &self,
        id: CollectionId,
        fields: CollectionFields,
    ) -> impl Future<Output = Result<Collection, StorageError>> + Send;

    /// Reassigns the parent and replaces the whole direct membership set.
    fn update_parent_and_members(
        &self,
        id: CollectionId,
        parent_id: Option<CollectionId>,
        members: Vec<MemberGrant>,
    ) -> impl Future<Output = Result<Collection, StorageError>> + Send;

    /// Applies fields, parent and members together or not at all.
    fn update(
        &self,
        id: CollectionId,
        update: CollectionUpdate,
    ) -> impl Future<Output = Result<Collection, StorageError>> + Send;

    fn collection_of_link(
        &self,
        link_id: LinkId,
    ) -> impl Future<Output = Result<Option<CollectionId>, StorageError>> + Send;

    fn create_link(&self, link: NewLink)
    -> impl Future<Output = Result<Link, StorageError>> + Send;

    /// Applies a validated move: parent change and root order together.
    fn commit_move(
        &self,
        commit: &MoveCommit,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

pub trait UserStore: Send + Sync {
    fn get_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<User>, StorageError>> + Send;

    /// Creates the user record when it does not exist yet.
    fn update_root_order(
        &self,
        user_id: UserId,
        root_order: Vec<CollectionId>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
