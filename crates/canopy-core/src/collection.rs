use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(i64);

impl CollectionId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for CollectionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collection:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(i64);

impl LinkId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for LinkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link:{}", self.0)
    }
}

/// The three flags a membership grant carries. All-false is meaningful: a
/// direct record with no rights still overrides anything inherited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rights {
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl Rights {
    pub fn new(can_create: bool, can_update: bool, can_delete: bool) -> Self {
        Self {
            can_create,
            can_update,
            can_delete,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::new(true, true, true)
    }

    pub fn any(&self) -> bool {
        self.can_create || self.can_update || self.can_delete
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.can_create, 'c'),
            flag(self.can_update, 'u'),
            flag(self.can_delete, 'd')
        )
    }
}

/// A membership record stored against one exact collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberGrant {
    pub user_id: UserId,
    pub rights: Rights,
}

impl MemberGrant {
    pub fn new(user_id: UserId, rights: Rights) -> Self {
        Self { user_id, rights }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub owner_id: UserId,
    pub parent_id: Option<CollectionId>,
    pub members: Vec<MemberGrant>,
    pub link_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(id: CollectionId, name: impl Into<String>, owner_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            color: None,
            icon: None,
            owner_id,
            parent_id: None,
            members: Vec::new(),
            link_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: CollectionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_member(mut self, user_id: UserId, rights: Rights) -> Self {
        self.members.retain(|m| m.user_id != user_id);
        self.members.push(MemberGrant::new(user_id, rights));
        self
    }

    pub fn with_link_count(mut self, link_count: u64) -> Self {
        self.link_count = link_count;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn direct_member(&self, user_id: UserId) -> Option<&MemberGrant> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.id, self.name)
    }
}

/// Where an inherited member record was synthesized from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub collection_id: CollectionId,
    pub collection_name: String,
}

/// A member as seen on a particular collection: either its own direct record
/// or one inherited from an ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub rights: Rights,
    pub inherited_from: Option<Provenance>,
}

impl Member {
    pub fn direct(grant: &MemberGrant) -> Self {
        Self {
            user_id: grant.user_id,
            rights: grant.rights,
            inherited_from: None,
        }
    }

    pub fn inherited(grant: &MemberGrant, source: &Collection) -> Self {
        Self {
            user_id: grant.user_id,
            rights: grant.rights,
            inherited_from: Some(Provenance {
                collection_id: source.id,
                collection_name: source.name.clone(),
            }),
        }
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited_from.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibleCollection {
    pub collection: Collection,
    pub members: Vec<Member>,
    pub has_inherited_members: bool,
}

impl AccessibleCollection {
    pub fn new(collection: Collection, members: Vec<Member>) -> Self {
        let has_inherited_members = members.iter().any(Member::is_inherited);
        Self {
            collection,
            members,
            has_inherited_members,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.collection.id
    }

    pub fn member(&self, user_id: UserId) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn inherited_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.is_inherited())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_kind_prefix() {
        assert_eq!(CollectionId::new(7).to_string(), "collection:7");
        assert_eq!(UserId::new(3).to_string(), "user:3");
        assert_eq!(LinkId::new(11).to_string(), "link:11");
    }

    #[test]
    fn rights_any_is_false_only_when_all_flags_clear() {
        assert!(!Rights::none().any());
        assert!(Rights::new(false, true, false).any());
        assert!(Rights::all().any());
    }

    #[test]
    fn rights_display_shows_flags() {
        assert_eq!(Rights::new(true, false, true).to_string(), "c-d");
        assert_eq!(Rights::none().to_string(), "---");
    }

    #[test]
    fn with_member_replaces_existing_record_for_same_user() {
        let bob = UserId::new(2);
        let collection = Collection::new(CollectionId::new(1), "Reading", UserId::new(1))
            .with_member(bob, Rights::all())
            .with_member(bob, Rights::none());

        assert_eq!(collection.members.len(), 1);
        assert_eq!(collection.direct_member(bob).unwrap().rights, Rights::none());
    }

    #[test]
    fn direct_member_misses_unknown_user() {
        let collection = Collection::new(CollectionId::new(1), "Reading", UserId::new(1));
        assert!(collection.direct_member(UserId::new(9)).is_none());
    }

    #[test]
    fn collection_without_parent_is_root() {
        let root = Collection::new(CollectionId::new(1), "Root", UserId::new(1));
        let child = Collection::new(CollectionId::new(2), "Child", UserId::new(1))
            .with_parent(CollectionId::new(1));

        assert!(root.is_root());
        assert!(!child.is_root());
    }

    #[test]
    fn inherited_member_carries_source() {
        let source = Collection::new(CollectionId::new(4), "Team", UserId::new(1));
        let grant = MemberGrant::new(UserId::new(2), Rights::new(true, false, false));

        let member = Member::inherited(&grant, &source);

        assert!(member.is_inherited());
        let provenance = member.inherited_from.unwrap();
        assert_eq!(provenance.collection_id, CollectionId::new(4));
        assert_eq!(provenance.collection_name, "Team");
    }
}
