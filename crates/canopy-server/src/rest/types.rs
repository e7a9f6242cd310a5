use canopy_core::collection::{
    AccessibleCollection, Collection, CollectionId, Member, MemberGrant, Rights, UserId,
};
use canopy_core::engine::{EffectivePermission, MoveIntent, MoveOutcome, ParentRef, Position};
use canopy_core::tree::{FlatItem, TreeItem, TreeState};
use canopy_storage::Link;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RightsBody {
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
}

impl From<Rights> for RightsBody {
    fn from(rights: Rights) -> Self {
        Self {
            can_create: rights.can_create,
            can_update: rights.can_update,
            can_delete: rights.can_delete,
        }
    }
}

impl From<RightsBody> for Rights {
    fn from(body: RightsBody) -> Self {
        Rights::new(body.can_create, body.can_update, body.can_delete)
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: i64,
    #[serde(flatten)]
    pub rights: RightsBody,
}

impl From<MemberRequest> for MemberGrant {
    fn from(req: MemberRequest) -> Self {
        MemberGrant::new(UserId::new(req.user_id), req.rights.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub members: Vec<MemberRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Absent keeps the current parent; `null` moves to the top level.
    #[serde(default, deserialize_with = "present")]
    pub parent_id: Option<Option<i64>>,
    #[serde(default)]
    pub members: Option<Vec<MemberRequest>>,
}

/// Tells an explicit `null` apart from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub owner_id: i64,
    pub parent_id: Option<i64>,
    pub link_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Collection> for CollectionResponse {
    fn from(c: &Collection) -> Self {
        Self {
            id: c.id.value(),
            name: c.name.clone(),
            description: c.description.clone(),
            color: c.color.clone(),
            icon: c.icon.clone(),
            owner_id: c.owner_id.value(),
            parent_id: c.parent_id.map(|p| p.value()),
            link_count: c.link_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: i64,
    #[serde(flatten)]
    pub rights: RightsBody,
    pub inherited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_collection_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_collection_name: Option<String>,
}

impl From<&Member> for MemberResponse {
    fn from(m: &Member) -> Self {
        Self {
            user_id: m.user_id.value(),
            rights: m.rights.into(),
            inherited: m.is_inherited(),
            source_collection_id: m.inherited_from.as_ref().map(|p| p.collection_id.value()),
            source_collection_name: m
                .inherited_from
                .as_ref()
                .map(|p| p.collection_name.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessibleCollectionResponse {
    #[serde(flatten)]
    pub collection: CollectionResponse,
    pub members: Vec<MemberResponse>,
    pub has_inherited_members: bool,
}

impl From<&AccessibleCollection> for AccessibleCollectionResponse {
    fn from(view: &AccessibleCollection) -> Self {
        Self {
            collection: CollectionResponse::from(&view.collection),
            members: view.members.iter().map(MemberResponse::from).collect(),
            has_inherited_members: view.has_inherited_members,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListCollectionsResponse {
    pub collections: Vec<AccessibleCollectionResponse>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub id: i64,
    pub collection_id: i64,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Link> for LinkResponse {
    fn from(link: &Link) -> Self {
        Self {
            id: link.id.value(),
            collection_id: link.collection_id.value(),
            name: link.name.clone(),
            url: link.url.clone(),
            created_at: link.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    /// One of `owner`, `grant` or `none`.
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<RightsBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_collection_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_collection_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct: Option<bool>,
}

impl From<&EffectivePermission> for PermissionResponse {
    fn from(permission: &EffectivePermission) -> Self {
        match permission {
            EffectivePermission::Grant(grant) => Self {
                kind: "grant",
                rights: Some(grant.rights.into()),
                source_collection_id: Some(grant.source_collection_id.value()),
                source_collection_name: Some(grant.source_collection_name.clone()),
                direct: Some(grant.direct),
            },
            other => Self {
                kind: if other.is_owner() { "owner" } else { "none" },
                rights: None,
                source_collection_id: None,
                source_collection_name: None,
                direct: None,
            },
        }
    }
}

/// `parent: null` is the synthetic root.
#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl From<PositionRequest> for Position {
    fn from(req: PositionRequest) -> Self {
        Position::new(
            ParentRef::from(req.parent.map(CollectionId::new)),
            req.index,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub collection_id: i64,
    pub source: PositionRequest,
    pub destination: PositionRequest,
}

impl From<MoveRequest> for MoveIntent {
    fn from(req: MoveRequest) -> Self {
        MoveIntent {
            collection_id: CollectionId::new(req.collection_id),
            source: req.source.into(),
            destination: req.destination.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub moved: bool,
    pub parent_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_order: Option<Vec<i64>>,
}

impl From<&MoveOutcome> for MoveResponse {
    fn from(outcome: &MoveOutcome) -> Self {
        match outcome {
            MoveOutcome::Unchanged => Self {
                moved: false,
                parent_changed: false,
                root_order: None,
            },
            MoveOutcome::Moved {
                parent_changed,
                root_order,
            } => Self {
                moved: true,
                parent_changed: *parent_changed,
                root_order: root_order
                    .as_ref()
                    .map(|order| order.iter().map(|id| id.value()).collect()),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TreeRequest {
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub active: Option<i64>,
    #[serde(default)]
    pub expanded: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct TreeItemResponse {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub children: Vec<i64>,
    pub is_expanded: bool,
    pub link_count: u64,
    pub total_link_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&TreeItem> for TreeItemResponse {
    fn from(item: &TreeItem) -> Self {
        Self {
            id: item.id.value(),
            parent_id: item.parent_id.map(|p| p.value()),
            name: item.name.clone(),
            children: item.children.iter().map(|c| c.value()).collect(),
            is_expanded: item.is_expanded,
            link_count: item.link_count,
            total_link_count: item.total_link_count,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VisibleItemResponse {
    pub id: i64,
    pub depth: usize,
}

impl From<&FlatItem> for VisibleItemResponse {
    fn from(item: &FlatItem) -> Self {
        Self {
            id: item.id.value(),
            depth: item.depth,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub sort: String,
    pub root_children: Vec<i64>,
    pub items: Vec<TreeItemResponse>,
    pub visible: Vec<VisibleItemResponse>,
}

impl TreeResponse {
    /// Items are listed in depth-first order so the output is deterministic.
    pub fn from_tree(tree: &TreeState, sort: &str) -> Self {
        let mut items = Vec::with_capacity(tree.len());
        let mut stack: Vec<CollectionId> = tree.root_children().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(item) = tree.item(id) {
                items.push(TreeItemResponse::from(item));
                stack.extend(item.children.iter().rev().copied());
            }
        }

        Self {
            sort: sort.to_string(),
            root_children: tree.root_children().iter().map(|id| id.value()).collect(),
            items,
            visible: tree.flatten().iter().map(VisibleItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_body(json: &str) -> UpdateCollectionRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn update_parent_distinguishes_missing_from_null() {
        assert_eq!(update_body(r#"{"name": "a"}"#).parent_id, None);
        assert_eq!(update_body(r#"{"name": "a", "parent_id": null}"#).parent_id, Some(None));
        assert_eq!(update_body(r#"{"name": "a", "parent_id": 7}"#).parent_id, Some(Some(7)));
    }
}
