pub mod collection;
pub mod engine;
pub mod tree;

pub use collection::{
    AccessibleCollection, Collection, CollectionId, LinkId, Member, MemberGrant, Provenance,
    Rights, UserId,
};
pub use tree::{FlatItem, SortMode, TreeItem, TreeOptions, TreeState};
