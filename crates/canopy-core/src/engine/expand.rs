use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::collection::{AccessibleCollection, Collection, CollectionId, Member, UserId};

use super::{CollectionReader, EngineConfig, EngineError};

/// Expands a user's directly reachable collections into everything they may
/// read, annotating descendants with the grants they inherit.
pub struct AccessibleSetExpander<R: CollectionReader> {
    reader: Arc<R>,
    config: EngineConfig,
}

impl<R: CollectionReader> AccessibleSetExpander<R> {
    pub fn new(reader: Arc<R>, config: EngineConfig) -> Self {
        Self { reader, config }
    }

    /// Accessibility roots first (store order), then descendants breadth-first.
    pub async fn expand(&self, user_id: UserId) -> Result<Vec<AccessibleCollection>, EngineError> {
        let roots = self.reader.accessible_roots(user_id).await?;

        let mut processed = HashSet::new();
        let mut materialized: Vec<Collection> = Vec::with_capacity(roots.len());
        for root in roots {
            if processed.insert(root.id) {
                materialized.push(root);
            }
        }

        let mut frontier: Vec<CollectionId> = materialized.iter().map(|c| c.id).collect();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for parent_id in frontier {
                for child in self.reader.children(parent_id).await? {
                    if processed.insert(child.id) {
                        next.push(child.id);
                        materialized.push(child);
                    }
                }
            }
            frontier = next;
        }

        let index: HashMap<CollectionId, usize> = materialized
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();

        let views = materialized
            .iter()
            .map(|collection| {
                let ancestors = self.materialized_ancestors(collection, &materialized, &index);
                let members = merge_members(collection, ancestors);
                AccessibleCollection::new(collection.clone(), members)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            %user_id,
            collections = views.len(),
            "expanded accessible set"
        );

        Ok(views)
    }

    /// A single collection with its full inherited member chain, or `None`
    /// when it does not exist or the user holds no record anywhere on its
    /// ancestry. Both cases look the same to the caller.
    pub async fn view_collection(
        &self,
        user_id: UserId,
        collection_id: CollectionId,
    ) -> Result<Option<AccessibleCollection>, EngineError> {
        let Some(collection) = self.reader.collection(collection_id).await? else {
            return Ok(None);
        };

        let mut access =
            collection.is_owned_by(user_id) || collection.direct_member(user_id).is_some();
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([collection.id]);
        let mut current = collection.parent_id;

        while let Some(id) = current {
            if !visited.insert(id) || visited.len() > self.config.max_depth {
                tracing::warn!(
                    %collection_id,
                    at = %id,
                    "ancestor chain is cyclic or too deep, truncating"
                );
                break;
            }
            let Some(ancestor) = self.reader.collection(id).await? else {
                break;
            };
            if !access {
                access = ancestor.is_owned_by(user_id) || ancestor.direct_member(user_id).is_some();
            }
            current = ancestor.parent_id;
            ancestors.push(ancestor);
        }

        if !access {
            tracing::debug!(%user_id, %collection_id, "no record on collection or its ancestors");
            return Ok(None);
        }

        let members = merge_members(&collection, ancestors.iter());
        Ok(Some(AccessibleCollection::new(collection, members)))
    }

    fn materialized_ancestors<'a>(
        &self,
        collection: &Collection,
        materialized: &'a [Collection],
        index: &HashMap<CollectionId, usize>,
    ) -> Vec<&'a Collection> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([collection.id]);
        let mut current = collection.parent_id;

        while let Some(id) = current {
            let Some(&i) = index.get(&id) else {
                break;
            };
            if !visited.insert(id) || visited.len() > self.config.max_depth {
                tracing::warn!(
                    collection_id = %collection.id,
                    at = %id,
                    "ancestor chain is cyclic or too deep, truncating"
                );
                break;
            }
            let ancestor = &materialized[i];
            ancestors.push(ancestor);
            current = ancestor.parent_id;
        }

        ancestors
    }
}

/// Direct records first, then one inherited record per user taken from the
/// nearest ancestor that has one. `ancestors` must be ordered nearest first.
fn merge_members<'a>(
    collection: &Collection,
    ancestors: impl IntoIterator<Item = &'a Collection>,
) -> Vec<Member> {
    let mut members: Vec<Member> = collection.members.iter().map(Member::direct).collect();
    let mut seen: HashSet<UserId> = members.iter().map(|m| m.user_id).collect();

    for ancestor in ancestors {
        for grant in &ancestor.members {
            if seen.insert(grant.user_id) {
                members.push(Member::inherited(grant, ancestor));
            }
        }
    }

    members
}
