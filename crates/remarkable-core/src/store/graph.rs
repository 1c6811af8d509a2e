//! Link/backlink maintenance and parent/child tree traversal.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

use super::EventStore;
use crate::error::{CoreError, Result};
use crate::event::Event;

/// One node of a breadth-first tree walk.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub event: Event,
    /// 0 for the root
    pub depth: usize,
}

impl EventStore {
    /// Add `to_id` to `from_id`'s forward links and refresh `to_id`'s
    /// backlinks.
    pub async fn add_link(&self, from_id: &str, to_id: &str) -> Result<Event> {
        if from_id == to_id {
            return Err(CoreError::invalid("an event cannot link to itself"));
        }
        let source = self.load(from_id).await?;
        self.load(to_id).await?;

        let source = if source.linked_event_ids.iter().any(|l| l == to_id) {
            source
        } else {
            let mut updated = source.clone();
            updated.linked_event_ids.push(to_id.to_string());
            self.save_maintenance(&source, updated).await?
        };
        self.rebuild_backlinks(to_id).await?;
        Ok(source)
    }

    /// Drop `to_id` from `from_id`'s forward links. The target may already be
    /// gone.
    pub async fn remove_link(&self, from_id: &str, to_id: &str) -> Result<Event> {
        let source = self.load(from_id).await?;
        let source = if source.linked_event_ids.iter().any(|l| l == to_id) {
            let mut updated = source.clone();
            updated.linked_event_ids.retain(|l| l != to_id);
            self.save_maintenance(&source, updated).await?
        } else {
            source
        };
        self.refresh_backlinks(to_id).await?;
        Ok(source)
    }

    /// Recompute `id`'s backlinks from the index. Idempotent.
    pub async fn rebuild_backlinks(&self, id: &str) -> Result<Event> {
        match self.refresh_backlinks(id).await? {
            Some(event) => Ok(event),
            None => Err(CoreError::not_found(id)),
        }
    }

    /// Recompute backlinks for every stored event; returns how many changed.
    pub async fn rebuild_all_backlinks(&self) -> Result<usize> {
        let events = self.persistence.query_all(None).await?;
        let mut changed = 0;
        for event in events {
            let before = event.backlinks.clone();
            if let Some(after) = self.refresh_backlinks(&event.id).await? {
                if after.backlinks != before {
                    changed += 1;
                }
            }
        }
        debug!(target: "remarkable::store", changed, "rebuilt all backlinks");
        Ok(changed)
    }

    /// Like `rebuild_backlinks` but a missing target is not an error.
    pub(super) async fn refresh_backlinks(&self, id: &str) -> Result<Option<Event>> {
        let Some(target) = self.persistence.get(id).await? else {
            return Ok(None);
        };
        let computed = self
            .backlinks
            .backlinks_for(self.persistence.as_ref(), id)
            .await?;
        if computed == target.backlinks {
            return Ok(Some(target));
        }
        let mut updated = target.clone();
        updated.backlinks = computed;
        self.save_maintenance(&target, updated).await.map(Some)
    }

    /// Active, non-subordinate children in `child_event_ids` order.
    pub async fn get_children(&self, id: &str) -> Result<Vec<Event>> {
        let parent = self.load(id).await?;
        let mut children = Vec::with_capacity(parent.child_event_ids.len());
        for child_id in &parent.child_event_ids {
            match self.persistence.get(child_id).await? {
                Some(child) if visible_in_tree(&child) => children.push(child),
                Some(_) => {}
                None => debug!(target: "remarkable::store", parent_id = id, child_id = %child_id, "dangling child id"),
            }
        }
        Ok(children)
    }

    /// Number of ancestors above `id`. Stops at a cycle or a missing parent.
    pub async fn get_depth(&self, id: &str) -> Result<usize> {
        Ok(self.ancestors(id).await?.len() - 1)
    }

    /// Topmost reachable ancestor (the event itself when it has no parent).
    pub async fn get_root(&self, id: &str) -> Result<Event> {
        let mut chain = self.ancestors(id).await?;
        chain
            .pop()
            .ok_or_else(|| CoreError::not_found(id))
    }

    /// Breadth-first walk from `root_id`. Each id appears at most once, so a
    /// corrupted parent/child cycle still terminates.
    pub async fn get_tree(&self, root_id: &str) -> Result<Vec<TreeNode>> {
        let root = self.load(root_id).await?;
        let mut visited: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut queue: VecDeque<TreeNode> = VecDeque::from([TreeNode {
            event: root,
            depth: 0,
        }]);
        let mut nodes = Vec::new();

        while let Some(node) = queue.pop_front() {
            for child_id in &node.event.child_event_ids {
                if !visited.insert(child_id.clone()) {
                    warn!(
                        target: "remarkable::store",
                        event_id = %child_id,
                        "tree walk reached an already visited id"
                    );
                    continue;
                }
                if let Some(child) = self.persistence.get(child_id).await? {
                    if visible_in_tree(&child) {
                        queue.push_back(TreeNode {
                            event: child,
                            depth: node.depth + 1,
                        });
                    }
                }
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    /// `id` followed by each parent up the chain.
    async fn ancestors(&self, id: &str) -> Result<Vec<Event>> {
        let start = self.load(id).await?;
        let mut visited: HashSet<String> = HashSet::from([start.id.clone()]);
        let mut parent_id = start.parent_event_id.clone();
        let mut chain = vec![start];

        while let Some(pid) = parent_id {
            if !visited.insert(pid.clone()) {
                warn!(target: "remarkable::store", event_id = %pid, "parent chain contains a cycle");
                break;
            }
            match self.persistence.get(&pid).await? {
                Some(parent) => {
                    parent_id = parent.parent_event_id.clone();
                    chain.push(parent);
                }
                None => break,
            }
        }
        Ok(chain)
    }
}

fn visible_in_tree(event: &Event) -> bool {
    !event.is_deleted() && !event.is_subordinate()
}
