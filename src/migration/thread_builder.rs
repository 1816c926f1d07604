// Thread Builder - flat comment table to an arena-backed forest
// Records are stored once by identifier; hierarchy is an index of parent -> ordered children.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::{CommentRecord, SourceId};

/// Comment threads reconstructed from `logbook_comments`.
///
/// Every record has exactly one parent, so the records reachable from a root form a tree and no
/// record can belong to two threads. Records whose parent chain never reaches a root (missing
/// parent, or a cycle) are kept in the arena but reported by [`ThreadForest::orphans`].
#[derive(Debug, Clone, Default)]
pub struct ThreadForest {
    records: HashMap<SourceId, CommentRecord>,
    children: HashMap<SourceId, Vec<SourceId>>,
    roots: Vec<SourceId>,
}

impl ThreadForest {
    /// Build the forest. Root and child order follow the input order.
    pub fn build(comments: impl IntoIterator<Item = CommentRecord>) -> Self {
        let mut forest = ThreadForest::default();

        for comment in comments {
            if comment.is_thread_root() {
                forest.roots.push(comment.id);
            } else if let Some(parent) = comment.parent {
                forest.children.entry(parent).or_default().push(comment.id);
            }
            forest.records.insert(comment.id, comment);
        }

        forest
    }

    pub fn roots(&self) -> &[SourceId] {
        &self.roots
    }

    pub fn record(&self, id: SourceId) -> Option<&CommentRecord> {
        self.records.get(&id)
    }

    /// Direct children of `id`, in first-observed order.
    pub fn children(&self, id: SourceId) -> &[SourceId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All identifiers of the thread starting at `root`, parents before children.
    #[cfg(test)]
    pub fn thread(&self, root: SourceId) -> Vec<SourceId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    /// Records not reachable from any root, sorted by identifier.
    pub fn orphans(&self) -> Vec<SourceId> {
        let mut reachable = HashSet::with_capacity(self.records.len());
        let mut queue: VecDeque<SourceId> = self.roots.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if reachable.insert(id) {
                queue.extend(self.children(id).iter().copied());
            }
        }

        let mut orphans: Vec<SourceId> = self
            .records
            .keys()
            .filter(|id| !reachable.contains(*id))
            .copied()
            .collect();
        orphans.sort_unstable();
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: SourceId, parent: Option<SourceId>, root_parent: Option<SourceId>) -> CommentRecord {
        CommentRecord {
            id,
            run: None,
            user_id: None,
            title: Some(format!("comment {}", id)),
            body: None,
            class: None,
            comment_type: None,
            created_at: None,
            deleted: false,
            parent,
            root_parent,
        }
    }

    fn sample() -> ThreadForest {
        ThreadForest::build(vec![
            comment(1, None, None),
            comment(2, Some(1), Some(1)),
            comment(3, Some(2), Some(1)),
            comment(4, None, None),
            comment(5, Some(1), Some(1)),
            comment(6, Some(4), Some(4)),
        ])
    }

    #[test]
    fn test_roots_are_records_without_parent_or_root() {
        let forest = sample();
        assert_eq!(forest.roots(), &[1, 4]);
        assert_eq!(forest.len(), 6);
    }

    #[test]
    fn test_children_keep_first_observed_order() {
        let forest = sample();
        assert_eq!(forest.children(1), &[2, 5]);
        assert_eq!(forest.children(2), &[3]);
        assert!(forest.children(3).is_empty());
    }

    #[test]
    fn test_thread_is_preorder() {
        let forest = sample();
        assert_eq!(forest.thread(1), vec![1, 2, 3, 5]);
        assert_eq!(forest.thread(4), vec![4, 6]);
    }

    #[test]
    fn test_no_record_in_two_threads() {
        let forest = sample();
        let mut seen = HashSet::new();
        for root in forest.roots() {
            for id in forest.thread(*root) {
                assert!(seen.insert(id), "record {} appears in more than one thread", id);
            }
        }
        assert_eq!(seen.len(), forest.len());
    }

    #[test]
    fn test_orphans_are_reported_not_visited() {
        let forest = ThreadForest::build(vec![
            comment(1, None, None),
            comment(2, Some(1), Some(1)),
            // parent 99 was deleted from the source
            comment(3, Some(99), Some(99)),
            comment(4, Some(3), Some(99)),
            // root parent set but no parent: not a root, never reachable
            comment(5, None, Some(1)),
        ]);

        assert_eq!(forest.roots(), &[1]);
        assert_eq!(forest.thread(1), vec![1, 2]);
        assert_eq!(forest.orphans(), vec![3, 4, 5]);
    }

    #[test]
    fn test_cycle_is_unreachable() {
        let forest = ThreadForest::build(vec![
            comment(1, None, None),
            comment(7, Some(8), Some(1)),
            comment(8, Some(7), Some(1)),
        ]);

        assert_eq!(forest.thread(1), vec![1]);
        assert_eq!(forest.orphans(), vec![7, 8]);
    }
}
