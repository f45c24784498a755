//! Task tree snapshot and structural validation
//!
//! [`TaskTree`] holds an in-memory snapshot of tasks supplied by the caller and
//! guards every structural mutation: attaching a child, detaching it, and
//! planning a cascading delete. Nothing here performs I/O; callers persist the
//! outcome themselves.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::models::{TaskId, TaskNode, TaskWithSubtasks, UserId, MAX_LEVEL};

/// A structural mutation the tree refuses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("attaching task {child} under task {parent} would create a cycle")]
    Cycle { parent: TaskId, child: TaskId },

    #[error(
        "attaching task {child} under task {parent} would nest {depth} levels deep (max {max})",
        max = MAX_LEVEL
    )]
    LevelBound {
        parent: TaskId,
        child: TaskId,
        depth: usize,
    },

    #[error("task {child} of user {child_user} cannot be attached to task {parent} of user {parent_user}")]
    CrossUser {
        parent: TaskId,
        parent_user: UserId,
        child: TaskId,
        child_user: UserId,
    },

    #[error("task {0} not found")]
    NotFound(TaskId),
}

/// Snapshot of tasks keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTree {
    nodes: BTreeMap<TaskId, TaskNode>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from any collection of tasks; later duplicates win
    pub fn from_tasks(tasks: impl IntoIterator<Item = TaskNode>) -> Self {
        Self {
            nodes: tasks.into_iter().map(|task| (task.id(), task)).collect(),
        }
    }

    /// Inserts or replaces a task, returning the previous version
    pub fn insert(&mut self, task: TaskNode) -> Option<TaskNode> {
        self.nodes.insert(task.id(), task)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all tasks in ascending id order
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    /// Iterates over the tasks owned by `user_id`
    pub fn user_tasks(&self, user_id: UserId) -> impl Iterator<Item = &TaskNode> {
        self.nodes
            .values()
            .filter(move |task| task.user_id() == user_id)
    }

    /// Direct children of `id`, in ascending id order
    pub fn children(&self, id: TaskId) -> Vec<TaskId> {
        self.nodes
            .values()
            .filter(|task| task.parent_id() == Some(id))
            .map(TaskNode::id)
            .collect()
    }

    fn children_index(&self) -> BTreeMap<TaskId, Vec<TaskId>> {
        let mut index: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
        for task in self.nodes.values() {
            if let Some(parent_id) = task.parent_id() {
                index.entry(parent_id).or_default().push(task.id());
            }
        }
        index
    }

    /// Nesting depth of `id`: 0 for a root, parent's depth + 1 otherwise.
    ///
    /// A parent missing from the snapshot ends the walk. The walk gives up
    /// after `MAX_LEVEL` steps and reports the depth reached so far plus one,
    /// which is enough for callers to see the bound is broken.
    pub fn depth(&self, id: TaskId) -> Result<usize, TreeError> {
        let mut current = self.get(id).ok_or(TreeError::NotFound(id))?.parent_id();
        let mut depth = 0;
        while let Some(ancestor) = current {
            depth += 1;
            if depth > MAX_LEVEL as usize {
                break;
            }
            current = self.get(ancestor).and_then(TaskNode::parent_id);
        }
        Ok(depth)
    }

    /// Longest downward path below `id` (0 for a leaf)
    fn height(&self, id: TaskId, children: &BTreeMap<TaskId, Vec<TaskId>>) -> usize {
        let mut height = 0;
        let mut visited = BTreeSet::from([id]);
        let mut queue = VecDeque::from([(id, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            height = height.max(depth);
            // No need to look further once the bound is already exceeded
            if depth > MAX_LEVEL as usize {
                continue;
            }
            for &child in children.get(&current).into_iter().flatten() {
                if visited.insert(child) {
                    queue.push_back((child, depth + 1));
                }
            }
        }
        height
    }

    /// Makes `child_id` a child of `parent_id`, re-parenting it if needed.
    ///
    /// The snapshot is left untouched when an error is returned.
    pub fn attach(&mut self, parent_id: TaskId, child_id: TaskId) -> Result<(), TreeError> {
        let parent = self.get(parent_id).ok_or(TreeError::NotFound(parent_id))?;
        let child = self.get(child_id).ok_or(TreeError::NotFound(child_id))?;

        if parent.user_id() != child.user_id() {
            return Err(TreeError::CrossUser {
                parent: parent_id,
                parent_user: parent.user_id(),
                child: child_id,
                child_user: child.user_id(),
            });
        }

        if parent_id == child_id {
            return Err(TreeError::Cycle {
                parent: parent_id,
                child: child_id,
            });
        }

        // Walk from the parent up to its root looking for the child
        let mut parent_depth = 0usize;
        let mut current = parent.parent_id();
        while let Some(ancestor) = current {
            if ancestor == child_id {
                return Err(TreeError::Cycle {
                    parent: parent_id,
                    child: child_id,
                });
            }
            parent_depth += 1;
            if parent_depth > MAX_LEVEL as usize {
                return Err(TreeError::LevelBound {
                    parent: parent_id,
                    child: child_id,
                    depth: parent_depth + 1,
                });
            }
            current = self.get(ancestor).and_then(TaskNode::parent_id);
        }

        let depth = parent_depth + 1 + self.height(child_id, &self.children_index());
        if depth > MAX_LEVEL as usize {
            return Err(TreeError::LevelBound {
                parent: parent_id,
                child: child_id,
                depth,
            });
        }

        if let Some(child) = self.get_mut(child_id) {
            child.set_parent(Some(parent_id));
        }
        Ok(())
    }

    /// Turns `child_id` into a root if it is currently a child of `parent_id`.
    ///
    /// Returns whether anything changed; detaching a non-child is a no-op.
    pub fn detach(&mut self, parent_id: TaskId, child_id: TaskId) -> bool {
        match self.get_mut(child_id) {
            Some(child) if child.parent_id() == Some(parent_id) => {
                child.set_parent(None);
                true
            }
            _ => false,
        }
    }

    /// Computes the ids to remove when deleting `id`: the node and all of its
    /// descendants, deepest first. Ties at equal depth are ordered by id.
    pub fn cascade_delete(&self, id: TaskId) -> Result<Vec<TaskId>, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::NotFound(id));
        }

        let children = self.children_index();
        let mut visited = BTreeSet::from([id]);
        let mut queue = VecDeque::from([(id, 0usize)]);
        let mut plan = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            plan.push((depth, current));
            for &child in children.get(&current).into_iter().flatten() {
                if visited.insert(child) {
                    queue.push_back((child, depth + 1));
                }
            }
        }

        plan.sort_by(|(depth_a, id_a), (depth_b, id_b)| {
            depth_b.cmp(depth_a).then_with(|| id_a.cmp(id_b))
        });
        Ok(plan.into_iter().map(|(_, id)| id).collect())
    }

    /// Removes every id in `plan` from the snapshot, returning what was removed
    pub fn remove(&mut self, plan: &[TaskId]) -> Vec<TaskNode> {
        plan.iter().filter_map(|id| self.nodes.remove(id)).collect()
    }

    /// Builds the recursive view of `id` and everything below it
    pub fn subtree(&self, id: TaskId) -> Result<TaskWithSubtasks, TreeError> {
        let root = self.get(id).ok_or(TreeError::NotFound(id))?;
        let children = self.children_index();
        let mut visited = BTreeSet::from([id]);
        Ok(self.build_subtree(root, &children, &mut visited))
    }

    fn build_subtree(
        &self,
        task: &TaskNode,
        children: &BTreeMap<TaskId, Vec<TaskId>>,
        visited: &mut BTreeSet<TaskId>,
    ) -> TaskWithSubtasks {
        let mut subtasks = Vec::new();
        for &child_id in children.get(&task.id()).into_iter().flatten() {
            if !visited.insert(child_id) {
                continue;
            }
            if let Some(child) = self.get(child_id) {
                subtasks.push(self.build_subtree(child, children, visited));
            }
        }

        TaskWithSubtasks {
            task: task.clone(),
            subtasks,
        }
    }
}
