//! Parent/child display tree over a flat task list.
//!
//! Every task appears exactly once. A task whose parent is missing from the
//! list is promoted to a root, and members of a parent cycle are broken out
//! as roots in list order.

use crate::task::{Task, TaskId};
use std::collections::HashMap;

/// One display row, `depth` 0 for roots
#[derive(Debug, Clone, Copy)]
pub struct TaskRow<'a> {
    pub depth: usize,
    pub task: &'a Task,
}

/// Nesting is stored as indices into the borrowed list, so neither building,
/// walking nor dropping the tree recurses.
#[derive(Debug, Clone, Default)]
pub struct TaskTree<'a> {
    tasks: &'a [Task],
    roots: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl<'a> TaskTree<'a> {
    pub fn build(tasks: &'a [Task]) -> Self {
        let mut index: HashMap<&TaskId, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            index.entry(&task.id).or_insert(i);
        }

        let mut linked: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        let mut candidates = Vec::new();
        for (i, task) in tasks.iter().enumerate() {
            match task.parent_id().and_then(|p| index.get(p)) {
                Some(&parent) if parent != i => linked[parent].push(i),
                _ => candidates.push(i),
            }
        }

        let mut tree = Self {
            tasks,
            roots: Vec::with_capacity(candidates.len()),
            children: vec![Vec::new(); tasks.len()],
        };
        let mut visited = vec![false; tasks.len()];
        for i in candidates {
            tree.attach_root(i, &linked, &mut visited);
        }

        // Whatever is still unvisited sits on a parent cycle
        for i in 0..tasks.len() {
            if !visited[i] {
                tree.attach_root(i, &linked, &mut visited);
            }
        }
        tree
    }

    fn attach_root(&mut self, root: usize, linked: &[Vec<usize>], visited: &mut [bool]) {
        visited[root] = true;
        self.roots.push(root);
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for &child in &linked[node] {
                if !visited[child] {
                    visited[child] = true;
                    self.children[node].push(child);
                    stack.push(child);
                }
            }
        }
    }

    pub fn roots(&self) -> impl Iterator<Item = &'a Task> + '_ {
        let tasks = self.tasks;
        self.roots.iter().map(move |&i| &tasks[i])
    }

    /// Depth-first rows in display order.
    pub fn rows(&self) -> Vec<TaskRow<'a>> {
        let tasks = self.tasks;
        let mut rows = Vec::with_capacity(self.tasks.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&i| (0, i)).collect();
        while let Some((depth, i)) = stack.pop() {
            rows.push(TaskRow {
                depth,
                task: &tasks[i],
            });
            for &child in self.children[i].iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        rows
    }

    /// Every task of the list is placed exactly once.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
