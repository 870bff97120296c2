//! Task plan maintained by the agent during a session.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Task {
    /// Failure reason recorded by [`TodoManager::fail`].
    pub fn failure_reason(&self) -> Option<&str> {
        self.metadata.get("error").and_then(Value::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TodoError {
    #[error("task {0} not found")]
    NotFound(u64),
    #[error("task {0} is already done or failed")]
    NotPending(u64),
}

/// Counts of tasks by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoStats {
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug)]
struct Inner {
    tasks: Vec<Task>,
    next_id: u64,
}

/// Thread-safe task list. IDs start at 1 and restart after [`clear`](Self::clear).
#[derive(Debug)]
pub struct TodoManager {
    inner: RwLock<Inner>,
}

impl Default for TodoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                tasks: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Append a pending task and return its ID.
    pub fn add(&self, description: impl Into<String>, metadata: Option<Map<String, Value>>) -> u64 {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.tasks.push(Task {
            id,
            description: description.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            metadata: metadata.unwrap_or_default(),
        });
        inner.next_id += 1;
        id
    }

    pub fn complete(&self, id: u64) -> Result<(), TodoError> {
        let mut inner = self.inner.write();
        let task = pending_task(&mut inner.tasks, id)?;
        task.status = TaskStatus::Done;
        task.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&self, id: u64, reason: impl Into<String>) -> Result<(), TodoError> {
        let mut inner = self.inner.write();
        let task = pending_task(&mut inner.tasks, id)?;
        task.status = TaskStatus::Failed;
        task.metadata.insert("error".into(), Value::String(reason.into()));
        Ok(())
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tasks.clear();
        inner.next_id = 1;
    }

    /// Replace the whole plan, returning the new IDs in order.
    pub fn set_tasks<I, S>(&self, descriptions: I) -> Vec<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clear();
        descriptions
            .into_iter()
            .map(|d| self.add(d, None))
            .collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.read().tasks.clone()
    }

    pub fn stats(&self) -> TodoStats {
        let inner = self.inner.read();
        let mut stats = TodoStats {
            total: inner.tasks.len(),
            ..Default::default()
        };
        for task in &inner.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Done => stats.done += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Human-readable plan, injected into the agent context every turn.
    pub fn render(&self) -> String {
        let inner = self.inner.read();
        if inner.tasks.is_empty() {
            return "No active tasks".to_string();
        }

        let mut out = String::from("CURRENT PLAN:\n");
        let (mut pending, mut done, mut failed) = (0, 0, 0);
        for task in &inner.tasks {
            let marker = match task.status {
                TaskStatus::Pending => {
                    pending += 1;
                    "[ ]"
                }
                TaskStatus::Done => {
                    done += 1;
                    "[✓]"
                }
                TaskStatus::Failed => {
                    failed += 1;
                    "[✗]"
                }
            };
            out.push_str(&format!("{marker} {}. {}\n", task.id, task.description));
            if task.status == TaskStatus::Failed {
                if let Some(reason) = task.failure_reason() {
                    out.push_str(&format!("    Error: {reason}\n"));
                }
            }
        }
        out.push_str(&format!(
            "\nStats: {done} done, {pending} in progress, {failed} failed"
        ));
        out
    }
}

fn pending_task(tasks: &mut [Task], id: u64) -> Result<&mut Task, TodoError> {
    let task = tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or(TodoError::NotFound(id))?;
    if task.status != TaskStatus::Pending {
        return Err(TodoError::NotPending(id));
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_reset_on_clear() {
        let tm = TodoManager::new();
        assert_eq!(tm.add("first", None), 1);
        assert_eq!(tm.add("second", None), 2);
        tm.clear();
        assert_eq!(tm.add("again", None), 1);
    }

    #[test]
    fn test_complete_and_fail_only_pending() {
        let tm = TodoManager::new();
        let a = tm.add("a", None);
        let b = tm.add("b", None);

        tm.complete(a).unwrap();
        assert_eq!(tm.complete(a), Err(TodoError::NotPending(a)));

        tm.fail(b, "timeout").unwrap();
        assert_eq!(tm.fail(b, "again"), Err(TodoError::NotPending(b)));
        assert_eq!(tm.complete(99), Err(TodoError::NotFound(99)));

        let tasks = tm.tasks();
        assert!(tasks[0].completed_at.is_some());
        assert_eq!(tasks[1].failure_reason(), Some("timeout"));
    }

    #[test]
    fn test_stats() {
        let tm = TodoManager::new();
        tm.set_tasks(["a", "b", "c"]);
        tm.complete(1).unwrap();
        tm.fail(2, "x").unwrap();
        assert_eq!(
            tm.stats(),
            TodoStats {
                pending: 1,
                done: 1,
                failed: 1,
                total: 3
            }
        );
    }

    #[test]
    fn test_set_tasks_replaces_plan() {
        let tm = TodoManager::new();
        tm.add("old", None);
        let ids = tm.set_tasks(vec!["check api".to_string(), "load sketches".to_string()]);
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(tm.tasks().len(), 2);
    }

    #[test]
    fn test_render() {
        let tm = TodoManager::new();
        assert_eq!(tm.render(), "No active tasks");

        tm.set_tasks(["fetch", "analyze", "write"]);
        tm.complete(1).unwrap();
        tm.fail(2, "image unreadable").unwrap();

        let text = tm.render();
        assert!(text.starts_with("CURRENT PLAN:\n"));
        assert!(text.contains("[✓] 1. fetch\n"));
        assert!(text.contains("[✗] 2. analyze\n    Error: image unreadable\n"));
        assert!(text.contains("[ ] 3. write\n"));
        assert!(text.ends_with("Stats: 1 done, 1 in progress, 1 failed"));
    }
}
