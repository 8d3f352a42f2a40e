use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::datetime::interval_label;
use crate::status::{Status, classify};
use crate::task::{Completion, Task};

/// A task joined with its most recent completion.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskWithLastCompletion {
    #[serde(flatten)]
    pub task: Task,
    pub last_completion: Option<Completion>,
}

impl TaskWithLastCompletion {
    pub fn status(&self, now: DateTime<Utc>) -> Status {
        classify(self.task.interval_days, self.last_completion.as_ref(), now)
    }

    pub fn interval_label(&self) -> String {
        interval_label(self.task.interval_days)
    }
}

/// Export row: the view plus its derived status and label.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub view: TaskWithLastCompletion,
    pub status: Status,
    pub interval_label: String,
}

impl StatusReport {
    pub fn new(view: TaskWithLastCompletion, now: DateTime<Utc>) -> Self {
        let status = view.status(now);
        let interval_label = view.interval_label();
        Self {
            view,
            status,
            interval_label,
        }
    }
}

/// Completion with the greatest `completed_at` for `task_uuid`. Which of
/// several equal timestamps wins is unspecified.
pub fn latest_completion<'a>(
    task_uuid: Uuid,
    completions: &'a [Completion],
) -> Option<&'a Completion> {
    completions
        .iter()
        .filter(|c| c.task_uuid == task_uuid)
        .max_by_key(|c| c.completed_at)
}

/// Newest task first. Archived tasks are dropped unless `include_archived`.
#[tracing::instrument(skip(tasks, completions), fields(tasks = tasks.len(), completions = completions.len()))]
pub fn assemble(
    tasks: &[Task],
    completions: &[Completion],
    include_archived: bool,
) -> Vec<TaskWithLastCompletion> {
    let mut latest: HashMap<Uuid, &Completion> = HashMap::new();
    for completion in completions {
        latest
            .entry(completion.task_uuid)
            .and_modify(|current| {
                if completion.completed_at > current.completed_at {
                    *current = completion;
                }
            })
            .or_insert(completion);
    }

    let mut views: Vec<TaskWithLastCompletion> = tasks
        .iter()
        .filter(|task| include_archived || !task.is_archived)
        .map(|task| TaskWithLastCompletion {
            task: task.clone(),
            last_completion: latest.get(&task.uuid).map(|c| (*c).clone()),
        })
        .collect();

    views.sort_by(|a, b| {
        b.task
            .created_at
            .cmp(&a.task.created_at)
            .then_with(|| b.task.id.cmp(&a.task.id))
    });
    views
}

/// Overdue tasks that want to be nagged about it, in input order.
pub fn overdue_notifications(
    views: &[TaskWithLastCompletion],
    now: DateTime<Utc>,
) -> Vec<&TaskWithLastCompletion> {
    views
        .iter()
        .filter(|view| view.task.notifications_enabled && view.status(now) == Status::Overdue)
        .collect()
}

/// Every completion for the task, newest first.
pub fn history(task_uuid: Uuid, completions: &[Completion]) -> Vec<Completion> {
    let mut rows: Vec<Completion> = completions
        .iter()
        .filter(|c| c.task_uuid == task_uuid)
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    rows
}
