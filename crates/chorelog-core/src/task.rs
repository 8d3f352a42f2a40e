use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::datetime::compact_date_serde;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub uuid: Uuid,

    pub id: u64,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub interval_days: Option<u32>,

    #[serde(default = "default_true")]
    pub notifications_enabled: bool,

    #[serde(default)]
    pub is_archived: bool,

    #[serde(with = "compact_date_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "compact_date_serde")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    pub uuid: Uuid,

    pub task_uuid: Uuid,

    #[serde(with = "compact_date_serde")]
    pub completed_at: DateTime<Utc>,

    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub interval_days: Option<u32>,
    #[serde(default)]
    pub notifications_enabled: Option<bool>,
}

/// Tri-state field update.
///
/// `Keep` leaves the stored value alone, `Clear` removes it and `Set`
/// replaces it. When deserialized with `#[serde(default)]`, an absent JSON
/// field becomes `Keep`, an explicit `null` becomes `Clear` and any other
/// value becomes `Set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Patch<String>,
    #[serde(default)]
    pub interval_days: Patch<u32>,
    #[serde(default)]
    pub notifications_enabled: Option<bool>,
    #[serde(default)]
    pub is_archived: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_keep()
            && self.interval_days.is_keep()
            && self.notifications_enabled.is_none()
            && self.is_archived.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CompletionPatch {
    #[serde(default, with = "compact_date_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Patch<String>,
}

impl CompletionPatch {
    pub fn is_empty(&self) -> bool {
        self.completed_at.is_none() && self.notes.is_keep()
    }
}

impl Task {
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>, id: u64) -> anyhow::Result<Self> {
        let name = normalize_name(&draft.name)?;
        Ok(Self {
            uuid: Uuid::new_v4(),
            id,
            name,
            description: draft.description.and_then(non_empty),
            interval_days: draft.interval_days.filter(|days| *days > 0),
            notifications_enabled: draft.notifications_enabled.unwrap_or(true),
            is_archived: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merges `patch` into the task. An empty description or a zero interval
    /// count as clearing the field.
    pub fn apply_patch(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(name) = patch.name {
            self.name = normalize_name(&name)?;
        }

        match patch.description {
            Patch::Set(text) => self.description = non_empty(text),
            other => other.apply(&mut self.description),
        }

        match patch.interval_days {
            Patch::Set(0) => self.interval_days = None,
            other => other.apply(&mut self.interval_days),
        }

        if let Some(enabled) = patch.notifications_enabled {
            self.notifications_enabled = enabled;
        }
        if let Some(archived) = patch.is_archived {
            self.is_archived = archived;
        }

        self.updated_at = now;
        Ok(())
    }
}

impl Completion {
    pub fn new(
        task_uuid: Uuid,
        completed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            task_uuid,
            completed_at,
            notes: notes.and_then(non_empty),
        }
    }

    pub fn apply_patch(&mut self, patch: CompletionPatch) {
        if let Some(at) = patch.completed_at {
            self.completed_at = at;
        }
        match patch.notes {
            Patch::Set(text) => self.notes = non_empty(text),
            other => other.apply(&mut self.notes),
        }
    }

    pub fn short_ref(&self) -> String {
        self.uuid.simple().to_string()[..8].to_string()
    }
}

fn normalize_name(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("task name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
