use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::{Completion, CompletionPatch, Task, TaskDraft, TaskPatch};
use crate::view::{self, TaskWithLastCompletion};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub completions_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let completions_path = data_dir.join("completions.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !completions_path.exists() {
            fs::write(&completions_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            completions = %completions_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            completions_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_completions(&self) -> anyhow::Result<Vec<Completion>> {
        load_jsonl(&self.completions_path).context("failed to load completions.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, completions))]
    pub fn save_completions(&self, completions: &[Completion]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.completions_path, completions)
            .context("failed to save completions.data")
    }

    pub fn next_id(&self, tasks: &[Task]) -> u64 {
        tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    #[tracing::instrument(skip(self))]
    pub fn find_task(&self, id: u64) -> anyhow::Result<Task> {
        self.load_tasks()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow!("no task with id {id}"))
    }

    #[tracing::instrument(skip(self, draft, now), fields(name = %draft.name))]
    pub fn create_task(&self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let mut tasks = self.load_tasks()?;
        let task = Task::from_draft(draft, now.trunc_subsecs(0), self.next_id(&tasks))?;

        tasks.push(task.clone());
        tasks.sort_by_key(|t| t.id);
        self.save_tasks(&tasks)?;

        debug!(id = task.id, uuid = %task.uuid, "task created");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch, now))]
    pub fn update_task(
        &self,
        id: u64,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Task> {
        let mut tasks = self.load_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow!("no task with id {id}"))?;

        task.apply_patch(patch, now.trunc_subsecs(0))?;
        let updated = task.clone();
        self.save_tasks(&tasks)?;

        debug!(id, "task updated");
        Ok(updated)
    }

    /// Removes the task and every completion logged against it.
    #[tracing::instrument(skip(self))]
    pub fn delete_task(&self, id: u64) -> anyhow::Result<Task> {
        let mut tasks = self.load_tasks()?;
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| anyhow!("no task with id {id}"))?;
        let removed = tasks.remove(idx);

        let completions = self.load_completions()?;
        let before = completions.len();
        let kept: Vec<Completion> = completions
            .into_iter()
            .filter(|c| c.task_uuid != removed.uuid)
            .collect();

        // Completions first so a failed write cannot orphan history.
        if kept.len() != before {
            self.save_completions(&kept)?;
        }
        self.save_tasks(&tasks)?;

        info!(
            id,
            uuid = %removed.uuid,
            completions_removed = before - kept.len(),
            "deleted task"
        );
        Ok(removed)
    }

    #[tracing::instrument(skip(self, completed_at, notes))]
    pub fn create_completion(
        &self,
        task_id: u64,
        completed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> anyhow::Result<Completion> {
        let task = self.find_task(task_id)?;
        let completion = Completion::new(task.uuid, completed_at.trunc_subsecs(0), notes);

        let mut completions = self.load_completions()?;
        completions.push(completion.clone());
        self.save_completions(&completions)?;

        debug!(task_id, completion = %completion.uuid, "completion logged");
        Ok(completion)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update_completion(
        &self,
        reference: &str,
        patch: CompletionPatch,
    ) -> anyhow::Result<Completion> {
        let mut completions = self.load_completions()?;
        let target = resolve_completion_ref(&completions, reference)?;
        let completion = completions
            .iter_mut()
            .find(|c| c.uuid == target)
            .ok_or_else(|| anyhow!("no completion matching {reference}"))?;

        completion.apply_patch(CompletionPatch {
            completed_at: patch.completed_at.map(|ts| ts.trunc_subsecs(0)),
            ..patch
        });
        let updated = completion.clone();
        self.save_completions(&completions)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_completion(&self, reference: &str) -> anyhow::Result<Completion> {
        let mut completions = self.load_completions()?;
        let target = resolve_completion_ref(&completions, reference)?;
        let idx = completions
            .iter()
            .position(|c| c.uuid == target)
            .ok_or_else(|| anyhow!("no completion matching {reference}"))?;

        let removed = completions.remove(idx);
        self.save_completions(&completions)?;
        info!(completion = %removed.uuid, "deleted completion");
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    pub fn completions_for(&self, task_uuid: Uuid) -> anyhow::Result<Vec<Completion>> {
        let completions = self.load_completions()?;
        Ok(view::history(task_uuid, &completions))
    }

    #[tracing::instrument(skip(self))]
    pub fn list_views(&self, include_archived: bool) -> anyhow::Result<Vec<TaskWithLastCompletion>> {
        let tasks = self.load_tasks()?;
        let completions = self.load_completions()?;
        Ok(view::assemble(&tasks, &completions, include_archived))
    }
}

/// Accepts a full uuid or a unique prefix of its hyphen-less form.
fn resolve_completion_ref(completions: &[Completion], reference: &str) -> anyhow::Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(reference) {
        return Ok(uuid);
    }

    let needle = reference.trim().to_ascii_lowercase().replace('-', "");
    if needle.len() < 4 {
        return Err(anyhow!(
            "completion reference must be at least 4 characters: {reference}"
        ));
    }

    let mut matches = completions
        .iter()
        .filter(|c| c.uuid.simple().to_string().starts_with(&needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no completion matching {reference}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("ambiguous completion reference: {reference}"));
    }
    Ok(first.uuid)
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
