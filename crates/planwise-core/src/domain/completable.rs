//! Completable: the shared shape of Projects and Tasks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CompletableId, TagId};

/// Which map a completable lives in.
///
/// Projects are roots (listed in `User::projects`); Tasks are always nested
/// under another completable's `subtasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Task,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (kind, id) pair addressing one completable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: CompletableId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: CompletableId) -> Self {
        Self { kind, id }
    }

    pub fn project(id: impl Into<CompletableId>) -> Self {
        Self::new(EntityKind::Project, id.into())
    }

    pub fn task(id: impl Into<CompletableId>) -> Self {
        Self::new(EntityKind::Task, id.into())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A Project or a Task. Field names on the wire follow the REST documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completable {
    #[serde(rename = "_id")]
    pub id: CompletableId,
    pub title: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    /// Tag references. Order-preserving, no duplicates.
    #[serde(default)]
    pub tags: Vec<TagId>,
    /// Child Task ids, in display order.
    #[serde(default)]
    pub subtasks: Vec<CompletableId>,
    /// Advisory only; the store never enforces it.
    #[serde(default)]
    pub prereq_tasks: Vec<CompletableId>,
}

impl Completable {
    /// A fresh completable with default field values.
    pub fn new(id: CompletableId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            note: String::new(),
            priority: 0,
            start_date: None,
            due_date: None,
            completed: false,
            completed_date: None,
            tags: Vec::new(),
            subtasks: Vec::new(),
            prereq_tasks: Vec::new(),
        }
    }

    /// Remove `child` from `subtasks`, keeping sibling order. Returns whether it was present.
    pub fn detach_subtask(&mut self, child: &CompletableId) -> bool {
        let before = self.subtasks.len();
        self.subtasks.retain(|id| id != child);
        self.subtasks.len() != before
    }

    /// Drop repeated tag references, keeping the first occurrence.
    pub fn dedup_tags(&mut self) {
        dedup_in_order(&mut self.tags);
    }

    pub fn has_tag(&self, tag: &TagId) -> bool {
        self.tags.contains(tag)
    }

    /// Apply one field update.
    ///
    /// Returns the extra `CompletedDate` update when toggling `completed`
    /// moved the completion stamp, so the caller can notify that table too.
    pub fn apply(&mut self, update: CompletableUpdate, now: DateTime<Utc>) -> Option<CompletableUpdate> {
        match update {
            CompletableUpdate::Title(v) => self.title = v,
            CompletableUpdate::Note(v) => self.note = v,
            CompletableUpdate::Priority(v) => self.priority = v,
            CompletableUpdate::StartDate(v) => self.start_date = v,
            CompletableUpdate::DueDate(v) => self.due_date = v,
            CompletableUpdate::Completed(v) => {
                let was = self.completed;
                self.completed = v;
                let stamp = match (was, v) {
                    (false, true) => Some(now),
                    (_, false) => None,
                    (true, true) => self.completed_date,
                };
                if stamp != self.completed_date {
                    self.completed_date = stamp;
                    return Some(CompletableUpdate::CompletedDate(stamp));
                }
            }
            CompletableUpdate::CompletedDate(v) => self.completed_date = v,
            CompletableUpdate::Tags(mut v) => {
                dedup_in_order(&mut v);
                self.tags = v;
            }
            CompletableUpdate::Subtasks(v) => self.subtasks = v,
            CompletableUpdate::PrereqTasks(v) => self.prereq_tasks = v,
        }
        None
    }

    /// Current value of `field`, as an update carrying it.
    pub fn value_of(&self, field: CompletableField) -> CompletableUpdate {
        match field {
            CompletableField::Title => CompletableUpdate::Title(self.title.clone()),
            CompletableField::Note => CompletableUpdate::Note(self.note.clone()),
            CompletableField::Priority => CompletableUpdate::Priority(self.priority),
            CompletableField::StartDate => CompletableUpdate::StartDate(self.start_date),
            CompletableField::DueDate => CompletableUpdate::DueDate(self.due_date),
            CompletableField::Completed => CompletableUpdate::Completed(self.completed),
            CompletableField::CompletedDate => CompletableUpdate::CompletedDate(self.completed_date),
            CompletableField::Tags => CompletableUpdate::Tags(self.tags.clone()),
            CompletableField::Subtasks => CompletableUpdate::Subtasks(self.subtasks.clone()),
            CompletableField::PrereqTasks => CompletableUpdate::PrereqTasks(self.prereq_tasks.clone()),
        }
    }
}

fn dedup_in_order(tags: &mut Vec<TagId>) {
    let mut seen = Vec::with_capacity(tags.len());
    tags.retain(|t| {
        if seen.contains(t) {
            false
        } else {
            seen.push(t.clone());
            true
        }
    });
}

/// Settable fields of a completable. Keys the per-property listener tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletableField {
    Title,
    Note,
    Priority,
    StartDate,
    DueDate,
    Completed,
    CompletedDate,
    Tags,
    Subtasks,
    PrereqTasks,
}

/// One field's new value.
///
/// Property listeners receive this, never the whole entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum CompletableUpdate {
    Title(String),
    Note(String),
    Priority(i32),
    StartDate(Option<DateTime<Utc>>),
    DueDate(Option<DateTime<Utc>>),
    Completed(bool),
    CompletedDate(Option<DateTime<Utc>>),
    Tags(Vec<TagId>),
    Subtasks(Vec<CompletableId>),
    PrereqTasks(Vec<CompletableId>),
}

impl CompletableUpdate {
    pub fn field(&self) -> CompletableField {
        match self {
            CompletableUpdate::Title(_) => CompletableField::Title,
            CompletableUpdate::Note(_) => CompletableField::Note,
            CompletableUpdate::Priority(_) => CompletableField::Priority,
            CompletableUpdate::StartDate(_) => CompletableField::StartDate,
            CompletableUpdate::DueDate(_) => CompletableField::DueDate,
            CompletableUpdate::Completed(_) => CompletableField::Completed,
            CompletableUpdate::CompletedDate(_) => CompletableField::CompletedDate,
            CompletableUpdate::Tags(_) => CompletableField::Tags,
            CompletableUpdate::Subtasks(_) => CompletableField::Subtasks,
            CompletableUpdate::PrereqTasks(_) => CompletableField::PrereqTasks,
        }
    }
}
