//! The session user: root project list, settings, tags and view filters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::completable::Completable;
use super::ids::{CompletableId, TagId, UserId};

/// Display data of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub color: String,
}

/// View filters applied when listing subtasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    pub show_completed_tasks: bool,
    pub show_future_start_dates: bool,
    /// Empty means "all tags".
    pub tag_ids_to_show: Vec<TagId>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            show_completed_tasks: true,
            show_future_start_dates: true,
            tag_ids_to_show: Vec::new(),
        }
    }
}

impl Filters {
    /// Whether `item` should be shown at time `now`.
    pub fn admits(&self, item: &Completable, now: DateTime<Utc>) -> bool {
        if !self.show_completed_tasks && item.completed {
            return false;
        }
        if !self.show_future_start_dates && item.start_date.is_some_and(|start| start > now) {
            return false;
        }
        if !self.tag_ids_to_show.is_empty()
            && !item.tags.iter().any(|t| self.tag_ids_to_show.contains(t))
        {
            return false;
        }
        true
    }
}

/// Exactly one per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Root project ids, in display order.
    #[serde(default)]
    pub projects: Vec<CompletableId>,
    /// Named boolean flags. Open-ended.
    #[serde(default)]
    pub settings: BTreeMap<String, bool>,
    #[serde(default)]
    pub current_tags: BTreeMap<TagId, TagInfo>,
    #[serde(default)]
    pub filters: Filters,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            projects: Vec::new(),
            settings: BTreeMap::new(),
            current_tags: BTreeMap::new(),
            filters: Filters::default(),
        }
    }

    pub fn setting(&self, name: &str) -> bool {
        self.settings.get(name).copied().unwrap_or(false)
    }

    pub fn apply(&mut self, update: UserUpdate) {
        match update {
            UserUpdate::Projects(v) => self.projects = v,
            UserUpdate::Settings(v) => self.settings = v,
            UserUpdate::CurrentTags(v) => self.current_tags = v,
            UserUpdate::Filters(v) => self.filters = v,
        }
    }

    pub fn value_of(&self, field: UserField) -> UserUpdate {
        match field {
            UserField::Projects => UserUpdate::Projects(self.projects.clone()),
            UserField::Settings => UserUpdate::Settings(self.settings.clone()),
            UserField::CurrentTags => UserUpdate::CurrentTags(self.current_tags.clone()),
            UserField::Filters => UserUpdate::Filters(self.filters.clone()),
        }
    }
}

/// Settable fields of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserField {
    Projects,
    Settings,
    CurrentTags,
    Filters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum UserUpdate {
    Projects(Vec<CompletableId>),
    Settings(BTreeMap<String, bool>),
    CurrentTags(BTreeMap<TagId, TagInfo>),
    Filters(Filters),
}

impl UserUpdate {
    pub fn field(&self) -> UserField {
        match self {
            UserUpdate::Projects(_) => UserField::Projects,
            UserUpdate::Settings(_) => UserField::Settings,
            UserUpdate::CurrentTags(_) => UserField::CurrentTags,
            UserUpdate::Filters(_) => UserField::Filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn item(completed: bool, start_in_hours: Option<i64>, tags: &[&str]) -> Completable {
        let mut c = Completable::new(CompletableId::new("t"), "x");
        c.completed = completed;
        c.start_date = start_in_hours.map(|h| now() + chrono::Duration::hours(h));
        c.tags = tags.iter().map(|t| TagId::new(*t)).collect();
        c
    }

    #[test]
    fn default_filters_admit_everything() {
        let f = Filters::default();
        assert!(f.admits(&item(true, Some(48), &[]), now()));
    }

    #[rstest]
    #[case::completed_hidden(item(true, None, &[]), false)]
    #[case::open_shown(item(false, None, &[]), true)]
    #[case::future_hidden(item(false, Some(2), &[]), false)]
    #[case::past_start_shown(item(false, Some(-2), &[]), true)]
    fn strict_filters(#[case] c: Completable, #[case] expected: bool) {
        let f = Filters {
            show_completed_tasks: false,
            show_future_start_dates: false,
            tag_ids_to_show: Vec::new(),
        };
        assert_eq!(f.admits(&c, now()), expected);
    }

    #[test]
    fn tag_filter_requires_a_shared_tag() {
        let f = Filters {
            tag_ids_to_show: vec![TagId::new("work")],
            ..Filters::default()
        };
        assert!(f.admits(&item(false, None, &["home", "work"]), now()));
        assert!(!f.admits(&item(false, None, &["home"]), now()));
        assert!(!f.admits(&item(false, None, &[]), now()));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let user: User = serde_json::from_value(serde_json::json!({ "_id": "u1" })).unwrap();
        assert!(user.projects.is_empty());
        assert!(user.filters.show_completed_tasks);
        assert!(!user.setting("darkMode"));
    }
}
