// Data models for the board

use serde::{Deserialize, Deserializer, Serialize};

/// A card on the board
///
/// Position is not stored here; it is the task's index within its column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Older snapshots predate categories, so a missing field means "none"
    #[serde(default)]
    pub category_id: Option<String>,
}

impl Task {
    /// Create a task with a fresh id and no description or category
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            category_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

/// Label that can be attached to tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Presentation tag, stored verbatim
    pub color: String,
}

impl Category {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Partial update for a task
///
/// Each field is applied only when `Some`. For the optional fields the inner
/// `Option` is the new value, so `Some(None)` clears it. In JSON an absent key
/// leaves the field alone and `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.category_id.is_none()
    }

    pub(crate) fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(category_id) = self.category_id {
            task.category_id = category_id;
        }
    }
}

/// Partial update for a category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CategoryPatch {
    pub(crate) fn apply(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name;
        }
        if let Some(color) = self.color {
            category.color = color;
        }
    }
}

// Distinguishes `"field": null` (Some(None)) from a missing key (None via default)
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Generate a new time-ordered identifier
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
