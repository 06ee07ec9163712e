use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder resource managed through the `/examples` routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Example {
    /// Creates a new Example with a fresh identifier.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update. Fields left as `None` are kept.
    pub fn apply_update(&mut self, name: Option<String>, content: Option<String>) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(content) = content {
            self.content = content;
        }
        self.updated_at = Utc::now();
    }
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// Filter for listing examples.
#[derive(Debug, Clone, Default)]
pub struct ExampleFilter {
    /// Case-sensitive substring match on the name.
    pub name_like: Option<String>,
    /// Case-insensitive substring match on the content.
    pub content_ilike: Option<String>,
    pub order_by_name: Option<OrderDirection>,
}

impl ExampleFilter {
    pub fn matches(&self, example: &Example) -> bool {
        if let Some(ref pattern) = self.name_like {
            if !example.name.contains(pattern.as_str()) {
                return false;
            }
        }
        if let Some(ref pattern) = self.content_ilike {
            if !example
                .content
                .to_lowercase()
                .contains(&pattern.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}
