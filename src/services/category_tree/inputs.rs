use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::CategoryModel;
use crate::tree::Position;

fn default_true() -> bool {
    true
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Category name must not be empty".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub name: String,
    /// Derived from `name` when absent
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub position: Position,
    /// Appended after the current siblings when absent
    pub sort_order: Option<i32>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default = "default_true")]
    pub show_in_menu: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[validate(length(max = 255))]
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl CreateCategoryInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            description: None,
            position: Position::Last,
            sort_order: None,
            is_visible: true,
            show_in_menu: true,
            is_featured: false,
            meta_title: None,
            meta_description: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// Attribute changes. `expected_version` must match the stored version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCategoryInput {
    pub expected_version: i32,
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i32>,
    pub is_visible: Option<bool>,
    pub show_in_menu: Option<bool>,
    pub is_featured: Option<bool>,
    #[validate(length(max = 255))]
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Physically remove rows and compact boundaries. Maintenance only.
    #[serde(default)]
    pub hard: bool,
}

/// One row of a bulk import. Rows reference parents by id, either another
/// row of the same import or a live category.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImportCategory {
    pub id: Option<Uuid>,
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub name: String,
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub sort_order: i32,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default = "default_true")]
    pub show_in_menu: bool,
    #[serde(default)]
    pub is_featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// A category with its live children, in nested-set order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: CategoryModel,
    pub children: Vec<CategoryTreeNode>,
}

impl CategoryTreeNode {
    pub fn leaf(category: CategoryModel) -> Self {
        Self {
            category,
            children: Vec::new(),
        }
    }

    /// This node plus every node below it.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTreeNode::size).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveOutcome {
    pub category: CategoryModel,
    pub old_parent_id: Option<Uuid>,
    pub old_path: String,
    /// Rows relocated; 0 when the node already sat at the target slot.
    pub affected: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub nodes: usize,
    pub created: usize,
    pub updated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(CreateCategoryInput::named("   ").validate().is_err());
        assert!(CreateCategoryInput::named("Books").validate().is_ok());

        let update = UpdateCategoryInput {
            name: Some("".into()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
        assert!(UpdateCategoryInput::default().validate().is_ok());
    }

    #[test]
    fn create_input_deserializes_with_defaults() {
        let input: CreateCategoryInput =
            serde_json::from_str(r#"{"name":"Phones","position":"first"}"#).unwrap();
        assert_eq!(input.position, Position::First);
        assert!(input.is_visible);
        assert!(input.show_in_menu);
        assert!(!input.is_featured);
        assert!(input.sort_order.is_none());
    }

    #[test]
    fn import_rows_deserialize_from_json() {
        let rows: Vec<ImportCategory> = serde_json::from_str(
            r#"[
                {"id":"6f1c1d3e-8f1a-4a57-9d55-0f6a4c2b9e11","name":"Electronics"},
                {"name":"Phones","parent_id":"6f1c1d3e-8f1a-4a57-9d55-0f6a4c2b9e11","sort_order":2}
            ]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].id.is_none());
        assert_eq!(rows[1].sort_order, 2);
        assert_eq!(rows[1].parent_id, rows[0].id);
    }
}
