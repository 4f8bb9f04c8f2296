use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::{Bounds, NodeSnapshot};

/// One row of the flat `categories` table. `left`/`right`/`level`/`path` are
/// owned by the tree service; nothing else writes them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Uuid")]
    pub id: Uuid,

    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,

    #[sea_orm(column_name = "lft")]
    pub left: i32,
    #[sea_orm(column_name = "rgt")]
    pub right: i32,
    pub level: i32,
    pub path: String,

    pub sort_order: i32,
    pub is_visible: bool,
    pub show_in_menu: bool,
    pub is_featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,

    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(belongs_to = "Entity", from = "Column::ParentId", to = "Column::Id")]
    Parent,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn bounds(&self) -> Bounds {
        Bounds {
            left: self.left,
            right: self.right,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            parent_id: self.parent_id,
            left: self.left,
            right: self.right,
            level: self.level,
            slug: self.slug.clone(),
            path: self.path.clone(),
        }
    }
}
