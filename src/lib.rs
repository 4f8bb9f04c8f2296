//! StateSet Category Tree
//!
//! Nested-set hierarchical category engine for the product catalog. Subtree,
//! ancestor and child lookups are single range queries over one flat
//! `categories` table; inserts, moves and deletes are applied as atomic range
//! shifts under a tree-wide write lock.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod repositories;
pub mod services;
pub mod tree;

use std::sync::Arc;
use tokio::sync::mpsc;

pub use errors::{ErrorKind, ServiceError};
pub use services::category_tree::CategoryTreeService;

/// Commonly used types
pub mod prelude {
    pub use crate::entities::{Category, CategoryModel};
    pub use crate::errors::{ErrorKind, ServiceError};
    pub use crate::events::{CategoryEventHandler, Event, EventSender};
    pub use crate::services::category_tree::{
        CategoryTreeNode, CategoryTreeService, CreateCategoryInput, DeleteOptions,
        ImportCategory, MoveOutcome, RebuildSummary, UpdateCategoryInput,
    };
    pub use crate::tree::{Position, TreeViolation};
}

/// Connects, optionally migrates, and wires a service plus the receiving end
/// of its event channel from loaded configuration.
pub async fn build_service(
    cfg: &config::AppConfig,
) -> Result<(CategoryTreeService, mpsc::Receiver<events::Event>), ServiceError> {
    let db = db::establish_connection_from_app_config(cfg).await?;
    if cfg.auto_migrate {
        db::run_migrations(&db).await?;
    }

    let (tx, rx) = mpsc::channel(cfg.event_channel_capacity);
    let service = CategoryTreeService::new(
        Arc::new(db),
        Arc::new(events::EventSender::new(tx)),
        cfg.category_tree.clone(),
    );
    Ok((service, rx))
}
