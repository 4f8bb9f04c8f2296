#![allow(dead_code)]

use std::sync::Arc;

use stateset_category_tree::{
    config::CategoryTreeConfig,
    db,
    entities::CategoryModel,
    events::{Event, EventSender},
    services::category_tree::{CategoryTreeService, CreateCategoryInput},
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A service over a fresh in-memory SQLite database, plus its event stream.
pub struct TestTree {
    pub service: CategoryTreeService,
    pub events: mpsc::Receiver<Event>,
}

impl TestTree {
    pub async fn new() -> Self {
        Self::with_config(CategoryTreeConfig::default()).await
    }

    pub async fn with_config(config: CategoryTreeConfig) -> Self {
        let pool = db::establish_connection("sqlite::memory:")
            .await
            .expect("connect to in-memory sqlite");
        db::run_migrations(&pool).await.expect("run migrations");

        let (tx, rx) = mpsc::channel(256);
        let service = CategoryTreeService::new(
            Arc::new(pool),
            Arc::new(EventSender::new(tx)),
            config,
        );
        Self {
            service,
            events: rx,
        }
    }

    pub async fn create(&self, name: &str, parent_id: Option<Uuid>) -> CategoryModel {
        self.service
            .create(CreateCategoryInput::named(name), parent_id)
            .await
            .unwrap_or_else(|e| panic!("create {name}: {e}"))
    }

    pub async fn reload(&self, id: Uuid) -> CategoryModel {
        self.service.get(id).await.expect("category should be live")
    }

    pub async fn bounds(&self, id: Uuid) -> (i32, i32) {
        let category = self.reload(id).await;
        (category.left, category.right)
    }

    pub async fn assert_consistent(&self) {
        let violations = self.service.verify_tree().await.expect("verify tree");
        assert!(violations.is_empty(), "tree violations: {:#?}", violations);
    }

    /// Every live event received so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn names(categories: &[CategoryModel]) -> Vec<&str> {
    categories.iter().map(|c| c.name.as_str()).collect()
}
