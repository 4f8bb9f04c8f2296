//! Orchestrates nested-set mutations and queries over the `categories` table.
//!
//! Mutations run inside one [`UnitOfWork`]: the tree lock is taken, the
//! boundaries involved are read inside the transaction, the arithmetic in
//! [`crate::tree`] turns them into range shifts, and the repository applies
//! them. Events are published only after commit. Reads are plain range scans
//! and never take the lock.

mod inputs;

pub use inputs::{
    CategoryTreeNode, CreateCategoryInput, DeleteOptions, ImportCategory, MoveOutcome,
    RebuildSummary, UpdateCategoryInput,
};

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, Set};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::CategoryTreeConfig;
use crate::db::{TreeLock, UnitOfWork};
use crate::entities::category::ActiveModel as CategoryActiveModel;
use crate::entities::CategoryModel;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{CategoryRepository, NewCategoryRow};
use crate::services::slug::{build_path, slugify, slugify_or_fallback, unique_slug};
use crate::tree::{
    check_forest, compute_deletion_boundaries, compute_insertion_boundaries,
    compute_move_boundaries, number_forest, Bounds, FlatNode, Position, TreeViolation,
};

/// Nested-set category tree service
#[derive(Clone)]
pub struct CategoryTreeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    lock: TreeLock,
    config: CategoryTreeConfig,
}

impl CategoryTreeService {
    /// Clones share one tree lock; build a single service per database.
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: CategoryTreeConfig,
    ) -> Self {
        let lock = TreeLock::new(config.lock_timeout());
        Self {
            db,
            event_sender,
            lock,
            config,
        }
    }

    async fn begin(&self, operation: &'static str) -> Result<UnitOfWork, ServiceError> {
        UnitOfWork::begin(&self.db, &self.lock, operation).await
    }

    fn repo(&self) -> CategoryRepository<'_, DatabaseConnection> {
        CategoryRepository::new(&*self.db)
    }

    // ==================== Mutations ====================

    /// Creates a category under `parent_id`, or as a root when `None`.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        input: CreateCategoryInput,
        parent_id: Option<Uuid>,
    ) -> Result<CategoryModel, ServiceError> {
        input.validate()?;

        let uow = self.begin("create").await?;
        let result = self.create_in(uow.txn(), input, parent_id).await;
        let category = uow.finish(result).await?;

        self.event_sender
            .send_or_log(Event::CategoryCreated {
                id: category.id,
                parent_id: category.parent_id,
                path: category.path.clone(),
            })
            .await;

        info!(
            category_id = %category.id,
            left = category.left,
            right = category.right,
            "Created category {}",
            category.path
        );
        Ok(category)
    }

    async fn create_in(
        &self,
        txn: &DatabaseTransaction,
        input: CreateCategoryInput,
        parent_id: Option<Uuid>,
    ) -> Result<CategoryModel, ServiceError> {
        let repo = CategoryRepository::new(txn);

        let (parent_bounds, level, parent_path) = match parent_id {
            Some(id) => {
                let parent = repo.require_live(id).await?;
                (parent.bounds(), parent.level + 1, Some(parent.path))
            }
            None => (Bounds::virtual_root(repo.max_right().await?), 0, None),
        };
        self.check_depth(level)?;

        let slug = self
            .resolve_slug(&repo, input.slug.as_deref(), &input.name, None, &HashSet::new())
            .await?;
        let path = build_path(parent_path.as_deref(), &slug);

        let sort_order = match input.sort_order {
            Some(sort_order) => sort_order,
            None => next_sort_order(repo.max_sibling_sort_order(parent_id).await?),
        };

        let plan = compute_insertion_boundaries(parent_bounds, input.position);
        repo.shift_boundaries(plan.shift_from_boundary, plan.shift_amount)
            .await?;

        let row = NewCategoryRow {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            slug,
            description: input.description,
            parent_id,
            sort_order,
            is_visible: input.is_visible,
            show_in_menu: input.show_in_menu,
            is_featured: input.is_featured,
            meta_title: input.meta_title,
            meta_description: input.meta_description,
        };
        repo.insert_node(row, plan.new_left, plan.new_right, level, path, Utc::now())
            .await
            .map_err(ServiceError::from_write)
    }

    /// Moves a category and its whole subtree under `new_parent_id` (root
    /// level when `None`). Moving a node under itself or one of its
    /// descendants is a validation error and changes nothing.
    #[instrument(skip(self))]
    pub async fn move_category(
        &self,
        id: Uuid,
        new_parent_id: Option<Uuid>,
        position: Position,
    ) -> Result<MoveOutcome, ServiceError> {
        if new_parent_id == Some(id) {
            return Err(ServiceError::ValidationError(format!(
                "Category {} cannot become its own parent",
                id
            )));
        }

        let uow = self.begin("move").await?;
        let result = self.move_in(uow.txn(), id, new_parent_id, position).await;
        let outcome = uow.finish(result).await?;

        if outcome.affected > 0 {
            self.event_sender
                .send_or_log(Event::CategoryMoved {
                    id,
                    old_parent_id: outcome.old_parent_id,
                    new_parent_id: outcome.category.parent_id,
                    old_path: outcome.old_path.clone(),
                    new_path: outcome.category.path.clone(),
                    affected: outcome.affected,
                })
                .await;
            info!(
                category_id = %id,
                affected = outcome.affected,
                "Moved category {} -> {}",
                outcome.old_path,
                outcome.category.path
            );
        } else {
            debug!(category_id = %id, "Move left category in place");
        }
        Ok(outcome)
    }

    async fn move_in(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        new_parent_id: Option<Uuid>,
        position: Position,
    ) -> Result<MoveOutcome, ServiceError> {
        let repo = CategoryRepository::new(txn);
        let node = repo.require_live(id).await?;

        let (parent_bounds, new_level, parent_path) = match new_parent_id {
            Some(parent_id) => {
                let parent = repo.require_live(parent_id).await?;
                (parent.bounds(), parent.level + 1, Some(parent.path))
            }
            None => (Bounds::virtual_root(repo.max_right().await?), 0, None),
        };

        let plan = compute_move_boundaries(node.bounds(), parent_bounds, position)?;
        if plan.is_noop() && node.parent_id == new_parent_id {
            return Ok(MoveOutcome {
                old_parent_id: node.parent_id,
                old_path: node.path.clone(),
                category: node,
                affected: 0,
            });
        }

        if let Some(max_depth) = self.config.max_depth {
            let subtree = repo.subtree(node.bounds()).await?;
            let deepest = subtree.iter().map(|c| c.level).max().unwrap_or(node.level);
            self.check_depth_limit(new_level + (deepest - node.level), max_depth)?;
        }

        let sort_order = if node.parent_id == new_parent_id {
            node.sort_order
        } else {
            next_sort_order(repo.max_sibling_sort_order(new_parent_id).await?)
        };

        let level_delta = new_level - node.level;
        let new_path = build_path(parent_path.as_deref(), &node.slug);
        let now = Utc::now();

        repo.translate_range(plan.subtree, plan.park_offset).await?;
        repo.shift_boundaries(plan.close_from, -plan.width).await?;
        repo.shift_boundaries(plan.open_from, plan.width).await?;
        let affected = repo
            .relocate_subtree(
                plan.parked(),
                plan.unpark_translation(),
                level_delta,
                &node.path,
                &new_path,
                now,
            )
            .await?;
        repo.set_parent(id, new_parent_id, sort_order).await?;

        let category = repo.require_live(id).await?;
        if (category.left, category.right) != (plan.new_left, plan.new_right) {
            warn!(
                category_id = %id,
                expected_left = plan.new_left,
                actual_left = category.left,
                "Moved category landed on unexpected boundaries"
            );
            return Err(ServiceError::Conflict(format!(
                "Category {} moved concurrently; retry the operation",
                id
            )));
        }

        Ok(MoveOutcome {
            category,
            old_parent_id: node.parent_id,
            old_path: node.path,
            affected,
        })
    }

    /// Soft-deletes the category and its whole subtree, or with `hard`
    /// physically removes them and closes the gap. Returns the number of rows.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, options: DeleteOptions) -> Result<u64, ServiceError> {
        let uow = self.begin(if options.hard { "hard_delete" } else { "delete" }).await?;
        let result = self.delete_in(uow.txn(), id, options).await;
        let affected = uow.finish(result).await?;

        self.event_sender
            .send_or_log(Event::CategoryDeleted {
                id,
                hard: options.hard,
                affected,
            })
            .await;

        info!(category_id = %id, hard = options.hard, affected, "Deleted category subtree");
        Ok(affected)
    }

    async fn delete_in(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        options: DeleteOptions,
    ) -> Result<u64, ServiceError> {
        let repo = CategoryRepository::new(txn);
        let node = repo.require_live(id).await?;

        if !options.hard {
            return Ok(repo.soft_delete_subtree(node.bounds(), Utc::now()).await?);
        }

        let removed = repo.hard_delete_subtree(node.bounds()).await?;
        let compaction = compute_deletion_boundaries(node.bounds());
        repo.shift_boundaries(compaction.shift_from, -compaction.width)
            .await?;
        Ok(removed)
    }

    /// Updates display attributes and optionally the slug. A new slug is
    /// made unique and rewrites the path of every descendant.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        input.validate()?;

        let uow = self.begin("update").await?;
        let result = self.update_in(uow.txn(), id, input).await;
        let category = uow.finish(result).await?;

        self.event_sender
            .send_or_log(Event::CategoryUpdated {
                id,
                path: category.path.clone(),
                version: category.version,
            })
            .await;

        info!(category_id = %id, version = category.version, "Updated category");
        Ok(category)
    }

    async fn update_in(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        let repo = CategoryRepository::new(txn);
        let current = repo.require_live(id).await?;
        if current.version != input.expected_version {
            return Err(ServiceError::ConcurrentModification {
                id,
                expected: input.expected_version,
                actual: current.version,
            });
        }

        let now = Utc::now();
        let mut active: CategoryActiveModel = current.clone().into();

        if let Some(requested) = input.slug.as_deref() {
            let slug = self
                .resolve_slug(
                    &repo,
                    Some(requested),
                    &current.name,
                    Some(&current.slug),
                    &HashSet::new(),
                )
                .await?;
            if slug != current.slug {
                let parent_path = match current.parent_id {
                    Some(parent_id) => Some(repo.require_live(parent_id).await?.path),
                    None => None,
                };
                let path = build_path(parent_path.as_deref(), &slug);
                repo.rewrite_descendant_paths(current.bounds(), &current.path, &path, now)
                    .await?;
                active.slug = Set(slug);
                active.path = Set(path);
            }
        }

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(sort_order) = input.sort_order {
            active.sort_order = Set(sort_order);
        }
        if let Some(is_visible) = input.is_visible {
            active.is_visible = Set(is_visible);
        }
        if let Some(show_in_menu) = input.show_in_menu {
            active.show_in_menu = Set(show_in_menu);
        }
        if let Some(is_featured) = input.is_featured {
            active.is_featured = Set(is_featured);
        }
        if let Some(meta_title) = input.meta_title {
            active.meta_title = Set(Some(meta_title));
        }
        if let Some(meta_description) = input.meta_description {
            active.meta_description = Set(Some(meta_description));
        }

        active.version = Set(current.version + 1);
        active.updated_at = Set(now);

        repo.update(active).await.map_err(ServiceError::from_write)
    }

    // ==================== Queries ====================

    pub async fn get(&self, id: Uuid) -> Result<CategoryModel, ServiceError> {
        self.repo().require_live(id).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<CategoryModel, ServiceError> {
        self.repo()
            .find_live_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category with slug '{}' not found", slug)))
    }

    pub async fn get_by_path(&self, path: &str) -> Result<CategoryModel, ServiceError> {
        self.repo()
            .find_live_by_path(path)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category at path '{}' not found", path)))
    }

    /// Live roots in tree order.
    pub async fn get_roots(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(self.repo().roots().await?)
    }

    /// The node and all descendants in pre-order, node first.
    #[instrument(skip(self))]
    pub async fn get_subtree(&self, id: Uuid) -> Result<Vec<CategoryModel>, ServiceError> {
        let repo = self.repo();
        let node = repo.require_live(id).await?;
        Ok(repo.subtree(node.bounds()).await?)
    }

    /// Ancestors from the root down to the direct parent.
    #[instrument(skip(self))]
    pub async fn get_ancestors(&self, id: Uuid) -> Result<Vec<CategoryModel>, ServiceError> {
        let repo = self.repo();
        let node = repo.require_live(id).await?;
        Ok(repo.ancestors(node.bounds()).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_children(&self, id: Uuid) -> Result<Vec<CategoryModel>, ServiceError> {
        let repo = self.repo();
        let node = repo.require_live(id).await?;
        Ok(repo.children(node.bounds(), node.level).await?)
    }

    /// Ids used to scope "products in this category or below" queries.
    pub async fn get_category_and_descendant_ids(
        &self,
        id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self.get_subtree(id).await?.into_iter().map(|c| c.id).collect())
    }

    pub async fn count_descendants(&self, id: Uuid) -> Result<u64, ServiceError> {
        let repo = self.repo();
        let node = repo.require_live(id).await?;
        Ok(repo.count_descendants(node.bounds()).await?)
    }

    /// Nested view of one subtree, or of the whole forest when `root_id` is `None`.
    #[instrument(skip(self))]
    pub async fn get_tree(
        &self,
        root_id: Option<Uuid>,
    ) -> Result<Vec<CategoryTreeNode>, ServiceError> {
        let rows = match root_id {
            Some(id) => self.get_subtree(id).await?,
            None => self.repo().load_live_forest().await?,
        };
        Ok(assemble_tree(rows))
    }

    // ==================== Maintenance ====================

    /// Checks every structural invariant over the live rows.
    #[instrument(skip(self))]
    pub async fn verify_tree(&self) -> Result<Vec<TreeViolation>, ServiceError> {
        let rows = self.repo().load_live_forest().await?;
        let snapshots: Vec<_> = rows.iter().map(CategoryModel::snapshot).collect();
        let violations = check_forest(&snapshots);
        if violations.is_empty() {
            debug!(nodes = rows.len(), "Category tree verified");
        } else {
            warn!(
                nodes = rows.len(),
                violations = violations.len(),
                "Category tree has integrity violations"
            );
        }
        Ok(violations)
    }

    /// Renumbers every live row from its stored `parent_id`, keeping current
    /// sibling order. Closes gaps left by soft deletes and repairs drifted
    /// boundaries, levels and paths.
    #[instrument(skip(self))]
    pub async fn rebuild_from_storage(&self) -> Result<RebuildSummary, ServiceError> {
        let uow = self.begin("rebuild").await?;
        let result = self.rebuild_in(uow.txn(), Vec::new()).await;
        let summary = uow.finish(result).await?;
        self.publish_rebuild(summary).await;
        Ok(summary)
    }

    /// Bulk import: merges `rows` over the live forest (known ids are updated,
    /// the rest inserted) and renumbers everything depth-first in one
    /// transaction. Siblings follow `sort_order`, then input order.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn rebuild_tree(
        &self,
        rows: Vec<ImportCategory>,
    ) -> Result<RebuildSummary, ServiceError> {
        for row in &rows {
            row.validate()?;
        }

        let uow = self.begin("rebuild").await?;
        let result = self.rebuild_in(uow.txn(), rows).await;
        let summary = uow.finish(result).await?;
        self.publish_rebuild(summary).await;
        Ok(summary)
    }

    /// Physically removes soft-deleted rows, releasing their slugs.
    #[instrument(skip(self))]
    pub async fn purge_deleted(&self) -> Result<u64, ServiceError> {
        let uow = self.begin("purge").await?;
        let result = CategoryRepository::new(uow.txn())
            .purge_soft_deleted()
            .await
            .map_err(ServiceError::from);
        let purged = uow.finish(result).await?;
        info!(purged, "Purged soft-deleted categories");
        Ok(purged)
    }

    async fn publish_rebuild(&self, summary: RebuildSummary) {
        self.event_sender
            .send_or_log(Event::CategoryTreeRebuilt {
                nodes: summary.nodes,
                at: Utc::now(),
            })
            .await;
        info!(
            nodes = summary.nodes,
            created = summary.created,
            updated = summary.updated,
            "Rebuilt category tree"
        );
    }

    async fn rebuild_in(
        &self,
        txn: &DatabaseTransaction,
        imports: Vec<ImportCategory>,
    ) -> Result<RebuildSummary, ServiceError> {
        let repo = CategoryRepository::new(txn);
        let live = repo.load_live_forest().await?;
        let live_by_id: HashMap<Uuid, usize> =
            live.iter().enumerate().map(|(idx, c)| (c.id, idx)).collect();

        // Storage order is kept for a plain renumbering; an import sorts by sort_order.
        let mut flat: Vec<FlatNode> = live
            .iter()
            .map(|c| FlatNode {
                id: c.id,
                parent_id: c.parent_id,
                sort_order: if imports.is_empty() { 0 } else { c.sort_order },
            })
            .collect();

        let mut slugs: HashMap<Uuid, String> =
            live.iter().map(|c| (c.id, c.slug.clone())).collect();
        let mut reserved: HashSet<String> = HashSet::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut updates: HashMap<Uuid, ImportCategory> = HashMap::new();
        let mut inserts: HashMap<Uuid, ImportCategory> = HashMap::new();

        for import in imports {
            let id = import.id.unwrap_or_else(Uuid::new_v4);
            if !seen.insert(id) {
                return Err(ServiceError::ValidationError(format!(
                    "Category {} appears more than once in the import",
                    id
                )));
            }

            match live_by_id.get(&id) {
                Some(&idx) => {
                    let current = &live[idx];
                    flat[idx].parent_id = import.parent_id;
                    flat[idx].sort_order = import.sort_order;
                    let slug = match import.slug.as_deref() {
                        Some(requested) => {
                            self.resolve_slug(
                                &repo,
                                Some(requested),
                                &import.name,
                                Some(&current.slug),
                                &reserved,
                            )
                            .await?
                        }
                        None => current.slug.clone(),
                    };
                    reserved.insert(slug.clone());
                    slugs.insert(id, slug);
                    updates.insert(id, import);
                }
                None => {
                    if repo.find_any(id).await?.is_some_and(|c| c.is_deleted()) {
                        return Err(ServiceError::ValidationError(format!(
                            "Category {} was deleted and cannot be imported again",
                            id
                        )));
                    }
                    let slug = self
                        .resolve_slug(&repo, import.slug.as_deref(), &import.name, None, &reserved)
                        .await?;
                    reserved.insert(slug.clone());
                    slugs.insert(id, slug);
                    flat.push(FlatNode {
                        id,
                        parent_id: import.parent_id,
                        sort_order: import.sort_order,
                    });
                    inserts.insert(id, import);
                }
            }
        }

        // Cycles and dangling parents are rejected here, before any write.
        let numbered = number_forest(&flat)?;
        if let Some(max_depth) = self.config.max_depth {
            if let Some(deepest) = numbered.iter().map(|n| n.level).max() {
                self.check_depth_limit(deepest, max_depth)?;
            }
        }

        let mut paths: HashMap<Uuid, String> = HashMap::with_capacity(numbered.len());
        let mut summary = RebuildSummary {
            nodes: numbered.len(),
            ..Default::default()
        };
        let now = Utc::now();

        for node in &numbered {
            let slug = slugs
                .remove(&node.id)
                .ok_or_else(|| ServiceError::category_not_found(node.id))?;
            let parent_path = node
                .parent_id
                .and_then(|p| paths.get(&p))
                .map(String::as_str);
            let path = build_path(parent_path, &slug);

            if let Some(import) = inserts.remove(&node.id) {
                let row = new_row_from_import(node.id, slug, import);
                repo.insert_node(row, node.left, node.right, node.level, path.clone(), now)
                    .await
                    .map_err(ServiceError::from_write)?;
                summary.created += 1;
            } else if let Some(&idx) = live_by_id.get(&node.id) {
                let current = &live[idx];
                match updates.remove(&node.id) {
                    Some(import) => {
                        let mut active: CategoryActiveModel = current.clone().into();
                        active.name = Set(import.name.trim().to_string());
                        active.slug = Set(slug);
                        active.description = Set(import.description);
                        active.parent_id = Set(node.parent_id);
                        active.left = Set(node.left);
                        active.right = Set(node.right);
                        active.level = Set(node.level);
                        active.path = Set(path.clone());
                        active.sort_order = Set(import.sort_order);
                        active.is_visible = Set(import.is_visible);
                        active.show_in_menu = Set(import.show_in_menu);
                        active.is_featured = Set(import.is_featured);
                        active.meta_title = Set(import.meta_title);
                        active.meta_description = Set(import.meta_description);
                        active.version = Set(current.version + 1);
                        active.updated_at = Set(now);
                        repo.update(active).await.map_err(ServiceError::from_write)?;
                        summary.updated += 1;
                    }
                    None => repo.apply_numbering(current, node, &path, now).await?,
                }
            }

            paths.insert(node.id, path);
        }

        Ok(summary)
    }

    // ==================== Helpers ====================

    /// Slugifies the requested slug (or the name when none is given) and
    /// appends the first free numeric suffix. `own` is the slug the row
    /// already holds, which it may keep. `reserved` holds slugs claimed
    /// earlier in the same operation.
    async fn resolve_slug<C: ConnectionTrait>(
        &self,
        repo: &CategoryRepository<'_, C>,
        requested: Option<&str>,
        name: &str,
        own: Option<&str>,
        reserved: &HashSet<String>,
    ) -> Result<String, ServiceError> {
        let base = match requested {
            Some(requested) => {
                let candidate = slugify(requested);
                if candidate.is_empty() {
                    return Err(ServiceError::ValidationError(format!(
                        "Slug '{}' contains no usable characters",
                        requested
                    )));
                }
                candidate
            }
            None => slugify_or_fallback(name),
        };

        let taken = repo.slugs_like(&base).await?;
        unique_slug(
            &base,
            |slug| (taken.contains(slug) && Some(slug) != own) || reserved.contains(slug),
            self.config.max_slug_attempts,
        )
    }

    fn check_depth(&self, level: i32) -> Result<(), ServiceError> {
        match self.config.max_depth {
            Some(max_depth) => self.check_depth_limit(level, max_depth),
            None => Ok(()),
        }
    }

    fn check_depth_limit(&self, level: i32, max_depth: i32) -> Result<(), ServiceError> {
        if level > max_depth {
            return Err(ServiceError::ValidationError(format!(
                "Category depth {} exceeds the maximum of {}",
                level, max_depth
            )));
        }
        Ok(())
    }
}

fn next_sort_order(max_sibling: Option<i32>) -> i32 {
    max_sibling.map(|max| max + 1).unwrap_or(0)
}

fn new_row_from_import(id: Uuid, slug: String, import: ImportCategory) -> NewCategoryRow {
    NewCategoryRow {
        id,
        name: import.name.trim().to_string(),
        slug,
        description: import.description,
        parent_id: import.parent_id,
        sort_order: import.sort_order,
        is_visible: import.is_visible,
        show_in_menu: import.show_in_menu,
        is_featured: import.is_featured,
        meta_title: import.meta_title,
        meta_description: import.meta_description,
    }
}

/// Builds the nested view from rows ordered by `left`. A row belongs to the
/// closest still-open row whose range encloses it.
fn assemble_tree(rows: Vec<CategoryModel>) -> Vec<CategoryTreeNode> {
    fn attach(
        open: &mut Vec<CategoryTreeNode>,
        roots: &mut Vec<CategoryTreeNode>,
        node: CategoryTreeNode,
    ) {
        match open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    let mut roots = Vec::new();
    let mut open: Vec<CategoryTreeNode> = Vec::new();
    for row in rows {
        while open
            .last()
            .map_or(false, |top| top.category.right < row.left)
        {
            if let Some(done) = open.pop() {
                attach(&mut open, &mut roots, done);
            }
        }
        open.push(CategoryTreeNode::leaf(row));
    }
    while let Some(done) = open.pop() {
        attach(&mut open, &mut roots, done);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(slug: &str, left: i32, right: i32, level: i32) -> CategoryModel {
        let now = Utc::now();
        CategoryModel {
            id: Uuid::new_v4(),
            name: slug.to_string(),
            slug: slug.to_string(),
            description: None,
            parent_id: None,
            left,
            right,
            level,
            path: slug.to_string(),
            sort_order: 0,
            is_visible: true,
            show_in_menu: true,
            is_featured: false,
            meta_title: None,
            meta_description: None,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn assembles_nested_view_in_tree_order() {
        // electronics(1,8){phones(2,5){android(3,4)}, laptops(6,7)}, books(9,10)
        let rows = vec![
            model("electronics", 1, 8, 0),
            model("phones", 2, 5, 1),
            model("android", 3, 4, 2),
            model("laptops", 6, 7, 1),
            model("books", 9, 10, 0),
        ];
        let tree = assemble_tree(rows);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.slug, "electronics");
        assert_eq!(tree[0].size(), 4);
        let children: Vec<&str> = tree[0]
            .children
            .iter()
            .map(|c| c.category.slug.as_str())
            .collect();
        assert_eq!(children, vec!["phones", "laptops"]);
        assert_eq!(tree[0].children[0].children[0].category.slug, "android");
        assert_eq!(tree[1].category.slug, "books");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn assembles_subtree_with_gaps() {
        // Soft-deleted rows leave holes between live ranges.
        let rows = vec![model("root", 1, 12, 0), model("kept", 6, 7, 1)];
        let tree = assemble_tree(rows);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
    }

    #[test]
    fn empty_input_gives_empty_forest() {
        assert!(assemble_tree(Vec::new()).is_empty());
    }

    #[test]
    fn sort_order_appends_after_siblings() {
        assert_eq!(next_sort_order(None), 0);
        assert_eq!(next_sort_order(Some(4)), 5);
    }
}
