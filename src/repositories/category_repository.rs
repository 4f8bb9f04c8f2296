use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, BinOper, Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::entities::category::{
    ActiveModel as CategoryActiveModel, Column, Entity as Category, Model as CategoryModel,
};
use crate::errors::ServiceError;
use crate::tree::{Bounds, NumberedNode};

/// Which nested-set boundary column a range shift applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryField {
    Left,
    Right,
}

impl BoundaryField {
    fn column(self) -> Column {
        match self {
            BoundaryField::Left => Column::Left,
            BoundaryField::Right => Column::Right,
        }
    }
}

/// Caller-owned fields of a category about to be inserted.
#[derive(Debug, Clone)]
pub struct NewCategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    pub is_visible: bool,
    pub show_in_menu: bool,
    pub is_featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// Range-based reads and writes against the `categories` table.
///
/// Borrow it over a `DatabaseTransaction` for anything that mutates
/// boundaries; every write here assumes the caller holds the tree lock.
#[derive(Debug)]
pub struct CategoryRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> CategoryRepository<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    fn live() -> Select<Category> {
        Category::find().filter(Column::DeletedAt.is_null())
    }

    // ==================== Reads ====================

    pub async fn find_live(&self, id: Uuid) -> Result<Option<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::Id.eq(id))
            .one(self.conn)
            .await
    }

    /// Any row with this id, soft-deleted or not.
    pub async fn find_any(&self, id: Uuid) -> Result<Option<CategoryModel>, DbErr> {
        Category::find_by_id(id).one(self.conn).await
    }

    /// Loads a live node or fails with `NotFound`; soft-deleted rows count as missing.
    pub async fn require_live(&self, id: Uuid) -> Result<CategoryModel, ServiceError> {
        self.find_live(id)
            .await?
            .ok_or_else(|| ServiceError::category_not_found(id))
    }

    pub async fn find_live_by_slug(&self, slug: &str) -> Result<Option<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::Slug.eq(slug))
            .one(self.conn)
            .await
    }

    pub async fn find_live_by_path(&self, path: &str) -> Result<Option<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::Path.eq(path))
            .one(self.conn)
            .await
    }

    /// Slugs equal to `base` or of the form `base-*`, soft-deleted rows included.
    pub async fn slugs_like(&self, base: &str) -> Result<HashSet<String>, DbErr> {
        let slugs: Vec<String> = Category::find()
            .select_only()
            .column(Column::Slug)
            .filter(
                Condition::any()
                    .add(Column::Slug.eq(base))
                    .add(Column::Slug.starts_with(format!("{}-", base))),
            )
            .into_tuple()
            .all(self.conn)
            .await?;
        Ok(slugs.into_iter().collect())
    }

    /// Largest live `right`, 0 for an empty forest.
    pub async fn max_right(&self) -> Result<i32, DbErr> {
        let max: Option<Option<i32>> = Self::live()
            .select_only()
            .column_as(Column::Right.max(), "max_right")
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(max.flatten().unwrap_or(0))
    }

    pub async fn max_sibling_sort_order(
        &self,
        parent_id: Option<Uuid>,
    ) -> Result<Option<i32>, DbErr> {
        let parent_filter = match parent_id {
            Some(id) => Column::ParentId.eq(id),
            None => Column::ParentId.is_null(),
        };
        let max: Option<Option<i32>> = Self::live()
            .filter(parent_filter)
            .select_only()
            .column_as(Column::SortOrder.max(), "max_sort_order")
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(max.flatten())
    }

    /// The node and all live descendants, in pre-order.
    pub async fn subtree(&self, node: Bounds) -> Result<Vec<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::Left.between(node.left, node.right))
            .order_by_asc(Column::Left)
            .all(self.conn)
            .await
    }

    /// Every live node whose range strictly encloses `node`, root first.
    pub async fn ancestors(&self, node: Bounds) -> Result<Vec<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::Left.lt(node.left))
            .filter(Column::Right.gt(node.right))
            .order_by_asc(Column::Left)
            .all(self.conn)
            .await
    }

    pub async fn children(&self, node: Bounds, level: i32) -> Result<Vec<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::Left.gt(node.left))
            .filter(Column::Left.lt(node.right))
            .filter(Column::Level.eq(level + 1))
            .order_by_asc(Column::Left)
            .all(self.conn)
            .await
    }

    pub async fn count_descendants(&self, node: Bounds) -> Result<u64, DbErr> {
        Self::live()
            .filter(Column::Left.gt(node.left))
            .filter(Column::Left.lt(node.right))
            .count(self.conn)
            .await
    }

    pub async fn roots(&self) -> Result<Vec<CategoryModel>, DbErr> {
        Self::live()
            .filter(Column::ParentId.is_null())
            .order_by_asc(Column::Left)
            .all(self.conn)
            .await
    }

    /// Every live row ordered by `left`.
    pub async fn load_live_forest(&self) -> Result<Vec<CategoryModel>, DbErr> {
        Self::live().order_by_asc(Column::Left).all(self.conn).await
    }

    // ==================== Boundary writes ====================

    /// Adds `delta` to `field` on every live row where `field >= threshold`.
    pub async fn shift_range(
        &self,
        field: BoundaryField,
        threshold: i32,
        delta: i32,
    ) -> Result<u64, DbErr> {
        let column = field.column();
        let result = Category::update_many()
            .col_expr(column, Expr::col(column).add(delta))
            .filter(column.gte(threshold))
            .filter(Column::DeletedAt.is_null())
            .exec(self.conn)
            .await?;
        debug!(?field, threshold, delta, rows = result.rows_affected, "Shifted boundaries");
        Ok(result.rows_affected)
    }

    /// Shifts both boundary columns from `threshold` on.
    pub async fn shift_boundaries(&self, threshold: i32, delta: i32) -> Result<(), DbErr> {
        self.shift_range(BoundaryField::Left, threshold, delta).await?;
        self.shift_range(BoundaryField::Right, threshold, delta).await?;
        Ok(())
    }

    /// Moves every live row with `left` in `range` by `delta` without touching
    /// anything else. Used to park a subtree outside the positive integer space.
    pub async fn translate_range(&self, range: Bounds, delta: i32) -> Result<u64, DbErr> {
        let result = Category::update_many()
            .col_expr(Column::Left, Expr::col(Column::Left).add(delta))
            .col_expr(Column::Right, Expr::col(Column::Right).add(delta))
            .filter(Column::Left.between(range.left, range.right))
            .filter(Column::DeletedAt.is_null())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Inserts a row at the given coordinates with `version = 1`.
    pub async fn insert_node(
        &self,
        row: NewCategoryRow,
        left: i32,
        right: i32,
        level: i32,
        path: String,
        now: DateTime<Utc>,
    ) -> Result<CategoryModel, DbErr> {
        CategoryActiveModel {
            id: Set(row.id),
            name: Set(row.name),
            slug: Set(row.slug),
            description: Set(row.description),
            parent_id: Set(row.parent_id),
            left: Set(left),
            right: Set(right),
            level: Set(level),
            path: Set(path),
            sort_order: Set(row.sort_order),
            is_visible: Set(row.is_visible),
            show_in_menu: Set(row.show_in_menu),
            is_featured: Set(row.is_featured),
            meta_title: Set(row.meta_title),
            meta_description: Set(row.meta_description),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(self.conn)
        .await
    }

    /// Translates every live row with `left` in `range`, adjusts its level,
    /// swaps the `old_prefix` of its path for `new_prefix` and bumps its version.
    pub async fn relocate_subtree(
        &self,
        range: Bounds,
        translation: i32,
        level_delta: i32,
        old_prefix: &str,
        new_prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = Category::update_many()
            .col_expr(Column::Left, Expr::col(Column::Left).add(translation))
            .col_expr(Column::Right, Expr::col(Column::Right).add(translation))
            .col_expr(Column::Level, Expr::col(Column::Level).add(level_delta))
            .col_expr(Column::Path, rebased_path(old_prefix, new_prefix))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Left.between(range.left, range.right))
            .filter(Column::DeletedAt.is_null())
            .exec(self.conn)
            .await?;
        debug!(
            ?range,
            translation,
            level_delta,
            rows = result.rows_affected,
            "Relocated subtree"
        );
        Ok(result.rows_affected)
    }

    /// Rewrites the path prefix of the strict descendants of `node`.
    pub async fn rewrite_descendant_paths(
        &self,
        node: Bounds,
        old_prefix: &str,
        new_prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = Category::update_many()
            .col_expr(Column::Path, rebased_path(old_prefix, new_prefix))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Left.gt(node.left))
            .filter(Column::Left.lt(node.right))
            .filter(Column::DeletedAt.is_null())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Marks the node and every live descendant deleted in one statement.
    /// Boundaries are left as they are.
    pub async fn soft_delete_subtree(
        &self,
        node: Bounds,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = Category::update_many()
            .col_expr(Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .filter(Column::Left.between(node.left, node.right))
            .filter(Column::DeletedAt.is_null())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Physically removes the node and its live descendants.
    pub async fn hard_delete_subtree(&self, node: Bounds) -> Result<u64, DbErr> {
        let result = Category::delete_many()
            .filter(Column::Left.between(node.left, node.right))
            .filter(Column::DeletedAt.is_null())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Physically removes every soft-deleted row.
    pub async fn purge_soft_deleted(&self) -> Result<u64, DbErr> {
        let result = Category::delete_many()
            .filter(Column::DeletedAt.is_not_null())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Sets `parent_id` and `sort_order` on a single row.
    pub async fn set_parent(
        &self,
        id: Uuid,
        parent_id: Option<Uuid>,
        sort_order: i32,
    ) -> Result<(), DbErr> {
        Category::update_many()
            .col_expr(Column::ParentId, Expr::value(parent_id))
            .col_expr(Column::SortOrder, Expr::value(sort_order))
            .filter(Column::Id.eq(id))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    /// Writes freshly numbered coordinates onto a row. Rows whose level, path
    /// or parent changed get a version bump; pure renumbering does not.
    pub async fn apply_numbering(
        &self,
        current: &CategoryModel,
        numbered: &NumberedNode,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        let structural_change = current.level != numbered.level
            || current.path != path
            || current.parent_id != numbered.parent_id;
        if !structural_change
            && current.left == numbered.left
            && current.right == numbered.right
        {
            return Ok(());
        }

        let mut update = Category::update_many()
            .col_expr(Column::Left, Expr::value(numbered.left))
            .col_expr(Column::Right, Expr::value(numbered.right))
            .col_expr(Column::Level, Expr::value(numbered.level))
            .col_expr(Column::Path, Expr::value(path.to_string()))
            .col_expr(Column::ParentId, Expr::value(numbered.parent_id));
        if structural_change {
            update = update
                .col_expr(Column::Version, Expr::col(Column::Version).add(1))
                .col_expr(Column::UpdatedAt, Expr::value(now));
        }
        update.filter(Column::Id.eq(current.id)).exec(self.conn).await?;
        Ok(())
    }

    pub async fn update(&self, model: CategoryActiveModel) -> Result<CategoryModel, DbErr> {
        model.update(self.conn).await
    }
}

/// `new_prefix || SUBSTR(path, len(old_prefix) + 1)`; both backends index
/// characters from 1.
fn rebased_path(old_prefix: &str, new_prefix: &str) -> SimpleExpr {
    let keep_from = old_prefix.chars().count() as i32 + 1;
    Expr::val(new_prefix.to_string()).binary(
        BinOper::Custom("||"),
        Func::cust(Alias::new("SUBSTR"))
            .arg(Expr::col(Column::Path))
            .arg(keep_from),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection, run_migrations};
    use sea_orm::DatabaseConnection;

    async fn setup() -> DatabaseConnection {
        let db = establish_connection("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        db
    }

    fn row(name: &str, parent_id: Option<Uuid>) -> NewCategoryRow {
        NewCategoryRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: None,
            parent_id,
            sort_order: 0,
            is_visible: true,
            show_in_menu: true,
            is_featured: false,
            meta_title: None,
            meta_description: None,
        }
    }

    #[tokio::test]
    async fn shift_range_only_touches_live_rows_at_or_after_threshold() {
        let db = setup().await;
        let repo = CategoryRepository::new(&db);
        let now = Utc::now();
        let a = repo
            .insert_node(row("A", None), 1, 2, 0, "a".into(), now)
            .await
            .unwrap();
        let b = repo
            .insert_node(row("B", None), 3, 4, 0, "b".into(), now)
            .await
            .unwrap();

        assert_eq!(repo.shift_range(BoundaryField::Left, 3, 2).await.unwrap(), 1);
        assert_eq!(repo.shift_range(BoundaryField::Right, 3, 2).await.unwrap(), 1);

        let a = repo.require_live(a.id).await.unwrap();
        let b = repo.require_live(b.id).await.unwrap();
        assert_eq!((a.left, a.right), (1, 2));
        assert_eq!((b.left, b.right), (5, 6));
        assert_eq!(b.version, 1);
        assert_eq!(repo.max_right().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn relocate_rewrites_paths_and_bumps_versions() {
        let db = setup().await;
        let repo = CategoryRepository::new(&db);
        let now = Utc::now();
        let root = repo
            .insert_node(row("Electronics", None), 1, 4, 0, "electronics".into(), now)
            .await
            .unwrap();
        let phones = repo
            .insert_node(
                row("Phones", Some(root.id)),
                2,
                3,
                1,
                "electronics/phones".into(),
                now,
            )
            .await
            .unwrap();

        let moved = repo
            .relocate_subtree(
                Bounds { left: 2, right: 3 },
                3,
                -1,
                "electronics/phones",
                "phones",
                now,
            )
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let phones = repo.require_live(phones.id).await.unwrap();
        assert_eq!((phones.left, phones.right, phones.level), (5, 6, 0));
        assert_eq!(phones.path, "phones");
        assert_eq!(phones.version, 2);
    }

    #[tokio::test]
    async fn soft_delete_hides_rows_and_keeps_slugs_reserved() {
        let db = setup().await;
        let repo = CategoryRepository::new(&db);
        let now = Utc::now();
        let root = repo
            .insert_node(row("Books", None), 1, 4, 0, "books".into(), now)
            .await
            .unwrap();
        repo.insert_node(row("Books-2", Some(root.id)), 2, 3, 1, "books/books-2".into(), now)
            .await
            .unwrap();

        assert_eq!(repo.soft_delete_subtree(root.bounds(), now).await.unwrap(), 2);
        assert!(repo.find_live(root.id).await.unwrap().is_none());
        assert_eq!(repo.max_right().await.unwrap(), 0);

        let taken = repo.slugs_like("books").await.unwrap();
        assert!(taken.contains("books"));
        assert!(taken.contains("books-2"));

        assert_eq!(repo.purge_soft_deleted().await.unwrap(), 2);
        assert!(repo.slugs_like("books").await.unwrap().is_empty());
    }
}
