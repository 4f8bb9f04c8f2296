// Category tree engine
pub mod category_tree;

// Slug and materialized path helpers
pub mod slug;

pub use category_tree::CategoryTreeService;
