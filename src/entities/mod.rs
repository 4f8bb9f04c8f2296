pub mod category;

pub use category::{Entity as Category, Model as CategoryModel};
