pub mod catalog;
pub mod path;

pub use catalog::{AutonCatalog, CatalogEntry};
pub use path::{NodeAction, NodeList, PathNode};
