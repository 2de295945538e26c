mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use schema::{CATALOG_TABLES, MIRROR_VERSIONED_SCHEMAS};
pub use store::{count_catalog_rows, SqliteMirrorStore};
pub use trait_def::{CatalogWriter, MirrorStore};
