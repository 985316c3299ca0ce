pub mod catalogue;
pub mod csv_catalogue;

pub use catalogue::{CatalogueEntry, ProductCatalogue};
