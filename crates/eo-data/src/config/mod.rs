//! Configuration of catalogue loading and dataset files

pub mod catalogue_options;
pub mod dataset_file;

pub use catalogue_options::*;
pub use dataset_file::*;
