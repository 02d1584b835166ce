//! Dataset loading and conversion

mod dataset;
mod loader;

pub use dataset::{columns_to_array, Dataset};
pub use loader::{load_csv, DataLoader};
