pub mod error;
pub mod text;
pub mod model;
pub mod store;
pub mod pagination;
pub mod view;
pub mod ingest;

pub use error::{FlagAtlasError, Result};
pub use model::{Country, CountryFields, Flag, FlagCategory, FlagFields, Region, RegionFields};
pub use store::Store;
