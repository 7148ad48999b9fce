// Source loaders for fiscal reconciliation: NF-e XML, CSV and Excel exports
// into the engine's raw rows. Values are passed through as found; all
// normalization happens in the engine.

pub mod csv;
pub mod error;
pub mod load;
pub mod nfe;
pub mod table;
pub mod xlsx;

pub use error::IoError;
pub use load::{load_canonical, load_source, LoadWarning, Loaded};
