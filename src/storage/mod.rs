//! Storage lifecycle and queries.

mod casc_storage;

pub use casc_storage::{CascStorage, InfoClass};
