pub mod error;
pub mod io;
pub mod layout;
pub mod migrate;
pub mod model;
pub mod path;
pub mod reconcile;
pub mod schema;
pub mod settings;
pub mod sheets;
pub mod store;
pub mod sync;

pub use error::{Result, ToolError};
