mod error;
mod paths;
mod schema;
mod store;

pub use error::WorkspaceStoreError;
pub use paths::{snapshot_file_name, store_root, EXEC_LOG_FILE};
pub use schema::ExecRecord;
pub use store::WorkspaceStore;
