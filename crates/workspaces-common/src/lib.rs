pub mod errors;
pub mod id;

pub use errors::{ConfigError, WorkspaceError};
pub use id::{new_id, new_salt};

pub type Result<T> = std::result::Result<T, WorkspaceError>;
