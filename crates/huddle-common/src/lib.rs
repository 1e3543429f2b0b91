pub mod errors;
pub mod id;

pub use errors::{ConfigError, DeviceError, HuddleError};
pub use id::new_user_id;

pub type Result<T> = std::result::Result<T, HuddleError>;
