//! TOML config loading.

mod loader;
mod template;


pub use loader::{config_path, load_default, load_from_path, load_or_create};
