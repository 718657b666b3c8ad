//! Narrow collaborators standing in for the host platform: the content store
//! and the course-module deletion routines.

pub mod content;
pub mod modules;

pub use content::{ContentStore, FileDirStore};
pub use modules::{purge_module_data, DatabasePlatform, ModuleDeletedEvent, ModuleDeleter, ModuleHooks};
