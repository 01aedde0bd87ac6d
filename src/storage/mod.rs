//! Collaborator implementations backing the identity engine.

mod file;
mod memory;
mod postgres;

pub use file::FilePendingRoleStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;
