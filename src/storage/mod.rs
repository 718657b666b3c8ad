pub mod gateway;
pub mod models;
pub mod queries;
pub mod sqlite;

pub use gateway::RecordStore;
pub use sqlite::Database;
