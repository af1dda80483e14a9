pub mod memory;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use memory::MemoryStore;
pub use store::{PgStore, Store};
