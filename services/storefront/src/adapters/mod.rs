pub mod db;
pub mod identity;
pub mod memory;

pub use db::PgDocumentStore;
pub use identity::SessionIdentity;
pub use memory::InMemoryDocumentStore;
