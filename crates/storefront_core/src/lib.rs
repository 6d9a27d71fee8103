pub mod cart_sync;
pub mod domain;
pub mod error;
pub mod ports;
pub mod record;

pub use cart_sync::{CartChanged, CartSyncService, SyncOptions};
pub use domain::{Cart, Identity, ItemError, LineItem, Order, OrderStatus};
pub use error::{CartError, CartResult, InvalidOperation};
pub use ports::{DocumentStore, IdentitySource, IdentityStream, PortError, PortResult, Record};
