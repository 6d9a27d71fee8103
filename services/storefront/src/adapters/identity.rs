//! services/storefront/src/adapters/identity.rs
//!
//! An `IdentitySource` fed by explicit sign-in and sign-out calls, backed by a
//! `tokio::sync::watch` channel. The gateway keeps one per connection.

use futures::{future, stream, StreamExt};
use storefront_core::domain::Identity;
use storefront_core::ports::{IdentitySource, IdentityStream};
use tokio::sync::watch;

pub struct SessionIdentity {
    sender: watch::Sender<Option<Identity>>,
}

impl SessionIdentity {
    /// Creates a signed-out identity source.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.sender.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }

    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for SessionIdentity {
    /// Yields the current identity, then each later change. Rapid changes may
    /// collapse into the latest one. Ends when the `SessionIdentity` is dropped.
    fn subscribe(&self) -> IdentityStream {
        let mut receiver = self.sender.subscribe();
        let current = receiver.borrow_and_update().clone();
        let changes = stream::unfold(receiver, |mut receiver| async move {
            receiver.changed().await.ok()?;
            let identity = receiver.borrow_and_update().clone();
            Some((identity, receiver))
        });
        Box::pin(stream::once(future::ready(current)).chain(changes))
    }
}
