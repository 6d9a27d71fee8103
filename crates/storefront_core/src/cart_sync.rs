//! crates/storefront_core/src/cart_sync.rs
//!
//! The cart synchronization service.
//!
//! Holds the signed-in user's cart in memory, mirrors it to one record per user
//! in the document store, and tells observers about every change. Mutations are
//! applied and announced synchronously; the matching store writes run later on a
//! per-service sync worker, in the order they were issued.

use futures::{FutureExt, StreamExt};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{Cart, Identity, ItemError, LineItem, Order};
use crate::error::{CartResult, InvalidOperation};
use crate::ports::{DocumentStore, IdentitySource, IdentityStream};
use crate::record::{decode_cart_record, encode_cart_record, encode_order_record};

//=========================================================================================
// Options and Notifications
//=========================================================================================

/// Store layout and buffering for a `CartSyncService`.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Collection holding one cart record per user, keyed by user id.
    pub carts_collection: String,
    /// Append-only collection of orders.
    pub orders_collection: String,
    /// How many change notifications a slow observer may fall behind by.
    pub change_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            carts_collection: "carts".to_string(),
            orders_collection: "orders".to_string(),
            change_capacity: 64,
        }
    }
}

/// Sent to observers after every cart change. Carries no data: observers read
/// the current state back through the service accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartChanged;

//=========================================================================================
// Shared State
//=========================================================================================

#[derive(Debug, Clone)]
enum CartOp {
    Add(LineItem),
    Remove(String),
    Decrement(String),
    Clear,
}

impl CartOp {
    /// Only additions can grow a cart, and a cart without an owner stays empty.
    fn needs_identity(&self) -> bool {
        matches!(self, CartOp::Add(_))
    }

    /// Applies the op, returning whether the cart changed.
    fn apply(&self, cart: &mut Cart) -> Result<bool, ItemError> {
        match self {
            CartOp::Add(item) => cart.add(item.clone()).map(|()| true),
            CartOp::Remove(id) => Ok(cart.remove(id)),
            CartOp::Decrement(id) => Ok(cart.decrement(id)),
            CartOp::Clear => {
                let changed = !cart.is_empty();
                cart.clear();
                Ok(changed)
            }
        }
    }
}

#[derive(Debug, Default)]
struct CartState {
    cart: Cart,
    identity: Option<Identity>,
    /// Bumped on every identity switch; tags fetches so stale ones are dropped.
    generation: u64,
    /// `Some` while the fetch for the current identity is in flight. Holds the
    /// edits made meanwhile, to be replayed on top of the fetched cart.
    loading: Option<Vec<CartOp>>,
}

struct Shared {
    state: Mutex<CartState>,
    changes: broadcast::Sender<CartChanged>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        // No receivers is fine.
        let _ = self.changes.send(CartChanged);
    }
}

enum SyncJob {
    Fetch { identity: Identity, generation: u64 },
    Persist { identity: Identity, items: Vec<LineItem> },
    Flush(oneshot::Sender<()>),
}

/// What the identity listener and the service share: the state and the queue
/// into the sync worker.
#[derive(Clone)]
struct SyncHandle {
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<SyncJob>,
}

impl SyncHandle {
    fn enqueue(&self, job: SyncJob) {
        if self.jobs.send(job).is_err() {
            warn!("Cart sync worker has stopped; dropping sync job.");
        }
    }

    fn on_identity_changed(&self, identity: Option<Identity>) {
        {
            let mut state = self.shared.lock();
            let same = state.identity == identity;
            if same && identity.is_none() {
                return;
            }
            state.generation += 1;
            if !same {
                state.cart.clear();
                state.identity = identity.clone();
            }
            match identity {
                None => {
                    info!("Signed out; cart cleared.");
                    state.loading = None;
                }
                Some(identity) => {
                    if same {
                        // The cart stays; edits recorded for a fetch in flight
                        // carry over to the new one.
                        info!(user_id = %identity, "Signed in again; reloading stored cart.");
                        state.loading.get_or_insert_with(Vec::new);
                    } else {
                        info!(user_id = %identity, "Signed in; loading stored cart.");
                        state.loading = Some(Vec::new());
                    }
                    // Queued under the lock so it stays ordered with cart writes.
                    self.enqueue(SyncJob::Fetch {
                        identity,
                        generation: state.generation,
                    });
                }
            }
        }
        self.shared.notify();
    }

    /// Applies `op`, notifies, and queues a write of the whole cart when an
    /// identity is set and no fetch is pending. A refused op leaves the cart,
    /// the observers and the store untouched.
    fn mutate(&self, op: CartOp) -> CartResult<()> {
        {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            if op.needs_identity() && state.identity.is_none() {
                return Err(InvalidOperation::IdentityAbsent.into());
            }
            // Clearing is announced and written even when nothing changed.
            let announce = op.apply(&mut state.cart)? || matches!(op, CartOp::Clear);
            match (&state.identity, &mut state.loading) {
                // Replayed onto the fetched cart, even when it was a no-op here.
                (Some(_), Some(pending)) => pending.push(op),
                // Queued under the lock so concurrent writers reach the store in
                // the same order their edits were applied.
                (Some(identity), None) if announce => self.enqueue(SyncJob::Persist {
                    identity: identity.clone(),
                    items: state.cart.items().to_vec(),
                }),
                _ => {}
            }
            if !announce {
                return Ok(());
            }
        }
        self.shared.notify();
        Ok(())
    }
}

//=========================================================================================
// The Sync Worker
//=========================================================================================

/// Executes cart-record reads and writes strictly in the order they were queued,
/// so a later write never lands before an earlier one and a fetch sees every
/// write queued ahead of it.
struct SyncWorker {
    shared: Arc<Shared>,
    store: Arc<dyn DocumentStore>,
    carts_collection: String,
}

impl SyncWorker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<SyncJob>) {
        while let Some(job) = jobs.recv().await {
            match job {
                SyncJob::Fetch {
                    identity,
                    generation,
                } => self.fetch(identity, generation).await,
                SyncJob::Persist { identity, items } => self.persist(&identity, &items).await,
                SyncJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Cart sync worker stopped.");
    }

    async fn fetch(&self, identity: Identity, generation: u64) {
        // Any failure here degrades to an empty cart; callers never see it.
        let items = match self.store.get(&self.carts_collection, &identity.user_id).await {
            Ok(None) => {
                debug!(user_id = %identity, "No stored cart; starting empty.");
                Vec::new()
            }
            Ok(Some(record)) => match decode_cart_record(Some(&record)) {
                Ok(items) => items,
                Err(e) => {
                    warn!(user_id = %identity, error = %e, "Stored cart is unreadable; starting empty.");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(user_id = %identity, error = %e, "Failed to fetch stored cart; starting empty.");
                Vec::new()
            }
        };
        let mut cart = Cart::from_items(items).unwrap_or_else(|e| {
            warn!(user_id = %identity, error = %e, "Stored cart is unusable; starting empty.");
            Cart::new()
        });

        let persist = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            if state.generation != generation || state.identity.as_ref() != Some(&identity) {
                debug!(user_id = %identity, "Discarding stale cart fetch.");
                return;
            }
            let replay = state.loading.take().unwrap_or_default();
            for op in &replay {
                if let Err(e) = op.apply(&mut cart) {
                    warn!(user_id = %identity, error = %e, "Dropping edit that does not fit the stored cart.");
                }
            }
            state.cart = cart;
            (!replay.is_empty()).then(|| state.cart.items().to_vec())
        };

        self.shared.notify();
        if let Some(items) = persist {
            self.persist(&identity, &items).await;
        }
    }

    async fn persist(&self, identity: &Identity, items: &[LineItem]) {
        let record = match encode_cart_record(items) {
            Ok(record) => record,
            Err(e) => {
                error!(user_id = %identity, error = %e, "Failed to encode cart record.");
                return;
            }
        };
        match self
            .store
            .set(&self.carts_collection, &identity.user_id, record)
            .await
        {
            Ok(()) => debug!(user_id = %identity, items = items.len(), "Cart persisted."),
            Err(e) => error!(user_id = %identity, error = %e, "Failed to persist cart."),
        }
    }
}

async fn listen_for_identity(
    handle: SyncHandle,
    mut identities: IdentityStream,
    subscription: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = subscription.cancelled() => break,
            next = identities.next() => match next {
                Some(identity) => handle.on_identity_changed(identity),
                None => {
                    debug!("Identity stream ended.");
                    break;
                }
            },
        }
    }
}

//=========================================================================================
// The Service
//=========================================================================================

/// Keeps the current user's cart in memory and in sync with the document store.
///
/// Must be created inside a Tokio runtime: construction subscribes to the
/// identity source and spawns the identity listener and the sync worker.
pub struct CartSyncService {
    handle: SyncHandle,
    store: Arc<dyn DocumentStore>,
    options: SyncOptions,
    subscription: CancellationToken,
}

impl CartSyncService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity_source: &dyn IdentitySource,
        options: SyncOptions,
    ) -> Self {
        let (changes, _) = broadcast::channel(options.change_capacity.max(1));
        let shared = Arc::new(Shared {
            state: Mutex::new(CartState::default()),
            changes,
        });

        let (jobs, job_rx) = mpsc::unbounded_channel();
        let worker = SyncWorker {
            shared: shared.clone(),
            store: store.clone(),
            carts_collection: options.carts_collection.clone(),
        };
        tokio::spawn(worker.run(job_rx));

        let handle = SyncHandle { shared, jobs };

        // Apply the identity that is current right now, if the source already
        // has it, so the service starts out signed in.
        let mut identities = identity_source.subscribe();
        if let Some(Some(initial)) = identities.next().now_or_never() {
            handle.on_identity_changed(initial);
        }

        let subscription = CancellationToken::new();
        tokio::spawn(listen_for_identity(
            handle.clone(),
            identities,
            subscription.clone(),
        ));

        Self {
            handle,
            store,
            options,
            subscription,
        }
    }

    /// Registers an observer. Every cart change sends one `CartChanged`.
    pub fn subscribe(&self) -> broadcast::Receiver<CartChanged> {
        self.handle.shared.changes.subscribe()
    }

    /// Reacts to a sign-in (`Some`) or sign-out (`None`).
    ///
    /// Normally driven by the identity source; exposed for callers that manage
    /// identity themselves.
    pub fn on_identity_changed(&self, identity: Option<Identity>) {
        self.handle.on_identity_changed(identity);
    }

    /// Adds `quantity` of a product, merging into an existing line with the same id.
    pub fn add_item(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
    ) -> CartResult<()> {
        let item = LineItem::new(id, name, unit_price, quantity);
        item.validate()?;
        self.handle.mutate(CartOp::Add(item))
    }

    /// Removes the line with `id`. Unknown ids are ignored.
    pub fn remove_item(&self, id: &str) {
        let _ = self.handle.mutate(CartOp::Remove(id.to_string()));
    }

    /// Lowers the quantity of `id` by one, removing the line instead of going below 1.
    pub fn decrement_item(&self, id: &str) {
        let _ = self.handle.mutate(CartOp::Decrement(id.to_string()));
    }

    /// Empties the cart. The stored record is overwritten on a best-effort basis.
    pub fn clear_cart(&self) {
        let _ = self.handle.mutate(CartOp::Clear);
    }

    /// Submits the current cart as a pending order and returns the order key.
    ///
    /// The cart itself is left as it is.
    pub async fn place_order(&self) -> CartResult<String> {
        let order = {
            let state = self.handle.shared.lock();
            let identity = state
                .identity
                .as_ref()
                .ok_or(InvalidOperation::IdentityAbsent)?;
            if state.loading.is_some() {
                return Err(InvalidOperation::CartLoading.into());
            }
            if state.cart.is_empty() {
                return Err(InvalidOperation::CartEmpty.into());
            }
            Order::pending(identity, &state.cart)
        };

        let record = encode_order_record(&order)?;
        let order_id = self
            .store
            .add(&self.options.orders_collection, record)
            .await
            .map_err(|e| {
                error!(user_id = %order.user_id, error = %e, "Failed to place order.");
                e
            })?;

        info!(
            user_id = %order.user_id,
            order_id = %order_id,
            item_count = order.item_count,
            total = %order.total_price,
            "Order placed."
        );
        Ok(order_id)
    }

    /// Resolves once every sync job queued before this call has run.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.handle.enqueue(SyncJob::Flush(done));
        let _ = wait.await;
    }

    /// Stops listening to the identity source. Safe to call more than once.
    pub fn dispose(&self) {
        if !self.subscription.is_cancelled() {
            debug!("Releasing identity subscription.");
            self.subscription.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.is_cancelled()
    }

    pub fn items(&self) -> Vec<LineItem> {
        self.handle.shared.lock().cart.items().to_vec()
    }

    pub fn item_count(&self) -> u64 {
        self.handle.shared.lock().cart.item_count()
    }

    pub fn total_price(&self) -> Decimal {
        self.handle.shared.lock().cart.total_price()
    }

    pub fn snapshot(&self) -> Cart {
        self.handle.shared.lock().cart.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.handle.shared.lock().identity.clone()
    }

    /// Whether the stored cart for the current identity is still being fetched.
    pub fn is_loading(&self) -> bool {
        self.handle.shared.lock().loading.is_some()
    }
}

impl Drop for CartSyncService {
    fn drop(&mut self) {
        self.dispose();
    }
}
