//! Cart manager.
//!
//! Owns the tab's view of the cart. Mutations are applied locally first,
//! then confirmed or rolled back when the backend answers. The current
//! snapshot is published on a `tokio::sync::watch` channel.
//!
//! # Ordering
//!
//! Every mutation and refresh takes a sequence number from one counter.
//! Per product the manager tracks:
//!
//! - `latest_op`: the newest local mutation of that line
//! - `applied`: the newest server snapshot whose value for that line was
//!   taken
//! - `pending`: unconfirmed mutations and the line as it was before each
//!
//! A server snapshot tagged `seq` replaces a line only if no newer local
//! mutation or snapshot has touched it and, for lines other than the one
//! the request itself targeted, nothing is still pending. So a late
//! confirmation for a superseded request never overwrites the newer state,
//! regardless of arrival order.
//!
//! Rollback restores the line exactly as it was before the failed
//! mutation. If a newer mutation of the same line is still pending, the
//! restore point is handed to that one instead. Once a server snapshot
//! newer than the failed mutation has been applied to the line, the
//! snapshot stands.

mod wire;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use ojas_core::{Cart, CartLine, Product, ProductId, Quantity, SyncState};

use crate::http::{ApiClient, ApiError, ApiErrorKind, ApiRequest, endpoints};
use crate::telemetry::add_breadcrumb;

/// A local change to one line.
enum Change<'a> {
    Add(&'a Product, Quantity),
    Set(Quantity),
    Remove,
}

/// Identifies a request's place in the ordering.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    seq: u64,
    epoch: u64,
}

/// The line as it was before a pending mutation.
#[derive(Debug, Clone)]
struct Prior {
    index: usize,
    line: Option<CartLine>,
}

#[derive(Debug, Default)]
struct LineLedger {
    latest_op: u64,
    applied: u64,
    pending: BTreeMap<u64, Prior>,
}

#[derive(Debug, Default)]
struct CartBook {
    lines: Vec<CartLine>,
    ledger: HashMap<ProductId, LineLedger>,
    next_seq: u64,
    /// Bumped by `reset`; outcomes from an older epoch are dropped.
    epoch: u64,
    refreshing: usize,
    failed: bool,
}

impl CartBook {
    fn ticket(&mut self) -> Ticket {
        self.next_seq += 1;
        Ticket {
            seq: self.next_seq,
            epoch: self.epoch,
        }
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.lines.iter().position(|l| l.product_id == product_id)
    }

    fn sync_state(&self) -> SyncState {
        if self.ledger.values().any(|l| !l.pending.is_empty()) {
            SyncState::Stale
        } else if self.refreshing > 0 {
            SyncState::Syncing
        } else if self.failed {
            SyncState::Error
        } else {
            SyncState::Idle
        }
    }

    fn to_cart(&self) -> Cart {
        Cart {
            lines: self.lines.clone(),
            sync_state: self.sync_state(),
        }
    }

    fn apply(&mut self, product_id: ProductId, change: &Change<'_>) -> Ticket {
        let ticket = self.ticket();
        let index = self.position(product_id);
        let prior = Prior {
            index: index.unwrap_or(self.lines.len()),
            line: index.map(|i| self.lines[i].clone()),
        };

        match (change, index) {
            (Change::Add(_, quantity), Some(i)) => {
                let line = &mut self.lines[i];
                line.quantity = line.quantity.saturating_add(*quantity);
            }
            (Change::Add(product, quantity), None) => {
                self.lines.push(CartLine::from_product(product, *quantity));
            }
            (Change::Set(quantity), Some(i)) => self.lines[i].quantity = *quantity,
            (Change::Remove, Some(i)) => {
                self.lines.remove(i);
            }
            // Nothing local to change; the server snapshot decides.
            (Change::Set(_) | Change::Remove, None) => {}
        }

        let ledger = self.ledger.entry(product_id).or_default();
        ledger.latest_op = ticket.seq;
        ledger.pending.insert(ticket.seq, prior);
        ticket
    }

    fn restore(&mut self, product_id: ProductId, prior: Prior) {
        match (self.position(product_id), prior.line) {
            (Some(i), Some(line)) => self.lines[i] = line,
            (Some(i), None) => {
                self.lines.remove(i);
            }
            (None, Some(line)) => {
                let at = prior.index.min(self.lines.len());
                self.lines.insert(at, line);
            }
            (None, None) => {}
        }
    }

    fn rollback(&mut self, ticket: Ticket, product_id: ProductId) {
        if ticket.epoch != self.epoch {
            return;
        }
        self.failed = true;

        let restore = {
            let Some(ledger) = self.ledger.get_mut(&product_id) else {
                return;
            };
            let Some(prior) = ledger.pending.remove(&ticket.seq) else {
                return;
            };
            if let Some((_, newer)) = ledger.pending.range_mut(ticket.seq + 1..).next() {
                *newer = prior;
                None
            } else if ledger.applied < ticket.seq {
                // Nothing newer stands: later changes were rolled back too,
                // and no server snapshot has been taken for this line since.
                Some(prior)
            } else {
                None
            }
        };

        if let Some(prior) = restore {
            self.restore(product_id, prior);
        }
    }

    /// Whether the local value of a line outranks a snapshot tagged `seq`.
    fn keeps_local(&self, product_id: ProductId, seq: u64, own: Option<ProductId>) -> bool {
        self.ledger.get(&product_id).is_some_and(|ledger| {
            ledger.latest_op > seq
                || ledger.applied > seq
                || (own != Some(product_id) && !ledger.pending.is_empty())
        })
    }

    fn reconcile(&mut self, seq: u64, own: Option<ProductId>, server: Vec<CartLine>) {
        let mut merged = Vec::with_capacity(server.len().max(self.lines.len()));
        let mut from_server = Vec::new();
        let mut listed = HashSet::new();

        for line in server {
            let product_id = line.product_id;
            listed.insert(product_id);
            if self.keeps_local(product_id, seq, own) {
                if let Some(i) = self.position(product_id) {
                    merged.push(self.lines[i].clone());
                }
            } else {
                from_server.push(product_id);
                merged.push(line);
            }
        }

        for (index, line) in self.lines.iter().enumerate() {
            if listed.contains(&line.product_id) {
                continue;
            }
            if self.keeps_local(line.product_id, seq, own) {
                let at = index.min(merged.len());
                merged.insert(at, line.clone());
            } else {
                from_server.push(line.product_id);
            }
        }
        if let Some(product_id) = own {
            from_server.push(product_id);
        }

        for product_id in from_server {
            if self.keeps_local(product_id, seq, own) {
                continue;
            }
            let ledger = self.ledger.entry(product_id).or_default();
            ledger.applied = ledger.applied.max(seq);
        }
        self.lines = merged;
    }

    fn confirm(&mut self, ticket: Ticket, own: Option<ProductId>, server: Vec<CartLine>) {
        if ticket.epoch != self.epoch {
            debug!(seq = ticket.seq, "Dropping cart snapshot from before reset");
            return;
        }
        if let Some(product_id) = own
            && let Some(ledger) = self.ledger.get_mut(&product_id)
        {
            ledger.pending.remove(&ticket.seq);
        }
        self.failed = false;
        self.reconcile(ticket.seq, own, server);
    }
}

/// Tab-scoped cart state and the operations that change it.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CartManager {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: ApiClient,
    book: Mutex<CartBook>,
    published: watch::Sender<Cart>,
}

impl CartInner {
    /// Change the book and publish the result while still holding the lock,
    /// so subscribers see snapshots in the order they were made.
    fn update<R>(&self, f: impl FnOnce(&mut CartBook) -> R) -> (R, Cart) {
        let mut book = self.book.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut book);
        let cart = book.to_cart();
        self.published.send_replace(cart.clone());
        (result, cart)
    }
}

impl CartManager {
    /// Create an empty cart.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (published, _) = watch::channel(Cart::default());
        Self {
            inner: Arc::new(CartInner {
                api,
                book: Mutex::new(CartBook::default()),
                published,
            }),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.inner.published.borrow().clone()
    }

    /// Current line for a product, if any.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<CartLine> {
        self.inner.published.borrow().line(product_id).cloned()
    }

    /// Subscribe to snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.inner.published.subscribe()
    }

    /// Add units of a product, creating the line if needed.
    ///
    /// # Errors
    ///
    /// Returns the backend's error after rolling the change back.
    #[instrument(skip(self, product), fields(product_id = %product.id, quantity = %quantity))]
    pub async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<Cart, ApiError> {
        let id = product.id.to_string();
        add_breadcrumb("cart", "Added to cart", Some(&[("product_id", id.as_str())]));
        let request = ApiRequest::post(endpoints::CART_ADD).json(json!({
            "product_id": product.id,
            "quantity": quantity.get(),
        }));
        self.mutate(product.id, Change::Add(product, quantity), request)
            .await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns the backend's error after rolling the change back.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, ApiError> {
        let Some(quantity) = Quantity::new(quantity) else {
            return self.remove_item(product_id).await;
        };
        let request = ApiRequest::post(endpoints::CART_UPDATE).json(json!({
            "product_id": product_id,
            "quantity": quantity.get(),
        }));
        self.mutate(product_id, Change::Set(quantity), request).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns the backend's error after rolling the change back.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: ProductId) -> Result<Cart, ApiError> {
        let id = product_id.to_string();
        add_breadcrumb("cart", "Removed from cart", Some(&[("product_id", id.as_str())]));
        let request = ApiRequest::post(endpoints::CART_REMOVE).json(json!({
            "product_id": product_id,
        }));
        self.mutate(product_id, Change::Remove, request).await
    }

    async fn mutate(
        &self,
        product_id: ProductId,
        change: Change<'_>,
        request: ApiRequest,
    ) -> Result<Cart, ApiError> {
        let (ticket, _) = self.inner.update(|book| book.apply(product_id, &change));
        debug!(seq = ticket.seq, "Applied optimistic cart change");

        match self.confirmed_lines(request).await {
            Ok(server) => {
                let ((), cart) = self
                    .inner
                    .update(|book| book.confirm(ticket, Some(product_id), server));
                Ok(cart)
            }
            Err(err) => {
                self.inner
                    .update(|book| book.rollback(ticket, product_id));
                warn!(seq = ticket.seq, error = %err, "Cart change failed; rolled back");
                if err.kind() == ApiErrorKind::Conflict
                    && let Err(refresh_err) = self.refresh().await
                {
                    warn!(error = %refresh_err, "Refresh after conflict failed");
                }
                Err(err)
            }
        }
    }

    /// Server snapshot after a mutation. Backends that answer a mutation
    /// without the cart are asked for it.
    async fn confirmed_lines(&self, request: ApiRequest) -> Result<Vec<CartLine>, ApiError> {
        let body = self.inner.api.execute(request).await?;
        match wire::decode(body)? {
            Some(lines) => Ok(lines),
            None => wire::decode_required(
                self.inner.api.execute(ApiRequest::get(endpoints::CART)).await?,
            ),
        }
    }

    /// Re-fetch the cart from the backend.
    ///
    /// Lines with unconfirmed local changes keep their local value until
    /// those changes are confirmed or rolled back.
    ///
    /// # Errors
    ///
    /// Returns the backend's error; local lines are left as they were.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Cart, ApiError> {
        let (ticket, _) = self.inner.update(|book| {
            book.refreshing += 1;
            book.ticket()
        });

        let outcome = match self.inner.api.execute(ApiRequest::get(endpoints::CART)).await {
            Ok(body) => wire::decode_required(body),
            Err(err) => Err(err),
        };

        let settle = |book: &mut CartBook| {
            if ticket.epoch == book.epoch {
                book.refreshing = book.refreshing.saturating_sub(1);
            }
        };
        match outcome {
            Ok(server) => {
                let ((), cart) = self.inner.update(|book| {
                    settle(book);
                    book.confirm(ticket, None, server);
                });
                info!(lines = cart.lines.len(), "Cart refreshed");
                Ok(cart)
            }
            Err(err) => {
                self.inner.update(|book| {
                    settle(book);
                    if ticket.epoch == book.epoch {
                        book.failed = true;
                    }
                });
                warn!(error = %err, "Cart refresh failed");
                Err(err)
            }
        }
    }

    /// Empty the local cart and drop every in-flight outcome.
    pub fn reset(&self) {
        self.inner.update(|book| {
            book.epoch += 1;
            book.lines.clear();
            book.ledger.clear();
            book.refreshing = 0;
            book.failed = false;
        });
        debug!("Cart reset");
    }
}
