// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The allocator hierarchy.
//!
//! An [`Allocator`] is a handle to one node in a tree of allocation
//! contexts. Every node has an immutable byte limit; a reservation on a node
//! is charged to that node and to every ancestor up to the root, so a limit
//! on any ancestor caps the whole subtree:
//!
//! ```text
//!             root (1 GB)
//!            /           \
//!    query-1 (512 MB)   query-2 (512 MB)
//!      /        \
//!  frag-0     frag-1        reserve(frag-0, n) charges frag-0, query-1, root
//!  (64 MB)    (64 MB)
//! ```
//!
//! # Reservation protocol
//! 1. Ask the bound [`InjectionPoint`] about [`CHILD_BUFFER_SITE`]. On
//!    `Fail` return [`MemoryError::Injected`] without touching any tally.
//! 2. Under the tree lock, check every node from the target up to the root.
//!    If any would exceed its limit return [`MemoryError::OutOfMemory`],
//!    again without touching any tally.
//! 3. Charge every node in the chain and hand out a [`Reservation`].
//!
//! # Thread Safety
//! All accounting for one tree sits behind a single mutex, so the limit
//! check and the commit across the ancestor chain are one atomic step and a
//! single lock cannot deadlock. Allocator handles are `Send + Sync`.

use crate::{AllocationStats, MemoryBudget, MemoryError, Reservation};
use injection::{ControlSet, Endpoint, InjectionPoint, InjectionSite, Verdict};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// The injection site consulted by every [`Allocator::reserve`] call.
pub const CHILD_BUFFER_SITE: InjectionSite =
    InjectionSite::from_static("memory_manager::Allocator", "child-buffer");

/// Every injection site compiled into this crate.
pub const INJECTION_SITES: &[InjectionSite] = &[CHILD_BUFFER_SITE];

/// Opaque identity of one allocator within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocatorId(u64);

impl fmt::Display for AllocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an allocator needs to know about where it runs: the local endpoint
/// and the injection point to consult.
#[derive(Clone)]
pub struct AllocationContext {
    endpoint: Option<Endpoint>,
    injector: Arc<dyn InjectionPoint>,
}

impl AllocationContext {
    /// A context on `endpoint` consulting `injector`.
    pub fn new(endpoint: Endpoint, injector: Arc<dyn InjectionPoint>) -> Self {
        Self {
            endpoint: Some(endpoint),
            injector,
        }
    }

    /// A production context: no injections ever fire.
    pub fn unmonitored(endpoint: Option<Endpoint>) -> Self {
        Self {
            endpoint,
            injector: Arc::new(ControlSet::empty()),
        }
    }

    /// The same endpoint, consulting a different injection point.
    pub fn with_injector(&self, injector: Arc<dyn InjectionPoint>) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            injector,
        }
    }

    /// The endpoint reservations are attributed to.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    fn evaluate(&self, site: &InjectionSite) -> Verdict {
        self.injector.evaluate(site, self.endpoint.as_ref())
    }
}

impl Default for AllocationContext {
    fn default() -> Self {
        Self::unmonitored(None)
    }
}

impl fmt::Debug for AllocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationContext")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// ── Ledger ─────────────────────────────────────────────────────

/// Accounting state of one node.
#[derive(Debug)]
struct Account {
    name: String,
    limit: usize,
    reserved: usize,
    parent: Option<AllocatorId>,
    children: BTreeSet<AllocatorId>,
    /// Reservation id → size, for reservations made directly on this node.
    outstanding: HashMap<u64, usize>,
    stats: AllocationStats,
    /// The handle was dropped while busy; remove the account once idle.
    detached: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    accounts: HashMap<AllocatorId, Account>,
    next_allocator: u64,
    next_reservation: u64,
}

impl Ledger {
    fn account(&self, id: AllocatorId) -> &Account {
        self.accounts
            .get(&id)
            .expect("live allocator handles always have an account")
    }

    fn account_mut(&mut self, id: AllocatorId) -> &mut Account {
        self.accounts
            .get_mut(&id)
            .expect("live allocator handles always have an account")
    }

    /// `id` followed by each of its ancestors, ending at the root.
    fn chain(&self, id: AllocatorId) -> Vec<AllocatorId> {
        let mut chain = vec![id];
        let mut current = self.account(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.account(parent).parent;
        }
        chain
    }

    fn leak(&self, id: AllocatorId) -> Option<MemoryError> {
        let account = self.account(id);
        if account.reserved == 0 && account.children.is_empty() {
            return None;
        }
        Some(MemoryError::LeakDetected {
            allocator: account.name.clone(),
            reserved_bytes: account.reserved,
            outstanding: account.outstanding.len(),
            open_children: account.children.len(),
        })
    }

    /// Removes `id`, then any detached ancestor left idle by its removal.
    fn remove(&mut self, id: AllocatorId) {
        let mut next = Some(id);
        while let Some(id) = next.take() {
            let Some(account) = self.accounts.remove(&id) else {
                break;
            };
            if let Some(parent_id) = account.parent {
                if let Some(parent) = self.accounts.get_mut(&parent_id) {
                    parent.children.remove(&id);
                    if parent.detached && parent.reserved == 0 && parent.children.is_empty() {
                        next = Some(parent_id);
                    }
                }
            }
        }
    }

    /// Removes `id` if its handle is gone and nothing is held under it.
    fn reap(&mut self, id: AllocatorId) {
        let idle = self
            .accounts
            .get(&id)
            .is_some_and(|a| a.detached && a.reserved == 0 && a.children.is_empty());
        if idle {
            tracing::debug!(allocator = %self.account(id).name, "detached allocator reclaimed");
            self.remove(id);
        }
    }
}

/// Shared state of one allocator tree.
#[derive(Debug, Default)]
pub(crate) struct Tree {
    ledger: Mutex<Ledger>,
}

impl Tree {
    fn open(&self, name: &str, limit: usize, parent: Option<AllocatorId>) -> AllocatorId {
        let mut ledger = self.ledger.lock();
        let id = AllocatorId(ledger.next_allocator);
        ledger.next_allocator += 1;
        if let Some(parent) = parent {
            ledger.account_mut(parent).children.insert(id);
        }
        ledger.accounts.insert(
            id,
            Account {
                name: name.to_string(),
                limit,
                reserved: 0,
                parent,
                children: BTreeSet::new(),
                outstanding: HashMap::new(),
                stats: AllocationStats::default(),
                detached: false,
            },
        );
        id
    }

    /// All-or-nothing charge of `size` bytes to `id` and its ancestors.
    fn reserve(&self, id: AllocatorId, size: usize) -> Result<u64, MemoryError> {
        let mut ledger = self.ledger.lock();
        let chain = ledger.chain(id);

        let breach = chain.iter().find_map(|node| {
            let account = ledger.account(*node);
            let available = account.limit - account.reserved;
            (size > available).then(|| MemoryError::OutOfMemory {
                allocator: account.name.clone(),
                requested_bytes: size,
                available_bytes: available,
                limit_bytes: account.limit,
            })
        });

        if let Some(err) = breach {
            for node in &chain {
                ledger.account_mut(*node).stats.record_oom();
            }
            return Err(err);
        }

        let reservation = ledger.next_reservation;
        ledger.next_reservation += 1;
        for node in &chain {
            let account = ledger.account_mut(*node);
            account.reserved += size;
            account.stats.record_reservation(size);
            account.stats.update_peak(account.reserved);
        }
        ledger.account_mut(id).outstanding.insert(reservation, size);
        Ok(reservation)
    }

    fn record_injected(&self, id: AllocatorId) {
        let mut ledger = self.ledger.lock();
        for node in ledger.chain(id) {
            ledger.account_mut(node).stats.record_injected();
        }
    }

    /// Returns `size` bytes of `reservation` to `id` and its ancestors.
    ///
    /// # Panics
    /// Panics if the reservation is unknown (released twice) or if any tally
    /// would underflow. Both mean the accounting is already corrupt.
    pub(crate) fn release(&self, id: AllocatorId, reservation: u64, size: usize) {
        let defect = {
            let mut ledger = self.ledger.lock();
            let removed = match ledger.accounts.get_mut(&id) {
                None => Err(format!("allocator {id} no longer exists")),
                Some(account) => account.outstanding.remove(&reservation).ok_or_else(|| {
                    format!(
                        "reservation {reservation} on allocator '{}' released twice",
                        account.name
                    )
                }),
            };

            match removed {
                Err(defect) => Some(defect),
                Ok(recorded) if recorded != size => Some(format!(
                    "reservation {reservation} recorded {recorded} bytes but released {size}"
                )),
                Ok(_) => {
                    let mut underflow = None;
                    for node in ledger.chain(id) {
                        let account = ledger.account_mut(node);
                        match account.reserved.checked_sub(size) {
                            Some(remaining) => {
                                account.reserved = remaining;
                                account.stats.record_release();
                            }
                            None => {
                                underflow = Some(format!(
                                    "allocator '{}' holds {} bytes, cannot release {size}",
                                    account.name, account.reserved
                                ));
                                break;
                            }
                        }
                    }
                    if underflow.is_none() {
                        ledger.reap(id);
                    }
                    underflow
                }
            }
        };

        if let Some(defect) = defect {
            panic!("allocator accounting defect: {defect}");
        }
    }

    fn close(&self, id: AllocatorId) -> Result<(), MemoryError> {
        let mut ledger = self.ledger.lock();
        if let Some(leak) = ledger.leak(id) {
            return Err(leak);
        }
        ledger.remove(id);
        Ok(())
    }

    /// Removes `id` if it is idle. Otherwise marks it detached, so it is
    /// removed once its last reservation and child are gone, and returns the
    /// bytes it still holds.
    fn detach(&self, id: AllocatorId) -> Option<usize> {
        let mut ledger = self.ledger.lock();
        if ledger.leak(id).is_none() {
            ledger.remove(id);
            return None;
        }
        let account = ledger.account_mut(id);
        account.detached = true;
        Some(account.reserved)
    }

    fn reserved(&self, id: AllocatorId) -> usize {
        self.ledger.lock().account(id).reserved
    }

    fn available(&self, id: AllocatorId) -> usize {
        let ledger = self.ledger.lock();
        ledger
            .chain(id)
            .into_iter()
            .map(|node| {
                let account = ledger.account(node);
                account.limit - account.reserved
            })
            .min()
            .unwrap_or(0)
    }

    fn stats(&self, id: AllocatorId) -> AllocationStats {
        self.ledger.lock().account(id).stats.clone()
    }

    fn child_count(&self, id: AllocatorId) -> usize {
        self.ledger.lock().account(id).children.len()
    }
}

// ── Allocator handle ───────────────────────────────────────────

/// A handle to one node of an allocator tree.
///
/// # Example
/// ```
/// use memory_manager::{AllocationContext, Allocator, MemoryBudget};
///
/// let root = Allocator::root("root", MemoryBudget::from_mb(64), AllocationContext::default());
/// let child = root.new_child("fragment-0", MemoryBudget::from_mb(8));
///
/// let r = child.reserve(1024 * 1024).unwrap();
/// assert_eq!(child.reserved(), 1024 * 1024);
/// assert_eq!(root.reserved(), 1024 * 1024); // charged to the ancestor too
///
/// r.release();
/// child.close().unwrap();
/// root.close().unwrap();
/// ```
pub struct Allocator {
    tree: Arc<Tree>,
    id: AllocatorId,
    parent: Option<AllocatorId>,
    name: String,
    limit: MemoryBudget,
    context: AllocationContext,
    closed: bool,
}

impl Allocator {
    /// Creates the root of a new allocator tree.
    pub fn root(name: impl Into<String>, limit: MemoryBudget, context: AllocationContext) -> Self {
        let name = name.into();
        let tree = Arc::new(Tree::default());
        let id = tree.open(&name, limit.as_bytes(), None);
        tracing::debug!(allocator = %name, %limit, "root allocator created");
        Self {
            tree,
            id,
            parent: None,
            name,
            limit,
            context,
            closed: false,
        }
    }

    /// Creates a child with its own limit, inheriting this allocator's context.
    ///
    /// A child's limit may exceed its parent's; the parent's limit still caps
    /// the child's effective headroom.
    pub fn new_child(&self, name: impl Into<String>, limit: MemoryBudget) -> Allocator {
        self.new_child_in(name, limit, self.context.clone())
    }

    /// Creates a child bound to a different context (e.g. a per-query
    /// snapshot of the injection rules).
    pub fn new_child_in(
        &self,
        name: impl Into<String>,
        limit: MemoryBudget,
        context: AllocationContext,
    ) -> Allocator {
        let name = name.into();
        let id = self.tree.open(&name, limit.as_bytes(), Some(self.id));
        tracing::debug!(allocator = %name, parent = %self.name, %limit, "child allocator created");
        Allocator {
            tree: Arc::clone(&self.tree),
            id,
            parent: Some(self.id),
            name,
            limit,
            context,
            closed: false,
        }
    }

    /// Reserves `size` bytes on this allocator and all of its ancestors.
    ///
    /// Fails with [`MemoryError::Injected`] if a rule fires at
    /// [`CHILD_BUFFER_SITE`], or [`MemoryError::OutOfMemory`] if any limit in
    /// the chain would be exceeded. Failure never changes any tally.
    pub fn reserve(&self, size: usize) -> Result<Reservation, MemoryError> {
        if let Verdict::Fail(defect) = self.context.evaluate(&CHILD_BUFFER_SITE) {
            self.tree.record_injected(self.id);
            return Err(MemoryError::Injected {
                allocator: self.name.clone(),
                site: CHILD_BUFFER_SITE,
                defect,
            });
        }

        let reservation = self.tree.reserve(self.id, size).map_err(|e| {
            tracing::debug!(allocator = %self.name, size, "reservation refused: {e}");
            e
        })?;
        Ok(Reservation::new(Arc::clone(&self.tree), self.id, reservation, size))
    }

    /// Closes this allocator.
    ///
    /// Only legal once every reservation made on it is released and every
    /// child is closed. Otherwise the allocator is handed back, still open,
    /// inside a [`CloseError`] carrying [`MemoryError::LeakDetected`].
    pub fn close(mut self) -> Result<(), CloseError> {
        match self.tree.close(self.id) {
            Ok(()) => {
                self.closed = true;
                tracing::debug!(allocator = %self.name, "allocator closed");
                Ok(())
            }
            Err(error) => Err(CloseError {
                allocator: self,
                error,
            }),
        }
    }

    /// Bytes currently reserved in this allocator's subtree.
    pub fn reserved(&self) -> usize {
        self.tree.reserved(self.id)
    }

    /// This allocator's own limit.
    pub fn limit(&self) -> MemoryBudget {
        self.limit
    }

    /// Largest reservation that would currently succeed, given every
    /// ancestor's headroom.
    pub fn available(&self) -> usize {
        self.tree.available(self.id)
    }

    /// Snapshot of this subtree's statistics.
    pub fn stats(&self) -> AllocationStats {
        self.tree.stats(self.id)
    }

    /// Number of open children.
    pub fn child_count(&self) -> usize {
        self.tree.child_count(self.id)
    }

    pub fn id(&self) -> AllocatorId {
        self.id
    }

    pub fn parent(&self) -> Option<AllocatorId> {
        self.parent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &AllocationContext {
        &self.context
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.context.endpoint()
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Some(reserved) = self.tree.detach(self.id) {
            tracing::error!(
                allocator = %self.name,
                reserved,
                "allocator dropped while still in use; it stays open until its reservations are released"
            );
        }
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("reserved", &self.reserved())
            .field("endpoint", &self.context.endpoint())
            .finish()
    }
}

/// A refused [`Allocator::close`], returning the still-open allocator.
#[derive(Debug, thiserror::Error)]
#[error("cannot close allocator: {error}")]
pub struct CloseError {
    /// The allocator, unchanged and still open.
    pub allocator: Allocator,
    /// Why the close was refused.
    #[source]
    pub error: MemoryError,
}
