//! Pending request registry.
//!
//! Maps the [`ContentId`] of an outbound request to a one-shot slot that the
//! dispatcher fills when the matching response arrives. Resolution removes the
//! entry atomically, so each request is delivered at most once. A second
//! resolution attempt, or one for an id that was never registered, is a no-op
//! that returns `false`.
//!
//! A request tracked with an expected response kind only accepts a response of
//! that kind. A response of any other kind leaves the entry in place, so the
//! waiter keeps waiting for a correct answer.
//!
//! Entries leave the table in exactly three ways: resolution, an expired
//! [`PendingResponse::wait`] timeout, or dropping the [`PendingResponse`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use selfkit_lib::message::ContentType;
use selfkit_lib::ContentId;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::{InteractiveError, Result};

/// A registered request awaiting its response.
struct PendingRequest<T> {
    slot: oneshot::Sender<T>,
    /// `None` accepts a response of any kind.
    expected: Option<ContentType>,
    created: DateTime<Utc>,
    advisory_expiry: Option<DateTime<Utc>>,
}

/// Metadata about a pending request, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub id: ContentId,
    pub expected: Option<ContentType>,
    pub created: DateTime<Utc>,
    pub advisory_expiry: Option<DateTime<Utc>>,
}

/// What [`PendingRequestRegistry::resolve_kind`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Removed the entry and handed the value to its waiter.
    Delivered,
    /// No entry for the id, or its waiter has gone away.
    Unknown,
    /// An entry exists but expects another response kind. Left in place.
    KindMismatch { expected: ContentType },
}

/// Concurrent table of pending requests.
///
/// Cloning yields another handle to the same table.
pub struct PendingRequestRegistry<T> {
    entries: Arc<DashMap<ContentId, PendingRequest<T>>>,
}

impl<T> Clone for PendingRequestRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for PendingRequestRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PendingRequestRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequestRegistry")
            .field("pending", &self.entries.len())
            .finish()
    }
}

impl<T> PendingRequestRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Insert `id -> slot`, accepting a response of any kind. Fails if `id` is
    /// already pending.
    ///
    /// The entry is visible to resolvers as soon as this returns.
    pub fn register(
        &self,
        id: ContentId,
        slot: oneshot::Sender<T>,
        advisory_expiry: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.insert(id, slot, None, advisory_expiry)
    }

    fn insert(
        &self,
        id: ContentId,
        slot: oneshot::Sender<T>,
        expected: Option<ContentType>,
        advisory_expiry: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match self.entries.entry(id) {
            Entry::Occupied(entry) => Err(InteractiveError::DuplicateRequest(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(request_id = %entry.key(), "registered pending request");
                entry.insert(PendingRequest {
                    slot,
                    expected,
                    created: Utc::now(),
                    advisory_expiry,
                });
                Ok(())
            }
        }
    }

    /// Register `id` with a fresh slot that only a response of kind
    /// `expected` can resolve, and return the receiving half.
    pub fn track(
        &self,
        id: ContentId,
        expected: ContentType,
        advisory_expiry: Option<DateTime<Utc>>,
    ) -> Result<PendingResponse<T>> {
        let (slot, receiver) = oneshot::channel();
        self.insert(id.clone(), slot, Some(expected), advisory_expiry)?;
        Ok(PendingResponse {
            id,
            receiver,
            registry: self.clone(),
        })
    }

    /// Atomically remove the entry for `id` and deliver `value` to it.
    ///
    /// Returns `false` if no entry exists or its waiter has gone away.
    pub fn resolve_and_remove(&self, id: &ContentId, value: T) -> bool {
        match self.entries.remove(id) {
            Some((_, pending)) => pending.slot.send(value).is_ok(),
            None => false,
        }
    }

    /// Deliver `value`, a response of kind `kind`, if the entry for `id`
    /// accepts that kind. The check and the removal are one atomic step.
    pub fn resolve_kind(&self, id: &ContentId, kind: ContentType, value: T) -> Resolution {
        match self.entries.entry(id.clone()) {
            Entry::Vacant(_) => Resolution::Unknown,
            Entry::Occupied(entry) => match entry.get().expected {
                Some(expected) if expected != kind => Resolution::KindMismatch { expected },
                _ => {
                    if entry.remove().slot.send(value).is_ok() {
                        Resolution::Delivered
                    } else {
                        Resolution::Unknown
                    }
                }
            },
        }
    }

    /// Remove the entry for `id` without delivering anything.
    pub fn cancel(&self, id: &ContentId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of what is currently pending.
    pub fn pending(&self) -> Vec<PendingInfo> {
        self.entries
            .iter()
            .map(|entry| PendingInfo {
                id: entry.key().clone(),
                expected: entry.value().expected,
                created: entry.value().created,
                advisory_expiry: entry.value().advisory_expiry,
            })
            .collect()
    }
}

/// Receiving half of a registered request.
///
/// Dropping it removes the registry entry, so an abandoned round never leaks.
pub struct PendingResponse<T> {
    id: ContentId,
    receiver: oneshot::Receiver<T>,
    registry: PendingRequestRegistry<T>,
}

impl<T> PendingResponse<T> {
    /// Id this response is correlated by.
    pub fn id(&self) -> &ContentId {
        &self.id
    }

    /// Suspend until the response arrives.
    ///
    /// With `Some(limit)`, gives up after `limit`, removes the entry and
    /// returns [`InteractiveError::Timeout`].
    #[instrument(skip(self), fields(request_id = %self.id))]
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<T> {
        let started = Instant::now();

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(received) => received,
                Err(_) => {
                    self.registry.cancel(&self.id);
                    return Err(InteractiveError::Timeout {
                        request_id: self.id.clone(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            },
            None => (&mut self.receiver).await,
        };

        received.map_err(|_| InteractiveError::ChannelClosed(self.id.clone()))
    }
}

impl<T> Drop for PendingResponse<T> {
    fn drop(&mut self) {
        // No-op once resolved; the resolver already removed the entry.
        if self.registry.cancel(&self.id) {
            debug!(request_id = %self.id, "dropped pending request");
        }
    }
}

impl<T> std::fmt::Debug for PendingResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let registry = PendingRequestRegistry::new();
        let id = ContentId::from("X");
        let pending = registry.track(id.clone(), ContentType::DiscoveryResponse, None).unwrap();

        assert!(registry.resolve_and_remove(&id, 1u32));
        assert!(!registry.resolve_and_remove(&id, 2u32));
        assert_eq!(pending.wait(None).await.unwrap(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let registry = PendingRequestRegistry::<u32>::new();
        let _pending = registry.track(ContentId::from("X"), ContentType::DiscoveryResponse, None).unwrap();

        assert!(!registry.resolve_and_remove(&ContentId::from("Y"), 7));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&ContentId::from("X")));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = PendingRequestRegistry::<u32>::new();
        let _first = registry.track(ContentId::from("X"), ContentType::DiscoveryResponse, None).unwrap();
        let err = registry.track(ContentId::from("X"), ContentType::DiscoveryResponse, None).unwrap_err();
        assert!(matches!(err, InteractiveError::DuplicateRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let registry = PendingRequestRegistry::<u32>::new();
        let id = ContentId::from("X");
        let pending = registry.track(id.clone(), ContentType::DiscoveryResponse, None).unwrap();

        let err = pending
            .wait(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, InteractiveError::Timeout { .. }));
        assert!(!registry.contains(&id));
        assert!(!registry.resolve_and_remove(&id, 1));
    }

    #[test]
    fn test_drop_removes_entry() {
        let registry = PendingRequestRegistry::<u32>::new();
        let id = ContentId::from("X");
        {
            let _pending = registry.track(id.clone(), ContentType::DiscoveryResponse, None).unwrap();
            assert!(registry.contains(&id));
        }
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn test_cancel_closes_slot() {
        let registry = PendingRequestRegistry::<u32>::new();
        let id = ContentId::from("X");
        let pending = registry.track(id.clone(), ContentType::DiscoveryResponse, None).unwrap();

        assert!(registry.cancel(&id));
        let err = pending.wait(None).await.unwrap_err();
        assert!(matches!(err, InteractiveError::ChannelClosed(_)));
    }

    #[test]
    fn test_pending_snapshot() {
        let registry = PendingRequestRegistry::<u32>::new();
        let expiry = Utc::now();
        let _pending = registry.track(ContentId::from("X"), ContentType::DiscoveryResponse, Some(expiry)).unwrap();

        let snapshot = registry.pending();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].advisory_expiry, Some(expiry));
        assert_eq!(snapshot[0].expected, Some(ContentType::DiscoveryResponse));
    }

    #[tokio::test]
    async fn test_wrong_kind_leaves_entry_pending() {
        let registry = PendingRequestRegistry::<u32>::new();
        let id = ContentId::from("X");
        let pending = registry
            .track(id.clone(), ContentType::DiscoveryResponse, None)
            .unwrap();

        assert_eq!(
            registry.resolve_kind(&id, ContentType::CredentialPresentationResponse, 1),
            Resolution::KindMismatch {
                expected: ContentType::DiscoveryResponse
            }
        );
        assert!(registry.contains(&id));

        assert_eq!(
            registry.resolve_kind(&id, ContentType::DiscoveryResponse, 2),
            Resolution::Delivered
        );
        assert_eq!(pending.wait(None).await.unwrap(), 2);
        assert_eq!(
            registry.resolve_kind(&id, ContentType::DiscoveryResponse, 3),
            Resolution::Unknown
        );
    }

    #[test]
    fn test_untyped_entry_accepts_any_kind() {
        let registry = PendingRequestRegistry::<u32>::new();
        let id = ContentId::from("X");
        let (slot, _receiver) = oneshot::channel();
        registry.register(id.clone(), slot, None).unwrap();

        assert_eq!(
            registry.resolve_kind(&id, ContentType::CredentialVerificationResponse, 1),
            Resolution::Delivered
        );
        assert!(registry.is_empty());
    }
}
