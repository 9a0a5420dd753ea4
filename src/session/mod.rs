//! Session state: the committed realm and its collaborators
//!
//! [`RealmSession`] is the only writer of the persistent cache. It owns the
//! committed realm behind a watch channel (so the replacement is atomic from
//! a collaborator's point of view) and broadcasts events instead of letting
//! collaborators poll:
//!
//! - `RealmSelected` when a realm is committed
//! - `CandidatesUpdated` when a scan (foreground or background) produced a
//!   new candidate list
//!
//! A background refresh triggered by the cache fast path only ever writes
//! the candidates key; the committed realm is replaced exclusively by a
//! foreground selection pass.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::cache::RealmCache;
use crate::config::SelectionConfig;
use crate::error::{Error, Result};
use crate::models::{CacheEntry, Candidate, NetworkIdentity, Realm};
use crate::selector::{RealmSelector, SelectionPath};

/// Capacity of the event channel; slow subscribers miss old events rather
/// than stalling the session
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Outbound events for collaborators
#[derive(Debug, Clone)]
pub enum RealmEvent {
    /// A realm was committed for this session
    RealmSelected(Realm),
    /// The full candidate list changed
    CandidatesUpdated(Vec<Candidate>),
}

/// Holds the committed realm and reacts to selection and scan results
pub struct RealmSession {
    network: NetworkIdentity,
    selector: Arc<RealmSelector>,
    cache: RealmCache,
    realm_tx: watch::Sender<Option<Realm>>,
    events: broadcast::Sender<RealmEvent>,
}

impl RealmSession {
    pub fn new(network: NetworkIdentity, selector: RealmSelector, cache: RealmCache) -> Self {
        let (realm_tx, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            network,
            selector: Arc::new(selector),
            cache,
            realm_tx,
            events,
        }
    }

    /// Subscribe to realm and candidate events
    pub fn subscribe(&self) -> broadcast::Receiver<RealmEvent> {
        self.events.subscribe()
    }

    /// Watch the committed realm directly
    pub fn watch_realm(&self) -> watch::Receiver<Option<Realm>> {
        self.realm_tx.subscribe()
    }

    /// The committed realm, if the first selection already completed
    pub fn current(&self) -> Option<Realm> {
        self.realm_tx.borrow().clone()
    }

    /// Suspend until the first realm commit, then return it
    pub async fn wait_until_initialized(&self) -> Result<Realm> {
        let mut rx = self.realm_tx.subscribe();
        let realm = rx
            .wait_for(|realm| realm.is_some())
            .await
            .map_err(|_| Error::other("session closed before a realm was committed"))?;
        realm
            .clone()
            .ok_or_else(|| Error::other("realm cleared during initialization"))
    }

    /// Run the selection algorithm and commit its result
    ///
    /// Blocks until a realm is committed or selection fails fatally. In
    /// preview mode the cache is neither read nor written. On a cache hit
    /// the candidate refresh is forked into the background so the client is
    /// not blocked on a full scan it does not need.
    pub async fn initialize(&self, config: &SelectionConfig) -> Result<Realm> {
        let cached = if config.preview_mode {
            CacheEntry::empty(self.network)
        } else {
            self.cache.load(self.network).await?
        };

        let outcome = self.selector.select(config, &cached).await?;
        let realm = outcome.realm;

        // Commit before events fire, so a subscriber reacting to the event
        // always observes the realm already in place.
        self.realm_tx.send_replace(Some(realm.clone()));
        let _ = self.events.send(RealmEvent::RealmSelected(realm.clone()));

        tracing::info!(
            domain = %realm.domain,
            name = %realm.catalyst_name,
            layer = %realm.layer,
            version = %realm.lighthouse_version,
            network = %self.network,
            "realm selected"
        );

        match outcome.path {
            SelectionPath::Preview => {
                // Local stub; nothing durable about it.
            }
            SelectionPath::FullScan => {
                self.cache.save_realm(self.network, &realm).await?;
                if let Some(set) = outcome.fresh {
                    let all = set.all();
                    self.cache.save_candidates(self.network, &all).await?;
                    let _ = self.events.send(RealmEvent::CandidatesUpdated(all));
                }
            }
            SelectionPath::CacheHit => {
                self.cache.save_realm(self.network, &realm).await?;
                self.spawn_background_refresh(config.clone());
            }
        }

        Ok(realm)
    }

    /// Fork a candidate re-scan that refreshes the cache for the next
    /// session without touching the committed realm
    fn spawn_background_refresh(&self, config: SelectionConfig) {
        let selector = Arc::clone(&self.selector);
        let cache = self.cache.clone();
        let events = self.events.clone();
        let network = self.network;

        tokio::spawn(async move {
            match selector.refresh(&config).await {
                Ok(set) => {
                    let all = set.all();
                    if let Err(e) = cache.save_candidates(network, &all).await {
                        tracing::warn!(error = %e, "failed to cache refreshed candidates");
                        return;
                    }
                    tracing::debug!(count = all.len(), "background candidate refresh complete");
                    let _ = events.send(RealmEvent::CandidatesUpdated(all));
                }
                Err(e) => {
                    // Background refresh failures are not fatal: the session
                    // already runs on a validated realm.
                    tracing::warn!(error = %e, "background candidate refresh failed");
                }
            }
        });
    }
}
