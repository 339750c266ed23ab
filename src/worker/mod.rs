//! Background enrichment of raw memories.
//!
//! The [`Worker`] polls for unprocessed raw memories, oldest first, hands each
//! to the owning user's [`Enricher`] and flags it processed on success. The
//! enricher itself (an LLM agent that distills insights or project data) is an
//! external collaborator; this module only owns scheduling, the per-user agent
//! cache and the bookkeeping that keeps one worker from handling the same
//! memory twice.
//!
//! Two workers in different processes can still pick up the same memory: the
//! scan and the `processed` write are not atomic.

pub mod cache;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::memory::{MemoryDocument, MemoryRepository};
use cache::AgentCache;

/// Turns one raw memory into derived memories. Returns a short summary of what it did.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, memory: &MemoryDocument) -> Result<String>;
}

/// Creates the enricher for a user. Called at most once per user while the
/// cached agent is alive.
pub trait EnricherFactory: Send + Sync {
    fn create(&self, user_id: &str) -> Result<Arc<dyn Enricher>>;
}

pub struct Worker {
    repo: MemoryRepository,
    factory: Arc<dyn EnricherFactory>,
    agents: AgentCache<Arc<dyn Enricher>>,
    in_flight: Mutex<HashSet<String>>,
    interval: Duration,
    error_backoff: Duration,
    batch_size: usize,
    user_id: Option<String>,
}

/// Removes an id from the in-flight set when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

impl Worker {
    pub fn new(
        repo: MemoryRepository,
        factory: Arc<dyn EnricherFactory>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            repo,
            factory,
            agents: AgentCache::new(
                config.agent_cache_capacity,
                Duration::from_secs(config.agent_cache_ttl_secs),
            ),
            in_flight: Mutex::new(HashSet::new()),
            interval: Duration::from_secs(config.interval_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            batch_size: config.batch_size.max(1),
            user_id: None,
        }
    }

    /// Only process memories owned by `user_id`.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn claim(&self, id: &str) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(id.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            id: id.to_string(),
        })
    }

    /// Enrich one memory and flag it processed. Returns `true` only when both
    /// steps succeeded.
    pub async fn process_memory(&self, memory: &MemoryDocument) -> bool {
        let Some(id) = memory.id.as_deref() else {
            tracing::warn!("memory without id, skipping");
            return false;
        };
        let Some(_claim) = self.claim(id) else {
            tracing::debug!(id = %id, "memory already in flight");
            return false;
        };

        // the scan may be stale by now
        let Some(current) = self.repo.get_memory(id).await else {
            tracing::debug!(id = %id, "memory vanished before processing");
            return false;
        };
        if current.processed {
            tracing::debug!(id = %id, "memory already processed");
            return false;
        }

        let agent = match self
            .agents
            .get_or_try_insert_with(&current.user_id, || self.factory.create(&current.user_id))
        {
            Ok(agent) => agent,
            Err(e) => {
                tracing::error!(id = %id, user_id = %current.user_id, error = %e, "failed to create enricher");
                return false;
            }
        };

        tracing::info!(id = %id, user_id = %current.user_id, "processing memory");
        match agent.enrich(&current).await {
            Ok(summary) => {
                if self.repo.mark_processed(id).await {
                    tracing::info!(id = %id, summary = %summary, "memory processed");
                    true
                } else {
                    tracing::error!(id = %id, "failed to flag memory as processed");
                    false
                }
            }
            Err(e) => {
                tracing::error!(id = %id, error = %e, "enrichment failed");
                false
            }
        }
    }

    /// Process one batch of unprocessed memories. Returns how many succeeded.
    pub async fn process_batch(&self) -> Result<usize> {
        let memories = self
            .repo
            .get_unprocessed_memories(self.batch_size, self.user_id.as_deref())
            .await?;
        if memories.is_empty() {
            return Ok(0);
        }

        let mut processed = 0;
        for memory in &memories {
            if self.process_memory(memory).await {
                processed += 1;
            }
        }
        tracing::debug!(found = memories.len(), processed, "batch done");
        Ok(processed)
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// After a productive batch the next one starts immediately; otherwise the
    /// worker sleeps `interval`, or `error_backoff` after a failed poll.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "memory worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = match self.process_batch().await {
                Ok(n) if n > 0 => {
                    tracing::info!(processed = n, "processed memories");
                    continue;
                }
                Ok(_) => {
                    tracing::debug!("no unprocessed memories");
                    self.interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker poll failed");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("memory worker stopped");
    }
}
