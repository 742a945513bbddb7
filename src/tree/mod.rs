//! Call tree construction service
//!
//! Tree builds are funnelled through a single worker task so the CPU-bound
//! construction never runs on the caller's task. Finished trees are cached by
//! log id, and concurrent requests for the same id are coalesced onto one
//! build via a broadcast channel.

pub mod builder;
pub mod error;
pub mod query;

pub use builder::TreeBuilder;
pub use error::{TreeError, TreeResult};
pub use query::TreeFilter;

use crate::models::{CallTree, ParsedLog};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

const WORKER_QUEUE_DEPTH: usize = 64;
const BUILD_ACTION: &str = "buildTree";

/// Tuning knobs for [`CallTreeService`]
#[derive(Debug, Clone)]
pub struct CallTreeConfig {
    /// Upper bound on a single tree build, queue wait included
    pub build_timeout: Duration,
}

impl Default for CallTreeConfig {
    fn default() -> Self {
        Self { build_timeout: Duration::from_secs(30) }
    }
}

struct WorkerRequest {
    id: Uuid,
    action: &'static str,
    payload: ParsedLog,
    reply: oneshot::Sender<WorkerResponse>,
}

struct WorkerResponse {
    id: Uuid,
    success: bool,
    result: Option<CallTree>,
    error: Option<String>,
}

enum Role {
    Leader,
    Follower(broadcast::Receiver<TreeResult<Arc<CallTree>>>),
}

/// Caching front end over the tree-build worker
pub struct CallTreeService {
    cache: DashMap<String, Arc<CallTree>>,
    in_flight: DashMap<String, broadcast::Sender<TreeResult<Arc<CallTree>>>>,
    /// `None` when no runtime was active at construction; every build then
    /// reports [`TreeError::WorkerUnavailable`] instead of panicking
    tx: Option<mpsc::Sender<WorkerRequest>>,
    config: CallTreeConfig,
}

impl CallTreeService {
    pub fn new() -> Self {
        Self::with_config(CallTreeConfig::default())
    }

    pub fn with_config(config: CallTreeConfig) -> Self {
        let tx = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
                handle.spawn(Self::worker_loop(rx));
                Some(tx)
            }
            Err(_) => {
                tracing::warn!("no async runtime at construction, tree worker not started");
                None
            }
        };
        Self {
            cache: DashMap::new(),
            in_flight: DashMap::new(),
            tx,
            config,
        }
    }

    /// Build the call tree for a parsed log, serving repeats from cache
    ///
    /// Concurrent calls with the same `log_id` share one build: the first
    /// caller becomes the leader and drives the worker, later callers wait on
    /// the leader's broadcast. Failed builds are never cached, so a later
    /// call retries from scratch.
    pub async fn build_tree(&self, log_id: &str, parsed: &ParsedLog) -> TreeResult<Arc<CallTree>> {
        if let Some(hit) = self.cache.get(log_id) {
            tracing::debug!(log_id, "call tree cache hit");
            return Ok(hit.clone());
        }

        // Resolve leader/follower while holding the entry lock, then drop it
        // before any await so followers registering behind us cannot deadlock.
        let role = match self.in_flight.entry(log_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Role::Follower(entry.get().subscribe())
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                // A previous leader caches before it unregisters, so a cache
                // re-check here catches builds that finished since our first
                // look and keeps this request from rebuilding them.
                if let Some(hit) = self.cache.get(log_id) {
                    return Ok(hit.clone());
                }
                let (notify, _) = broadcast::channel(1);
                entry.insert(notify);
                Role::Leader
            }
        };

        match role {
            Role::Follower(mut rx) => match rx.recv().await {
                Ok(shared) => shared,
                // Leader dropped without sending; retry as a fresh request.
                Err(_) => Box::pin(self.build_tree(log_id, parsed)).await,
            },
            Role::Leader => {
                let outcome = self.run_build(parsed.clone()).await;
                if let Ok(tree) = &outcome {
                    self.cache.insert(log_id.to_string(), tree.clone());
                }
                if let Some((_, notify)) = self.in_flight.remove(log_id) {
                    // Send fails only when no follower is waiting.
                    let _ = notify.send(outcome.clone());
                }
                outcome
            }
        }
    }

    async fn run_build(&self, payload: ParsedLog) -> TreeResult<Arc<CallTree>> {
        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = WorkerRequest {
            id: request_id,
            action: BUILD_ACTION,
            payload,
            reply: reply_tx,
        };

        let tx = self.tx.as_ref().ok_or(TreeError::WorkerUnavailable)?;
        tx.send(request)
            .await
            .map_err(|_| TreeError::WorkerUnavailable)?;

        let response = tokio::time::timeout(self.config.build_timeout, reply_rx)
            .await
            .map_err(|_| TreeError::Timeout(self.config.build_timeout))?
            .map_err(|_| TreeError::WorkerUnavailable)?;

        debug_assert_eq!(response.id, request_id);
        if response.success {
            response
                .result
                .map(Arc::new)
                .ok_or_else(|| TreeError::Worker("worker reported success without a tree".into()))
        } else {
            Err(TreeError::Worker(
                response.error.unwrap_or_else(|| "unknown worker failure".into()),
            ))
        }
    }

    async fn worker_loop(mut rx: mpsc::Receiver<WorkerRequest>) {
        while let Some(request) = rx.recv().await {
            let WorkerRequest { id, action, payload, reply } = request;
            tracing::debug!(request_id = %id, action, lines = payload.lines.len(), "worker building tree");

            let built = tokio::task::spawn_blocking(move || TreeBuilder::build(&payload)).await;
            let response = match built {
                Ok(tree) => WorkerResponse {
                    id,
                    success: true,
                    result: Some(tree),
                    error: None,
                },
                Err(join_err) => WorkerResponse {
                    id,
                    success: false,
                    result: None,
                    error: Some(join_err.to_string()),
                },
            };

            // The requester may have timed out and dropped its receiver;
            // at-most-once delivery means late replies are simply discarded.
            if reply.send(response).is_err() {
                tracing::debug!(request_id = %id, "requester gone, dropping tree build result");
            }
        }
    }

    /// Drop one cached tree, or every cached tree when no id is given
    pub fn clear_cache(&self, log_id: Option<&str>) {
        match log_id {
            Some(id) => {
                self.cache.remove(id);
            }
            None => self.cache.clear(),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for CallTreeService {
    fn default() -> Self {
        Self::new()
    }
}
