//! Debounced dispatch queue
//!
//! Submissions are buffered and every submit re-arms a single timer. When
//! the timer fires without being superseded, the buffer is drained, merged
//! per tool and executed in [`Tool::DISPATCH_ORDER`] inside one session.
//!
//! A timer task carries the generation it was armed with and drains only
//! if that generation is still current, so a superseded timer never
//! flushes even if it woke up before it could be aborted.

use crate::constants::{REPORT_CHANNEL_CAPACITY, REQUEST_KEY_PREFIX};
use crate::registry::ToolRegistry;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strata_core::{
    has_content, DispatchConfig, Envelope, Package, ReadRequest, Status, StorageError,
    StrataResult, Timestamp, Tool, ValidationError,
};
use strata_storage::Database;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Key assigned to one submitted package.
pub type RequestKey = String;

/// Outcome of one flush, keyed by tool name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushReport {
    /// 1-based flush number of this queue
    pub sequence: u64,
    pub request_count: usize,
    pub results: BTreeMap<String, Envelope>,
    pub flushed_at: Timestamp,
}

impl FlushReport {
    pub fn result(&self, tool: Tool) -> Option<&Envelope> {
        self.results.get(tool.name())
    }
}

// ============================================================================
// MERGING
// ============================================================================

/// Buffered packages folded into one payload per queueable tool.
#[derive(Debug, Default)]
struct QueueMerge {
    create: Map<String, Value>,
    update: Map<String, Value>,
    delete: Map<String, Value>,
    search: Map<String, Value>,
    read: Vec<String>,
    rejected: BTreeMap<String, Vec<String>>,
}

impl QueueMerge {
    fn from_requests(requests: &[(RequestKey, Package)]) -> Self {
        let mut merge = Self::default();
        for (key, package) in requests {
            merge.add(key, package);
        }
        merge
    }

    fn reject(&mut self, tool: &str, message: String) {
        tracing::warn!(tool, error = %message, "Queued payload rejected");
        self.rejected.entry(tool.to_string()).or_default().push(message);
    }

    fn add(&mut self, key: &str, package: &Package) {
        for (name, payload) in package.entries() {
            if !has_content(payload) {
                continue;
            }
            let tool = match name.parse::<Tool>() {
                Ok(tool) => tool,
                Err(e) => {
                    self.reject(name, format!("{}: {}", key, e));
                    continue;
                }
            };

            let target = match tool {
                Tool::Create => &mut self.create,
                Tool::Update => &mut self.update,
                Tool::Delete => &mut self.delete,
                Tool::Search => &mut self.search,
                Tool::Read => {
                    match serde_json::from_value::<ReadRequest>(payload.clone()) {
                        Ok(request) => self.read.extend(request.owners.into_vec()),
                        Err(e) => self.reject(
                            name,
                            ValidationError::MalformedPayload {
                                context: format!("read payload of {}", key),
                                reason: e.to_string(),
                            }
                            .to_string(),
                        ),
                    }
                    continue;
                }
                Tool::List => {
                    self.reject(name, format!("{}: tool '{}' cannot be queued", key, name));
                    continue;
                }
            };
            match payload.as_object() {
                Some(entries) => {
                    for (k, v) in entries {
                        target.insert(k.clone(), v.clone());
                    }
                }
                None => {
                    let message = ValidationError::MalformedPayload {
                        context: format!("{} payload of {}", name, key),
                        reason: "expected an object".to_string(),
                    }
                    .to_string();
                    self.reject(name, message);
                }
            }
        }
    }

    /// Names of every tool that carried content, known or not.
    fn requested_tools(requests: &[(RequestKey, Package)]) -> BTreeSet<String> {
        requests
            .iter()
            .flat_map(|(_, package)| package.entries())
            .filter(|(_, payload)| has_content(payload))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Merged payloads in dispatch order, empty ones left out.
    fn payloads(&self) -> Vec<(Tool, Value)> {
        Tool::DISPATCH_ORDER
            .into_iter()
            .filter_map(|tool| {
                let payload = match tool {
                    Tool::Create if !self.create.is_empty() => Value::Object(self.create.clone()),
                    Tool::Update if !self.update.is_empty() => Value::Object(self.update.clone()),
                    Tool::Delete if !self.delete.is_empty() => Value::Object(self.delete.clone()),
                    Tool::Search if !self.search.is_empty() => Value::Object(self.search.clone()),
                    Tool::Read if !self.read.is_empty() => json!({ "UUID": self.read }),
                    _ => return None,
                };
                Some((tool, payload))
            })
            .collect()
    }
}

// ============================================================================
// QUEUE
// ============================================================================

#[derive(Debug, Default)]
struct QueueState {
    buffer: Vec<(RequestKey, Package)>,
    requests: u64,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct QueueInner {
    db: Arc<Database>,
    registry: Arc<ToolRegistry>,
    debounce: Duration,
    /// Runtime the timer tasks run on; submit may come from any thread
    runtime: Handle,
    state: Mutex<QueueState>,
    last: Mutex<Option<FlushReport>>,
    reports: broadcast::Sender<FlushReport>,
    flushes: AtomicU64,
    /// Serializes flushes so sequence numbers follow drain order
    flush_gate: tokio::sync::Mutex<()>,
}

impl QueueInner {
    fn state(&self) -> StrataResult<MutexGuard<'_, QueueState>> {
        Ok(self.state.lock().map_err(|_| StorageError::LockPoisoned)?)
    }

    /// Take the buffer.
    ///
    /// With `Some(generation)` (a timer firing) nothing is drained unless
    /// that generation is still current. With `None` any pending timer is
    /// cancelled first.
    fn drain(&self, generation: Option<u64>) -> StrataResult<Vec<(RequestKey, Package)>> {
        let mut state = self.state()?;
        match generation {
            Some(g) if g != state.generation => return Ok(Vec::new()),
            Some(_) => {
                state.timer = None;
            }
            None => {
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                state.generation += 1;
            }
        }
        Ok(std::mem::take(&mut state.buffer))
    }

    /// Run merged handlers inside one session. Blocking.
    fn run_flush(&self, requests: &[(RequestKey, Package)]) -> StrataResult<BTreeMap<String, Envelope>> {
        let merge = QueueMerge::from_requests(requests);
        let catalog = self.db.catalog();

        let mut results = self.db.session(|session| {
            let mut results = BTreeMap::new();
            for (tool, payload) in merge.payloads() {
                let envelope = self.registry.invoke(tool, &payload, session, &catalog);
                results.insert(tool.name().to_string(), envelope);
            }
            Ok(results)
        })?;

        for (name, errors) in merge.rejected {
            match results.get_mut(&name) {
                Some(envelope) => {
                    envelope.errors.extend(errors);
                    envelope.status = Status::derive(true, envelope.status.is_useful());
                }
                None => {
                    results.insert(name, Envelope::new(json!({}), errors, false));
                }
            }
        }
        Ok(results)
    }

    /// Execute drained requests and publish the report.
    ///
    /// A failed session still yields a report: every tool named by the
    /// drained packages gets a failed envelope carrying the cause.
    async fn flush(self: &Arc<Self>, requests: Vec<(RequestKey, Package)>) -> FlushReport {
        let request_count = requests.len();
        let tools = QueueMerge::requested_tools(&requests);
        tracing::info!(requests = request_count, "Dispatch flush started");

        let inner = Arc::clone(self);
        let outcome = match tokio::task::spawn_blocking(move || inner.run_flush(&requests)).await {
            Ok(outcome) => outcome,
            Err(e) => Err(StorageError::TaskFailed {
                reason: e.to_string(),
            }
            .into()),
        };
        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, requests = request_count, "Dispatch flush failed");
                tools
                    .into_iter()
                    .map(|tool| {
                        let envelope = Envelope::failed(format!("{} failed: {}", tool, e));
                        (tool, envelope)
                    })
                    .collect()
            }
        };

        let sequence = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        let report = FlushReport {
            sequence,
            request_count,
            results,
            flushed_at: Utc::now(),
        };
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        // No subscribers is fine
        let _ = self.reports.send(report.clone());

        tracing::info!(
            sequence,
            requests = request_count,
            tools = report.results.len(),
            "Dispatch flush finished"
        );
        report
    }

    /// Timer body: wait out the window, then flush if still current.
    async fn fire(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.debounce).await;
        let _gate = self.flush_gate.lock().await;
        let requests = match self.drain(Some(generation)) {
            Ok(requests) => requests,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch drain failed");
                return;
            }
        };
        if requests.is_empty() {
            return;
        }
        self.flush(requests).await;
    }
}

/// Cloneable handle to one debounced queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    inner: Arc<QueueInner>,
}

impl DispatchQueue {
    /// Queue whose timers run on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`DispatchQueue::with_runtime`] to pass a handle explicitly.
    pub fn new(db: Arc<Database>, registry: Arc<ToolRegistry>, config: DispatchConfig) -> Self {
        Self::with_runtime(db, registry, config, Handle::current())
    }

    pub fn with_runtime(
        db: Arc<Database>,
        registry: Arc<ToolRegistry>,
        config: DispatchConfig,
        runtime: Handle,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(QueueInner {
                db,
                registry,
                debounce: config.debounce,
                runtime,
                state: Mutex::new(QueueState::default()),
                last: Mutex::new(None),
                reports,
                flushes: AtomicU64::new(0),
                flush_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Buffer a package and restart the debounce timer.
    ///
    /// Callable from any thread; the timer runs on the queue's runtime.
    pub fn submit(&self, package: Package) -> StrataResult<RequestKey> {
        let mut state = self.inner.state()?;
        state.requests += 1;
        let key = format!("{}{}", REQUEST_KEY_PREFIX, state.requests);
        state.buffer.push((key.clone(), package));

        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let generation = state.generation;
        state.timer = Some(
            self.inner
                .runtime
                .spawn(Arc::clone(&self.inner).fire(generation)),
        );

        tracing::debug!(request = %key, pending = state.buffer.len(), "Package queued");
        Ok(key)
    }

    /// Cancel the timer and flush whatever is buffered now.
    ///
    /// Returns `None` when nothing was pending. A failed session is
    /// reported through the envelopes of the returned report.
    pub async fn flush_now(&self) -> StrataResult<Option<FlushReport>> {
        let _gate = self.inner.flush_gate.lock().await;
        let requests = self.inner.drain(None)?;
        if requests.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.inner.flush(requests).await))
    }

    /// Cancel the timer and flush any pending packages.
    pub async fn shutdown(&self) -> StrataResult<Option<FlushReport>> {
        let report = self.flush_now().await?;
        tracing::info!(flushes = self.flush_count(), "Dispatch queue shut down");
        Ok(report)
    }

    /// Number of buffered requests.
    pub fn pending(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .len()
    }

    /// Number of completed flushes, failed ones included.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::SeqCst)
    }

    /// Report of the most recent flush.
    pub fn last_results(&self) -> Option<FlushReport> {
        self.inner
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receive every report completed after this call, in flush order.
    pub fn subscribe(&self) -> broadcast::Receiver<FlushReport> {
        self.inner.reports.subscribe()
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }
}
