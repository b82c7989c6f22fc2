//! Pooled request manager.
//!
//! # Design
//! At most `pool_size` exchanges are on the wire at once; the rest wait in
//! a priority queue (lower priority value first, then submission order).
//! Every request carries an id that must be unique among requests the
//! manager still tracks. A failed attempt (timeout, transport failure or
//! 5xx) is retried on a fresh `XhrIo` until `max_retries` attempts have
//! been made. Callbacks are never invoked while a lock is held.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};
use serde::Deserialize;
use uuid::Uuid;

use super::xhr::{ErrorCode, XhrIo};
use super::{AjaxImpl, AjaxRequest, AjaxResponse, Completion, Exchange, RequestOptions};
use crate::error::Error;
use crate::http::{HttpRequest, ResponseBody};

/// Manager-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Exchanges allowed on the wire at once.
    pub pool_size: usize,
    /// Total attempts per request; 1 means no retry.
    pub max_retries: u32,
    /// Timeout for requests that do not set their own; 0 disables it.
    pub timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_retries: 1,
            timeout_ms: 0,
        }
    }
}

struct Queued {
    priority: u32,
    seq: u64,
    request: Arc<ManagedRequest>,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap pops the greatest element; invert so the lowest
    // (priority, seq) pair comes out first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

#[derive(Default)]
struct ManagerState {
    active: usize,
    seq: u64,
    queue: BinaryHeap<Queued>,
    requests: HashMap<String, Arc<ManagedRequest>>,
}

struct ManagerInner {
    config: ManagerConfig,
    state: Mutex<ManagerState>,
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A pool of `XhrIo` objects shared by many requests. Clones share the pool.
#[derive(Clone)]
pub struct XhrManager {
    inner: Arc<ManagerInner>,
}

impl XhrManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Queue a request. Fails with `IdInUse` while another request with the
    /// same id is still queued or in flight, and with `Io` when its first
    /// attempt is dispatched at once but no worker thread can be started.
    pub fn send(
        &self,
        id: Option<String>,
        request: HttpRequest,
        options: &RequestOptions,
        on_complete: Completion,
    ) -> Result<Arc<ManagedRequest>, Error> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let timeout_ms = match options.timeout_ms {
            0 => self.inner.config.timeout_ms,
            ms => ms,
        };
        let managed = Arc::new_cyclic(|this| ManagedRequest {
            this: this.clone(),
            id: id.clone(),
            request,
            timeout_ms,
            with_credentials: options.with_credentials,
            max_attempts: options.max_retries.unwrap_or(self.inner.config.max_retries).max(1),
            manager: Arc::downgrade(&self.inner),
            state: Mutex::new(ManagedState {
                completion: Some(on_complete),
                ..ManagedState::default()
            }),
        });

        {
            let mut state = self.inner.state();
            if state.requests.contains_key(&id) {
                return Err(Error::IdInUse(id));
            }
            state.requests.insert(id.clone(), managed.clone());
            let seq = state.seq;
            state.seq += 1;
            state.queue.push(Queued {
                priority: options.priority.unwrap_or(0),
                seq,
                request: managed.clone(),
            });
        }
        debug!("queued request {id}");

        // A request that cannot start right away is reported to the caller
        // here rather than through its completion.
        let mut own_error = None;
        let mut others = Vec::new();
        for (request, e) in pump(&self.inner) {
            if Arc::ptr_eq(&request, &managed) {
                own_error = Some(e);
            } else {
                others.push((request, e));
            }
        }
        if own_error.is_some() {
            // Its completion is dropped unused.
            release(&managed);
        }
        settle_failed_starts(others);
        match own_error {
            Some(e) => Err(e),
            None => Ok(managed),
        }
    }

    /// Abort the tracked request with this id, if any.
    pub fn abort_id(&self, id: &str) -> bool {
        let found = self.inner.state().requests.get(id).cloned();
        match found {
            Some(request) => {
                abort_request(&request);
                true
            }
            None => false,
        }
    }

    /// Requests queued or in flight.
    pub fn outstanding(&self) -> usize {
        self.inner.state().requests.len()
    }

    /// Requests currently on the wire.
    pub fn active(&self) -> usize {
        self.inner.state().active
    }
}

impl AjaxImpl for XhrManager {
    fn issue_request(
        &self,
        request: HttpRequest,
        on_complete: Completion,
        options: &RequestOptions,
    ) -> Result<Arc<dyn Exchange>, Error> {
        let managed: Arc<dyn Exchange> = self.send(options.id.clone(), request, options, on_complete)?;
        Ok(managed)
    }
}

/// Dispatch queued requests while the pool has room. Returns the requests
/// whose first attempt could not be started; they still hold a pool slot.
fn pump(inner: &Arc<ManagerInner>) -> Vec<(Arc<ManagedRequest>, Error)> {
    let mut failed = Vec::new();
    loop {
        let next = {
            let mut state = inner.state();
            if state.active >= inner.config.pool_size.max(1) {
                return failed;
            }
            match state.queue.pop() {
                Some(queued) => {
                    state.active += 1;
                    queued.request
                }
                None => return failed,
            }
        };
        next.state().dispatched = true;
        if let Err(e) = start_attempt(&next) {
            failed.push((next, e));
        }
    }
}

/// Finish requests that could not start, reporting the error as a
/// transport failure.
fn settle_failed_starts(failed: Vec<(Arc<ManagedRequest>, Error)>) {
    for (request, e) in failed {
        warn!("request {} could not start: {e}", request.id);
        request.state().start_error = Some(e.to_string());
        finish(&request);
    }
}

/// Start the next attempt on a fresh `XhrIo`. On error the previous
/// attempt, if any, stays the visible one.
fn start_attempt(request: &Arc<ManagedRequest>) -> Result<(), Error> {
    let xhr = XhrIo::new();
    xhr.set_timeout_interval(request.timeout_ms);
    xhr.set_with_credentials(request.with_credentials);
    let (attempt, previous) = {
        let mut state = request.state();
        if state.aborted {
            drop(state);
            finish(request);
            return Ok(());
        }
        state.attempts += 1;
        (state.attempts, state.xhr.replace(xhr.clone()))
    };
    debug!("request {} attempt {attempt}/{}", request.id, request.max_attempts);

    let owner = request.clone();
    xhr.listen_complete(move |xhr| on_attempt_complete(&owner, xhr));
    if let Err(e) = xhr.send(request.request.clone()) {
        let mut state = request.state();
        state.attempts -= 1;
        state.xhr = previous;
        return Err(e);
    }
    // An abort that arrived before `send` found the attempt idle.
    if request.state().aborted {
        xhr.abort_with(ErrorCode::Abort);
    }
    Ok(())
}

fn on_attempt_complete(request: &Arc<ManagedRequest>, xhr: &XhrIo) {
    let retry = {
        let state = request.state();
        !state.aborted && state.attempts < request.max_attempts && should_retry(xhr)
    };
    if retry {
        warn!("request {} failed ({:?}), retrying", request.id, xhr.last_error_code());
        if let Err(e) = start_attempt(request) {
            settle_failed_starts(vec![(request.clone(), e)]);
        }
    } else {
        finish(request);
    }
}

fn should_retry(xhr: &XhrIo) -> bool {
    match xhr.last_error_code() {
        ErrorCode::Timeout | ErrorCode::Exception => true,
        ErrorCode::HttpError => xhr.status().map(|s| s >= 500).unwrap_or(false),
        ErrorCode::NoError | ErrorCode::Abort => false,
    }
}

fn abort_request(request: &Arc<ManagedRequest>) {
    let xhr = {
        let mut state = request.state();
        if state.finished {
            return;
        }
        state.aborted = true;
        if state.dispatched {
            state.xhr.clone()
        } else {
            None
        }
    };
    match xhr {
        // Completes through the attempt listener, which sees `aborted`.
        Some(xhr) => xhr.abort_with(ErrorCode::Abort),
        // Dispatched but not yet started: `start_attempt` sees `aborted`.
        None if request.state().dispatched => {}
        None => finish(request),
    }
}

/// Release the request's pool slot and id, then report the outcome.
fn finish(request: &Arc<ManagedRequest>) {
    if let Some(completion) = release(request) {
        completion(request.as_ref());
    }
}

/// Mark the request finished, free its slot and id, and hand back its
/// completion. `None` if it had already finished.
fn release(request: &Arc<ManagedRequest>) -> Option<Completion> {
    let (completion, dispatched) = {
        let mut state = request.state();
        if state.finished {
            return None;
        }
        state.finished = true;
        (state.completion.take(), state.dispatched)
    };

    if let Some(inner) = request.manager.upgrade() {
        {
            let mut state = inner.state();
            if dispatched {
                state.active = state.active.saturating_sub(1);
            } else {
                state.queue.retain(|queued| queued.request.id != request.id);
            }
            state.requests.remove(&request.id);
        }
        settle_failed_starts(pump(&inner));
    }
    completion
}

#[derive(Default)]
struct ManagedState {
    attempts: u32,
    dispatched: bool,
    aborted: bool,
    finished: bool,
    xhr: Option<XhrIo>,
    /// Why the first attempt never started.
    start_error: Option<String>,
    completion: Option<Completion>,
}

/// Handle for a request submitted through an `XhrManager`. Reads reflect
/// the most recent attempt.
pub struct ManagedRequest {
    this: Weak<ManagedRequest>,
    id: String,
    request: HttpRequest,
    timeout_ms: u64,
    with_credentials: bool,
    max_attempts: u32,
    manager: Weak<ManagerInner>,
    state: Mutex<ManagedState>,
}

impl ManagedRequest {
    fn state(&self) -> MutexGuard<'_, ManagedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.state().attempts
    }

    fn current(&self) -> Option<XhrIo> {
        self.state().xhr.clone()
    }
}

impl AjaxRequest for ManagedRequest {
    fn abort(&self) {
        if let Some(this) = self.this.upgrade() {
            abort_request(&this);
        }
    }
}

impl AjaxResponse for ManagedRequest {
    /// -1 once aborted, whatever the current attempt reports.
    fn status(&self) -> Result<i32, Error> {
        let (aborted, xhr, start_failed) = {
            let state = self.state();
            (state.aborted, state.xhr.clone(), state.start_error.is_some())
        };
        match xhr {
            _ if aborted => Ok(-1),
            Some(xhr) => xhr.status(),
            None if start_failed => Ok(0),
            None => Ok(-1),
        }
    }

    fn status_text(&self) -> String {
        let (xhr, start_error) = {
            let state = self.state();
            (state.xhr.clone(), state.start_error.clone())
        };
        match xhr {
            Some(xhr) => xhr.status_text(),
            None => start_error.unwrap_or_default(),
        }
    }

    fn body(&self) -> ResponseBody {
        self.current().map(|xhr| xhr.body()).unwrap_or_default()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.current().and_then(|xhr| xhr.response_header(name))
    }

    fn was_aborted(&self) -> bool {
        self.state().aborted
    }
}
