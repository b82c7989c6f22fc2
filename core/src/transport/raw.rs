//! Ready-state request object: `open`, set headers, `send`, and follow the
//! exchange through a change listener until it reaches `Done`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use super::wire::{self, WireOutcome};
use super::{AjaxImpl, AjaxRequest, AjaxResponse, Completion, Exchange, RequestOptions};
use crate::error::Error;
use crate::http::{find_header, Body, Headers, HttpRequest, ResponseBody};

/// Progress of an exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

type ReadyListener = Box<dyn FnMut(&RawRequest, ReadyState) + Send>;

#[derive(Default)]
struct RawState {
    ready_state: ReadyState,
    method: String,
    uri: String,
    headers: Headers,
    sent: bool,
    /// Set once an exchange has ended; status and body are readable.
    finished: bool,
    timeout_ms: u64,
    with_credentials: bool,
    status: i32,
    status_text: String,
    response: ResponseBody,
    response_headers: Headers,
    /// Bumped on `open` and `abort` so a stale worker can tell it lost.
    generation: u64,
}

/// The listener plus transitions not yet delivered to it. One thread
/// delivers at a time; transitions raised meanwhile, from any thread, are
/// queued and handed to the listener they were raised for.
#[derive(Default)]
struct Dispatch {
    listener: Option<ReadyListener>,
    listener_id: u64,
    pending: VecDeque<(u64, ReadyState)>,
    delivering: bool,
}

impl Dispatch {
    /// Return a listener taken out for delivery, unless it was replaced.
    fn restore(&mut self, held: Option<(u64, ReadyListener)>) {
        if let Some((id, listener)) = held {
            if self.listener_id == id && self.listener.is_none() {
                self.listener = Some(listener);
            }
        }
    }
}

#[derive(Default)]
struct RawInner {
    state: Mutex<RawState>,
    dispatch: Mutex<Dispatch>,
    /// Serializes `issue_request` calls on one object.
    issuing: Mutex<()>,
}

/// A request object driven through `ReadyState`. Clones share state.
#[derive(Clone, Default)]
pub struct RawRequest {
    inner: Arc<RawInner>,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RawState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    fn dispatch(&self) -> MutexGuard<'_, Dispatch> {
        self.inner.dispatch.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install the listener called on every ready-state transition.
    pub fn on_ready_state_change<F>(&self, listener: F)
    where
        F: FnMut(&RawRequest, ReadyState) + Send + 'static,
    {
        self.install_listener(Box::new(listener));
    }

    fn install_listener(&self, listener: ReadyListener) -> u64 {
        let mut dispatch = self.dispatch();
        dispatch.listener_id += 1;
        dispatch.listener = Some(listener);
        dispatch.listener_id
    }

    fn remove_listener(&self, id: u64) {
        let mut dispatch = self.dispatch();
        if dispatch.listener_id == id {
            dispatch.listener = None;
            dispatch.listener_id += 1;
        }
    }

    /// Announce `ready_state` to the current listener. If another call is
    /// already delivering, the transition is queued and that call delivers
    /// it once the running listener returns.
    fn fire(&self, ready_state: ReadyState) {
        let mut dispatch = self.dispatch();
        let id = dispatch.listener_id;
        dispatch.pending.push_back((id, ready_state));
        if dispatch.delivering {
            return;
        }
        dispatch.delivering = true;

        let mut held: Option<(u64, ReadyListener)> = None;
        while let Some((id, ready_state)) = dispatch.pending.pop_front() {
            if held.as_ref().map(|(held_id, _)| *held_id) != Some(id) {
                dispatch.restore(held.take());
                if dispatch.listener_id == id {
                    held = dispatch.listener.take().map(|listener| (id, listener));
                }
            }
            if let Some((_, listener)) = held.as_mut() {
                drop(dispatch);
                listener(self, ready_state);
                dispatch = self.dispatch();
            }
        }
        dispatch.restore(held);
        dispatch.delivering = false;
    }

    pub fn open(&self, method: &str, uri: &str) -> Result<(), Error> {
        {
            let mut state = self.state();
            if state.sent {
                return Err(Error::InvalidState("cannot open while a request is in flight"));
            }
            state.ready_state = ReadyState::Opened;
            state.method = method.to_string();
            state.uri = uri.to_string();
            state.headers.clear();
            state.finished = false;
            state.generation += 1;
        }
        self.fire(ReadyState::Opened);
        Ok(())
    }

    /// Add a request header. Repeated names are combined with `, `.
    pub fn set_request_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let mut state = self.state();
        if state.ready_state != ReadyState::Opened || state.sent {
            return Err(Error::InvalidState("headers can only be set after open and before send"));
        }
        match state.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => state.headers.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn set_timeout(&self, timeout_ms: u64) {
        self.state().timeout_ms = timeout_ms;
    }

    pub fn set_with_credentials(&self, with_credentials: bool) {
        self.state().with_credentials = with_credentials;
    }

    /// Send the opened request. A missing body is sent as the empty string.
    pub fn send(&self, body: Option<Body>) -> Result<(), Error> {
        let (request, timeout_ms, generation) = {
            let mut state = self.state();
            if state.ready_state != ReadyState::Opened || state.sent {
                return Err(Error::InvalidState("send requires an opened, unsent request"));
            }
            state.sent = true;
            if state.with_credentials {
                debug!("{} {} with credentials", state.method, state.uri);
            }
            let request = HttpRequest {
                method: state.method.clone(),
                uri: state.uri.clone(),
                headers: state.headers.clone(),
                body: Some(body.unwrap_or_else(|| Body::Text(String::new()))),
            };
            (request, state.timeout_ms, state.generation)
        };

        let raw = self.clone();
        let spawned = wire::spawn("ajax-xmlhttprequest", move || {
            let outcome = wire::perform(&request, timeout_ms);
            raw.complete(generation, outcome);
        });
        if let Err(e) = spawned {
            let mut state = self.state();
            if !state.sent || state.generation != generation {
                // Aborted in the meantime; `Done` has been announced.
                return Ok(());
            }
            state.sent = false;
            return Err(e);
        }
        Ok(())
    }

    fn complete(&self, generation: u64, outcome: WireOutcome) {
        let response = {
            let mut state = self.state();
            if state.generation != generation || !state.sent {
                return;
            }
            match outcome {
                WireOutcome::Response(response) => Some(response),
                WireOutcome::TimedOut => {
                    Self::settle(&mut state, -1, String::new());
                    None
                }
                WireOutcome::Failed(message) => {
                    Self::settle(&mut state, 0, message);
                    None
                }
            }
        };

        if let Some(response) = response {
            if !self.advance(generation, ReadyState::HeadersReceived, |state| {
                state.status = i32::from(response.status);
                state.status_text = response.status_text.clone();
                state.response_headers = response.headers.clone();
            }) {
                return;
            }
            if !self.advance(generation, ReadyState::Loading, |_| {}) {
                return;
            }
            let done = self.advance(generation, ReadyState::Done, |state| {
                state.response = response.body.clone();
                state.sent = false;
                state.finished = true;
            });
            if !done {
                return;
            }
        }
        self.fire(ReadyState::Done);
    }

    /// Move to `next` unless the exchange was aborted or reopened, then
    /// notify the listener. `Done` is announced by the caller.
    fn advance<F>(&self, generation: u64, next: ReadyState, update: F) -> bool
    where
        F: FnOnce(&mut RawState),
    {
        {
            let mut state = self.state();
            if state.generation != generation || !state.sent {
                return false;
            }
            update(&mut state);
            state.ready_state = next;
        }
        if next != ReadyState::Done {
            self.fire(next);
        }
        true
    }

    fn settle(state: &mut RawState, status: i32, status_text: String) {
        state.status = status;
        state.status_text = status_text;
        state.response = ResponseBody::default();
        state.response_headers.clear();
        state.ready_state = ReadyState::Done;
        state.sent = false;
        state.finished = true;
    }

    /// `open`, set every header, then `send`.
    fn start(&self, request: HttpRequest) -> Result<(), Error> {
        self.open(&request.method, &request.uri)?;
        for (name, value) in &request.headers {
            self.set_request_header(name, value)?;
        }
        self.send(request.body)
    }

    /// Abort an in-flight exchange: the state returns to `Unsent` and the
    /// listener is told the exchange is `Done`. Does nothing otherwise.
    pub fn abort(&self) {
        {
            let mut state = self.state();
            if !state.sent {
                if state.ready_state == ReadyState::Opened {
                    state.ready_state = ReadyState::Unsent;
                }
                return;
            }
            state.generation += 1;
            state.sent = false;
            state.finished = true;
            state.status = -1;
            state.status_text.clear();
            state.response = ResponseBody::default();
            state.response_headers.clear();
            state.ready_state = ReadyState::Unsent;
        }
        self.fire(ReadyState::Done);
    }
}

impl AjaxImpl for RawRequest {
    fn issue_request(
        &self,
        request: HttpRequest,
        on_complete: Completion,
        options: &RequestOptions,
    ) -> Result<Arc<dyn Exchange>, Error> {
        let _issuing = self.inner.issuing.lock().unwrap_or_else(|e| e.into_inner());
        if self.state().sent {
            return Err(Error::InvalidState("request object is already in flight"));
        }
        self.set_timeout(options.timeout_ms);
        self.set_with_credentials(options.with_credentials);

        let mut on_complete = Some(on_complete);
        let listener_id = self.install_listener(Box::new(move |raw: &RawRequest, ready_state: ReadyState| {
            if ready_state == ReadyState::Done {
                if let Some(callback) = on_complete.take() {
                    callback(raw);
                }
            }
        }));
        if let Err(e) = self.start(request) {
            self.remove_listener(listener_id);
            return Err(e);
        }
        Ok(Arc::new(self.clone()))
    }
}

impl AjaxRequest for RawRequest {
    fn abort(&self) {
        RawRequest::abort(self);
    }
}

impl AjaxResponse for RawRequest {
    /// Errors until the exchange has ended.
    fn status(&self) -> Result<i32, Error> {
        let state = self.state();
        if state.finished {
            Ok(state.status)
        } else {
            Err(Error::InvalidState("status read before the request completed"))
        }
    }

    fn status_text(&self) -> String {
        self.state().status_text.clone()
    }

    fn body(&self) -> ResponseBody {
        self.state().response.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        find_header(&self.state().response_headers, name).map(str::to_string)
    }

    fn was_aborted(&self) -> bool {
        let state = self.state();
        state.finished && state.ready_state == ReadyState::Unsent
    }
}
