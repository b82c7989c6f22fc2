//! Event-style request object: configure, `send`, and get told once when
//! the exchange is complete.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use super::wire::{self, WireOutcome, WireResponse};
use super::{AjaxImpl, AjaxRequest, AjaxResponse, Completion, Exchange, RequestOptions};
use crate::error::Error;
use crate::http::{HttpRequest, ResponseBody};
use crate::response::is_success;

/// Why the last exchange ended the way it did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorCode {
    #[default]
    NoError,
    /// The request never produced an HTTP response.
    Exception,
    /// The server answered with a non-success status.
    HttpError,
    Abort,
    Timeout,
}

type CompleteListener = Box<dyn FnOnce(&XhrIo) + Send>;

#[derive(Default)]
struct XhrState {
    timeout_ms: u64,
    with_credentials: bool,
    active: bool,
    response: Option<WireResponse>,
    last_error: ErrorCode,
    last_error_text: String,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    pending: Vec<(u64, CompleteListener)>,
}

#[derive(Default)]
struct XhrInner {
    state: Mutex<XhrState>,
    listeners: Mutex<Listeners>,
}

/// A single request object. Clones share state.
///
/// Completion listeners run on the worker thread, or on the aborting
/// thread when the exchange is cancelled. Each listener fires once.
#[derive(Clone, Default)]
pub struct XhrIo {
    inner: Arc<XhrInner>,
}

impl XhrIo {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, XhrState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_timeout_interval(&self, timeout_ms: u64) {
        self.state().timeout_ms = timeout_ms;
    }

    pub fn timeout_interval(&self) -> u64 {
        self.state().timeout_ms
    }

    pub fn set_with_credentials(&self, with_credentials: bool) {
        self.state().with_credentials = with_credentials;
    }

    pub fn with_credentials(&self) -> bool {
        self.state().with_credentials
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener for the next completion.
    pub fn listen_complete<F>(&self, listener: F)
    where
        F: FnOnce(&XhrIo) + Send + 'static,
    {
        self.add_listener(Box::new(listener));
    }

    fn add_listener(&self, listener: CompleteListener) -> u64 {
        let mut listeners = self.listeners();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.pending.push((id, listener));
        id
    }

    fn remove_listener(&self, id: u64) {
        self.listeners().pending.retain(|(pending, _)| *pending != id);
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    /// Start the exchange on a worker thread.
    pub fn send(&self, request: HttpRequest) -> Result<(), Error> {
        self.start(request, None)
    }

    /// Claim the object and start the exchange. When `issued` is given, its
    /// options and completion listener are installed only once the object
    /// is known to be idle, and the listener is removed again if the worker
    /// cannot be started.
    fn start(&self, request: HttpRequest, issued: Option<(CompleteListener, &RequestOptions)>) -> Result<(), Error> {
        let (timeout_ms, listener_id) = {
            let mut state = self.state();
            if state.active {
                return Err(Error::InvalidState("request object is already active"));
            }
            let listener_id = match issued {
                Some((listener, options)) => {
                    state.timeout_ms = options.timeout_ms;
                    state.with_credentials = options.with_credentials;
                    Some(self.add_listener(listener))
                }
                None => None,
            };
            state.active = true;
            state.response = None;
            state.last_error = ErrorCode::NoError;
            state.last_error_text.clear();
            if state.with_credentials {
                debug!("{} {} with credentials", request.method, request.uri);
            }
            (state.timeout_ms, listener_id)
        };

        let xhr = self.clone();
        let spawned = wire::spawn("ajax-xhrio", move || {
            let outcome = wire::perform(&request, timeout_ms);
            xhr.finish(outcome);
        });
        if let Err(e) = spawned {
            {
                let mut state = self.state();
                if !state.active {
                    // Aborted in the meantime; the listeners have run.
                    return Ok(());
                }
                state.active = false;
            }
            if let Some(id) = listener_id {
                self.remove_listener(id);
            }
            return Err(e);
        }
        Ok(())
    }

    fn finish(&self, outcome: WireOutcome) {
        {
            let mut state = self.state();
            if !state.active {
                // Aborted while on the wire.
                return;
            }
            state.active = false;
            match outcome {
                WireOutcome::Response(response) => {
                    state.last_error = if is_success(i32::from(response.status)) {
                        ErrorCode::NoError
                    } else {
                        ErrorCode::HttpError
                    };
                    state.response = Some(response);
                }
                WireOutcome::TimedOut => state.last_error = ErrorCode::Timeout,
                WireOutcome::Failed(message) => {
                    state.last_error = ErrorCode::Exception;
                    state.last_error_text = message;
                }
            }
        }
        self.dispatch_complete();
    }

    /// Cancel an active exchange, completing it with `code`.
    pub fn abort_with(&self, code: ErrorCode) {
        {
            let mut state = self.state();
            if !state.active {
                return;
            }
            state.active = false;
            state.response = None;
            state.last_error = code;
        }
        self.dispatch_complete();
    }

    fn dispatch_complete(&self) {
        let listeners: Vec<(u64, CompleteListener)> = self.listeners().pending.drain(..).collect();
        for (_, listener) in listeners {
            listener(self);
        }
    }

    pub fn last_error_code(&self) -> ErrorCode {
        self.state().last_error
    }

    /// Message of the transport failure behind `ErrorCode::Exception`.
    pub fn last_error(&self) -> String {
        self.state().last_error_text.clone()
    }
}

impl AjaxImpl for XhrIo {
    fn issue_request(
        &self,
        request: HttpRequest,
        on_complete: Completion,
        options: &RequestOptions,
    ) -> Result<Arc<dyn Exchange>, Error> {
        let listener: CompleteListener = Box::new(move |xhr: &XhrIo| on_complete(xhr));
        self.start(request, Some((listener, options)))?;
        Ok(Arc::new(self.clone()))
    }
}

impl AjaxRequest for XhrIo {
    fn abort(&self) {
        self.abort_with(ErrorCode::Abort);
    }
}

impl AjaxResponse for XhrIo {
    /// HTTP status; 0 when the request failed before any response and -1
    /// when it was aborted or timed out.
    fn status(&self) -> Result<i32, Error> {
        let state = self.state();
        Ok(match (&state.response, state.last_error) {
            (Some(response), _) => i32::from(response.status),
            (None, ErrorCode::Exception) => 0,
            (None, _) => -1,
        })
    }

    fn status_text(&self) -> String {
        let state = self.state();
        match &state.response {
            Some(response) => response.status_text.clone(),
            None => state.last_error_text.clone(),
        }
    }

    fn body(&self) -> ResponseBody {
        self.state()
            .response
            .as_ref()
            .map(|r| r.body.clone())
            .unwrap_or_default()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.state().response.as_ref().and_then(|r| r.header(name))
    }

    fn was_aborted(&self) -> bool {
        self.last_error_code() == ErrorCode::Abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn abort_before_completion_fires_listener_once() {
        let xhr = XhrIo::new();
        let (tx, rx) = mpsc::channel();
        xhr.listen_complete(move |x| {
            tx.send((x.status().unwrap(), x.was_aborted())).unwrap();
        });
        xhr.state().active = true;
        xhr.abort();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), (-1, true));
        xhr.finish(WireOutcome::TimedOut);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(xhr.last_error_code(), ErrorCode::Abort);
    }

    #[test]
    fn abort_when_idle_is_a_no_op() {
        let xhr = XhrIo::new();
        xhr.abort();
        assert_eq!(xhr.last_error_code(), ErrorCode::NoError);
        assert!(!xhr.was_aborted());
    }

    #[test]
    fn finish_records_http_errors_and_timeouts() {
        let xhr = XhrIo::new();
        xhr.state().active = true;
        xhr.finish(WireOutcome::Response(WireResponse {
            status: 503,
            status_text: "Service Unavailable".into(),
            headers: vec![("Content-Type".into(), "text/plain".into())],
            body: ResponseBody::Text("down".into()),
        }));
        assert_eq!(xhr.last_error_code(), ErrorCode::HttpError);
        assert_eq!(xhr.status().unwrap(), 503);
        assert_eq!(xhr.response_header("content-type").as_deref(), Some("text/plain"));

        xhr.state().active = true;
        xhr.finish(WireOutcome::TimedOut);
        assert_eq!(xhr.status().unwrap(), -1);
        assert!(!xhr.was_aborted());
    }

    #[test]
    fn network_failure_reports_status_zero() {
        let xhr = XhrIo::new();
        xhr.state().active = true;
        xhr.finish(WireOutcome::Failed("connection refused".into()));
        assert_eq!(xhr.status().unwrap(), 0);
        assert_eq!(xhr.status_text(), "connection refused");
        assert_eq!(xhr.last_error_code(), ErrorCode::Exception);
    }

    #[test]
    fn second_send_while_active_is_rejected() {
        let xhr = XhrIo::new();
        xhr.state().active = true;
        let request = HttpRequest {
            method: "GET".into(),
            uri: "http://127.0.0.1:9/".into(),
            headers: Vec::new(),
            body: None,
        };
        assert!(matches!(xhr.send(request), Err(Error::InvalidState(_))));
    }

    #[test]
    fn busy_object_rejects_a_second_request_without_touching_it() {
        let xhr = XhrIo::new();
        xhr.set_timeout_interval(500);
        let (tx, rx) = mpsc::channel::<&'static str>();
        let first = tx.clone();
        xhr.listen_complete(move |_| first.send("first").unwrap());
        xhr.state().active = true;

        let request = HttpRequest {
            method: "GET".into(),
            uri: "http://127.0.0.1:9/".into(),
            headers: Vec::new(),
            body: None,
        };
        let options = RequestOptions {
            timeout_ms: 10,
            ..RequestOptions::default()
        };
        let second: Completion = Box::new(move |_| tx.send("second").unwrap());
        let result = xhr.issue_request(request, second, &options);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(xhr.timeout_interval(), 500);

        xhr.finish(WireOutcome::Failed("refused".into()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "first");
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
