//! In-memory exchange for unit tests.

use crate::error::Error;
use crate::http::{find_header, Headers, ResponseBody};
use crate::transport::AjaxResponse;

#[derive(Debug, Clone)]
pub(crate) struct StubResponse {
    status: Option<i32>,
    status_text: String,
    body: ResponseBody,
    headers: Headers,
    aborted: bool,
}

impl StubResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: Some(200),
            status_text: "OK".to_string(),
            body: ResponseBody::Text(body.to_string()),
            headers: Vec::new(),
            aborted: false,
        }
    }

    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::timed_out()
        }
    }

    pub fn timed_out() -> Self {
        Self::ok("").with_status(-1, "")
    }

    /// Status not yet readable.
    pub fn unfinished() -> Self {
        Self {
            status: None,
            ..Self::ok("")
        }
    }

    pub fn with_status(mut self, status: i32, text: &str) -> Self {
        self.status = Some(status);
        self.status_text = text.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }
}

impl AjaxResponse for StubResponse {
    fn status(&self) -> Result<i32, Error> {
        self.status.ok_or(Error::InvalidState("status read before the request completed"))
    }

    fn status_text(&self) -> String {
        self.status_text.clone()
    }

    fn body(&self) -> ResponseBody {
        self.body.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        find_header(&self.headers, name).map(str::to_string)
    }

    fn was_aborted(&self) -> bool {
        self.aborted
    }
}
