use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::Serialize;

use crate::{CancelSignal, Result, SnipeItError};

/// A request built by an API service, executed by
/// [`crate::SnipeItClient::execute`].
///
/// The body is kept as the original encoded bytes so every retry sends a
/// fresh copy of it.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the client's base URL, e.g. `api/v1/hardware`.
    pub path: String,
    pub body: Option<Vec<u8>>,
    /// Extra headers sent on top of the client defaults.
    pub headers: HeaderMap,
    pub cancel: CancelSignal,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Creates a request with `body` encoded as JSON.
    pub fn json<B>(method: Method, path: impl Into<String>, body: &B) -> Result<Self>
    where
        B: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(body).map_err(|err| {
            SnipeItError::InvalidRequest(format!("invalid JSON request body: {err}"))
        })?;
        Ok(Self::new(method, path).with_body(bytes))
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}
