use std::{fmt, io::Write};

use reqwest::{header::HeaderMap, StatusCode, Url};
use serde::de::DeserializeOwned;

/// Status line and headers of a successful response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Url,
}

/// Slot a successful JSON body is decoded into.
pub trait JsonSlot: Send {
    fn fill(&mut self, body: &[u8]) -> serde_json::Result<()>;
}

impl<T> JsonSlot for Option<T>
where
    T: DeserializeOwned + Send,
{
    fn fill(&mut self, body: &[u8]) -> serde_json::Result<()> {
        *self = Some(serde_json::from_slice(body)?);
        Ok(())
    }
}

/// Where the body of a successful response goes.
#[derive(Default)]
pub enum DecodeTarget<'a> {
    /// Drop the body.
    #[default]
    Discard,
    /// Decode the body as JSON. An empty body leaves the slot untouched.
    Json(&'a mut dyn JsonSlot),
    /// Copy the body bytes verbatim.
    Raw(&'a mut (dyn Write + Send)),
}

impl<'a> DecodeTarget<'a> {
    pub fn json<T>(slot: &'a mut Option<T>) -> Self
    where
        T: DeserializeOwned + Send,
    {
        Self::Json(slot)
    }

    pub fn raw<W>(sink: &'a mut W) -> Self
    where
        W: Write + Send,
    {
        Self::Raw(sink)
    }

    /// Reborrows the target for one more attempt.
    pub(crate) fn reborrow(&mut self) -> DecodeTarget<'_> {
        match self {
            Self::Discard => DecodeTarget::Discard,
            Self::Json(slot) => DecodeTarget::Json(&mut **slot),
            Self::Raw(sink) => DecodeTarget::Raw(&mut **sink),
        }
    }
}

impl fmt::Debug for DecodeTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("Discard"),
            Self::Json(_) => f.write_str("Json(..)"),
            Self::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}
