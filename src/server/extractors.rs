//! Request body extractor with JSON error responses.
//!
//! Game servers and the admin panel send loosely-formed bodies: sometimes
//! nothing at all, sometimes without a JSON content type. [`JsonBody`] reads
//! the raw bytes, treats an empty body as `T::default()`, and turns any parse
//! failure into a [`ServiceError::InvalidParameter`] so the caller still gets
//! the usual `{success:false, error}` body instead of axum's plain-text
//! rejection.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ServiceError::InvalidParameter(e.body_text()))?;
        parse_body(&bytes).map(JsonBody)
    }
}

/// Parse a JSON body, treating an empty or whitespace-only body as `T::default()`.
pub fn parse_body<T>(bytes: &[u8]) -> Result<T, ServiceError>
where
    T: DeserializeOwned + Default,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| ServiceError::InvalidParameter(e.to_string()))
}

impl<T> std::ops::Deref for JsonBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
