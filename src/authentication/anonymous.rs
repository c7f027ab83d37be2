use axum::http::{HeaderMap, header::AUTHORIZATION};

use super::RequestAuthenticator;
use crate::{Identity, Result};

/// Matches requests whose `Authorization` header is absent or blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthenticator;

#[async_trait::async_trait]
impl RequestAuthenticator for AnonymousAuthenticator {
    async fn authenticate_request(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        let blank = headers
            .get(AUTHORIZATION)
            .is_none_or(|value| value.as_bytes().trim_ascii().is_empty());
        Ok(blank.then(Identity::anonymous))
    }
}
