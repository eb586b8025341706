//! Bearer-token extractor for protected routes.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use pehchan_core::PublicAccount;

use crate::error::ApiError;
use crate::state::AppState;

/// The account behind a valid `Authorization: Bearer <token>` header.
pub struct CurrentAccount(pub PublicAccount);

#[async_trait]
impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".into()))?;

        let account = state.service.authenticate(token)?;
        Ok(CurrentAccount(account))
    }
}
