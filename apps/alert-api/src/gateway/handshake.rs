//! Connection handshake: authenticate the token presented on `/ws/{user_id}`.

use std::fmt;

use crate::auth::tokens::TokenKeys;
use crate::db::users::UserStore;
use crate::models::user::UserRole;

use super::events::{
    CLOSE_ACCOUNT_DEACTIVATED, CLOSE_IDENTITY_MISMATCH, CLOSE_INTERNAL_ERROR, CLOSE_INVALID_TOKEN,
    CLOSE_NO_TOKEN, CLOSE_USER_NOT_FOUND,
};

/// Why a connection was refused. Each variant maps to a distinct close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    MissingToken,
    InvalidToken,
    IdentityMismatch,
    UserNotFound,
    AccountDisabled,
    StoreUnavailable,
}

impl HandshakeError {
    pub fn close_code(self) -> u16 {
        match self {
            HandshakeError::MissingToken => CLOSE_NO_TOKEN,
            HandshakeError::InvalidToken => CLOSE_INVALID_TOKEN,
            HandshakeError::IdentityMismatch => CLOSE_IDENTITY_MISMATCH,
            HandshakeError::UserNotFound => CLOSE_USER_NOT_FOUND,
            HandshakeError::AccountDisabled => CLOSE_ACCOUNT_DEACTIVATED,
            HandshakeError::StoreUnavailable => CLOSE_INTERNAL_ERROR,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            HandshakeError::MissingToken => "No token provided",
            HandshakeError::InvalidToken => "Invalid token",
            HandshakeError::IdentityMismatch => "Token user_id mismatch",
            HandshakeError::UserNotFound => "User not found",
            HandshakeError::AccountDisabled => "Account deactivated",
            HandshakeError::StoreUnavailable => "User lookup failed",
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl std::error::Error for HandshakeError {}

/// An authenticated recipient, ready to be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub role: UserRole,
}

/// Validate `token` for a connection that claims to be `claimed_user_id`.
///
/// The role comes from the user store, not from the token claims, so a
/// reconnect always picks up the current role.
pub async fn authenticate(
    keys: &TokenKeys,
    users: &dyn UserStore,
    claimed_user_id: i64,
    token: Option<&str>,
) -> Result<Recipient, HandshakeError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(HandshakeError::MissingToken)?;

    let claims = keys.decode(token).map_err(|e| {
        tracing::debug!(?e, claimed_user_id, "connection token rejected");
        HandshakeError::InvalidToken
    })?;

    if claims.user_id != claimed_user_id {
        return Err(HandshakeError::IdentityMismatch);
    }

    let user = users
        .find_user(claimed_user_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e.message, claimed_user_id, "user lookup failed during handshake");
            HandshakeError::StoreUnavailable
        })?
        .ok_or(HandshakeError::UserNotFound)?;

    if !user.is_active {
        return Err(HandshakeError::AccountDisabled);
    }

    Ok(Recipient {
        user_id: user.id,
        role: user.role,
    })
}
