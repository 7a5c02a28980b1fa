use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::user::UserRole;

use super::memory::MemoryDb;

/// The fields the connection handshake and auth extractor need about a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub role: UserRole,
    pub is_active: bool,
}

/// Lookup of users by id.
///
/// Backed by the in-memory tables in the server and swappable in tests.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, ApiError>;
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, ApiError> {
        Ok(self.lock().user(id).map(|u| UserRecord {
            id: u.id,
            role: u.role,
            is_active: u.is_active,
        }))
    }
}
