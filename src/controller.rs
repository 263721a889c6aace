//! The remote side of a read.
//!
//! Implementations own the OpenNebula transport (XML-RPC client, credentials,
//! timeouts). The lookup engine only needs two calls from it.

use std::sync::Arc;

use serde_json::Value;

use crate::error::TransportError;
use crate::types::{User, UserId};

/// Access to the OpenNebula user pool.
///
/// # Example
///
/// ```
/// use hemmer_provider_opennebula::controller::Controller;
/// use hemmer_provider_opennebula::error::TransportError;
/// use hemmer_provider_opennebula::types::{User, UserId};
///
/// struct Offline;
///
/// #[async_trait::async_trait]
/// impl Controller for Offline {
///     async fn list_users(&self) -> Result<Vec<User>, TransportError> {
///         Err(TransportError::new("not connected"))
///     }
///
///     async fn user_quotas(&self, _id: UserId) -> Result<serde_json::Value, TransportError> {
///         Err(TransportError::new("not connected"))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Controller: Send + Sync + 'static {
    /// List every user in the pool, in pool order.
    async fn list_users(&self) -> Result<Vec<User>, TransportError>;

    /// Fetch the raw quota structure of one user.
    ///
    /// Only called for the selected user, and only when quotas were requested.
    async fn user_quotas(&self, id: UserId) -> Result<Value, TransportError>;
}

#[async_trait::async_trait]
impl<T: Controller + ?Sized> Controller for Arc<T> {
    async fn list_users(&self) -> Result<Vec<User>, TransportError> {
        (**self).list_users().await
    }

    async fn user_quotas(&self, id: UserId) -> Result<Value, TransportError> {
        (**self).user_quotas(id).await
    }
}

#[async_trait::async_trait]
impl<T: Controller + ?Sized> Controller for Box<T> {
    async fn list_users(&self) -> Result<Vec<User>, TransportError> {
        (**self).list_users().await
    }

    async fn user_quotas(&self, id: UserId) -> Result<Value, TransportError> {
        (**self).user_quotas(id).await
    }
}
