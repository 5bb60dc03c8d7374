//! Session guard: a view only mounts for an authenticated user.

use tracing::{debug, info};

use murmur_shared::constants::LOGIN_ROUTE;
use murmur_shared::provider::AuthProvider;
use murmur_shared::{Identity, MurmurError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(Identity),
    /// Send the visitor to this route instead.
    Redirect(&'static str),
}

pub struct SessionGuard;

impl SessionGuard {
    pub async fn check<A: AuthProvider + ?Sized>(auth: &A) -> Result<Access> {
        match auth.current_user().await? {
            Some(identity) => {
                debug!(user = %identity.id, "Session present");
                Ok(Access::Granted(identity))
            }
            None => {
                info!(route = LOGIN_ROUTE, "No session, redirecting");
                Ok(Access::Redirect(LOGIN_ROUTE))
            }
        }
    }

    /// Like [`SessionGuard::check`], but a redirect becomes
    /// [`MurmurError::Unauthenticated`].
    pub async fn require<A: AuthProvider + ?Sized>(auth: &A) -> Result<Identity> {
        match Self::check(auth).await? {
            Access::Granted(identity) => Ok(identity),
            Access::Redirect(_) => Err(MurmurError::Unauthenticated),
        }
    }
}
