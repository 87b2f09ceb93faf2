//! Identity Provider Abstraction
//!
//! Contract for the third-party service that owns user credentials
//! (email/password accounts) and issues short-lived identity tokens.
//!
//! The provider is an external collaborator: the core never inspects
//! credentials itself, it only asks the provider to establish, end, or
//! delete a session and to hand out a token the backend can verify.
//!
//! ## Session change notifications
//!
//! [`IdentityProvider::on_session_change`] registers a listener that is
//! invoked with the current session (or `None`) immediately at registration,
//! and again on every sign-in, sign-out, or account deletion. The returned
//! [`SessionSubscription`] detaches the listener when it is dropped or when
//! [`SessionSubscription::unsubscribe`] is called, whichever comes first.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// A provider-side signed-in account.
///
/// Implementations must not expose tokens through `Debug`.
#[async_trait]
pub trait ProviderSession: Send + Sync + fmt::Debug {
    /// Provider-assigned user identifier.
    fn uid(&self) -> &str;

    /// Email address attached to the account, if the provider knows one.
    fn email(&self) -> Option<&str>;

    /// Returns an identity token for this session.
    ///
    /// With `force_refresh` the provider must mint a new token even if the
    /// cached one has not expired yet.
    async fn id_token(&self, force_refresh: bool) -> Result<String>;
}

/// Shared handle to a provider session.
pub type SharedSession = Arc<dyn ProviderSession>;

/// Callback invoked on every provider session change.
pub type SessionListener = Arc<dyn Fn(Option<SharedSession>) + Send + Sync>;

/// Registration token returned by [`IdentityProvider::on_session_change`].
///
/// The detach closure runs exactly once: on the first call to
/// [`unsubscribe`](Self::unsubscribe) or on drop.
pub struct SessionSubscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl SessionSubscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    /// Detach the listener now.
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    /// Returns `true` until the listener has been detached.
    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Credential-based identity provider.
///
/// # Errors
///
/// Credential problems (wrong password, unknown user, duplicate account,
/// weak password) are reported as [`BridgeError::Rejected`](crate::BridgeError::Rejected);
/// transport problems as [`BridgeError::OperationFailed`](crate::BridgeError::OperationFailed).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a session-change listener.
    ///
    /// The listener is called synchronously with the current session before
    /// this method returns, then on every subsequent change.
    fn on_session_change(&self, listener: SessionListener) -> SessionSubscription;

    /// The session the provider currently holds, if any.
    fn current_session(&self) -> Option<SharedSession>;

    /// Sign in with email and password.
    async fn sign_in_with_credentials(&self, email: &str, password: &str)
        -> Result<SharedSession>;

    /// Create a new account and sign it in.
    async fn create_account_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SharedSession>;

    /// End the current provider session.
    async fn sign_out(&self) -> Result<()>;

    /// Permanently delete the account behind `session`.
    async fn delete_account(&self, session: &dyn ProviderSession) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_detaches_on_drop() {
        let detached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&detached);

        let subscription = SessionSubscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(subscription.is_active());
        drop(subscription);

        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_unsubscribe_runs_once() {
        let detached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&detached);

        let subscription = SessionSubscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subscription.unsubscribe();

        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_subscription() {
        let subscription = SessionSubscription::noop();
        assert!(!subscription.is_active());
        assert_eq!(
            format!("{:?}", subscription),
            "SessionSubscription { active: false }"
        );
    }
}
