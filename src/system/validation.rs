//! User token validation gating map loading and localization.
//!
//! The token check itself belongs to an external [`TokenAuthority`]. This
//! module only remembers the outcome: the most recent validation call decides
//! whether gated operations run, and a rejected token revokes an earlier
//! acceptance.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::{VpsError, VpsResult};

/// External authorization source.
pub trait TokenAuthority: Send + Sync {
    /// `Ok(true)` when the token is accepted.
    fn check(&self, token: &str) -> anyhow::Result<bool>;
}

/// Authority that accepts a fixed set of tokens.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuthority {
    accepted: HashSet<String>,
}

impl StaticTokenAuthority {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl TokenAuthority for StaticTokenAuthority {
    fn check(&self, token: &str) -> anyhow::Result<bool> {
        Ok(self.accepted.contains(token))
    }
}

/// Validation state shared by every gated component.
pub struct UserValidation {
    authority: Box<dyn TokenAuthority>,
    validated: AtomicBool,
}

impl UserValidation {
    pub fn new(authority: Box<dyn TokenAuthority>) -> Self {
        Self {
            authority,
            validated: AtomicBool::new(false),
        }
    }

    /// Check `token` against the authority and record the outcome.
    ///
    /// Authority errors count as a rejection.
    pub fn validate_user(&self, token: &str) -> bool {
        let accepted = match self.authority.check(token) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("token authority failed: {e:#}");
                false
            }
        };
        self.validated.store(accepted, Ordering::SeqCst);
        if accepted {
            info!("user validated");
        } else {
            warn!("user token rejected");
        }
        accepted
    }

    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::SeqCst)
    }

    /// Drop a previous acceptance.
    pub fn revoke(&self) {
        self.validated.store(false, Ordering::SeqCst);
    }

    /// Fails with `Unauthorized` unless a token has been accepted.
    pub fn require(&self) -> VpsResult<()> {
        if self.is_validated() {
            Ok(())
        } else {
            Err(VpsError::Unauthorized)
        }
    }
}

impl std::fmt::Debug for UserValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserValidation")
            .field("validated", &self.is_validated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingAuthority;

    impl TokenAuthority for FailingAuthority {
        fn check(&self, _token: &str) -> anyhow::Result<bool> {
            anyhow::bail!("authority offline")
        }
    }

    #[test]
    fn test_unvalidated_by_default() {
        let v = UserValidation::new(Box::new(StaticTokenAuthority::new(["good"])));
        assert!(!v.is_validated());
        assert!(matches!(v.require(), Err(VpsError::Unauthorized)));
    }

    #[test]
    fn test_accept_then_reject() {
        let v = UserValidation::new(Box::new(StaticTokenAuthority::new(["good"])));
        assert!(v.validate_user("good"));
        assert!(v.require().is_ok());

        // Last validation result wins.
        assert!(!v.validate_user("bad"));
        assert!(v.require().is_err());
    }

    #[test]
    fn test_revoke() {
        let v = UserValidation::new(Box::new(StaticTokenAuthority::new(["good"])));
        v.validate_user("good");
        v.revoke();
        assert!(!v.is_validated());
    }

    #[test]
    fn test_authority_error_rejects() {
        let v = UserValidation::new(Box::new(FailingAuthority));
        assert!(!v.validate_user("anything"));
        assert!(v.require().is_err());
    }
}
