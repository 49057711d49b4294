//! Custodia Access - Role assignments and the allow-list
//!
//! The registry answers two questions for the vault: does an account hold a
//! role, and is it on the allow-list. Roles and allow-list membership are
//! orthogonal: whitelisting never grants a role, and removing an account from
//! the allow-list suspends it without touching its roles.
//!
//! Mutations use set-membership semantics. Granting a held role or listing a
//! listed account is a successful no-op; every mutator returns whether the
//! state actually changed. Only Admin may mutate, and the null account can be
//! neither granted a role nor listed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use custodia_types::{
    AccountId, AuthorizationError, CustodyError, Result, Role, StateError, ValidationError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// Persisted registry state: one role set and one allow-list flag per account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessState {
    pub roles: BTreeMap<AccountId, BTreeSet<Role>>,
    pub whitelist: BTreeSet<AccountId>,
}

impl AccessState {
    fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.roles
            .get(account)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    fn admin_count(&self) -> usize {
        self.roles
            .values()
            .filter(|roles| roles.contains(&Role::Admin))
            .count()
    }

    fn require_admin(&self, caller: &AccountId) -> Result<()> {
        if self.has_role(caller, Role::Admin) {
            Ok(())
        } else {
            Err(CustodyError::missing_role(caller, Role::Admin))
        }
    }
}

/// Role and allow-list registry
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AccessRegistry {
    state: Arc<RwLock<AccessState>>,
}

impl AccessRegistry {
    /// Create a registry whose only member is the bootstrap admin
    pub fn new(admin: AccountId) -> Self {
        let mut state = AccessState::default();
        state
            .roles
            .entry(admin)
            .or_default()
            .insert(Role::Admin);
        Self::from_state(state)
    }

    pub fn from_state(state: AccessState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.state.read().await.has_role(account, role)
    }

    pub async fn is_whitelisted(&self, account: &AccountId) -> bool {
        self.state.read().await.whitelist.contains(account)
    }

    pub async fn roles_of(&self, account: &AccountId) -> BTreeSet<Role> {
        self.state
            .read()
            .await
            .roles
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn whitelisted_accounts(&self) -> Vec<AccountId> {
        self.state.read().await.whitelist.iter().cloned().collect()
    }

    /// Fail with `MissingRole` unless `account` holds `role`
    pub async fn ensure_role(&self, account: &AccountId, role: Role) -> Result<()> {
        if self.has_role(account, role).await {
            Ok(())
        } else {
            Err(CustodyError::missing_role(account, role))
        }
    }

    /// Fail with `NotWhitelisted` unless `account` is on the allow-list
    pub async fn ensure_whitelisted(&self, account: &AccountId) -> Result<()> {
        if self.is_whitelisted(account).await {
            Ok(())
        } else {
            Err(AuthorizationError::NotWhitelisted {
                account: account.clone(),
            }
            .into())
        }
    }

    /// Grant `role` to `account`. Returns `false` if it was already held.
    pub async fn grant_role(
        &self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        state.require_admin(caller)?;
        require_named(account)?;

        let changed = state.roles.entry(account.clone()).or_default().insert(role);
        if changed {
            info!(%caller, %account, %role, "Role granted");
        }
        Ok(changed)
    }

    /// Revoke `role` from `account`. Returns `false` if it was not held.
    ///
    /// The last remaining admin cannot be revoked.
    pub async fn revoke_role(
        &self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        state.require_admin(caller)?;

        if !state.has_role(account, role) {
            return Ok(false);
        }
        if role == Role::Admin && state.admin_count() == 1 {
            return Err(StateError::LastAdmin {
                account: account.clone(),
            }
            .into());
        }

        let now_empty = match state.roles.get_mut(account) {
            Some(roles) => {
                roles.remove(&role);
                roles.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.roles.remove(account);
        }
        info!(%caller, %account, %role, "Role revoked");
        Ok(true)
    }

    /// Add or remove `account` from the allow-list. Returns whether membership changed.
    pub async fn set_whitelisted(
        &self,
        caller: &AccountId,
        account: &AccountId,
        listed: bool,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        state.require_admin(caller)?;
        if listed {
            require_named(account)?;
        }

        let changed = if listed {
            state.whitelist.insert(account.clone())
        } else {
            state.whitelist.remove(account)
        };
        if changed {
            info!(%caller, %account, listed, "Allow-list updated");
        }
        Ok(changed)
    }

    pub async fn snapshot(&self) -> AccessState {
        self.state.read().await.clone()
    }
}

fn require_named(account: &AccountId) -> Result<()> {
    if account.is_null() {
        return Err(ValidationError::InvalidAccount.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AccountId {
        AccountId::new("admin")
    }

    #[tokio::test]
    async fn test_bootstrap_admin() {
        let registry = AccessRegistry::new(admin());
        assert!(registry.has_role(&admin(), Role::Admin).await);
        assert!(!registry.has_role(&admin(), Role::Depositor).await);
        assert!(!registry.is_whitelisted(&admin()).await);
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let registry = AccessRegistry::new(admin());
        let alice = AccountId::new("alice");

        assert!(registry.grant_role(&admin(), &alice, Role::Depositor).await.unwrap());
        assert!(!registry.grant_role(&admin(), &alice, Role::Depositor).await.unwrap());
        assert_eq!(
            registry.roles_of(&alice).await,
            BTreeSet::from([Role::Depositor])
        );
    }

    #[tokio::test]
    async fn test_non_admin_cannot_mutate() {
        let registry = AccessRegistry::new(admin());
        let mallory = AccountId::new("mallory");

        let err = registry
            .grant_role(&mallory, &mallory, Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err, CustodyError::missing_role(&mallory, Role::Admin));

        let err = registry
            .set_whitelisted(&mallory, &mallory, true)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ROLE");
        assert!(!registry.is_whitelisted(&mallory).await);
    }

    #[tokio::test]
    async fn test_whitelist_twice_equals_once() {
        let registry = AccessRegistry::new(admin());
        let alice = AccountId::new("alice");

        registry.set_whitelisted(&admin(), &alice, true).await.unwrap();
        let once = registry.snapshot().await;
        let changed = registry.set_whitelisted(&admin(), &alice, true).await.unwrap();

        assert!(!changed);
        assert_eq!(registry.snapshot().await, once);
        assert_eq!(registry.whitelisted_accounts().await, vec![alice]);
    }

    #[tokio::test]
    async fn test_whitelist_is_orthogonal_to_roles() {
        let registry = AccessRegistry::new(admin());
        let bob = AccountId::new("bob");

        registry.set_whitelisted(&admin(), &bob, true).await.unwrap();
        assert!(registry.roles_of(&bob).await.is_empty());

        registry.grant_role(&admin(), &bob, Role::Withdrawer).await.unwrap();
        registry.set_whitelisted(&admin(), &bob, false).await.unwrap();
        assert!(registry.has_role(&bob, Role::Withdrawer).await);
        assert!(matches!(
            registry.ensure_whitelisted(&bob).await,
            Err(CustodyError::Authorization(AuthorizationError::NotWhitelisted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_revoked() {
        let registry = AccessRegistry::new(admin());
        let err = registry
            .revoke_role(&admin(), &admin(), Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "LAST_ADMIN");

        let second = AccountId::new("second-admin");
        registry.grant_role(&admin(), &second, Role::Admin).await.unwrap();
        assert!(registry.revoke_role(&second, &admin(), Role::Admin).await.unwrap());
        assert!(!registry.has_role(&admin(), Role::Admin).await);
    }

    #[tokio::test]
    async fn test_revoke_missing_role_is_noop() {
        let registry = AccessRegistry::new(admin());
        let carol = AccountId::new("carol");
        assert!(!registry.revoke_role(&admin(), &carol, Role::Depositor).await.unwrap());
    }

    #[tokio::test]
    async fn test_state_roundtrips_through_json() {
        let registry = AccessRegistry::new(admin());
        let alice = AccountId::new("alice");
        registry.grant_role(&admin(), &alice, Role::Depositor).await.unwrap();
        registry.set_whitelisted(&admin(), &alice, true).await.unwrap();

        let json = serde_json::to_string(&registry.snapshot().await).unwrap();
        let restored = AccessRegistry::from_state(serde_json::from_str(&json).unwrap());
        assert!(restored.has_role(&alice, Role::Depositor).await);
        assert!(restored.is_whitelisted(&alice).await);
    }

    #[tokio::test]
    async fn test_null_account_cannot_be_granted_or_listed() {
        let registry = AccessRegistry::new(admin());
        let before = registry.snapshot().await;

        let err = registry
            .grant_role(&admin(), &AccountId::null(), Role::Depositor)
            .await
            .unwrap_err();
        assert_eq!(err, CustodyError::Validation(ValidationError::InvalidAccount));

        let err = registry
            .set_whitelisted(&admin(), &AccountId::new("  "), true)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ACCOUNT");
        assert_eq!(registry.snapshot().await, before);

        // non-admins still learn nothing beyond their missing role
        let err = registry
            .grant_role(&AccountId::new("mallory"), &AccountId::null(), Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ROLE");
    }
}
