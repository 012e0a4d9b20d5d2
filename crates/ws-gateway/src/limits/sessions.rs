//! Concurrent-session caps.
//!
//! Each owner keeps the set of its open external session ids. Check and
//! insert happen under the DashMap entry guard of that one owner, so two
//! handshakes for the same tenant cannot both take the last slot.

use crate::domain::error::LimitError;
use crate::domain::ids::{CustomerId, ExternalSessionId, TenantId, UserId};
use crate::domain::session::SecurityCtx;
use crate::limits::TenantProfile;
use dashmap::DashMap;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, warn};

/// Owner scope a cap applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    Tenant,
    Customer,
    RegularUser,
    PublicUser,
}

impl LimitScope {
    /// Close reason sent to the refused client.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Tenant => "Max tenant sessions limit reached!",
            Self::Customer => "Max customer sessions limit reached!",
            Self::RegularUser => "Max regular user sessions limit reached!",
            Self::PublicUser => "Max public user sessions limit reached!",
        }
    }
}

type OwnerSets<K> = DashMap<K, HashSet<ExternalSessionId>>;

/// Per-owner open-session index with caps.
#[derive(Default)]
pub struct SessionLimiter {
    tenants: OwnerSets<TenantId>,
    customers: OwnerSets<CustomerId>,
    regular_users: OwnerSets<UserId>,
    /// Public principals are counted per (public) customer.
    public_users: OwnerSets<CustomerId>,
}

impl SessionLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the session against every applicable cap.
    ///
    /// All caps must pass; on refusal, scopes already taken are released
    /// again and the session is left unindexed.
    pub fn try_acquire(
        &self,
        session_id: &ExternalSessionId,
        ctx: &SecurityCtx,
        profile: &TenantProfile,
    ) -> Result<(), LimitError> {
        let mut taken: Vec<LimitScope> = Vec::with_capacity(4);
        let result = self.acquire_all(session_id, ctx, profile, &mut taken);

        if let Err(err) = result {
            for scope in taken {
                self.release_scope(scope, session_id, ctx);
            }
            warn!(
                session_id = %session_id,
                tenant_id = %ctx.tenant_id,
                scope = ?err.scope,
                "Session refused by limit"
            );
            return Err(err);
        }
        Ok(())
    }

    fn acquire_all(
        &self,
        session_id: &ExternalSessionId,
        ctx: &SecurityCtx,
        profile: &TenantProfile,
        taken: &mut Vec<LimitScope>,
    ) -> Result<(), LimitError> {
        if profile.max_sessions_per_tenant > 0 {
            acquire(
                &self.tenants,
                ctx.tenant_id,
                session_id,
                profile.max_sessions_per_tenant,
                LimitScope::Tenant,
            )?;
            taken.push(LimitScope::Tenant);
        }

        let Some(customer_id) = ctx.customer_id.filter(|_| ctx.is_customer_scoped()) else {
            return Ok(());
        };

        if profile.max_sessions_per_customer > 0 {
            acquire(
                &self.customers,
                customer_id,
                session_id,
                profile.max_sessions_per_customer,
                LimitScope::Customer,
            )?;
            taken.push(LimitScope::Customer);
        }

        if ctx.is_public() {
            if profile.max_sessions_per_public_user > 0 {
                acquire(
                    &self.public_users,
                    customer_id,
                    session_id,
                    profile.max_sessions_per_public_user,
                    LimitScope::PublicUser,
                )?;
                taken.push(LimitScope::PublicUser);
            }
        } else if profile.max_sessions_per_regular_user > 0 {
            acquire(
                &self.regular_users,
                ctx.user_id,
                session_id,
                profile.max_sessions_per_regular_user,
                LimitScope::RegularUser,
            )?;
            taken.push(LimitScope::RegularUser);
        }

        Ok(())
    }

    /// Remove the session from every owner set. Idempotent.
    pub fn release(&self, session_id: &ExternalSessionId, ctx: &SecurityCtx) {
        for scope in [
            LimitScope::Tenant,
            LimitScope::Customer,
            LimitScope::RegularUser,
            LimitScope::PublicUser,
        ] {
            self.release_scope(scope, session_id, ctx);
        }
        debug!(session_id = %session_id, "Released session limits");
    }

    fn release_scope(&self, scope: LimitScope, session_id: &ExternalSessionId, ctx: &SecurityCtx) {
        match scope {
            LimitScope::Tenant => release(&self.tenants, &ctx.tenant_id, session_id),
            LimitScope::RegularUser => release(&self.regular_users, &ctx.user_id, session_id),
            LimitScope::Customer => {
                if let Some(customer_id) = &ctx.customer_id {
                    release(&self.customers, customer_id, session_id);
                }
            }
            LimitScope::PublicUser => {
                if let Some(customer_id) = &ctx.customer_id {
                    release(&self.public_users, customer_id, session_id);
                }
            }
        }
    }

    pub fn tenant_sessions(&self, tenant_id: &TenantId) -> usize {
        count(&self.tenants, tenant_id)
    }

    pub fn customer_sessions(&self, customer_id: &CustomerId) -> usize {
        count(&self.customers, customer_id)
    }

    pub fn regular_user_sessions(&self, user_id: &UserId) -> usize {
        count(&self.regular_users, user_id)
    }

    pub fn public_user_sessions(&self, customer_id: &CustomerId) -> usize {
        count(&self.public_users, customer_id)
    }

    /// Number of owners with at least one open session, across all scopes.
    pub fn indexed_owners(&self) -> usize {
        self.tenants.len() + self.customers.len() + self.regular_users.len() + self.public_users.len()
    }
}

fn acquire<K: Eq + Hash>(
    sets: &OwnerSets<K>,
    owner: K,
    session_id: &ExternalSessionId,
    cap: u32,
    scope: LimitScope,
) -> Result<(), LimitError> {
    let mut set = sets.entry(owner).or_default();
    if set.contains(session_id) {
        return Ok(());
    }
    if set.len() >= cap as usize {
        return Err(LimitError { scope });
    }
    set.insert(session_id.clone());
    Ok(())
}

fn release<K: Eq + Hash>(sets: &OwnerSets<K>, owner: &K, session_id: &ExternalSessionId) {
    if let Some(mut set) = sets.get_mut(owner) {
        set.remove(session_id);
    }
    sets.remove_if(owner, |_, set| set.is_empty());
}

fn count<K: Eq + Hash>(sets: &OwnerSets<K>, owner: &K) -> usize {
    sets.get(owner).map(|s| s.len()).unwrap_or(0)
}
