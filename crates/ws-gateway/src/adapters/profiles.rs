//! Tenant profiles resolved once from configuration.

use crate::domain::config::{ConfigError, LimitsConfig};
use crate::domain::ids::TenantId;
use crate::limits::TenantProfile;
use crate::ports::TenantProfileProvider;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ConfigTenantProfiles {
    default_profile: Arc<TenantProfile>,
    overrides: HashMap<TenantId, Arc<TenantProfile>>,
}

impl ConfigTenantProfiles {
    /// Parse every profile up front so a bad rate-limit string fails startup.
    pub fn from_config(config: &LimitsConfig) -> Result<Self, ConfigError> {
        let default_profile = Arc::new(TenantProfile::from_config(&config.default_profile)?);
        let overrides = config
            .tenants
            .iter()
            .map(|(tenant_id, profile)| {
                TenantProfile::from_config(profile).map(|p| (*tenant_id, Arc::new(p)))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            default_profile,
            overrides,
        })
    }

    pub fn overrides(&self) -> usize {
        self.overrides.len()
    }
}

impl TenantProfileProvider for ConfigTenantProfiles {
    fn profile(&self, tenant_id: &TenantId) -> Arc<TenantProfile> {
        self.overrides
            .get(tenant_id)
            .map_or_else(|| Arc::clone(&self.default_profile), Arc::clone)
    }
}
