//! Static token table from configuration.

use crate::domain::config::TokenGrant;
use crate::domain::error::AuthError;
use crate::domain::session::{SecurityCtx, UserPrincipalKind};
use crate::ports::TokenValidator;
use subtle::ConstantTimeEq;

/// Validates tokens against a fixed list of grants.
///
/// Every grant is compared, so lookup time does not depend on which grant
/// (if any) matches.
pub struct StaticTokenValidator {
    grants: Vec<TokenGrant>,
}

impl StaticTokenValidator {
    pub fn new(grants: Vec<TokenGrant>) -> Self {
        Self { grants }
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> Result<SecurityCtx, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let mut matched: Option<&TokenGrant> = None;
        for grant in &self.grants {
            if constant_time_compare(token, &grant.token) && matched.is_none() {
                matched = Some(grant);
            }
        }

        let grant = matched.ok_or(AuthError::InvalidToken)?;
        Ok(SecurityCtx {
            tenant_id: grant.tenant_id,
            customer_id: grant.customer_id,
            user_id: grant.user_id,
            principal: if grant.public {
                UserPrincipalKind::PublicId
            } else {
                UserPrincipalKind::UserName
            },
        })
    }
}

/// Constant-time string comparison.
///
/// Both inputs are padded to the longer length with different fill bytes,
/// and the lengths are compared in constant time as well.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let max_len = a.len().max(b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}
