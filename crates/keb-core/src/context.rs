//! ERS context: account identity and license attached to every request.

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};

/// License types that restrict premium options (GPU pools, ingress filtering).
const EXTERNAL_LICENSE_TYPES: [&str; 3] = ["CUSTOMER", "PARTNER", "TRIAL"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErsContext {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(rename = "subaccount_id", default)]
    pub sub_account_id: String,
    #[serde(rename = "globalaccount_id", default)]
    pub global_account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_migration: Option<bool>,
}

impl ErsContext {
    /// Decode a raw provisioning context and enforce required identity fields.
    pub fn from_provision_raw(raw: &serde_json::Value) -> BrokerResult<Self> {
        let mut ctx: ErsContext = serde_json::from_value(raw.clone())
            .map_err(|e| BrokerError::bad_request(format!("while decoding context: {e}")))?;
        if ctx.global_account_id.is_empty() {
            return Err(BrokerError::bad_request("global accountID parameter cannot be empty"));
        }
        if ctx.sub_account_id.is_empty() {
            return Err(BrokerError::bad_request("subAccountID parameter cannot be empty"));
        }
        if ctx.user_id.is_empty() {
            return Err(BrokerError::bad_request("UserID parameter cannot be empty"));
        }
        ctx.user_id = ctx.user_id.to_lowercase();
        Ok(ctx)
    }

    /// Decode an update context; every field is optional there.
    pub fn from_update_raw(raw: Option<&serde_json::Value>) -> BrokerResult<Self> {
        match raw {
            None | Some(serde_json::Value::Null) => Ok(ErsContext::default()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| BrokerError::bad_request(format!("while decoding context: {e}"))),
        }
    }

    pub fn is_external_license(&self) -> bool {
        self.license_type
            .as_deref()
            .is_some_and(|l| EXTERNAL_LICENSE_TYPES.contains(&l))
    }

    /// Whether an update context carries more than identity and the
    /// active flag, which alone is reason enough to run an update.
    pub fn is_update_payload(&self) -> bool {
        self.license_type.is_some() || self.commercial_model.is_some() || self.is_migration.is_some()
    }

    /// Fill fields missing here from `saved`.
    pub fn inherit_missing(mut self, saved: &ErsContext) -> Self {
        fill(&mut self.tenant_id, &saved.tenant_id);
        fill(&mut self.sub_account_id, &saved.sub_account_id);
        fill(&mut self.global_account_id, &saved.global_account_id);
        fill(&mut self.user_id, &saved.user_id);
        if self.license_type.is_none() {
            self.license_type = saved.license_type.clone();
        }
        if self.commercial_model.is_none() {
            self.commercial_model = saved.commercial_model.clone();
        }
        self
    }

    /// Overlay non-empty values from `incoming` onto this context.
    pub fn merged_with(&self, incoming: &ErsContext) -> Self {
        let mut out = self.clone();
        overlay(&mut out.tenant_id, &incoming.tenant_id);
        overlay(&mut out.sub_account_id, &incoming.sub_account_id);
        overlay(&mut out.global_account_id, &incoming.global_account_id);
        overlay(&mut out.user_id, &incoming.user_id);
        if incoming.active.is_some() {
            out.active = incoming.active;
        }
        if incoming.license_type.is_some() {
            out.license_type = incoming.license_type.clone();
        }
        if incoming.commercial_model.is_some() {
            out.commercial_model = incoming.commercial_model.clone();
        }
        out
    }
}

fn fill(dst: &mut String, src: &str) {
    if dst.is_empty() {
        *dst = src.to_string();
    }
}

fn overlay(dst: &mut String, src: &str) {
    if !src.is_empty() {
        *dst = src.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provision_context_requires_ids() {
        let err = ErsContext::from_provision_raw(&json!({"subaccount_id": "sa", "user_id": "u"}))
            .unwrap_err();
        assert_eq!(err.message(), "global accountID parameter cannot be empty");

        let err = ErsContext::from_provision_raw(&json!({"globalaccount_id": "ga", "user_id": "u"}))
            .unwrap_err();
        assert_eq!(err.message(), "subAccountID parameter cannot be empty");

        let err =
            ErsContext::from_provision_raw(&json!({"globalaccount_id": "ga", "subaccount_id": "sa"}))
                .unwrap_err();
        assert_eq!(err.message(), "UserID parameter cannot be empty");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn user_id_lowercased() {
        let ctx = ErsContext::from_provision_raw(
            &json!({"globalaccount_id": "ga", "subaccount_id": "sa", "user_id": "John@Example.COM"}),
        )
        .unwrap();
        assert_eq!(ctx.user_id, "john@example.com");
    }

    #[test]
    fn external_license() {
        let mut ctx = ErsContext::default();
        assert!(!ctx.is_external_license());
        ctx.license_type = Some("CUSTOMER".into());
        assert!(ctx.is_external_license());
        ctx.license_type = Some("SAPDEV".into());
        assert!(!ctx.is_external_license());
    }

    #[test]
    fn update_payload_ignores_identity_and_active() {
        let mut ctx = ErsContext {
            global_account_id: "ga".into(),
            active: Some(false),
            ..Default::default()
        };
        assert!(!ctx.is_update_payload());
        ctx.commercial_model = Some("BTP".into());
        assert!(ctx.is_update_payload());
    }

    #[test]
    fn inherit_then_merge() {
        let saved = ErsContext {
            global_account_id: "ga-1".into(),
            sub_account_id: "sa-1".into(),
            user_id: "u".into(),
            license_type: Some("SAPDEV".into()),
            ..Default::default()
        };
        let incoming = ErsContext {
            global_account_id: "ga-2".into(),
            active: Some(false),
            ..Default::default()
        };
        let inherited = incoming.clone().inherit_missing(&saved);
        assert_eq!(inherited.sub_account_id, "sa-1");
        assert_eq!(inherited.global_account_id, "ga-2");

        let merged = saved.merged_with(&incoming);
        assert_eq!(merged.global_account_id, "ga-2");
        assert_eq!(merged.active, Some(false));
        assert_eq!(merged.license_type.as_deref(), Some("SAPDEV"));
    }
}
