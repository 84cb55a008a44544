//! Credential-gated admin actions
//!
//! The gate only keeps the client from firing privileged calls without a key.
//! The router enforces authorization on its own.

use serde_json::json;
use thiserror::Error;

use crate::client::{RequestSpec, ResponseResult};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Freeze,
    Unfreeze,
    Rollback,
    ClearCandidate,
}

impl AdminAction {
    pub fn all() -> &'static [AdminAction] {
        &[
            AdminAction::Freeze,
            AdminAction::Unfreeze,
            AdminAction::Rollback,
            AdminAction::ClearCandidate,
        ]
    }

    /// Endpoint name, also used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            AdminAction::Freeze => "freeze",
            AdminAction::Unfreeze => "unfreeze",
            AdminAction::Rollback => "rollback",
            AdminAction::ClearCandidate => "clear-candidate",
        }
    }

    pub fn from_name(name: &str) -> Option<AdminAction> {
        AdminAction::all().iter().copied().find(|a| a.name() == name)
    }

    pub fn path(&self, prefix: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("credential required")]
    CredentialRequired,
}

impl GateError {
    /// Result-shaped form so the presentation can show it like any other outcome
    pub fn to_result(&self) -> ResponseResult {
        ResponseResult::local_error(self.to_string())
    }
}

/// Build the request for `action`, or refuse when no credential is configured
pub fn authorize(action: AdminAction, config: &Config) -> Result<RequestSpec, GateError> {
    if !config.has_credential() {
        tracing::warn!(action = action.name(), "admin call without credential");
        return Err(GateError::CredentialRequired);
    }
    Ok(RequestSpec::post(&action.path(&config.admin_prefix), json!({})))
}
