//! API models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment status as tracked by the Canvas API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    Deploying,
    Destroying,
    Deployed,
    NotDeployed,
    Failed,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Deploying => "DEPLOYING",
            DeployStatus::Destroying => "DESTROYING",
            DeployStatus::Deployed => "DEPLOYED",
            DeployStatus::NotDeployed => "NOT_DEPLOYED",
            DeployStatus::Failed => "FAILED",
        }
    }

    /// Whether the status ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployStatus::Deployed | DeployStatus::NotDeployed | DeployStatus::Failed
        )
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `PATCH /provisioner/projects/{project_id}/packages/{package_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageStatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_status: Option<DeployStatus>,

    /// Omitted from the body when empty
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub output_data: serde_json::Map<String, serde_json::Value>,
}

impl PackageStatusUpdate {
    pub fn new(status: DeployStatus, output_data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            deploy_status: Some(status),
            output_data,
        }
    }
}
