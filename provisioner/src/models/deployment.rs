//! Deployment models

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use canvas_client::DeployStatus;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::ProvisionerError;

/// Output name to JSON value
pub type OutputData = Map<String, Value>;

/// What a run should do with the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentAction {
    Deploy,
    Destroy,
    /// Any other action string; decodes fine and fails at invocation
    Unsupported(String),
}

impl DeploymentAction {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentAction::Deploy => "DEPLOY",
            DeploymentAction::Destroy => "DESTROY",
            DeploymentAction::Unsupported(other) => other,
        }
    }

    /// Status reported when a run starts
    pub fn start_status(&self) -> DeployStatus {
        match self {
            DeploymentAction::Destroy => DeployStatus::Destroying,
            _ => DeployStatus::Deploying,
        }
    }

    /// Status reported when a run converges
    pub fn success_status(&self) -> DeployStatus {
        match self {
            DeploymentAction::Destroy => DeployStatus::NotDeployed,
            _ => DeployStatus::Deployed,
        }
    }
}

/// A missing action is as unsupported as an unknown one
impl Default for DeploymentAction {
    fn default() -> Self {
        DeploymentAction::Unsupported(String::new())
    }
}

impl From<String> for DeploymentAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DEPLOY" => DeploymentAction::Deploy,
            "DESTROY" => DeploymentAction::Destroy,
            _ => DeploymentAction::Unsupported(value),
        }
    }
}

impl From<DeploymentAction> for String {
    fn from(action: DeploymentAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the outputs a caller wants back.
///
/// Decodes from a list of names or from an object whose keys are the names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputNames(BTreeSet<String>);

impl OutputNames {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OutputNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Serialize for OutputNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for OutputNames {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Names(Vec<String>),
            Declared(Map<String, Value>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Names(names)) => names.into_iter().collect(),
            Some(Raw::Declared(declared)) => declared.into_iter().map(|(k, _)| k).collect(),
            None => OutputNames::default(),
        })
    }
}

/// Package descriptor: which module to stage and how to parameterize it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Module template name under the module root
    #[serde(rename = "type", default)]
    pub module_type: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub parameter_data: Map<String, Value>,

    #[serde(default)]
    pub outputs: OutputNames,
}

/// A unit of work decoded from a push message
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub package_id: String,

    #[serde(default)]
    pub package: PackageDescriptor,

    /// Values wired in from connected packages; these win over parameter data
    #[serde(default, deserialize_with = "null_as_default")]
    pub connected_input_data: Map<String, Value>,

    #[serde(default)]
    pub action: DeploymentAction,

    #[serde(default, deserialize_with = "null_as_default")]
    pub secrets: BTreeMap<String, String>,
}

impl DeploymentRequest {
    /// Check identifiers before any side effect keys off them
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        for (field, value) in [("project_id", &self.project_id), ("package_id", &self.package_id)] {
            if !is_path_component(value) {
                return Err(ProvisionerError::DecodeError(format!(
                    "{} must be a non-empty name without path separators, got {:?}",
                    field, value
                )));
            }
        }
        Ok(())
    }

    /// Remote state location for this package
    pub fn state_prefix(&self) -> String {
        state_prefix(&self.project_id, &self.package_id)
    }

    /// Parameter data overlaid with connected inputs
    pub fn merged_parameters(&self) -> Map<String, Value> {
        let mut merged = self.package.parameter_data.clone();
        for (key, value) in &self.connected_input_data {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentRequest")
            .field("project_id", &self.project_id)
            .field("package_id", &self.package_id)
            .field("package", &self.package)
            .field("connected_input_data", &self.connected_input_data)
            .field("action", &self.action)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `projects/{project_id}/packages/{package_id}`
pub fn state_prefix(project_id: &str, package_id: &str) -> String {
    format!("projects/{}/packages/{}", project_id, package_id)
}

/// True for a single, non-empty, non-special path segment
pub fn is_path_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
