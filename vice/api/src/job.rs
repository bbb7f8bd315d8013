use serde::{Deserialize, Serialize};

/// An analysis submission. Immutable once posted; the invocation id doubles
/// as the `external-id` label on every cluster object the analysis owns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub invocation_id: String,
    pub name: String,
    pub app_id: String,
    pub app_name: String,
    pub submitter: String,
    pub user_id: String,
    #[serde(default)]
    pub user_home: String,
    pub output_directory: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    /// The container of the first step, which drives the analysis pod's
    /// uid/gid and image. A job without steps is malformed.
    pub fn analysis_container(&self) -> Option<&Container> {
        self.steps.first().map(|step| &step.component.container)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub component: Component,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub container: Container,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub working_directory: String,
    pub port: i32,
    pub uid: i64,
    pub gid: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    #[serde(rename = "type")]
    pub ty: String,
    pub path: String,
}

impl Input {
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
