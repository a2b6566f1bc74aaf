use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Test frameworks the dashboard knows how to trigger and summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Selenium,
    Playwright,
    Maestro,
}

impl Technology {
    pub const ALL: [Technology; 3] = [
        Technology::Selenium,
        Technology::Playwright,
        Technology::Maestro,
    ];

    /// Input key carrying test tags for this framework's workflows.
    pub fn tag_input(&self) -> &'static str {
        match self {
            Technology::Selenium | Technology::Playwright => "groups",
            Technology::Maestro => "tags",
        }
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Technology::Selenium => write!(f, "selenium"),
            Technology::Playwright => write!(f, "playwright"),
            Technology::Maestro => write!(f, "maestro"),
        }
    }
}

impl std::str::FromStr for Technology {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "selenium" | "testng" => Ok(Technology::Selenium),
            "playwright" | "pw" => Ok(Technology::Playwright),
            "maestro" => Ok(Technology::Maestro),
            _ => Err(crate::Error::UnknownTechnology(s.to_string())),
        }
    }
}

/// A fully resolved workflow to trigger. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTarget {
    pub repository_full_name: String,
    pub workflow_name: String,
    pub technology: Technology,
    pub input_parameters: BTreeMap<String, String>,
    pub descriptive_label: String,
}

impl WorkflowTarget {
    pub fn new(
        repository_full_name: impl Into<String>,
        workflow_name: impl Into<String>,
        technology: Technology,
        input_parameters: BTreeMap<String, String>,
    ) -> Self {
        let repository_full_name = repository_full_name.into();
        let workflow_name = workflow_name.into();
        let descriptive_label = describe(&workflow_name, technology, &input_parameters);

        Self {
            repository_full_name,
            workflow_name,
            technology,
            input_parameters,
            descriptive_label,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.descriptive_label = label.into();
        self
    }

    pub fn input(&self, key: &str) -> Option<&str> {
        self.input_parameters.get(key).map(String::as_str)
    }

    pub fn environment(&self) -> Option<&str> {
        self.input("environment")
    }
}

fn describe(workflow: &str, technology: Technology, inputs: &BTreeMap<String, String>) -> String {
    let mut label = format!("{} ({})", workflow, technology);
    if let Some(env) = inputs.get("environment") {
        label.push_str(&format!(" on {}", env));
    }
    if let Some(tags) = inputs.get(technology.tag_input()) {
        label.push_str(&format!(" [{}]", tags));
    }
    label
}
