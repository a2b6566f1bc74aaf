//! JSON shape the LLM fallback must return, and its validation.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use todd_core::{Technology, WorkflowTarget};

use crate::{ResolutionError, ResolverConfig, Result, WorkflowCatalog};

/// Shape documented in the fallback prompt.
pub const RESPONSE_SHAPE: &str = r#"{"targets":[{"repository":"<owner>/<repo>","workflowName":"<workflow name>","technology":"selenium|playwright|maestro","inputs":{"environment":"qa"},"label":"<short description>"}]}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResolution {
    #[serde(default)]
    pub targets: Vec<LlmTarget>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmTarget {
    pub repository: String,
    #[serde(alias = "workflow")]
    pub workflow_name: String,
    #[serde(default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Cut the JSON document out of a completion that may carry code fences or prose.
fn json_body(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

pub fn parse_response(raw: &str) -> Result<LlmResolution> {
    let body = json_body(raw)
        .ok_or_else(|| ResolutionError::Parse("no JSON object in reply".to_string()))?;

    // Valid JSON of the wrong shape is a schema problem, not a parse problem.
    let value: Value =
        serde_json::from_str(body).map_err(|e| ResolutionError::Parse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| ResolutionError::Schema(e.to_string()))
}

fn input_value(key: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Null => Ok(None),
        other => Err(ResolutionError::Schema(format!(
            "input '{}' must be a scalar, got {}",
            key, other
        ))),
    }
}

impl LlmTarget {
    pub fn into_target(
        self,
        config: &ResolverConfig,
        catalog: Option<&WorkflowCatalog>,
    ) -> Result<WorkflowTarget> {
        let repository = self.repository.trim();
        if repository.is_empty() || repository.contains(char::is_whitespace) {
            return Err(ResolutionError::Schema(format!(
                "invalid repository '{}'",
                self.repository
            )));
        }
        let repository = if repository.contains('/') {
            repository.to_string()
        } else {
            format!("{}/{}", config.org, repository)
        };

        let workflow = self.workflow_name.trim().to_string();
        if workflow.is_empty() {
            return Err(ResolutionError::Schema("missing workflowName".to_string()));
        }
        if let Some(catalog) = catalog {
            if !catalog.contains(&repository, &workflow) {
                return Err(ResolutionError::Schema(format!(
                    "workflow '{}' is not available in {}",
                    workflow, repository
                )));
            }
        }

        let technology = self
            .technology
            .as_deref()
            .and_then(|t| t.parse::<Technology>().ok())
            .unwrap_or(config.default_technology);

        let mut inputs = BTreeMap::new();
        for (key, value) in self.inputs {
            if let Some(value) = input_value(&key, value)? {
                inputs.insert(key, value);
            }
        }
        inputs
            .entry("environment".to_string())
            .or_insert_with(|| config.default_environment.clone());

        let target = WorkflowTarget::new(repository, workflow, technology, inputs);
        Ok(match self.label.filter(|l| !l.trim().is_empty()) {
            Some(label) => target.with_label(label),
            None => target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ResolverConfig {
        ResolverConfig {
            org: "org".to_string(),
            default_environment: "qa".to_string(),
            default_technology: Technology::Playwright,
        }
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "```json\n{\"targets\":[{\"repository\":\"org/web-e2e\",\"workflowName\":\"E2E Smoke\",\"technology\":\"playwright\",\"inputs\":{\"groups\":\"@login\"}}]}\n```";
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.targets.len(), 1);

        let target = parsed.targets.into_iter().next().unwrap().into_target(&config(), None).unwrap();
        assert_eq!(target.workflow_name, "E2E Smoke");
        assert_eq!(target.input("groups"), Some("@login"));
        assert_eq!(target.environment(), Some("qa"));
    }

    #[test]
    fn test_not_json_is_parse_error() {
        assert!(matches!(
            parse_response("Sure! I'd run the smoke tests."),
            Err(ResolutionError::Parse(_))
        ));
        assert!(matches!(
            parse_response("{\"targets\": [ }"),
            Err(ResolutionError::Parse(_))
        ));
    }

    #[test]
    fn test_wrong_shape_is_schema_error() {
        assert!(matches!(
            parse_response("{\"targets\": \"E2E Smoke\"}"),
            Err(ResolutionError::Schema(_))
        ));
    }

    #[test]
    fn test_unknown_technology_uses_default_and_bare_repo_gets_org() {
        let target = LlmTarget {
            repository: "web-e2e".to_string(),
            workflow_name: "E2E Regression".to_string(),
            technology: Some("cypress".to_string()),
            inputs: BTreeMap::from([
                ("environment".to_string(), Value::from("prod")),
                ("retries".to_string(), Value::from(2)),
            ]),
            label: None,
        }
        .into_target(&config(), None)
        .unwrap();

        assert_eq!(target.repository_full_name, "org/web-e2e");
        assert_eq!(target.technology, Technology::Playwright);
        assert_eq!(target.input("retries"), Some("2"));
        assert_eq!(target.environment(), Some("prod"));
    }

    #[test]
    fn test_nested_input_rejected() {
        let result = LlmTarget {
            repository: "org/web-e2e".to_string(),
            workflow_name: "E2E Regression".to_string(),
            technology: None,
            inputs: BTreeMap::from([("groups".to_string(), serde_json::json!(["@a"]))]),
            label: None,
        }
        .into_target(&config(), None);
        assert!(matches!(result, Err(ResolutionError::Schema(_))));
    }

    #[test]
    fn test_catalog_rejects_unknown_workflow() {
        let mut catalog = WorkflowCatalog::new();
        catalog.insert("org/web-e2e", vec!["E2E Smoke".to_string()]);

        let result = LlmTarget {
            repository: "org/web-e2e".to_string(),
            workflow_name: "Nightly Everything".to_string(),
            technology: None,
            inputs: BTreeMap::new(),
            label: None,
        }
        .into_target(&config(), Some(&catalog));
        assert!(matches!(result, Err(ResolutionError::Schema(_))));
    }
}
