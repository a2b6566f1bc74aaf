use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use todd_ai::LlmClient;
use todd_core::{ChatMessage, ChatRole, Settings, Technology, WorkflowTarget};

use crate::keywords::ParsedCommand;
use crate::rules::{self, build_target, default_workflow, repository_name};
use crate::schema::{self, RESPONSE_SHAPE};
use crate::{ResolutionError, Result};

static CLAUSE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:;|&&|\bthen\b|\bas well as\b)\s*").unwrap());

/// Chat turns included in the fallback prompt.
const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub org: String,
    pub default_environment: String,
    pub default_technology: Technology,
}

impl ResolverConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            org: settings.github_org.clone(),
            default_environment: settings.default_environment.clone(),
            default_technology: settings.default_technology,
        }
    }

    pub fn repository(&self, technology: Technology) -> String {
        format!("{}/{}", self.org, repository_name(technology))
    }
}

/// Workflows available per repository, as listed by the CI provider.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, Vec<String>>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, repository: impl Into<String>, workflows: Vec<String>) {
        self.workflows.insert(repository.into(), workflows);
    }

    /// Repositories absent from the catalog are not constrained.
    pub fn contains(&self, repository: &str, workflow: &str) -> bool {
        match self.workflows.get(repository) {
            Some(names) => names.iter().any(|n| n.eq_ignore_ascii_case(workflow)),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    fn render(&self) -> String {
        self.workflows
            .iter()
            .map(|(repo, names)| format!("- {}: {}", repo, names.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Rules,
    History,
    Llm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Preview,
    Single,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPreview {
    pub targets: Vec<WorkflowTarget>,
    pub total: usize,
    pub technologies: Vec<Technology>,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resolution {
    Preview(ResolutionPreview),
    Single(WorkflowTarget),
}

impl Resolution {
    pub fn into_targets(self) -> Vec<WorkflowTarget> {
        match self {
            Resolution::Preview(preview) => preview.targets,
            Resolution::Single(target) => vec![target],
        }
    }
}

/// Turns free-text commands into workflow targets.
///
/// The rule table is consulted per clause; when any clause is left
/// unresolved the whole command goes to the LLM fallback, if configured.
pub struct IntentResolver {
    config: ResolverConfig,
    llm: Option<Arc<dyn LlmClient>>,
    catalog: Option<WorkflowCatalog>,
}

impl IntentResolver {
    pub fn new(config: ResolverConfig, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            config,
            llm,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: WorkflowCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub async fn resolve(
        &self,
        command: &str,
        history: &[ChatMessage],
        mode: ResolveMode,
    ) -> Result<Resolution> {
        match mode {
            ResolveMode::Preview => Ok(Resolution::Preview(self.preview(command, history).await?)),
            ResolveMode::Single => {
                let (mut targets, _) = self.resolve_targets(command, history).await?;
                if targets.len() > 1 {
                    return Err(ResolutionError::MultipleTargets(targets.len()));
                }
                let target = targets
                    .pop()
                    .ok_or_else(|| ResolutionError::NoMatch(command.to_string()))?;
                Ok(Resolution::Single(target))
            }
        }
    }

    pub async fn preview(&self, command: &str, history: &[ChatMessage]) -> Result<ResolutionPreview> {
        let (targets, source) = self.resolve_targets(command, history).await?;
        let technologies: BTreeSet<Technology> = targets.iter().map(|t| t.technology).collect();

        Ok(ResolutionPreview {
            total: targets.len(),
            technologies: technologies.into_iter().collect(),
            targets,
            source,
        })
    }

    async fn resolve_targets(
        &self,
        command: &str,
        history: &[ChatMessage],
    ) -> Result<(Vec<WorkflowTarget>, ResolutionSource)> {
        let clauses: Vec<&str> = CLAUSE_SEPARATOR
            .split(command)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if clauses.is_empty() {
            return Err(ResolutionError::NoMatch("empty command".to_string()));
        }

        let mut targets = Vec::new();
        let mut source = ResolutionSource::Rules;
        let mut unresolved = false;

        for clause in &clauses {
            let parsed = ParsedCommand::parse(clause);
            match self.resolve_clause(&parsed, history) {
                Some((clause_targets, clause_source)) => {
                    if clause_source == ResolutionSource::History {
                        source = clause_source;
                    }
                    targets.extend(clause_targets);
                }
                None => {
                    tracing::debug!("No rule matched clause '{}'", clause);
                    unresolved = true;
                    break;
                }
            }
        }

        if unresolved {
            targets = self.ask_llm(command, history).await?;
            source = ResolutionSource::Llm;
        } else {
            self.check_catalog(&targets)?;
        }

        let mut unique: Vec<WorkflowTarget> = Vec::with_capacity(targets.len());
        for target in targets {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }

        tracing::info!(
            "Resolved '{}' to {} workflow(s) via {:?}",
            command,
            unique.len(),
            source
        );
        Ok((unique, source))
    }

    fn resolve_clause(
        &self,
        cmd: &ParsedCommand,
        history: &[ChatMessage],
    ) -> Option<(Vec<WorkflowTarget>, ResolutionSource)> {
        if cmd.expand_all {
            let technologies = if cmd.technologies.is_empty() {
                Technology::ALL.to_vec()
            } else {
                cmd.technologies.clone()
            };
            let targets = technologies
                .into_iter()
                .map(|t| build_target(t, default_workflow(t), &[], cmd, &self.config))
                .collect();
            return Some((targets, ResolutionSource::Rules));
        }

        // A named framework always decides the technology.
        if !cmd.technologies.is_empty() {
            let targets = cmd
                .technologies
                .iter()
                .map(|&t| match rules::first_match(cmd, Some(t)) {
                    Some(rule) => rule.build(cmd, &self.config),
                    None => build_target(t, default_workflow(t), &[], cmd, &self.config),
                })
                .collect();
            return Some((targets, ResolutionSource::Rules));
        }

        if let Some(rule) = rules::first_match(cmd, None) {
            tracing::debug!("Rule '{}' matched '{}'", rule.name, cmd.text);
            return Some((vec![rule.build(cmd, &self.config)], ResolutionSource::Rules));
        }

        if cmd.follow_up {
            if let Some(targets) = self.follow_up(cmd, history) {
                return Some((targets, ResolutionSource::History));
            }
        }

        if !cmd.categories.is_empty() {
            let t = self.config.default_technology;
            return Some((
                vec![build_target(t, default_workflow(t), &[], cmd, &self.config)],
                ResolutionSource::Rules,
            ));
        }

        None
    }

    /// Reuse the last resolved targets, overriding only what the command mentions.
    fn follow_up(&self, cmd: &ParsedCommand, history: &[ChatMessage]) -> Option<Vec<WorkflowTarget>> {
        let previous = history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant && !m.targets.is_empty())?;

        let targets = previous
            .targets
            .iter()
            .map(|target| {
                let mut inputs = target.input_parameters.clone();
                if let Some(env) = &cmd.environment {
                    inputs.insert("environment".to_string(), env.clone());
                }
                if let Some(region) = &cmd.region {
                    inputs.insert("region".to_string(), region.clone());
                }
                let tags = rules::tags_for(target.technology, &[], &cmd.categories);
                if !tags.is_empty() {
                    inputs.insert(target.technology.tag_input().to_string(), tags.join(","));
                }
                if let Some(email) = &cmd.credentials.email {
                    inputs.insert("email".to_string(), email.clone());
                }
                if let Some(password) = &cmd.credentials.password {
                    inputs.insert("password".to_string(), password.clone());
                }
                WorkflowTarget::new(
                    target.repository_full_name.clone(),
                    target.workflow_name.clone(),
                    target.technology,
                    inputs,
                )
            })
            .collect();

        Some(targets)
    }

    fn check_catalog(&self, targets: &[WorkflowTarget]) -> Result<()> {
        let catalog = match &self.catalog {
            Some(catalog) => catalog,
            None => return Ok(()),
        };
        for target in targets {
            if !catalog.contains(&target.repository_full_name, &target.workflow_name) {
                return Err(ResolutionError::UnknownWorkflow {
                    repository: target.repository_full_name.clone(),
                    workflow: target.workflow_name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn ask_llm(&self, command: &str, history: &[ChatMessage]) -> Result<Vec<WorkflowTarget>> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return Err(ResolutionError::NoMatch(command.to_string())),
        };

        tracing::debug!("Falling back to {} for '{}'", llm.provider(), command);
        let raw = llm
            .complete_json(&self.system_prompt(), &user_prompt(command, history))
            .await?;

        let response = schema::parse_response(&raw)?;
        if response.targets.is_empty() {
            return Err(ResolutionError::Schema(
                response
                    .error
                    .unwrap_or_else(|| "reply contained no targets".to_string()),
            ));
        }

        response
            .targets
            .into_iter()
            .map(|t| t.into_target(&self.config, self.catalog.as_ref()))
            .collect()
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "Map the QA engineer's command to GitHub Actions workflows. \
             Reply with a single JSON object and nothing else, shaped as:\n{}\n\nRules, highest priority first:\n",
            RESPONSE_SHAPE
        );
        prompt.push_str("- An explicitly named framework (selenium, playwright, maestro) decides the technology.\n");
        for rule in rules::RULES {
            prompt.push_str(&format!(
                "- {} -> {} \"{}\" ({})\n",
                rule.description,
                self.config.repository(rule.technology),
                rule.workflow,
                rule.technology
            ));
        }
        prompt.push_str(&format!(
            "- Environment is \"prod\" or \"qa\" (default \"{}\"); add \"region\" only for us/ca.\n\
             - Combine several test categories into one comma-joined {} value.\n\
             - Include email/password inputs only when the command states them.\n\
             - Unknown framework: use {}.\n\nAvailable workflows:\n",
            self.config.default_environment,
            Technology::Playwright.tag_input(),
            self.config.default_technology
        ));

        match &self.catalog {
            Some(catalog) if !catalog.is_empty() => prompt.push_str(&catalog.render()),
            _ => {
                for (technology, names) in rules::known_workflows() {
                    prompt.push_str(&format!(
                        "- {}: {}\n",
                        self.config.repository(technology),
                        names.join(", ")
                    ));
                }
            }
        }

        prompt
    }
}

fn user_prompt(command: &str, history: &[ChatMessage]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut prompt = String::new();
    for message in &history[start..] {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        prompt.push_str(&format!("{}: {}\n", role, message.content));
    }
    prompt.push_str(&format!("Command: {}", command));
    prompt
}
