//! Ordered keyword rules mapping a parsed command to a workflow.
//!
//! Rules are consulted top to bottom and the first match wins, so the
//! specific production workflows sit above the generic mobile and web ones.

use std::collections::BTreeMap;
use todd_core::{Technology, WorkflowTarget};

use crate::keywords::{Category, ParsedCommand};
use crate::ResolverConfig;

const IOS_WORDS: &[&str] = &["ios", "iphone", "ipad"];
const ANDROID_WORDS: &[&str] = &["android"];
const MOBILE_WORDS: &[&str] = &["mobile", "ios", "iphone", "ipad", "android"];

pub struct Rule {
    pub name: &'static str,
    pub technology: Technology,
    pub workflow: &'static str,
    pub description: &'static str,
    base_tags: &'static [&'static str],
    predicate: fn(&ParsedCommand) -> bool,
}

impl Rule {
    pub fn matches(&self, cmd: &ParsedCommand) -> bool {
        (self.predicate)(cmd)
    }

    pub fn build(&self, cmd: &ParsedCommand, config: &ResolverConfig) -> WorkflowTarget {
        build_target(self.technology, self.workflow, self.base_tags, cmd, config)
    }
}

fn prod_ios(cmd: &ParsedCommand) -> bool {
    cmd.is_prod() && cmd.has_any(IOS_WORDS)
}

fn prod_android(cmd: &ParsedCommand) -> bool {
    cmd.is_prod() && cmd.has_any(ANDROID_WORDS)
}

fn core_ux_smoke(cmd: &ParsedCommand) -> bool {
    cmd.has_category(Category::Smoke) && cmd.has_category(Category::CoreUx)
}

fn mobile(cmd: &ParsedCommand) -> bool {
    cmd.has_any(MOBILE_WORDS)
}

fn web_smoke(cmd: &ParsedCommand) -> bool {
    cmd.has_category(Category::Smoke)
}

fn web_e2e(cmd: &ParsedCommand) -> bool {
    cmd.has_category(Category::E2e) || cmd.has("web")
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "prod-ios",
        technology: Technology::Selenium,
        workflow: "Prod iOS Regression",
        description: "\"ios\" together with \"prod\"/\"production\" (never the QA mobile suite)",
        base_tags: &["mobile"],
        predicate: prod_ios,
    },
    Rule {
        name: "prod-android",
        technology: Technology::Selenium,
        workflow: "Prod Android Regression",
        description: "\"android\" together with \"prod\"/\"production\"",
        base_tags: &["mobile"],
        predicate: prod_android,
    },
    Rule {
        name: "core-ux-smoke",
        technology: Technology::Playwright,
        workflow: "QA US - CORE UX SMOKE E2E",
        description: "\"smoke\" together with \"core ux\"",
        base_tags: &[],
        predicate: core_ux_smoke,
    },
    Rule {
        name: "mobile",
        technology: Technology::Maestro,
        workflow: "Mobile Regression",
        description: "\"ios\", \"android\" or \"mobile\" outside production",
        base_tags: &[],
        predicate: mobile,
    },
    Rule {
        name: "web-smoke",
        technology: Technology::Playwright,
        workflow: "E2E Smoke",
        description: "\"smoke\"",
        base_tags: &[],
        predicate: web_smoke,
    },
    Rule {
        name: "web-e2e",
        technology: Technology::Playwright,
        workflow: "E2E Regression",
        description: "\"e2e\" or \"web\" with no explicit framework",
        base_tags: &[],
        predicate: web_e2e,
    },
];

/// Repository (within the organisation) holding each framework's workflows.
pub fn repository_name(technology: Technology) -> &'static str {
    match technology {
        Technology::Selenium => "automation-framework",
        Technology::Playwright => "web-e2e",
        Technology::Maestro => "mobile-tests",
    }
}

pub fn default_workflow(technology: Technology) -> &'static str {
    match technology {
        Technology::Selenium => "Selenium Regression",
        Technology::Playwright => "E2E Regression",
        Technology::Maestro => "Mobile Regression",
    }
}

/// First rule matching `cmd`, restricted to `technology` when one is named.
pub fn first_match(cmd: &ParsedCommand, technology: Option<Technology>) -> Option<&'static Rule> {
    RULES
        .iter()
        .filter(|r| technology.map_or(true, |t| r.technology == t))
        .find(|r| r.matches(cmd))
}

/// Workflow names the rule table can produce, grouped by framework.
pub fn known_workflows() -> BTreeMap<Technology, Vec<&'static str>> {
    let mut known: BTreeMap<Technology, Vec<&'static str>> = BTreeMap::new();
    for technology in Technology::ALL {
        known.entry(technology).or_default().push(default_workflow(technology));
    }
    for rule in RULES {
        let names = known.entry(rule.technology).or_default();
        if !names.contains(&rule.workflow) {
            names.push(rule.workflow);
        }
    }
    known
}

/// Tags for `technology` from the rule's base tags and the command's categories.
pub fn tags_for(technology: Technology, base: &[&str], categories: &[Category]) -> Vec<String> {
    let mut tags: Vec<String> = base.iter().map(|t| t.to_string()).collect();

    for category in categories {
        let keep = match (technology, category) {
            (_, Category::Regression) => false,
            (Technology::Playwright, c) => !c.is_suite_selector(),
            (_, Category::E2e) => false,
            _ => true,
        };
        if !keep {
            continue;
        }

        let tag = match technology {
            Technology::Playwright => format!("@{}", category.name()),
            Technology::Selenium | Technology::Maestro => category.name().to_string(),
        };
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    tags
}

fn platform(cmd: &ParsedCommand) -> &'static str {
    match (cmd.has_any(IOS_WORDS), cmd.has_any(ANDROID_WORDS)) {
        (true, false) => "ios",
        (false, true) => "android",
        _ => "all",
    }
}

pub fn build_target(
    technology: Technology,
    workflow: &str,
    base_tags: &[&str],
    cmd: &ParsedCommand,
    config: &ResolverConfig,
) -> WorkflowTarget {
    let mut inputs = BTreeMap::new();
    inputs.insert(
        "environment".to_string(),
        cmd.environment
            .clone()
            .unwrap_or_else(|| config.default_environment.clone()),
    );
    if let Some(region) = &cmd.region {
        inputs.insert("region".to_string(), region.clone());
    }
    if technology == Technology::Maestro {
        inputs.insert("platform".to_string(), platform(cmd).to_string());
    }

    let tags = tags_for(technology, base_tags, &cmd.categories);
    if !tags.is_empty() {
        inputs.insert(technology.tag_input().to_string(), tags.join(","));
    }

    if let Some(email) = &cmd.credentials.email {
        inputs.insert("email".to_string(), email.clone());
    }
    if let Some(password) = &cmd.credentials.password {
        inputs.insert("password".to_string(), password.clone());
    }

    WorkflowTarget::new(
        config.repository(technology),
        workflow,
        technology,
        inputs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_priority() {
        let cmd = ParsedCommand::parse("run ios tests in prod");
        assert_eq!(first_match(&cmd, None).unwrap().name, "prod-ios");

        let cmd = ParsedCommand::parse("run ios tests");
        assert_eq!(first_match(&cmd, None).unwrap().name, "mobile");

        let cmd = ParsedCommand::parse("smoke core ux");
        assert_eq!(first_match(&cmd, None).unwrap().name, "core-ux-smoke");

        let cmd = ParsedCommand::parse("smoke please");
        assert_eq!(first_match(&cmd, None).unwrap().name, "web-smoke");

        assert!(first_match(&ParsedCommand::parse("do the thing"), None).is_none());
    }

    #[test]
    fn test_technology_filter() {
        let cmd = ParsedCommand::parse("run ios tests in prod");
        assert_eq!(
            first_match(&cmd, Some(Technology::Maestro)).unwrap().name,
            "mobile"
        );
        assert!(first_match(&cmd, Some(Technology::Playwright)).is_none());
    }

    #[test]
    fn test_tags_per_technology() {
        let categories = [Category::E2e, Category::CoreUx, Category::Smoke];
        assert_eq!(
            tags_for(Technology::Playwright, &[], &categories),
            vec!["@e2e", "@coreUx"]
        );
        assert_eq!(
            tags_for(Technology::Selenium, &["mobile"], &categories),
            vec!["mobile", "coreUx", "smoke"]
        );
        assert!(tags_for(Technology::Playwright, &[], &[Category::Regression]).is_empty());
    }

    #[test]
    fn test_known_workflows() {
        let known = known_workflows();
        assert_eq!(
            known[&Technology::Selenium],
            vec!["Selenium Regression", "Prod iOS Regression", "Prod Android Regression"]
        );
        assert_eq!(known[&Technology::Maestro], vec!["Mobile Regression"]);
    }
}
