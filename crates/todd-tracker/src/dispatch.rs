use futures::future::join_all;
use std::collections::BTreeMap;
use todd_core::{RunHandle, WorkflowTarget};
use todd_github::{CiProvider, Repository};

use crate::TriggerError;

fn provider_error(target: &WorkflowTarget, source: todd_github::Error) -> TriggerError {
    TriggerError::Provider {
        repository: target.repository_full_name.clone(),
        workflow: target.workflow_name.clone(),
        source,
    }
}

/// Find the workflow file a target's display name refers to.
async fn resolve_workflow(
    provider: &dyn CiProvider,
    target: &WorkflowTarget,
    branch: &str,
) -> Result<(Repository, String), TriggerError> {
    let repo = Repository::parse(&target.repository_full_name)
        .map_err(|e| provider_error(target, e))?
        .with_branch(branch.to_string());

    let workflows = provider
        .list_workflows(&repo)
        .await
        .map_err(|e| provider_error(target, e))?;
    let workflow = workflows
        .iter()
        .find(|w| w.matches(&target.workflow_name))
        .ok_or_else(|| TriggerError::WorkflowNotFound {
            repository: target.repository_full_name.clone(),
            workflow: target.workflow_name.clone(),
        })?;

    if !workflow.is_active() {
        return Err(TriggerError::WorkflowDisabled {
            repository: target.repository_full_name.clone(),
            workflow: target.workflow_name.clone(),
        });
    }

    let file = workflow.file_name().to_string();
    Ok((repo, file))
}

async fn trigger(
    provider: &dyn CiProvider,
    repo: &Repository,
    file: &str,
    target: &WorkflowTarget,
) -> Result<RunHandle, TriggerError> {
    let run_id = provider
        .trigger_workflow(repo, file, &target.input_parameters)
        .await
        .map_err(|e| provider_error(target, e))?;

    tracing::info!("Triggered {} ({}) as run {}", target.descriptive_label, file, run_id);
    Ok(RunHandle::new(run_id, target.clone()))
}

/// Trigger one target: resolve its workflow file, dispatch, and return the run handle.
pub async fn dispatch_target(
    provider: &dyn CiProvider,
    target: &WorkflowTarget,
    branch: &str,
) -> Result<RunHandle, TriggerError> {
    let (repo, file) = resolve_workflow(provider, target, branch).await?;
    trigger(provider, &repo, &file, target).await
}

/// Trigger every target. One failure never aborts the others; results come
/// back in target order.
///
/// Different workflows are dispatched concurrently. Targets sharing a
/// workflow file go out one after another, since the provider tells their
/// runs apart only by creation order.
pub async fn dispatch_batch(
    provider: &dyn CiProvider,
    targets: &[WorkflowTarget],
    branch: &str,
) -> Vec<Result<RunHandle, TriggerError>> {
    let resolved = join_all(targets.iter().map(|t| resolve_workflow(provider, t, branch))).await;

    let mut slots: Vec<Option<Result<RunHandle, TriggerError>>> = Vec::with_capacity(targets.len());
    let mut by_file: BTreeMap<(String, String), Vec<(usize, Repository)>> = BTreeMap::new();
    for (index, outcome) in resolved.into_iter().enumerate() {
        match outcome {
            Ok((repo, file)) => {
                by_file.entry((repo.full_name(), file)).or_default().push((index, repo));
                slots.push(None);
            }
            Err(e) => slots.push(Some(Err(e))),
        }
    }

    let triggered = join_all(by_file.into_iter().map(|((_, file), members)| async move {
        let mut results = Vec::with_capacity(members.len());
        for (index, repo) in members {
            results.push((index, trigger(provider, &repo, &file, &targets[index]).await));
        }
        results
    }))
    .await;

    for (index, result) in triggered.into_iter().flatten() {
        slots[index] = Some(result);
    }

    let results: Vec<_> = slots.into_iter().flatten().collect();
    for result in &results {
        if let Err(e) = result {
            tracing::error!("{}", e);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;
    use std::collections::BTreeMap;
    use todd_core::Technology;

    fn target(workflow: &str) -> WorkflowTarget {
        WorkflowTarget::new("acme/web-e2e", workflow, Technology::Playwright, BTreeMap::new())
    }

    fn provider() -> FakeProvider {
        let provider = FakeProvider::default();
        provider.add_workflow("acme/web-e2e", "E2E Smoke", "smoke.yml", "active");
        provider.add_workflow("acme/web-e2e", "E2E Regression", "regression.yml", "active");
        provider.add_workflow("acme/web-e2e", "Legacy", "legacy.yml", "disabled_manually");
        provider.add_workflow("acme/web-e2e", "Broken", "broken.yml", "active");
        provider
    }

    #[tokio::test]
    async fn test_dispatch_resolves_workflow_file() {
        let provider = provider();
        let handle = dispatch_target(&provider, &target("e2e smoke"), "main").await.unwrap();

        assert_eq!(handle.target.workflow_name, "e2e smoke");
        assert_eq!(provider.calls("trigger:acme/web-e2e/smoke.yml"), 1);
    }

    #[tokio::test]
    async fn test_batch_partial_failure() {
        let provider = provider();
        let targets = vec![
            target("E2E Smoke"),
            target("Broken"),
            target("Nope"),
            target("Legacy"),
            target("E2E Regression"),
        ];

        let results = dispatch_batch(&provider, &targets, "main").await;

        assert_eq!(results.len(), 5);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(TriggerError::Provider { source, .. }) if source.status() == Some(422)
        ));
        assert!(matches!(results[2], Err(TriggerError::WorkflowNotFound { .. })));
        assert!(matches!(results[3], Err(TriggerError::WorkflowDisabled { .. })));
        assert!(results[4].is_ok());
    }

    #[tokio::test]
    async fn test_same_workflow_is_dispatched_in_order() {
        let provider = provider();
        let mut qa = target("E2E Smoke");
        qa.input_parameters.insert("environment".to_string(), "qa".to_string());
        let mut prod = target("smoke.yml");
        prod.input_parameters.insert("environment".to_string(), "prod".to_string());
        let targets = vec![qa, target("E2E Regression"), prod];

        let results = dispatch_batch(&provider, &targets, "main").await;

        assert_eq!(provider.overlapping_triggers(), 0);
        assert_eq!(provider.calls("trigger:acme/web-e2e/smoke.yml"), 2);

        let handles: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(handles[0].target.input_parameters["environment"], "qa");
        assert_eq!(handles[2].target.input_parameters["environment"], "prod");
        assert!(handles[0].run_id < handles[2].run_id);
        assert_ne!(handles[0].run_id, handles[1].run_id);
    }

    #[tokio::test]
    async fn test_invalid_repository() {
        let provider = provider();
        let bad = WorkflowTarget::new("not-a-repo", "E2E Smoke", Technology::Playwright, BTreeMap::new());
        let result = dispatch_target(&provider, &bad, "main").await;
        assert!(matches!(result, Err(TriggerError::Provider { .. })));
    }
}
