use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use todd_core::{RunHandle, Technology, WorkflowTarget};
use todd_github::{
    Artifact, CiProvider, Error, Repository, Result, WorkflowInfo, WorkflowJob, WorkflowRun,
};

pub fn handle(run_id: u64) -> RunHandle {
    RunHandle::new(
        run_id,
        WorkflowTarget::new("acme/web-e2e", "E2E Regression", Technology::Playwright, BTreeMap::new()),
    )
}

#[derive(Default)]
struct ScriptedRun {
    status: String,
    conclusion: Option<String>,
    jobs: Vec<(WorkflowJob, String)>,
    artifacts: Vec<Artifact>,
    failures_left: u32,
}

/// In-memory CI provider driven by the test.
#[derive(Default)]
pub struct FakeProvider {
    runs: Mutex<HashMap<u64, ScriptedRun>>,
    workflows: Mutex<HashMap<String, Vec<WorkflowInfo>>>,
    calls: Mutex<Vec<String>>,
    next_run_id: Mutex<u64>,
    broken_logs: Mutex<HashMap<u64, u16>>,
    /// Triggers currently in flight per workflow file.
    in_flight: Mutex<HashMap<String, usize>>,
    overlapping_triggers: Mutex<usize>,
}

impl FakeProvider {
    pub fn set_run(&self, run_id: u64, status: &str, conclusion: Option<&str>) {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.entry(run_id).or_default();
        run.status = status.to_string();
        run.conclusion = conclusion.map(str::to_string);
    }

    pub fn add_job(&self, run_id: u64, job_id: u64, status: &str, conclusion: Option<&str>, log: &str) {
        let job = WorkflowJob {
            id: job_id,
            name: format!("job-{}", job_id),
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
            started_at: None,
            completed_at: None,
        };
        self.runs
            .lock()
            .unwrap()
            .entry(run_id)
            .or_default()
            .jobs
            .push((job, log.to_string()));
    }

    pub fn set_job(&self, run_id: u64, job_id: u64, status: &str, conclusion: Option<&str>, log: &str) {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.entry(run_id).or_default();
        for (job, text) in run.jobs.iter_mut().filter(|(j, _)| j.id == job_id) {
            job.status = status.to_string();
            job.conclusion = conclusion.map(str::to_string);
            *text = log.to_string();
        }
    }

    pub fn add_artifact(&self, run_id: u64, id: u64, name: &str, size: u64) {
        self.runs
            .lock()
            .unwrap()
            .entry(run_id)
            .or_default()
            .artifacts
            .push(Artifact {
                id,
                name: name.to_string(),
                size_in_bytes: size,
                archive_download_url: format!("https://example.test/artifacts/{}", id),
                expired: false,
            });
    }

    /// Make the next `count` fetches of the run fail.
    pub fn fail_get_run(&self, run_id: u64, count: u32) {
        self.runs.lock().unwrap().entry(run_id).or_default().failures_left = count;
    }

    pub fn add_workflow(&self, repository: &str, name: &str, file: &str, state: &str) {
        self.workflows
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .push(WorkflowInfo {
                name: name.to_string(),
                path: format!(".github/workflows/{}", file),
                state: state.to_string(),
            });
    }

    /// Make every log download for the job fail with `status`.
    pub fn fail_job_logs(&self, job_id: u64, status: u16) {
        self.broken_logs.lock().unwrap().insert(job_id, status);
    }

    /// How often a trigger started while another one for the same
    /// workflow file was still running.
    pub fn overlapping_triggers(&self) -> usize {
        *self.overlapping_triggers.lock().unwrap()
    }

    pub fn calls(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CiProvider for FakeProvider {
    async fn list_workflows(&self, repo: &Repository) -> Result<Vec<WorkflowInfo>> {
        self.record(format!("list_workflows:{}", repo.full_name()));
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .get(&repo.full_name())
            .cloned()
            .unwrap_or_default())
    }

    async fn trigger_workflow(
        &self,
        repo: &Repository,
        workflow_file: &str,
        _inputs: &BTreeMap<String, String>,
    ) -> Result<u64> {
        self.record(format!("trigger:{}/{}", repo.full_name(), workflow_file));

        let key = format!("{}/{}", repo.full_name(), workflow_file);
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let active = in_flight.entry(key.clone()).or_default();
            if *active > 0 {
                *self.overlapping_triggers.lock().unwrap() += 1;
            }
            *active += 1;
        }
        // Give concurrent dispatches a chance to interleave.
        tokio::task::yield_now().await;
        *self.in_flight.lock().unwrap().entry(key).or_default() -= 1;

        if workflow_file == "broken.yml" {
            return Err(Error::ApiError {
                status: 422,
                message: "Unexpected inputs provided".to_string(),
            });
        }

        let mut next = self.next_run_id.lock().unwrap();
        *next += 1;
        let run_id = 1000 + *next;
        self.set_run(run_id, "queued", None);
        Ok(run_id)
    }

    async fn get_run(&self, _repo: &Repository, run_id: u64) -> Result<WorkflowRun> {
        self.record(format!("get_run:{}", run_id));
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| Error::ApiError { status: 404, message: "Not Found".to_string() })?;

        if run.failures_left > 0 {
            run.failures_left -= 1;
            return Err(Error::ApiError { status: 502, message: "Bad Gateway".to_string() });
        }

        let now = chrono::Utc::now();
        Ok(WorkflowRun {
            id: run_id,
            name: None,
            status: run.status.clone(),
            conclusion: run.conclusion.clone(),
            html_url: format!("https://github.com/acme/web-e2e/actions/runs/{}", run_id),
            created_at: now,
            updated_at: now,
        })
    }

    async fn list_jobs(&self, _repo: &Repository, run_id: u64) -> Result<Vec<WorkflowJob>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .get(&run_id)
            .map(|r| r.jobs.iter().map(|(job, _)| job.clone()).collect())
            .unwrap_or_default())
    }

    async fn job_logs(&self, _repo: &Repository, job_id: u64) -> Result<String> {
        if let Some(status) = self.broken_logs.lock().unwrap().get(&job_id) {
            return Err(Error::ApiError {
                status: *status,
                message: "Logs are no longer available".to_string(),
            });
        }
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .flat_map(|r| r.jobs.iter())
            .find(|(job, _)| job.id == job_id)
            .map(|(_, log)| log.clone())
            .unwrap_or_default())
    }

    async fn list_artifacts(&self, _repo: &Repository, run_id: u64) -> Result<Vec<Artifact>> {
        self.record(format!("artifacts:{}", run_id));
        Ok(self
            .runs
            .lock()
            .unwrap()
            .get(&run_id)
            .map(|r| r.artifacts.clone())
            .unwrap_or_default())
    }

    async fn cancel_run(&self, _repo: &Repository, run_id: u64) -> Result<()> {
        self.record(format!("cancel:{}", run_id));
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| Error::ApiError { status: 404, message: "Not Found".to_string() })?;

        if run.status == "completed" {
            return Err(Error::ApiError {
                status: 409,
                message: "Cannot cancel a workflow run that is completed.".to_string(),
            });
        }
        run.status = "completed".to_string();
        run.conclusion = Some("cancelled".to_string());
        Ok(())
    }
}
