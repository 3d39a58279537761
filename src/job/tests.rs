//! Tests for the job orchestrator.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::test_support::{
    MemoryProjectStore, RecordingProgress, RecordingSink, ScriptedApiError, ScriptedJobApi, job,
    log_line,
};
use crate::workspace::{ArchiveBuilder, WorkspaceError};

struct Harness {
    _tmp: TempDir,
    cwd: Utf8PathBuf,
    out: Utf8PathBuf,
    api: ScriptedJobApi,
    store: MemoryProjectStore,
}

impl Harness {
    fn orchestrator(&self) -> JobOrchestrator<ScriptedJobApi, MemoryProjectStore> {
        JobOrchestrator::new(
            self.api.clone(),
            self.store.clone(),
            WorkspacePackager::new(ArchiveBuilder::new(self.out.clone())),
            self.cwd.clone(),
        )
        .with_poll_interval(Duration::from_millis(10))
    }
}

#[fixture]
fn harness() -> Harness {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let base = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    let project = base.join("mnist");
    let out = base.join("out");
    fs::create_dir_all(project.join("data")).unwrap_or_else(|err| panic!("mkdir: {err}"));
    fs::create_dir_all(&out).unwrap_or_else(|err| panic!("mkdir: {err}"));
    fs::write(project.join("train.py"), [b'x'; 10]).unwrap_or_else(|err| panic!("write: {err}"));
    fs::write(project.join("data").join("set.csv"), [b'y'; 20])
        .unwrap_or_else(|err| panic!("write: {err}"));
    let cwd = project
        .canonicalize_utf8()
        .unwrap_or_else(|err| panic!("canonicalize: {err}"));
    Harness {
        _tmp: tmp,
        cwd,
        out,
        api: ScriptedJobApi::new(),
        store: MemoryProjectStore::default(),
    }
}

fn full_request() -> JobRequest {
    JobRequest {
        container: Some(String::from("tensorflow/tensorflow:latest-gpu")),
        machine_type: Some(String::from("P4000")),
        command: Some(String::from("python train.py")),
        ..JobRequest::default()
    }
}

#[rstest]
#[tokio::test]
async fn programmatic_submission_uploads_archive_and_records_settings(harness: Harness) {
    harness.api.push_create(Ok(job("js1", "Pending")));
    let mut progress = RecordingProgress::default();
    let mut sink = RecordingSink::default();
    let request = JobRequest {
        workspace: Some(String::from(".")),
        ..full_request()
    };

    let outcome = harness
        .orchestrator()
        .execute(request, &mut progress, &mut sink)
        .await
        .unwrap_or_else(|err| panic!("submission should succeed: {err}"));

    assert_eq!(outcome.job.id, "js1");
    assert!(outcome.final_job.is_none());
    assert_eq!(outcome.workspace.size_bytes, 30);
    assert_eq!(progress.advanced(), 30);

    let created = harness.api.created();
    assert_eq!(created.len(), 1);
    let params = created.first().unwrap_or_else(|| panic!("create params"));
    assert_eq!(params.project, "mnist");
    assert!(
        matches!(params.workspace, WorkspaceUpload::Archive { ref file_name, .. } if file_name == "mnist.zip"),
        "unexpected upload: {:?}",
        params.workspace
    );

    let saved = harness.store.saved();
    let last = saved.last().unwrap_or_else(|| panic!("settings should be saved"));
    assert_eq!(last.last_job_id.as_deref(), Some("js1"));
    assert_eq!(last.project.as_deref(), Some("mnist"));
    assert_eq!(last.workspace.as_deref(), Some("."));
}

#[rstest]
#[tokio::test]
async fn programmatic_mode_defaults_to_no_workspace_and_never_tails(harness: Harness) {
    harness.api.push_create(Ok(job("js2", "Pending")));

    let outcome = harness
        .orchestrator()
        .execute(
            full_request(),
            &mut RecordingProgress::default(),
            &mut RecordingSink::default(),
        )
        .await
        .unwrap_or_else(|err| panic!("submission should succeed: {err}"));

    assert_eq!(outcome.workspace.kind, WorkspaceKind::None);
    assert_eq!(harness.api.get_job_calls(), 0);
    assert!(harness.api.log_requests().is_empty());
    let params = harness.api.created();
    assert_eq!(
        params.first().map(|created| created.workspace.clone()),
        Some(WorkspaceUpload::None)
    );
}

#[rstest]
#[tokio::test]
async fn saved_settings_fill_missing_parameters(harness: Harness) {
    let store = MemoryProjectStore::with_config(ProjectConfig {
        container: Some(String::from("saved/container")),
        machine_type: Some(String::from("C5")),
        project: Some(String::from("saved-project")),
        project_id: Some(String::from("pr42")),
        workspace: Some(String::from("https://github.com/example/repo")),
        ..ProjectConfig::default()
    });
    let harness = Harness { store, ..harness };
    harness.api.push_create(Ok(job("js3", "Pending")));
    let request = JobRequest {
        machine_type: Some(String::from("P5000")),
        ..JobRequest::default()
    };

    harness
        .orchestrator()
        .execute(
            request,
            &mut RecordingProgress::default(),
            &mut RecordingSink::default(),
        )
        .await
        .unwrap_or_else(|err| panic!("submission should succeed: {err}"));

    let created = harness.api.created();
    let params = created.first().unwrap_or_else(|| panic!("create params"));
    assert_eq!(params.container, "saved/container");
    assert_eq!(params.machine_type, "P5000");
    assert_eq!(params.project, "saved-project");
    assert_eq!(params.project_id.as_deref(), Some("pr42"));
    assert_eq!(
        params.workspace,
        WorkspaceUpload::Link(String::from("https://github.com/example/repo"))
    );
    let saved = harness.store.saved();
    assert_eq!(
        saved.last().and_then(|config| config.machine_type.as_deref()),
        Some("P5000")
    );
}

#[rstest]
#[case(JobRequest { container: None, ..full_request() }, "container")]
#[case(JobRequest { machine_type: Some(String::from("  ")), ..full_request() }, "machine type")]
#[tokio::test]
async fn missing_required_parameter_fails_before_any_call(
    harness: Harness,
    #[case] request: JobRequest,
    #[case] field: &str,
) {
    let err = harness
        .orchestrator()
        .execute(
            request,
            &mut RecordingProgress::default(),
            &mut RecordingSink::default(),
        )
        .await
        .expect_err("validation should fail");

    assert!(
        matches!(err, JobError::Request(JobRequestError::MissingField(name)) if name == field),
        "unexpected error: {err}"
    );
    assert!(harness.api.created().is_empty());
    assert!(harness.store.saved().is_empty());
}

#[rstest]
#[tokio::test]
async fn missing_workspace_fails_before_create(harness: Harness) {
    let request = JobRequest {
        workspace: Some(String::from("does-not-exist")),
        ..full_request()
    };

    let err = harness
        .orchestrator()
        .execute(
            request,
            &mut RecordingProgress::default(),
            &mut RecordingSink::default(),
        )
        .await
        .expect_err("missing workspace should fail");

    assert!(
        matches!(err, JobError::Workspace(WorkspaceError::Missing { .. })),
        "unexpected error: {err}"
    );
    assert!(harness.api.created().is_empty());
}

#[rstest]
#[tokio::test]
async fn create_failure_leaves_settings_untouched(harness: Harness) {
    harness
        .api
        .push_create(Err(ScriptedApiError::Scripted(String::from("quota exceeded"))));

    let err = harness
        .orchestrator()
        .execute(
            full_request(),
            &mut RecordingProgress::default(),
            &mut RecordingSink::default(),
        )
        .await
        .expect_err("create failure should surface");

    assert!(matches!(err, JobError::Create(_)), "unexpected error: {err}");
    assert!(harness.store.saved().is_empty());
}

#[rstest]
#[tokio::test]
async fn settings_write_failure_is_reported(harness: Harness) {
    harness.api.push_create(Ok(job("js4", "Pending")));
    harness.store.fail_on_save();

    let err = harness
        .orchestrator()
        .execute(
            full_request(),
            &mut RecordingProgress::default(),
            &mut RecordingSink::default(),
        )
        .await
        .expect_err("settings failure should surface");

    assert!(matches!(err, JobError::Config(_)), "unexpected error: {err}");
}

#[rstest]
#[tokio::test]
async fn interactive_submission_tails_until_finished(harness: Harness) {
    harness.api.push_create(Ok(job("js5", "Pending")));
    harness.api.push_job("js5", "Running");
    harness
        .api
        .push_log_page(vec![log_line(1, "training"), log_line(2, "PSEOF")]);
    harness.api.push_job_response(Ok(JobRecord {
        exit_code: Some(0),
        ..job("js5", "Stopped")
    }));
    let mut sink = RecordingSink::default();

    let outcome = harness
        .orchestrator()
        .with_mode(ExecutionMode::Interactive)
        .execute(full_request(), &mut RecordingProgress::default(), &mut sink)
        .await
        .unwrap_or_else(|err| panic!("submission should succeed: {err}"));

    assert_eq!(outcome.latest().state, "Stopped");
    assert_eq!(outcome.workspace.kind, WorkspaceKind::Directory);
    assert_eq!(sink.log_lines, vec!["training"]);
    assert!(
        sink.statuses.iter().any(|status| status == "New job id: js5"),
        "statuses: {:?}",
        sink.statuses
    );
}
