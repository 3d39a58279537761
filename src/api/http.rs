//! `reqwest` implementation of [`JobApi`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    ApiError, ApiFuture, CreateJobParams, JobApi, JobRecord, LogLine, MachineRecord,
    WorkspaceUpload,
};
use crate::config::ApiConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const API_KEY_HEADER: &str = "x-api-key";
const LOG_PAGE_LIMIT: u64 = 10_000;

const CREATE_JOB_PATH: &str = "/jobs/createJob";
const GET_JOB_PATH: &str = "/jobs/getJob";
const JOB_LOGS_PATH: &str = "/jobs/logs";
const GET_MACHINE_PATH: &str = "/machines/getMachinePublic";

/// Client for the compute API over HTTPS.
#[derive(Clone)]
pub struct HttpJobApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpJobApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJobApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpJobApi {
    /// Constructs a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] when the configuration fails validation or
    /// the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| ApiError::Config(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|err| ApiError::Transport {
                endpoint: endpoint.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| ApiError::Transport {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;
        debug!(endpoint, status = status.as_u16(), bytes = body.len(), "api response");

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|err| ApiError::Decode {
                endpoint: endpoint.to_owned(),
                message: err.to_string(),
            });
        }

        Err(ApiError::Status {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn create_job_form(params: &CreateJobParams) -> Result<Form, ApiError> {
        let mut form = Form::new()
            .text("container", params.container.clone())
            .text("machineType", params.machine_type.clone())
            .text("project", params.project.clone());
        for (name, value) in [
            ("projectId", params.project_id.as_ref()),
            ("command", params.command.as_ref()),
            ("dataset", params.dataset.as_ref()),
        ] {
            if let Some(text) = value {
                form = form.text(name, text.clone());
            }
        }
        if let Some(registry) = &params.registry {
            form = form
                .text("registryUsername", registry.username.clone())
                .text("registryPassword", registry.password.clone());
        }
        if let Some(auth) = &params.workspace_auth {
            form = form
                .text("workspaceUsername", auth.username.clone())
                .text("workspacePassword", auth.password.clone());
        }

        match &params.workspace {
            WorkspaceUpload::Archive { path, file_name } => {
                let upload_error = |err: &dyn std::fmt::Display| ApiError::Upload {
                    path: path.to_string(),
                    message: err.to_string(),
                };
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|err| upload_error(&err))?;
                let len = file
                    .metadata()
                    .await
                    .map_err(|err| upload_error(&err))?
                    .len();
                let part = Part::stream_with_length(Body::from(file), len)
                    .file_name(file_name.clone())
                    .mime_str("application/zip")
                    .map_err(|err| upload_error(&err))?;
                form = form
                    .text("workspaceFileName", file_name.clone())
                    .part("file", part);
            }
            WorkspaceUpload::Link(link) => {
                form = form.text("workspace", link.clone());
            }
            WorkspaceUpload::None => {}
        }
        Ok(form)
    }
}

fn error_message(body: &[u8]) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
        message: Option<String>,
    }

    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .error
                .and_then(|detail| detail.message)
                .or(parsed.message)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

impl JobApi for HttpJobApi {
    type Error = ApiError;

    fn create_job<'a>(
        &'a self,
        params: &'a CreateJobParams,
    ) -> ApiFuture<'a, JobRecord, Self::Error> {
        Box::pin(async move {
            let form = Self::create_job_form(params).await?;
            let request = self
                .client
                .post(self.url(CREATE_JOB_PATH))
                .timeout(UPLOAD_TIMEOUT)
                .multipart(form);
            self.send(CREATE_JOB_PATH, request).await
        })
    }

    fn get_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobRecord, Self::Error> {
        Box::pin(async move {
            let request = self
                .client
                .get(self.url(GET_JOB_PATH))
                .query(&[("jobId", job_id)]);
            self.send(GET_JOB_PATH, request).await
        })
    }

    fn get_machine<'a>(
        &'a self,
        machine_id: &'a str,
    ) -> ApiFuture<'a, MachineRecord, Self::Error> {
        Box::pin(async move {
            let request = self
                .client
                .get(self.url(GET_MACHINE_PATH))
                .query(&[("machineId", machine_id)]);
            self.send(GET_MACHINE_PATH, request).await
        })
    }

    fn job_logs<'a>(
        &'a self,
        job_id: &'a str,
        from_line: u64,
    ) -> ApiFuture<'a, Vec<LogLine>, Self::Error> {
        Box::pin(async move {
            let line = from_line.to_string();
            let limit = LOG_PAGE_LIMIT.to_string();
            let request = self.client.get(self.url(JOB_LOGS_PATH)).query(&[
                ("jobId", job_id),
                ("line", line.as_str()),
                ("limit", limit.as_str()),
            ]);
            self.send(JOB_LOGS_PATH, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Credentials;
    use camino::Utf8PathBuf;

    #[test]
    fn error_message_prefers_structured_detail() {
        let body = br#"{"error":{"name":"Error","status":400,"message":"invalid machine type"}}"#;
        assert_eq!(error_message(body), "invalid machine type");
    }

    #[test]
    fn error_message_falls_back_to_body_text() {
        assert_eq!(error_message(b"Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn new_rejects_missing_api_key() {
        let config = ApiConfig {
            api_key: String::new(),
            api_base_url: String::from("https://example.test"),
        };
        assert!(matches!(HttpJobApi::new(&config), Err(ApiError::Config(_))));
    }

    #[test]
    fn url_joins_without_duplicate_slash() {
        let config = ApiConfig {
            api_key: String::from("key"),
            api_base_url: String::from("https://example.test/"),
        };
        let api = HttpJobApi::new(&config).unwrap_or_else(|err| panic!("client: {err}"));
        assert_eq!(api.url(GET_JOB_PATH), "https://example.test/jobs/getJob");
    }

    #[tokio::test]
    async fn create_job_form_streams_existing_archive() {
        let tmp = tempfile::TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("mnist.zip"))
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
        std::fs::write(&path, b"PK\x05\x06").unwrap_or_else(|err| panic!("write: {err}"));
        let params = CreateJobParams {
            container: String::from("img"),
            machine_type: String::from("P4000"),
            project: String::from("demo"),
            workspace: WorkspaceUpload::Archive {
                path,
                file_name: String::from("mnist.zip"),
            },
            ..CreateJobParams::default()
        };

        let result = HttpJobApi::create_job_form(&params).await;

        assert!(result.is_ok(), "unexpected error: {:?}", result.err());
    }

    #[tokio::test]
    async fn create_job_form_reports_unreadable_archive() {
        let params = CreateJobParams {
            container: String::from("img"),
            machine_type: String::from("P4000"),
            project: String::from("demo"),
            registry: Some(Credentials {
                username: String::from("u"),
                password: String::from("p"),
            }),
            workspace: WorkspaceUpload::Archive {
                path: Utf8PathBuf::from("/nonexistent/skiff/workspace.zip"),
                file_name: String::from("workspace.zip"),
            },
            ..CreateJobParams::default()
        };

        let result = HttpJobApi::create_job_form(&params).await;

        assert!(
            matches!(result, Err(ApiError::Upload { ref path, .. }) if path.ends_with("workspace.zip")),
            "unexpected result: {:?}",
            result.err()
        );
    }
}
