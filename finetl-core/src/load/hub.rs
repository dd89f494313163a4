//! Hugging Face Hub loader: publishes the extracted tables as splits of one dataset.
//!
//! [`HubLoader`] turns tables into Parquet-encoded splits and hands them to a
//! [`HubApi`]. [`HfHubClient`] implements that boundary over the Hub HTTP API:
//! small files are committed inline, large ones go through the Git LFS batch
//! endpoint first, and a dataset card declaring the splits is committed alongside.

use super::Loader;
use crate::config::HubTarget;
use crate::error::LoadingError;
use crate::model::ExtractedData;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Token variables, in lookup order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

const REVISION: &str = "main";

/// Bytes of a file sent to the preupload endpoint for classification.
const SAMPLE_LEN: usize = 512;

/// Errors talking to the Hub.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("no Hugging Face token found (set {} or {})", TOKEN_ENV_VARS[0], TOKEN_ENV_VARS[1])]
    MissingToken,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{action} returned HTTP {status}: {message}")]
    Api {
        action: &'static str,
        status: u16,
        message: String,
    },

    #[error("unexpected Hub response: {0}")]
    Protocol(String),
}

/// One dataset split, already encoded as Parquet.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub name: String,
    pub rows: usize,
    pub parquet: Vec<u8>,
}

impl DatasetSplit {
    /// Repository path of the split's single data shard.
    pub fn path_in_repo(&self) -> String {
        format!("data/{}-00000-of-00001.parquet", self.name)
    }
}

/// Operations the pipeline needs from a dataset hub.
pub trait HubApi {
    /// Name of the account the credentials belong to.
    fn whoami(&self) -> Result<String, HubError>;

    fn repo_exists(&self, repo_id: &str) -> Result<bool, HubError>;

    /// Create a dataset repository. Creating one that already exists succeeds.
    fn create_repo(&self, repo_id: &str, private: bool) -> Result<(), HubError>;

    /// Publish all splits as one commit, creating the repository if missing.
    fn push_dataset(
        &self,
        repo_id: &str,
        splits: &[DatasetSplit],
        private: bool,
    ) -> Result<(), HubError>;
}

impl<H: HubApi + ?Sized> HubApi for Box<H> {
    fn whoami(&self) -> Result<String, HubError> {
        (**self).whoami()
    }

    fn repo_exists(&self, repo_id: &str) -> Result<bool, HubError> {
        (**self).repo_exists(repo_id)
    }

    fn create_repo(&self, repo_id: &str, private: bool) -> Result<(), HubError> {
        (**self).create_repo(repo_id, private)
    }

    fn push_dataset(
        &self,
        repo_id: &str,
        splits: &[DatasetSplit],
        private: bool,
    ) -> Result<(), HubError> {
        (**self).push_dataset(repo_id, splits, private)
    }
}

/// Loader publishing to a Hub dataset repository.
pub struct HubLoader {
    target: HubTarget,
    api: Box<dyn HubApi>,
}

impl HubLoader {
    pub fn new(target: HubTarget, api: impl HubApi + 'static) -> Self {
        Self {
            target,
            api: Box::new(api),
        }
    }
}

impl Loader for HubLoader {
    fn destination(&self) -> &str {
        "huggingface"
    }

    fn load(&self, data: &ExtractedData) -> Result<(), LoadingError> {
        let splits = to_splits(data)?;
        if splits.is_empty() {
            debug!(repo_id = %self.target.repo_id, "no splits to push");
            return Ok(());
        }

        info!(
            repo_id = %self.target.repo_id,
            splits = ?splits.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            private = self.target.private,
            "pushing dataset"
        );
        self.api
            .push_dataset(&self.target.repo_id, &splits, self.target.private)
            .map_err(|source| LoadingError::Upload {
                repo_id: self.target.repo_id.clone(),
                source,
            })
    }
}

/// Encode every present table as a split named after the table.
pub fn to_splits(data: &ExtractedData) -> Result<Vec<DatasetSplit>, LoadingError> {
    data.tables()
        .map(|(table, df)| {
            encode_parquet(df)
                .map(|parquet| DatasetSplit {
                    name: table.as_str().to_string(),
                    rows: df.height(),
                    parquet,
                })
                .map_err(|source| LoadingError::Convert { table, source })
        })
        .collect()
}

fn encode_parquet(df: &DataFrame) -> PolarsResult<Vec<u8>> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut df.clone())?;
    Ok(buf)
}

/// Dataset card front matter mapping each split to its data files.
pub fn dataset_card(repo_id: &str, splits: &[DatasetSplit]) -> String {
    let mut card = String::from("---\nconfigs:\n- config_name: default\n  data_files:\n");
    for split in splits {
        card.push_str(&format!(
            "  - split: {}\n    path: data/{}-*\n",
            split.name, split.name
        ));
    }
    card.push_str("---\n\n");
    card.push_str(&format!("# {repo_id}\n\nMarket data published by finetl.\n\n"));
    for split in splits {
        card.push_str(&format!("- `{}`: {} rows\n", split.name, split.rows));
    }
    card
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
struct PreuploadFile {
    path: String,
    #[serde(rename = "uploadMode")]
    upload_mode: String,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    oid: String,
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: u16,
    message: String,
}

/// A file staged for a commit.
struct CommitFile {
    path: String,
    content: Vec<u8>,
}

impl CommitFile {
    fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.content))
    }
}

/// Hub HTTP API client.
pub struct HfHubClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

impl HfHubClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, HubError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("finetl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Endpoint from `HF_ENDPOINT`, token from `HF_TOKEN` or `HUGGING_FACE_HUB_TOKEN`.
    pub fn from_env() -> Result<Self, HubError> {
        let endpoint =
            std::env::var("HF_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|t| !t.trim().is_empty());
        Self::new(endpoint, token)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn token(&self) -> Result<&str, HubError> {
        self.token.as_deref().ok_or(HubError::MissingToken)
    }

    fn send(
        &self,
        action: &'static str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, HubError> {
        let resp = request.bearer_auth(self.token()?).send()?;
        check(action, resp)
    }

    fn preupload(
        &self,
        repo_id: &str,
        files: &[CommitFile],
    ) -> Result<HashMap<String, String>, HubError> {
        let body = json!({
            "files": files.iter().map(|f| json!({
                "path": f.path,
                "size": f.content.len(),
                "sample": BASE64.encode(&f.content[..f.content.len().min(SAMPLE_LEN)]),
            })).collect::<Vec<_>>(),
        });
        let url = format!(
            "{}/api/datasets/{repo_id}/preupload/{REVISION}",
            self.endpoint
        );
        let resp: PreuploadResponse = self
            .send("preupload", self.client.post(url).json(&body))?
            .json()?;
        Ok(resp
            .files
            .into_iter()
            .map(|f| (f.path, f.upload_mode))
            .collect())
    }

    /// Upload LFS objects the server does not already have.
    fn upload_lfs(&self, repo_id: &str, files: &[&CommitFile]) -> Result<(), HubError> {
        if files.is_empty() {
            return Ok(());
        }

        let body = json!({
            "operation": "upload",
            "transfers": ["basic"],
            "hash_algo": "sha256",
            "objects": files.iter().map(|f| json!({
                "oid": f.sha256(),
                "size": f.content.len(),
            })).collect::<Vec<_>>(),
        });
        let url = format!("{}/datasets/{repo_id}.git/info/lfs/objects/batch", self.endpoint);
        let batch: LfsBatchResponse = self
            .send(
                "LFS batch",
                self.client
                    .post(url)
                    .header("Accept", "application/vnd.git-lfs+json")
                    .header("Content-Type", "application/vnd.git-lfs+json")
                    .body(body.to_string()),
            )?
            .json()?;

        for object in batch.objects {
            if let Some(err) = object.error {
                return Err(HubError::Api {
                    action: "LFS batch",
                    status: err.code,
                    message: err.message,
                });
            }
            let Some(file) = files.iter().find(|f| f.sha256() == object.oid) else {
                return Err(HubError::Protocol(format!("unknown LFS object {}", object.oid)));
            };
            let Some(actions) = object.actions else {
                debug!(path = %file.path, "LFS object already present");
                continue;
            };

            if let Some(upload) = actions.upload {
                let mut put = self.client.put(&upload.href).body(file.content.clone());
                for (name, value) in &upload.header {
                    put = put.header(name.as_str(), value.as_str());
                }
                check("LFS upload", put.send()?)?;
                debug!(path = %file.path, bytes = file.content.len(), "uploaded LFS object");
            }
            if let Some(verify) = actions.verify {
                let mut post = self
                    .client
                    .post(&verify.href)
                    .json(&json!({ "oid": object.oid, "size": file.content.len() }));
                for (name, value) in &verify.header {
                    post = post.header(name.as_str(), value.as_str());
                }
                self.send("LFS verify", post)?;
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        repo_id: &str,
        files: &[CommitFile],
        modes: &HashMap<String, String>,
        summary: &str,
    ) -> Result<(), HubError> {
        let mut lines = vec![json!({
            "key": "header",
            "value": { "summary": summary, "description": "" },
        })];
        for file in files {
            let line = if is_lfs(modes, &file.path) {
                json!({
                    "key": "lfsFile",
                    "value": {
                        "path": file.path,
                        "algo": "sha256",
                        "oid": file.sha256(),
                        "size": file.content.len(),
                    },
                })
            } else {
                json!({
                    "key": "file",
                    "value": {
                        "path": file.path,
                        "content": BASE64.encode(&file.content),
                        "encoding": "base64",
                    },
                })
            };
            lines.push(line);
        }
        let body = lines
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let url = format!("{}/api/datasets/{repo_id}/commit/{REVISION}", self.endpoint);
        self.send(
            "commit",
            self.client
                .post(url)
                .header("Content-Type", "application/x-ndjson")
                .body(body),
        )?;
        Ok(())
    }
}

impl HubApi for HfHubClient {
    fn whoami(&self) -> Result<String, HubError> {
        let url = format!("{}/api/whoami-v2", self.endpoint);
        let me: WhoAmI = self.send("whoami", self.client.get(url))?.json()?;
        Ok(me.name)
    }

    fn repo_exists(&self, repo_id: &str) -> Result<bool, HubError> {
        let url = format!("{}/api/datasets/{repo_id}", self.endpoint);
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.token()?)
            .send()?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check("repo lookup", resp)?;
        Ok(true)
    }

    fn create_repo(&self, repo_id: &str, private: bool) -> Result<(), HubError> {
        let (organization, name) = match repo_id.split_once('/') {
            Some((org, name)) => (Some(org), name),
            None => (None, repo_id),
        };
        let mut body = json!({ "name": name, "type": "dataset", "private": private });
        if let Some(org) = organization {
            body["organization"] = json!(org);
        }

        let url = format!("{}/api/repos/create", self.endpoint);
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.token()?)
            .json(&body)
            .send()?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            debug!(repo_id, "repository already exists");
            return Ok(());
        }
        check("create repo", resp)?;
        info!(repo_id, private, "created dataset repository");
        Ok(())
    }

    fn push_dataset(
        &self,
        repo_id: &str,
        splits: &[DatasetSplit],
        private: bool,
    ) -> Result<(), HubError> {
        if !self.repo_exists(repo_id)? {
            self.create_repo(repo_id, private)?;
        }

        let mut files: Vec<CommitFile> = splits
            .iter()
            .map(|s| CommitFile {
                path: s.path_in_repo(),
                content: s.parquet.clone(),
            })
            .collect();
        files.push(CommitFile {
            path: "README.md".to_string(),
            content: dataset_card(repo_id, splits).into_bytes(),
        });

        let modes = self.preupload(repo_id, &files)?;
        let lfs: Vec<&CommitFile> = files.iter().filter(|f| is_lfs(&modes, &f.path)).collect();
        self.upload_lfs(repo_id, &lfs)?;

        let names: Vec<&str> = splits.iter().map(|s| s.name.as_str()).collect();
        self.commit(
            repo_id,
            &files,
            &modes,
            &format!("Upload dataset splits: {}", names.join(", ")),
        )?;
        info!(repo_id, files = files.len(), lfs = lfs.len(), "dataset committed");
        Ok(())
    }
}

fn is_lfs(modes: &HashMap<String, String>, path: &str) -> bool {
    modes.get(path).is_some_and(|mode| mode == "lfs")
}

/// Map a non-success response to [`HubError::Api`], keeping the server's message.
fn check(
    action: &'static str,
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, HubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(HubError::Api {
        action,
        status: status.as_u16(),
        message,
    })
}
