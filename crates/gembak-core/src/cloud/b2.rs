use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::CloudCredentials;
use crate::error::{GembakError, Result};

use super::retry::{retry_http, retry_http_body, HttpRetryError, RetryConfig};
use super::{CloudMirror, RemoteObject};

const AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";
const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    account_id: String,
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketList {
    buckets: Vec<BucketEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketEntry {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    files: Vec<FileEntry>,
    next_file_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    file_name: String,
    file_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    authorization_token: String,
}

/// Backblaze B2 mirror over the native v2 JSON API.
///
/// `connect` authorizes the account and resolves the bucket id; every
/// later call reuses the session token. Transient HTTP failures are
/// retried with exponential backoff.
pub struct B2Mirror {
    agent: ureq::Agent,
    token: String,
    api_url: String,
    download_url: String,
    bucket_id: String,
    bucket_name: String,
    retry: RetryConfig,
}

impl B2Mirror {
    /// Authorize with the account key pair and look up the bucket.
    /// Authentication failures map to [`GembakError::CloudAuth`].
    pub fn connect(creds: &CloudCredentials) -> Result<B2Mirror> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300))
            .build();

        info!(bucket = %creds.bucket, "authenticating with Backblaze B2");
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", creds.key_id, creds.app_key));
        let auth: AuthorizeResponse = agent
            .get(AUTHORIZE_URL)
            .set("Authorization", &format!("Basic {basic}"))
            .call()
            .map_err(|e| GembakError::CloudAuth(format!("authorize account: {e}")))?
            .into_json()
            .map_err(|e| GembakError::CloudAuth(format!("authorize response: {e}")))?;

        let mirror = B2Mirror {
            agent,
            token: auth.authorization_token,
            api_url: auth.api_url,
            download_url: auth.download_url,
            bucket_id: String::new(),
            bucket_name: creds.bucket.clone(),
            retry: RetryConfig::default(),
        };

        let buckets: BucketList = mirror
            .api_call(
                "b2_list_buckets",
                serde_json::json!({
                    "accountId": auth.account_id,
                    "bucketName": creds.bucket,
                }),
            )
            .map_err(|e| GembakError::CloudAuth(format!("list buckets: {e}")))?;
        let bucket_id = buckets
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == creds.bucket)
            .map(|b| b.bucket_id)
            .ok_or_else(|| {
                GembakError::CloudAuth(format!("bucket not accessible: '{}'", creds.bucket))
            })?;

        info!(bucket = %creds.bucket, "connected to bucket");
        Ok(B2Mirror { bucket_id, ..mirror })
    }

    /// POST a JSON body to a B2 API operation and decode the response.
    fn api_call<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/b2api/v2/{operation}", self.api_url);
        let resp = retry_http(&self.retry, operation, || {
            self.agent
                .post(&url)
                .set("Authorization", &self.token)
                .send_json(body.clone())
        })
        .map_err(|e| GembakError::CloudTransfer(format!("{operation}: {e}")))?;
        resp.into_json()
            .map_err(|e| GembakError::CloudTransfer(format!("{operation} response: {e}")))
    }
}

impl CloudMirror for B2Mirror {
    fn upload(&self, local: &Path, remote_name: &str) -> Result<()> {
        let data = std::fs::read(local)?;
        info!(
            local = %local.display(),
            remote = remote_name,
            size = data.len(),
            "uploading to cloud"
        );

        // Upload URLs are single-use on some failures, so each attempt
        // requests a fresh target.
        retry_http_body(&self.retry, "upload", || {
            let target_url = format!("{}/b2api/v2/b2_get_upload_url", self.api_url);
            let target: UploadTarget = self
                .agent
                .post(&target_url)
                .set("Authorization", &self.token)
                .send_json(serde_json::json!({ "bucketId": self.bucket_id }))
                .map_err(HttpRetryError::http)?
                .into_json()
                .map_err(HttpRetryError::BodyIo)?;

            self.agent
                .post(&target.upload_url)
                .set("Authorization", &target.authorization_token)
                .set("X-Bz-File-Name", &encode_file_name(remote_name))
                .set("Content-Type", "b2/x-auto")
                .set("X-Bz-Content-Sha1", "do_not_verify")
                .send_bytes(&data)
                .map_err(HttpRetryError::http)
        })
        .map_err(|e| GembakError::CloudTransfer(format!("upload '{remote_name}': {e}")))?;

        info!(remote = remote_name, "upload complete");
        Ok(())
    }

    fn download(&self, remote_name: &str, local: &Path) -> Result<()> {
        info!(remote = remote_name, local = %local.display(), "downloading from cloud");
        let url = format!(
            "{}/file/{}/{}",
            self.download_url,
            self.bucket_name,
            encode_file_name(remote_name)
        );

        let resp = retry_http(&self.retry, "download", || {
            self.agent.get(&url).set("Authorization", &self.token).call()
        })
        .map_err(|e| GembakError::CloudTransfer(format!("download '{remote_name}': {e}")))?;

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(local)?;
        let mut reader = resp.into_reader();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| GembakError::CloudTransfer(format!("download '{remote_name}': {e}")))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        info!(remote = remote_name, "download complete");
        Ok(())
    }

    fn list(&self) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let mut body = serde_json::json!({
                "bucketId": self.bucket_id,
                "maxFileCount": LIST_PAGE_SIZE,
            });
            if let Some(ref name) = start {
                body["startFileName"] = serde_json::Value::String(name.clone());
            }
            let page: FileList = self.api_call("b2_list_file_names", body)?;
            objects.extend(page.files.into_iter().map(|f| RemoteObject {
                name: f.file_name,
                file_id: f.file_id,
            }));
            match page.next_file_name {
                Some(next) => start = Some(next),
                None => break,
            }
        }

        debug!(count = objects.len(), "listed cloud objects");
        Ok(objects)
    }

    fn delete(&self, object: &RemoteObject) -> Result<()> {
        let _: serde_json::Value = self.api_call(
            "b2_delete_file_version",
            serde_json::json!({
                "fileName": object.name,
                "fileId": object.file_id,
            }),
        )?;
        debug!(remote = %object.name, "deleted cloud object");
        Ok(())
    }
}

/// Percent-encode a file name for the `X-Bz-File-Name` header and download
/// URLs. B2 requires UTF-8 percent-encoding of everything outside the
/// unreserved set, with `/` kept literal.
fn encode_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
