use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::pktline;

/// Which of the two git services a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    pub fn as_service_name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    fn as_git_subcommand(&self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    pub fn result_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }
}

/// Transport-facing entry point for the two git services. Knows nothing
/// about auth, protection, or metadata — it shells out to the real `git`
/// binary, which is the only component that correctly implements the
/// upload-pack/receive-pack wire protocol end to end.
#[derive(Debug, Clone, Default)]
pub struct GitEngine;

impl GitEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build the `info/refs?service=...` advertisement response body,
    /// including the pkt-line service header the smart HTTP protocol
    /// requires before the advertisement itself.
    pub async fn advertise_refs(&self, repo_path: &Path, service: Service) -> Result<Vec<u8>> {
        let git_output = self
            .run_stateless(repo_path, service, &[], true)
            .await?;

        let mut out = Vec::with_capacity(git_output.len() + 32);
        out.extend(pktline::encode_str(&format!(
            "# service={}\n",
            service.as_service_name()
        )));
        out.extend(pktline::flush());
        out.extend(git_output);
        Ok(out)
    }

    /// Serve a `git-upload-pack` (clone/fetch) request. Entirely read-only,
    /// so no quarantine or pipeline involvement is needed.
    pub async fn upload_pack(&self, repo_path: &Path, input: &[u8]) -> Result<Vec<u8>> {
        self.run_stateless(repo_path, Service::UploadPack, input, false)
            .await
    }

    async fn run_stateless(
        &self,
        repo_path: &Path,
        service: Service,
        input: &[u8],
        advertise: bool,
    ) -> Result<Vec<u8>> {
        let mut cmd = Command::new("git");
        cmd.arg(service.as_git_subcommand());
        if advertise {
            cmd.arg("--advertise-refs");
        }
        cmd.arg("--stateless-rpc");
        cmd.arg(repo_path);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(Error::Spawn)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(service = service.as_service_name(), stderr, "git subprocess failed");
            return Err(Error::SubprocessFailed(stderr));
        }

        Ok(output.stdout)
    }
}
