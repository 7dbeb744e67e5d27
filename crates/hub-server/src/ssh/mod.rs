//! SSH transport front-end (spec §4.7's second wire protocol). Same two
//! services as Smart HTTP — `git-upload-pack` and `git-receive-pack` — but
//! the client speaks them over an `exec` channel instead of request
//! bodies, and authenticates with a registered public key instead of a
//! credential header.
//!
//! `russh` hands each accepted connection its own [`Handler`]; session
//! state (the command buffer, which repository it targets) lives on that
//! handler rather than in any shared map, since one TCP connection is
//! exactly one Git invocation for this protocol.

use std::sync::Arc;

use russh::server::{Auth, Handler, Msg, Server as RusshServer, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use uuid::Uuid;

use hubcore_git::parse_receive_commands;
use hubcore_pipeline::RequestContext;

use crate::state::AppState;

pub struct SshServer {
    state: AppState,
}

impl SshServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl RusshServer for SshServer {
    type Handler = SshSession;

    fn new_client(&mut self, _peer_addr: Option<std::net::SocketAddr>) -> Self::Handler {
        SshSession {
            state: self.state.clone(),
            principal_id: None,
            command: None,
            stdin: Vec::new(),
        }
    }
}

pub struct SshSession {
    state: AppState,
    principal_id: Option<Uuid>,
    /// `(service, owner, repo-name-without-.git)`, parsed once the client
    /// sends its `exec` request.
    command: Option<(hubcore_git::Service, String, String)>,
    stdin: Vec<u8>,
}

impl SshSession {
    /// Parses `git-upload-pack '<owner>/<repo>.git'` (and the
    /// `git-receive-pack` equivalent), the only two command shapes this
    /// server accepts. Anything else — a shell, `scp`, an unrecognized
    /// subcommand — is rejected in [`Handler::exec_request`].
    fn parse_git_command(data: &[u8]) -> Option<(hubcore_git::Service, String, String)> {
        let text = std::str::from_utf8(data).ok()?;
        let mut parts = text.split_whitespace();
        let service = hubcore_git::Service::from_str(parts.next()?)?;
        let path_arg = parts.next()?.trim_matches(['\'', '"']);
        let path = path_arg.trim_start_matches('/');
        let (owner, repo_segment) = path.split_once('/')?;
        let name = repo_segment.strip_suffix(".git").unwrap_or(repo_segment);
        Some((service, owner.to_string(), name.to_string()))
    }
}

#[async_trait::async_trait]
impl Handler for SshSession {
    type Error = anyhow::Error;

    /// Public-key-only authentication: there is no password or
    /// keyboard-interactive fallback, matching the git server convention
    /// that `~/.ssh/authorized_keys` (here, the `ssh_keys` table) is the
    /// sole source of truth.
    async fn auth_publickey(&mut self, _user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        let blob = public_key.public_key_bytes();
        match self.state.ssh_keys.find_principal_by_public_key(&blob).await? {
            Some(principal_id) => {
                self.principal_id = Some(principal_id);
                Ok(Auth::Accept)
            }
            None => Ok(Auth::Reject {
                proceed_with_methods: None,
            }),
        }
    }

    async fn channel_open_session(&mut self, _channel: Channel<Msg>, _session: &mut Session) -> Result<bool, Self::Error> {
        Ok(true)
    }

    /// Explicitly refused: this server exists to run one of two git
    /// subcommands over `exec`, never an interactive shell.
    async fn pty_request(
        &mut self,
        _channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        Err(anyhow::anyhow!("interactive sessions are not supported"))
    }

    async fn exec_request(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        let Some(parsed) = Self::parse_git_command(data) else {
            session.channel_failure(channel)?;
            session.close(channel)?;
            return Ok(());
        };
        self.command = Some(parsed);
        session.channel_success(channel)?;
        Ok(())
    }

    /// Accumulates `stdin` bytes the client streams over the channel;
    /// `--stateless-rpc` upload-pack/receive-pack both need the whole
    /// request framed before they can run, same as the HTTP front-end's
    /// buffered request body.
    async fn data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        self.stdin.extend_from_slice(data);
        let _ = (channel, session);
        Ok(())
    }

    async fn channel_eof(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        let Some((service, owner, name)) = self.command.clone() else {
            session.close(channel)?;
            return Ok(());
        };

        let result = self.run_service(service, &owner, &name).await;
        match result {
            Ok(output) => {
                session.data(channel, CryptoVec::from(output))?;
                session.exit_status_request(channel, 0)?;
            }
            Err(err) => {
                tracing::warn!(error = %err, owner, name, "ssh git request failed");
                let message = format!("fatal: {err}\n");
                session.extended_data(channel, 1, CryptoVec::from(message.into_bytes()))?;
                session.exit_status_request(channel, 1)?;
            }
        }
        session.channel_eof(channel)?;
        session.close(channel)?;
        Ok(())
    }
}

impl SshSession {
    async fn run_service(&self, service: hubcore_git::Service, owner: &str, name: &str) -> anyhow::Result<Vec<u8>> {
        let Some((owner_kind, owner_id)) = self.state.owners.resolve(owner).await? else {
            anyhow::bail!("repository not found");
        };
        let Some(repo) = self
            .state
            .pipeline
            .repo_repo
            .get_by_owner_and_name(owner_kind, owner_id, name)
            .await?
        else {
            anyhow::bail!("repository not found");
        };

        let required = match service {
            hubcore_git::Service::UploadPack => hubcore_auth::Capability::Read,
            hubcore_git::Service::ReceivePack => hubcore_auth::Capability::Write,
        };
        let capability = self.state.resolve_capability(self.principal_id, &repo).await?;
        if capability < required {
            anyhow::bail!("repository not found");
        }

        let repo_id = hubcore_storage::RepositoryId::from_uuid(repo.id);
        let handle = self.state.storage.open(repo_id)?;

        match service {
            hubcore_git::Service::UploadPack => Ok(self.state.engine.upload_pack(handle.git_dir(), &self.stdin).await?),
            hubcore_git::Service::ReceivePack => {
                let principal_id = self
                    .principal_id
                    .ok_or_else(|| anyhow::anyhow!("push requires an authenticated principal"))?;
                let _guard = self.state.concurrency.acquire_push_slot(principal_id).await;

                let (commands, pack_offset) = parse_receive_commands(&self.stdin);
                let pack_data = &self.stdin[pack_offset..];
                let pipeline = hubcore_pipeline::ReceivePushPipeline::new((*self.state.pipeline).clone());
                let outcome = pipeline
                    .run(&repo, Some(principal_id), commands, pack_data, &RequestContext::new())
                    .await?;
                Ok(outcome.report_status)
            }
        }
    }
}

/// Binds the SSH listener and serves connections until the process is
/// asked to shut down. Spawned as its own background task alongside the
/// HTTP server and job workers.
pub async fn serve(state: AppState, port: u16, host_key_path: &str) -> anyhow::Result<()> {
    let key_bytes = tokio::fs::read(host_key_path).await?;
    let host_key = russh_keys::decode_secret_key(std::str::from_utf8(&key_bytes)?, None)?;

    let config = Arc::new(russh::server::Config {
        keys: vec![host_key],
        ..Default::default()
    });

    let mut server = SshServer::new(state);
    let address = format!("0.0.0.0:{port}");
    russh::server::run(config, address, &mut server).await?;
    Ok(())
}
