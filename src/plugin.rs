//! Handing the SSM session over to `session-manager-plugin`.
//!
//! The plugin speaks the session protocol itself. The proxy only passes it the
//! `StartSession` request and response as JSON, in the positional form the AWS
//! CLI uses:
//!
//! ```text
//! session-manager-plugin <response> <region> StartSession <profile> <request> <endpoint>
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::aws::{SessionHandle, SessionRequest};
use crate::error::{ProxyError, Result};
use crate::signals::IgnoredSignals;

pub const PLUGIN_NAME: &str = "session-manager-plugin";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartSessionInput {
    #[serde(rename = "DocumentName")]
    pub document_name: String,
    #[serde(rename = "Parameters")]
    pub parameters: BTreeMap<String, Vec<String>>,
    #[serde(rename = "Target")]
    pub target: String,
}

impl From<&SessionRequest> for StartSessionInput {
    fn from(request: &SessionRequest) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("portNumber".to_string(), vec![request.port_number.clone()]);
        Self {
            document_name: request.document_name.clone(),
            parameters,
            target: request.target.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionResponse {
    #[serde(rename = "SessionId")]
    pub session_id: String,
    #[serde(rename = "StreamUrl")]
    pub stream_url: String,
    #[serde(rename = "TokenValue")]
    pub token_value: String,
}

impl From<&SessionHandle> for SessionResponse {
    fn from(handle: &SessionHandle) -> Self {
        Self {
            session_id: handle.session_id.clone(),
            stream_url: handle.stream_url.clone(),
            token_value: handle.token_value.clone(),
        }
    }
}

/// Positional arguments for one plugin run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInvocation {
    pub response: String,
    pub region: String,
    pub profile: String,
    pub request: String,
    pub endpoint: String,
}

impl PluginInvocation {
    pub fn new(request: &SessionRequest, handle: &SessionHandle, profile: &str) -> Result<Self> {
        let request = serde_json::to_string(&StartSessionInput::from(request))
            .map_err(|e| ProxyError::Transport(format!("failed to encode request: {}", e)))?;
        let response = serde_json::to_string(&SessionResponse::from(handle))
            .map_err(|e| ProxyError::Transport(format!("failed to encode response: {}", e)))?;

        Ok(Self {
            response,
            region: handle.signing_region.clone(),
            profile: profile.to_string(),
            request,
            endpoint: handle.endpoint.clone(),
        })
    }

    pub fn args(&self) -> [&str; 6] {
        [
            self.response.as_str(),
            self.region.as_str(),
            "StartSession",
            self.profile.as_str(),
            self.request.as_str(),
            self.endpoint.as_str(),
        ]
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait SessionManagerPlugin {
    /// Fails with `PluginNotFound` when the plugin cannot be run.
    fn check(&self) -> Result<()>;

    /// Runs the plugin on the proxy's own stdio until it exits.
    fn start(&self, invocation: &PluginInvocation) -> Result<()>;
}

/// The `session-manager-plugin` binary found on `PATH`.
pub struct SystemPlugin {
    program: String,
}

impl Default for SystemPlugin {
    fn default() -> Self {
        Self::new(PLUGIN_NAME)
    }
}

impl SystemPlugin {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn locate(&self) -> Result<PathBuf> {
        find_in_path(&self.program, std::env::var_os("PATH")).ok_or(ProxyError::PluginNotFound)
    }
}

impl SessionManagerPlugin for SystemPlugin {
    fn check(&self) -> Result<()> {
        self.locate().map(|_| ())
    }

    fn start(&self, invocation: &PluginInvocation) -> Result<()> {
        let program = self.locate()?;

        let mut cmd = Command::new(program);
        cmd.args(invocation.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // The plugin forwards these to the remote side itself.
            unsafe {
                cmd.pre_exec(crate::signals::reset_to_default);
            }
        }

        let status = {
            let _ignored = IgnoredSignals::acquire()?;
            cmd.status()
        };

        let status = match status {
            Ok(status) => status,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProxyError::PluginNotFound)
            }
            Err(e) => {
                return Err(ProxyError::Transport(format!(
                    "failed to run {}: {}",
                    self.program, e
                )))
            }
        };

        if !status.success() {
            return Err(ProxyError::Transport(match status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            }));
        }

        Ok(())
    }
}

/// Looks `program` up in a `PATH`-style list, in order.
pub fn find_in_path(program: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let program_path = Path::new(program);
    if program_path.components().count() > 1 {
        return is_executable(program_path).then(|| program_path.to_path_buf());
    }

    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program), dir.join(format!("{}.exe", program))]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
