use std::path::{Path, PathBuf};

use crate::error::{ProxyError, Result};
use crate::host::{resolve_host, InstanceFilter};

/// Built-in defaults for the command line.
pub struct Defaults;

impl Defaults {
    /// Host name pattern, matching hosts such as `ec2.my-instance`.
    pub const PATTERN: &'static str = "ec2.{name}";
    /// OS user the public key is authorized for.
    pub const USER: &'static str = "ec2-user";
    /// SSH public key pushed through EC2 Instance Connect.
    pub const PUBLIC_KEY: &'static str = "~/.ssh/id_rsa.pub";
}

/// Raw inputs from the command line, before any file is read.
#[derive(Debug, Clone)]
pub struct ProxyArgs {
    pub host: String,
    pub port: u16,
    pub pattern: String,
    pub profile: Option<String>,
    pub public_key: String,
    pub user: String,
}

/// Everything the pipeline needs, fixed once assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Effective AWS profile. `None` means the default credential chain.
    pub profile: Option<String>,
    pub user: String,
    pub port: u16,
    pub public_key: String,
    pub filter: InstanceFilter,
}

impl Params {
    /// Builds the parameter set using the caller's home directory for `~/`.
    pub fn assemble(args: &ProxyArgs) -> Result<Self> {
        Self::assemble_with_home(args, dirs::home_dir())
    }

    pub fn assemble_with_home(args: &ProxyArgs, home: Option<PathBuf>) -> Result<Self> {
        let key_path = expand_home(&args.public_key, home)?;
        let public_key = read_public_key(&key_path)?;

        let attrs = resolve_host(&args.pattern, &args.host)?;
        let filter = attrs
            .filter()
            .ok_or_else(|| ProxyError::UnresolvedHost(args.host.clone()))?;

        // An explicit --profile wins over one captured from the host name.
        let profile = args
            .profile
            .clone()
            .filter(|p| !p.is_empty())
            .or(attrs.profile);

        Ok(Self {
            profile,
            user: args.user.clone(),
            port: args.port,
            public_key,
            filter,
        })
    }

    /// Profile name handed to session-manager-plugin; empty when unset.
    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or("")
    }
}

/// Expands a leading `~/` against `home`.
pub fn expand_home(path: &str, home: Option<PathBuf>) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = home.ok_or_else(|| {
                ProxyError::Config("Cannot determine home directory".to_string())
            })?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

fn read_public_key(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ProxyError::Config(format!(
            "Failed to read public key {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIJ7 user@host\n";

    fn args(host: &str, public_key: &str) -> ProxyArgs {
        ProxyArgs {
            host: host.to_string(),
            port: 22,
            pattern: Defaults::PATTERN.to_string(),
            profile: None,
            public_key: public_key.to_string(),
            user: Defaults::USER.to_string(),
        }
    }

    fn key_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KEY.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_expand_home() {
        let home = PathBuf::from("/home/alice");
        assert_eq!(
            expand_home("~/.ssh/id_rsa.pub", Some(home.clone())).unwrap(),
            PathBuf::from("/home/alice/.ssh/id_rsa.pub")
        );
        assert_eq!(
            expand_home("/etc/key.pub", Some(home)).unwrap(),
            PathBuf::from("/etc/key.pub")
        );
        // Only a leading "~/" is expanded.
        assert_eq!(
            expand_home("~alice/key.pub", None).unwrap(),
            PathBuf::from("~alice/key.pub")
        );
    }

    #[test]
    fn test_expand_home_without_home_dir() {
        let err = expand_home("~/.ssh/id_rsa.pub", None).unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }

    #[test]
    fn test_assemble_defaults() {
        let file = key_file();
        let path = file.path().to_str().unwrap();

        let params = Params::assemble_with_home(&args("ec2.myhost", path), None).unwrap();
        assert_eq!(
            params,
            Params {
                profile: None,
                user: "ec2-user".to_string(),
                port: 22,
                public_key: KEY.to_string(),
                filter: InstanceFilter::Name("myhost".to_string()),
            }
        );
        assert_eq!(params.profile_name(), "");
    }

    #[test]
    fn test_assemble_reads_key_under_home() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".ssh")).unwrap();
        std::fs::write(dir.path().join(".ssh/id_rsa.pub"), KEY).unwrap();

        let params = Params::assemble_with_home(
            &args("ec2.myhost", Defaults::PUBLIC_KEY),
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        assert_eq!(params.public_key, KEY);
    }

    #[test]
    fn test_missing_key_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pub");

        let err = Params::assemble_with_home(&args("ec2.myhost", missing.to_str().unwrap()), None)
            .unwrap_err();
        assert!(matches!(err, ProxyError::Config(msg) if msg.contains("nope.pub")));
    }

    #[test]
    fn test_profile_from_pattern() {
        let file = key_file();
        let mut args = args("prod.web", file.path().to_str().unwrap());
        args.pattern = "{profile}.{name}".to_string();

        let params = Params::assemble_with_home(&args, None).unwrap();
        assert_eq!(params.profile.as_deref(), Some("prod"));
        assert_eq!(params.profile_name(), "prod");
        assert_eq!(params.filter, InstanceFilter::Name("web".to_string()));
    }

    #[test]
    fn test_cli_profile_overrides_pattern_profile() {
        let file = key_file();
        let mut args = args("prod.web", file.path().to_str().unwrap());
        args.pattern = "{profile}.{name}".to_string();
        args.profile = Some("admin".to_string());

        let params = Params::assemble_with_home(&args, None).unwrap();
        assert_eq!(params.profile.as_deref(), Some("admin"));
    }

    #[test]
    fn test_id_filter() {
        let file = key_file();
        let mut args = args("ec2.i-0123456789abcdef0", file.path().to_str().unwrap());
        args.pattern = "ec2.{id}".to_string();
        args.user = "ubuntu".to_string();
        args.port = 2222;

        let params = Params::assemble_with_home(&args, None).unwrap();
        assert_eq!(
            params.filter,
            InstanceFilter::Id("i-0123456789abcdef0".to_string())
        );
        assert_eq!(params.user, "ubuntu");
        assert_eq!(params.port, 2222);
    }

    #[test]
    fn test_unresolved_host_is_reported() {
        let file = key_file();
        let err = Params::assemble_with_home(&args("bastion", file.path().to_str().unwrap()), None)
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnresolvedHost(_)));
    }
}
