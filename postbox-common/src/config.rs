//! Configuration for a mail test run.
//!
//! A configuration names the address the capture server binds and declares
//! the flows that tests may trigger by name:
//!
//! ```ron
//! (
//!     capture: (host: "127.0.0.1", port: 0),
//!     flows: [
//!         (
//!             name: "subflow-mail-sender",
//!             kind: Mail((
//!                 from: "noreply@example.com",
//!                 to: ["to@example.com"],
//!                 cc: ["cc@example.com"],
//!                 subject: "Welcome to UT",
//!             )),
//!         ),
//!     ],
//! )
//! ```

use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV: &str = "POSTBOX_CONFIG";

/// File looked up in the working directory when `POSTBOX_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "postbox.config.ron";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostboxConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
}

/// Where the capture server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Port 0 binds an ephemeral port.
    #[serde(default)]
    pub port: u16,
    /// Name announced in the greeting.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Largest message accepted, in bytes. Larger messages are refused
    /// with 552 and not captured.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            hostname: default_hostname(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// 25 MiB
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 25 * 1024 * 1024;

const fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_hostname() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub name: String,
    pub kind: FlowKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    /// Sends the event payload as a mail.
    Mail(MailFlowConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailFlowConfig {
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    /// Each entry attaches the event payload under the given file name.
    #[serde(default)]
    pub attachments: Vec<AttachmentConfig>,
    /// SMTP relay to deliver through; the harness points this at the
    /// capture server when unset.
    #[serde(default)]
    pub relay: Option<String>,
}

impl MailFlowConfig {
    /// Envelope recipients: every To, Cc and Bcc address.
    #[must_use]
    pub fn envelope_recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub filename: String,
    #[serde(default = "default_attachment_type")]
    pub content_type: String,
}

fn default_attachment_type() -> String {
    "text/plain".to_string()
}

impl PostboxConfig {
    /// Parses a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid RON or a flow is invalid.
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "Loading configuration");
        Self::from_ron(&content)
    }

    /// Loads the configuration from `POSTBOX_CONFIG`, falling back to
    /// `./postbox.config.ron`.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found or the file is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::from_file(find_config_file(env_path, Path::new("."))?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = ahash::AHashSet::new();

        for flow in &self.flows {
            if flow.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "flows.name".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }

            if !seen.insert(flow.name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: format!("flows.{}", flow.name),
                    reason: "declared more than once".to_string(),
                });
            }

            match &flow.kind {
                FlowKind::Mail(mail) if mail.envelope_recipients().is_empty() => {
                    return Err(ConfigError::Invalid {
                        field: format!("flows.{}", flow.name),
                        reason: "a mail flow needs at least one recipient".to_string(),
                    });
                }
                FlowKind::Mail(_) => {}
            }
        }

        Ok(())
    }

    /// Looks up a declared flow by name.
    #[must_use]
    pub fn flow(&self, name: &str) -> Option<&FlowConfig> {
        self.flows.iter().find(|flow| flow.name == name)
    }
}

/// Resolves the configuration file from the value of `POSTBOX_CONFIG`, if
/// set, or else `postbox.config.ron` in `working_dir`.
fn find_config_file(env_path: Option<PathBuf>, working_dir: &Path) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::NotFound(format!(
            "  - {CONFIG_ENV}={} (does not exist)",
            path.display()
        )));
    }

    let path = working_dir.join(DEFAULT_CONFIG_FILE);
    if path.exists() {
        return Ok(path);
    }

    Err(ConfigError::NotFound(format!(
        "  - {CONFIG_ENV} environment variable\n  - {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    const DEMO: &str = r#"(
        capture: (port: 0),
        flows: [
            (
                name: "subflow-mail-sender",
                kind: Mail((
                    from: "noreply@example.com",
                    to: ["to@example.com"],
                    cc: ["cc@example.com"],
                    subject: "Welcome to UT",
                )),
            ),
            (
                name: "subflow-attachment-mail-sender",
                kind: Mail((
                    from: "noreply@example.com",
                    to: ["to@example.com"],
                    cc: ["cc@example.com"],
                    subject: "Welcome to UT",
                    attachments: [(filename: "test.txt")],
                    relay: "127.0.0.1:2525",
                )),
            ),
        ],
    )"#;

    #[test]
    fn test_parse_demo_config() {
        let config = PostboxConfig::from_ron(DEMO).unwrap();

        assert_eq!(config.capture, CaptureConfig::default());
        assert_eq!(config.flows.len(), 2);

        let FlowKind::Mail(mail) = &config.flow("subflow-attachment-mail-sender").unwrap().kind;
        assert_eq!(
            mail.attachments,
            vec![AttachmentConfig {
                filename: "test.txt".to_string(),
                content_type: "text/plain".to_string(),
            }]
        );
        assert_eq!(mail.relay.as_deref(), Some("127.0.0.1:2525"));
        assert_eq!(
            mail.envelope_recipients(),
            vec!["to@example.com", "cc@example.com"]
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PostboxConfig::from_ron("()").unwrap();

        assert_eq!(config, PostboxConfig::default());
        assert_eq!(config.capture.hostname, "localhost");
    }

    #[test]
    fn test_duplicate_flow_rejected() {
        let content = r#"(flows: [
            (name: "a", kind: Mail((from: "f@example.com", to: ["t@example.com"], subject: "s"))),
            (name: "a", kind: Mail((from: "f@example.com", to: ["t@example.com"], subject: "s"))),
        ])"#;

        assert!(matches!(
            PostboxConfig::from_ron(content),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_flow_without_recipients_rejected() {
        let content = r#"(flows: [
            (name: "a", kind: Mail((from: "f@example.com", subject: "s"))),
        ])"#;

        assert!(matches!(
            PostboxConfig::from_ron(content),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_invalid_ron_rejected() {
        assert!(matches!(
            PostboxConfig::from_ron("(capture: "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEMO.as_bytes()).unwrap();

        let config = PostboxConfig::from_file(file.path()).unwrap();
        assert!(config.flow("subflow-mail-sender").is_some());
    }

    #[test]
    fn test_find_config_file_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.ron");
        std::fs::write(&path, DEMO).unwrap();

        let found = find_config_file(Some(path.clone()), dir.path()).unwrap();
        assert_eq!(found, path);

        let config = PostboxConfig::from_file(found).unwrap();
        let names: Vec<_> = config.flows.iter().map(|flow| flow.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["subflow-mail-sender", "subflow-attachment-mail-sender"]
        );
    }

    #[test]
    fn test_find_config_file_env_names_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), DEMO).unwrap();

        let err = find_config_file(Some(dir.path().join("missing.ron")), dir.path()).unwrap_err();
        match err {
            ConfigError::NotFound(searched) => assert!(searched.contains("missing.ron")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_find_config_file_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            find_config_file(None, dir.path()),
            Err(ConfigError::NotFound(_))
        ));

        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, DEMO).unwrap();
        assert_eq!(find_config_file(None, dir.path()).unwrap(), path);
    }

    #[test]
    fn test_max_message_size() {
        let config = PostboxConfig::from_ron("(capture: (max_message_size: 1024))").unwrap();
        assert_eq!(config.capture.max_message_size, 1024);
        assert_eq!(
            CaptureConfig::default().max_message_size,
            DEFAULT_MAX_MESSAGE_SIZE
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PostboxConfig::from_file("/nonexistent/postbox.config.ron"),
            Err(ConfigError::Read { .. })
        ));
    }
}
