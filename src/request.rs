//! Inbound job description and validation
//!
//! The POST body for a new workflow looks like:
//!
//! ```json
//! {
//!   "type": "cmd",
//!   "command": ["/bin/echo", "Hello, world!"],
//!   "image": "lsstsqre/sciplat-lab:w_2020_01",
//!   "size": "tiny"
//! }
//! ```
//!
//! `type` is a tagged union: `cmd` runs a command line assembled from the
//! token list, `nb` would run a notebook kernel but is not implemented yet
//! and is rejected up front. The `kernel` field of `nb` is accepted but not
//! validated until that branch exists.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::{Error, Result};

/// A symbolic job description, as posted to `/new`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum JobRequest {
    /// Run a command line in the image
    #[serde(rename = "cmd")]
    Command {
        /// Command tokens, shlex-style
        #[serde(default)]
        command: Vec<String>,
        /// Container image reference
        #[serde(default)]
        image: String,
        /// Size label from the configured size table
        #[serde(default)]
        size: String,
    },
    /// Run a notebook kernel (not yet supported)
    #[serde(rename = "nb")]
    Notebook {
        /// Kernel name, e.g. 'LSST'
        #[serde(default)]
        kernel: Option<String>,
        /// Container image reference
        #[serde(default)]
        image: String,
        /// Size label from the configured size table
        #[serde(default)]
        size: String,
    },
}

impl JobRequest {
    /// Reject a job description that does not conform to expectations.
    ///
    /// Ordering matters: the job kind is checked first, so an `nb` request
    /// reports "not yet supported" rather than complaining about fields
    /// that only matter once that branch is implemented.
    pub fn validate(&self, config: &Config) -> Result<()> {
        let (image, size) = match self {
            JobRequest::Notebook { .. } => {
                return Err(Error::Unsupported("execution type 'nb'".to_string()));
            }
            JobRequest::Command { command, image, size } => {
                if command.is_empty() {
                    return Err(Error::invalid("no command specified"));
                }
                if command.iter().any(|t| t.is_empty()) {
                    return Err(Error::invalid("empty token in command"));
                }
                (image, size)
            }
        };
        if image.is_empty() {
            return Err(Error::invalid("no image specified for container"));
        }
        if !config.sizes.contains_key(size) {
            return Err(Error::invalid(format!(
                "'size' must be one of {:?}",
                config.size_labels()
            )));
        }
        Ok(())
    }

    /// Command tokens, for the kinds that carry them
    pub fn command(&self) -> &[String] {
        match self {
            JobRequest::Command { command, .. } => command,
            JobRequest::Notebook { .. } => &[],
        }
    }

    /// Container image reference
    pub fn image(&self) -> &str {
        match self {
            JobRequest::Command { image, .. } | JobRequest::Notebook { image, .. } => image,
        }
    }

    /// Requested size label
    pub fn size(&self) -> &str {
        match self {
            JobRequest::Command { size, .. } | JobRequest::Notebook { size, .. } => size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_request(command: &[&str], image: &str, size: &str) -> JobRequest {
        JobRequest::Command {
            command: command.iter().map(|s| s.to_string()).collect(),
            image: image.to_string(),
            size: size.to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_command_request() {
        let req = cmd_request(&["/bin/echo", "hi"], "repo/img:tag1", "small");
        assert!(req.validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_empty_command() {
        let req = cmd_request(&[], "repo/img:tag1", "small");
        let err = req.validate(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("command"), "got: {err}");
    }

    #[test]
    fn rejects_notebook_as_unsupported() {
        let req: JobRequest =
            serde_json::from_str(r#"{"type": "nb", "kernel": "LSST", "image": "i", "size": "tiny"}"#)
                .unwrap();
        let err = req.validate(&Config::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(err.to_string().contains("not yet supported"));
    }

    #[test]
    fn rejects_missing_image() {
        let req = cmd_request(&["/bin/echo", "hi"], "", "small");
        let err = req.validate(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("image"), "got: {err}");
    }

    #[test]
    fn rejects_unknown_size_label() {
        let req = cmd_request(&["/bin/echo", "hi"], "repo/img:tag1", "colossal");
        let err = req.validate(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("size"), "got: {err}");
    }

    #[test]
    fn deserializes_tagged_body() {
        let req: JobRequest = serde_json::from_str(
            r#"{"type": "cmd", "command": ["/bin/echo", "hi"], "image": "repo/img:tag1", "size": "small"}"#,
        )
        .unwrap();
        assert_eq!(req.command(), ["/bin/echo", "hi"]);
        assert_eq!(req.image(), "repo/img:tag1");
        assert_eq!(req.size(), "small");
    }

    #[test]
    fn unknown_type_fails_to_deserialize() {
        let result: std::result::Result<JobRequest, _> =
            serde_json::from_str(r#"{"type": "dance", "image": "i", "size": "tiny"}"#);
        assert!(result.is_err());
    }
}
