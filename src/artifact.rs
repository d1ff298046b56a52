//! Content-addressed command ConfigMap construction
//!
//! Two submissions with an identical command must reuse the same ConfigMap:
//! the artifact name embeds a digest of the command token sequence, turning
//! remote creation into a cache-like idempotent operation instead of a slow
//! leak of near-duplicate configuration blobs. The payload deliberately
//! excludes the image and size fields so artifact identity depends only on
//! *what to run*, not how big the container is.
//!
//! Building an artifact has no side effects; the remote create happens in
//! the submission pipeline under the ensure-exists policy.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::request::JobRequest;
use crate::{Error, Result};
use crate::{
    COMMAND_CONFIGMAP_KEY, COMMAND_CONFIGMAP_PREFIX, COMMAND_CONFIGMAP_SUFFIX,
    COMMAND_MOUNT_PATH, COMMAND_VOLUME_NAME, OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE,
};

/// The non-resource fields of a job request, in canonical key order
#[derive(Serialize)]
struct CommandPayload<'a> {
    command: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    kernel: Option<&'a str>,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// An immutable, content-addressed configuration blob for one command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigArtifact {
    /// ConfigMap name: `command.<digest>.json`
    pub name: String,
    /// Canonical JSON of the command/kernel fields
    pub payload: String,
    /// Full hex digest of the command token sequence
    pub digest: String,
}

impl ConfigArtifact {
    /// Derive the artifact for a job request.
    ///
    /// Pure function of the request content: identical commands yield an
    /// identical name and payload.
    pub fn build(request: &JobRequest) -> Result<Self> {
        let digest = command_digest(request.command());
        let name =
            format!("{COMMAND_CONFIGMAP_PREFIX}{digest}{COMMAND_CONFIGMAP_SUFFIX}");

        let payload = match request {
            JobRequest::Command { command, .. } => CommandPayload {
                command,
                kernel: None,
                kind: "cmd",
            },
            JobRequest::Notebook { kernel, .. } => CommandPayload {
                command: &[],
                kernel: kernel.as_deref(),
                kind: "nb",
            },
        };
        let payload = serde_json::to_string(&payload)
            .map_err(|e| Error::Internal(format!("cannot serialize command payload: {e}")))?;

        Ok(Self {
            name,
            payload,
            digest,
        })
    }

    /// First eight hex characters of the digest, used in workflow naming
    pub fn short_digest(&self) -> &str {
        &self.digest[..8]
    }

    /// The ConfigMap to ensure remotely
    pub fn configmap(&self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(BTreeMap::from([(
                    OWNERSHIP_LABEL_KEY.to_string(),
                    OWNERSHIP_LABEL_VALUE.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                COMMAND_CONFIGMAP_KEY.to_string(),
                self.payload.clone(),
            )])),
            ..Default::default()
        }
    }

    /// The workload volume exposing this artifact
    pub fn volume(&self) -> Volume {
        Volume {
            name: COMMAND_VOLUME_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: self.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// The read-only mount exposing this artifact at its fixed path
    pub fn mount(&self) -> VolumeMount {
        VolumeMount {
            name: COMMAND_VOLUME_NAME.to_string(),
            mount_path: COMMAND_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }
    }
}

/// Stable digest over the command token sequence.
///
/// Length-delimited so that token boundaries cannot alias: `["ab", "c"]`
/// and `["a", "bc"]` hash differently. Never rely on built-in object
/// hashing here; it is not stable across runs.
pub fn command_digest(tokens: &[String]) -> String {
    let mut hasher = Sha256::new();
    for token in tokens {
        hasher.update((token.len() as u64).to_le_bytes());
        hasher.update(token.as_bytes());
    }
    hex::encode(hasher.finalize())
}
