//! Argo Workflow resource types and spec assembly
//!
//! The `Workflow` custom resource is owned by the Argo engine; this module
//! carries just enough of its schema to submit specs and read back status.
//! The CRD itself is installed by the engine, so the derive runs with the
//! schema disabled.
//!
//! Assembly merges the resolved size class, the command ConfigMap mount,
//! the shared volumes, and the environment block into a complete spec. The
//! spec uses `metadata.generateName` with a collision-resistant base (the
//! short artifact digest is part of it), so the create response carries the
//! authoritative server-assigned name and concurrent resubmissions of the
//! same command can never be confused with one another.

use std::collections::BTreeMap;

use base64::Engine;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::artifact::ConfigArtifact;
use crate::auth::{escape_name, UserIdentity};
use crate::config::{Config, SharedVolume};
use crate::rbac::account_name;
use crate::request::JobRequest;
use crate::size::SizeClass;
use crate::{Error, Result};
use crate::{OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE, WORKFLOW_ENTRYPOINT, WORKFLOW_NAME_PREFIX};

/// Longest allowed generateName base; leaves room for the server suffix
const MAX_NAME_BASE: usize = 56;

// =============================================================================
// Argo Workflow CRD (subset)
// =============================================================================

/// Specification of an Argo Workflow
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Name of the template the engine starts with
    pub entrypoint: String,
    /// Workflow templates; we always submit exactly one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<WorkflowTemplate>,
    /// Pod volumes shared by all templates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Service account the workload runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// One template inside a workflow spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    /// Template name
    pub name: String,
    /// Container to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
}

/// Engine-owned status of a submitted workflow
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// Aggregate phase (Pending, Running, Succeeded, Failed, Error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Human-readable status message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Start timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Finish timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Per-pod node records, keyed by pod id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<BTreeMap<String, NodeStatus>>,
}

/// One node (pod) inside a workflow's status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Node id, matches the pod name
    #[serde(default)]
    pub id: String,
    /// Node name within the workflow
    #[serde(default)]
    pub name: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Node type (Pod, Steps, DAG, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Template the node executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Node phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Status message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Start timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Finish timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

/// Condensed listing entry for one workflow
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct WorkflowSummary {
    /// Workflow name
    pub name: String,
    /// Aggregate phase, if the engine has reported one
    pub phase: Option<String>,
    /// Start timestamp
    pub started_at: Option<String>,
    /// Finish timestamp
    pub finished_at: Option<String>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(wf: &Workflow) -> Self {
        let status = wf.status.as_ref();
        Self {
            name: wf.metadata.name.clone().unwrap_or_default(),
            phase: status.and_then(|s| s.phase.clone()),
            started_at: status.and_then(|s| s.started_at.clone()),
            finished_at: status.and_then(|s| s.finished_at.clone()),
        }
    }
}

/// Look up one node record by pod id
pub fn node_detail<'a>(wf: &'a Workflow, pod_id: &str) -> Result<&'a NodeStatus> {
    wf.status
        .as_ref()
        .and_then(|s| s.nodes.as_ref())
        .ok_or_else(|| Error::not_found("workflow has no node records"))
        .and_then(|nodes| {
            nodes
                .get(pod_id)
                .ok_or_else(|| Error::not_found(format!("pod '{pod_id}'")))
        })
}

// =============================================================================
// Assembly
// =============================================================================

/// Collision-resistant base for the generated workflow name.
///
/// `wf-<user>-<image tag>-<command basename>-<digest8>`, every component
/// DNS-sanitized. The server appends a random suffix via generateName.
pub fn workflow_name_base(
    escaped_user: &str,
    image: &str,
    first_token: &str,
    short_digest: &str,
) -> String {
    let tag = image.rsplit(':').next().unwrap_or(image);
    let basename = first_token.rsplit('/').next().unwrap_or(first_token);
    let mut base = format!(
        "{WORKFLOW_NAME_PREFIX}-{}-{}-{}-{}",
        escaped_user,
        escape_name(tag),
        escape_name(basename),
        short_digest,
    );
    base.truncate(MAX_NAME_BASE);
    base.trim_end_matches('-').to_string()
}

fn shared_volume(sv: &SharedVolume) -> Volume {
    Volume {
        name: sv.name.clone(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: sv.claim_name.clone(),
            read_only: Some(sv.read_only),
        }),
        ..Default::default()
    }
}

fn shared_mount(sv: &SharedVolume) -> VolumeMount {
    VolumeMount {
        name: sv.name.clone(),
        mount_path: sv.mount_path.clone(),
        read_only: Some(sv.read_only),
        ..Default::default()
    }
}

/// Base64 JSON descriptor of the shared volumes, consumed by dask workers
/// spawned from inside the workload
pub fn volume_descriptor_b64(volumes: &[SharedVolume]) -> Result<String> {
    let json = serde_json::to_string(volumes)
        .map_err(|e| Error::Internal(format!("cannot serialize volume descriptor: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

fn build_env(
    config: &Config,
    user: &UserIdentity,
    cname: &str,
    dask_b64: String,
) -> Vec<EnvVar> {
    let mut env: BTreeMap<String, String> = config.extra_env.clone();
    env.insert("DASK_VOLUME_B64".to_string(), dask_b64);
    env.insert(
        "DEBUG".to_string(),
        if config.debug { "TRUE" } else { "FALSE" }.to_string(),
    );
    env.insert("EXTERNAL_GROUPS".to_string(), user.groups.clone());
    env.insert("EXTERNAL_UID".to_string(), user.uid.clone());
    env.insert("JUPYTERHUB_USER".to_string(), cname.to_string());
    env.insert("NONINTERACTIVE".to_string(), "TRUE".to_string());
    env.into_iter()
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            ..Default::default()
        })
        .collect()
}

fn quantity_resources(size: &SizeClass) -> k8s_openapi::api::core::v1::ResourceRequirements {
    k8s_openapi::api::core::v1::ResourceRequirements {
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(size.cpu_limit.to_string())),
            ("memory".to_string(), Quantity(format!("{}Mi", size.mem_limit))),
        ])),
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(size.cpu_guarantee.to_string())),
            (
                "memory".to_string(),
                Quantity(format!("{}Mi", size.mem_guarantee)),
            ),
        ])),
        ..Default::default()
    }
}

/// Assemble a complete workflow spec for a validated job request.
///
/// Only the `cmd` kind is implemented; `nb` fails fast here as well in
/// case a caller skips request validation.
pub fn assemble(
    request: &JobRequest,
    size: &SizeClass,
    artifact: &ConfigArtifact,
    user: &UserIdentity,
    config: &Config,
) -> Result<Workflow> {
    let (command, image) = match request {
        JobRequest::Command { command, image, .. } => (command, image),
        JobRequest::Notebook { .. } => {
            return Err(Error::Unsupported("execution type 'nb'".to_string()));
        }
    };

    let first_token = command
        .first()
        .ok_or_else(|| Error::invalid("no command specified"))?;

    let escaped = user.escaped_name();
    let cname = workflow_name_base(&escaped, image, first_token, artifact.short_digest());

    let mut volumes: Vec<Volume> = config.volumes.iter().map(shared_volume).collect();
    let mut mounts: Vec<VolumeMount> = config.volumes.iter().map(shared_mount).collect();
    volumes.push(artifact.volume());
    mounts.push(artifact.mount());

    let dask_b64 = volume_descriptor_b64(&config.volumes)?;
    let env = build_env(config, user, &cname, dask_b64);

    let container = Container {
        name: cname.clone(),
        image: Some(image.clone()),
        env: Some(env),
        image_pull_policy: Some("Always".to_string()),
        volume_mounts: Some(mounts),
        resources: Some(quantity_resources(size)),
        ..Default::default()
    };

    Ok(Workflow {
        metadata: ObjectMeta {
            generate_name: Some(format!("{cname}-")),
            labels: Some(BTreeMap::from([(
                OWNERSHIP_LABEL_KEY.to_string(),
                OWNERSHIP_LABEL_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        spec: WorkflowSpec {
            entrypoint: WORKFLOW_ENTRYPOINT.to_string(),
            templates: vec![WorkflowTemplate {
                name: WORKFLOW_ENTRYPOINT.to_string(),
                container: Some(container),
            }],
            volumes,
            service_account_name: Some(account_name(&escaped)),
        },
        status: None,
    })
}
