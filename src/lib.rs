//! wfdispatch - REST server for dispatching Argo Workflows on a
//! multi-tenant JupyterLab cluster
//!
//! Each authenticated user gets a namespace of their own. A `POST /new`
//! request carrying a symbolic job description (image, size label, command
//! tokens) is turned into a runnable Argo Workflow: the size label is
//! resolved to concrete resource limits and guarantees, the command is
//! captured in a content-addressed ConfigMap mounted into the workload,
//! a namespaced service account with a fixed role is provisioned, and the
//! assembled Workflow is submitted to the engine. Every remote creation
//! follows an ensure-exists policy so retries and concurrent callers
//! converge on the same objects without locks.
//!
//! # Modules
//!
//! - [`auth`] - Verified caller identity (supplied by the fronting auth proxy)
//! - [`request`] - Inbound job description and validation
//! - [`size`] - Size-label resolution to limits and guarantees
//! - [`artifact`] - Content-addressed command ConfigMap construction
//! - [`ensure`] - Idempotent create-or-accept helper for cluster objects
//! - [`cluster`] - Cluster operations seam over the Kubernetes client
//! - [`rbac`] - Per-namespace service account, role, and binding provisioning
//! - [`workflow`] - Argo Workflow resource types and spec assembly
//! - [`dispatch`] - Submission pipeline and workflow lookup/delete
//! - [`server`] - HTTP routes
//! - [`config`] - Service configuration
//! - [`error`] - Error types for the dispatcher

#![cfg_attr(not(test), deny(missing_docs))]

pub mod artifact;
pub mod auth;
pub mod cluster;
pub mod config;
pub mod dispatch;
pub mod ensure;
pub mod error;
pub mod rbac;
pub mod request;
pub mod server;
pub mod size;
pub mod workflow;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Naming Constants
// =============================================================================
// Names at the cluster boundary are load-bearing: the command ConfigMap name
// and the per-user account name are the idempotency keys that make retried
// submissions converge on the same objects.

/// Prefix of every generated workflow name
pub const WORKFLOW_NAME_PREFIX: &str = "wf";

/// Entrypoint template name inside each generated workflow
pub const WORKFLOW_ENTRYPOINT: &str = "noninteractive";

/// Prefix of the content-addressed command ConfigMap name
pub const COMMAND_CONFIGMAP_PREFIX: &str = "command.";

/// Suffix of the content-addressed command ConfigMap name
pub const COMMAND_CONFIGMAP_SUFFIX: &str = ".json";

/// Key under which the command payload is stored in the ConfigMap
pub const COMMAND_CONFIGMAP_KEY: &str = "command.json";

/// Volume name for the command ConfigMap mount
pub const COMMAND_VOLUME_NAME: &str = "noninteractive-command";

/// Path at which the command ConfigMap is mounted, read-only, in the workload
pub const COMMAND_MOUNT_PATH: &str =
    "/opt/lsst/software/jupyterlab/noninteractive/command/";

/// Suffix of the per-user service account name
pub const ACCOUNT_SUFFIX: &str = "argo";

/// Ownership label applied to every object this service creates
pub const OWNERSHIP_LABEL_KEY: &str = "argocd.argoproj.io/instance";

/// Ownership label value
pub const OWNERSHIP_LABEL_VALUE: &str = "nublado-users";
