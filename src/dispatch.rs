//! Submission pipeline and workflow lookup
//!
//! One inbound request runs the pipeline synchronously: validate ->
//! resolve size -> build artifact -> ensure namespace -> ensure identity ->
//! ensure artifact -> create workflow. There is no cross-step transaction;
//! every remote object is deterministically named and immutable, so a crash
//! between steps just leaves objects the next attempt's ensure-exists calls
//! accept. Retry of the whole pipeline is the caller's job.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use tracing::{debug, info};

use crate::artifact::ConfigArtifact;
use crate::auth::UserIdentity;
use crate::cluster::{ClusterOps, KubeClusterOps};
use crate::config::Config;
use crate::ensure::create_or_accept;
use crate::rbac::ensure_identity;
use crate::request::JobRequest;
use crate::size::SizeResolver;
use crate::workflow::{self, NodeStatus, Workflow, WorkflowSummary};
use crate::{Error, Result};
use crate::{OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE};

/// Server-side timeout for the namespace-existence listing, so an
/// unresponsive API server cannot hang a request. A timeout surfaces as a
/// kube error, i.e. a transient failure, never as "namespace absent".
const NAMESPACE_LIST_TIMEOUT_SECS: u32 = 1;

/// The submission pipeline over the cluster operations seam
#[derive(Clone)]
pub struct Dispatcher {
    ops: Arc<dyn ClusterOps>,
    config: Arc<Config>,
    resolver: SizeResolver,
}

impl Dispatcher {
    /// Build a dispatcher from the shared client and validated config
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self::with_ops(Arc::new(KubeClusterOps::new(client)), config)
    }

    /// Build a dispatcher over any [`ClusterOps`] implementation
    pub fn with_ops(ops: Arc<dyn ClusterOps>, config: Arc<Config>) -> Self {
        let resolver = SizeResolver::new(&config);
        Self {
            ops,
            config,
            resolver,
        }
    }

    fn namespace_for(&self, user: &UserIdentity) -> String {
        self.config.namespace_for(&user.escaped_name())
    }

    /// Run the whole pipeline for one job request and return the
    /// engine-assigned workflow name.
    pub async fn submit(&self, user: &UserIdentity, request: &JobRequest) -> Result<String> {
        request.validate(&self.config)?;
        let size = self.resolver.resolve(request.size())?;
        let artifact = ConfigArtifact::build(request)?;
        let spec = workflow::assemble(request, &size, &artifact, user, &self.config)?;

        let namespace = self.namespace_for(user);
        let escaped = user.escaped_name();
        debug!(
            user = %user.name,
            namespace = %namespace,
            size = %size.label,
            artifact = %artifact.name,
            "submitting workflow"
        );

        self.ensure_namespace(&namespace).await?;
        ensure_identity(self.ops.as_ref(), &escaped, &namespace).await?;
        create_or_accept(
            &artifact.name,
            self.ops.create_config_map(&namespace, &artifact.configmap()),
        )
        .await?;

        let created = self.ops.create_workflow(&namespace, &spec).await?;
        let name = created
            .metadata
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Internal("no workflow created".to_string()))?;
        info!(workflow = %name, namespace = %namespace, "workflow created");
        Ok(name)
    }

    /// Idempotently ensure the user's namespace exists
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    OWNERSHIP_LABEL_KEY.to_string(),
                    OWNERSHIP_LABEL_VALUE.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };
        create_or_accept(name, self.ops.create_namespace(&ns)).await?;
        Ok(())
    }

    /// Check whether the user's namespace exists yet, bounded by a short
    /// server-side timeout
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .ops
            .list_namespace_names(NAMESPACE_LIST_TIMEOUT_SECS)
            .await?;
        Ok(namespace_in_list(names.iter().map(String::as_str), name))
    }

    /// List the caller's workflows. A namespace that does not exist yet is
    /// an expected transient state and yields an empty list.
    pub async fn list(&self, user: &UserIdentity) -> Result<Vec<WorkflowSummary>> {
        let namespace = self.namespace_for(user);
        if !self.namespace_exists(&namespace).await? {
            debug!(namespace = %namespace, "namespace not found, no workflows yet");
            return Ok(Vec::new());
        }
        debug!(namespace = %namespace, "listing workflows");
        let workflows = self.ops.list_workflows(&namespace).await?;
        Ok(workflows.iter().map(WorkflowSummary::from).collect())
    }

    /// Fetch one workflow by id
    pub async fn get(&self, user: &UserIdentity, id: &str) -> Result<Workflow> {
        let namespace = self.namespace_for(user);
        self.ops
            .get_workflow(&namespace, id)
            .await
            .map_err(|e| not_found_or(e, || format!("workflow '{id}'")))
    }

    /// Fetch one node record inside a workflow
    pub async fn node(&self, user: &UserIdentity, id: &str, pod_id: &str) -> Result<NodeStatus> {
        let wf = self.get(user, id).await?;
        workflow::node_detail(&wf, pod_id).map(NodeStatus::clone)
    }

    /// Delete one workflow by id
    pub async fn delete(&self, user: &UserIdentity, id: &str) -> Result<()> {
        let namespace = self.namespace_for(user);
        info!(workflow = %id, namespace = %namespace, "deleting workflow");
        self.ops
            .delete_workflow(&namespace, id)
            .await
            .map_err(|e| not_found_or(e, || format!("workflow '{id}'")))?;
        Ok(())
    }
}

/// Map a remote 404 to our NotFound; pass everything else through
fn not_found_or(err: kube::Error, what: impl FnOnce() -> String) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(what()),
        other => other.into(),
    }
}

fn namespace_in_list<'a>(mut names: impl Iterator<Item = &'a str>, target: &str) -> bool {
    names.any(|name| name == target)
}
