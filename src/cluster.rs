//! Cluster client operations
//!
//! Narrow trait over the remote calls the pipeline makes, so the real
//! client can be swapped for a mock in tests. Methods are raw creates and
//! lookups; the ensure-exists policy is layered on top by the callers via
//! [`crate::ensure::create_or_accept`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;

use crate::workflow::Workflow;

/// Trait abstracting the Kubernetes and Argo API calls the dispatcher makes
///
/// This trait allows mocking the cluster in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Create a namespace
    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), kube::Error>;

    /// List the names of all namespaces, bounded by a server-side timeout
    /// in seconds
    async fn list_namespace_names(&self, timeout_secs: u32) -> Result<Vec<String>, kube::Error>;

    /// Create a service account in a namespace
    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> Result<(), kube::Error>;

    /// Create a role in a namespace
    async fn create_role(&self, namespace: &str, role: &Role) -> Result<(), kube::Error>;

    /// Create a role binding in a namespace
    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> Result<(), kube::Error>;

    /// Create a ConfigMap in a namespace
    async fn create_config_map(
        &self,
        namespace: &str,
        configmap: &ConfigMap,
    ) -> Result<(), kube::Error>;

    /// Submit a workflow and return it as created by the engine, including
    /// the server-assigned name
    async fn create_workflow(
        &self,
        namespace: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, kube::Error>;

    /// List workflows in a namespace
    async fn list_workflows(&self, namespace: &str) -> Result<Vec<Workflow>, kube::Error>;

    /// Fetch one workflow by name
    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, kube::Error>;

    /// Delete one workflow by name
    async fn delete_workflow(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// The real [`ClusterOps`] implementation over a shared [`kube::Client`]
#[derive(Clone)]
pub struct KubeClusterOps {
    client: Client,
}

impl KubeClusterOps {
    /// Wrap the process-wide cluster client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn workflows(&self, namespace: &str) -> Api<Workflow> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterOps for KubeClusterOps {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.create(&PostParams::default(), namespace).await?;
        Ok(())
    }

    async fn list_namespace_names(&self, timeout_secs: u32) -> Result<Vec<String>, kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let lp = ListParams::default().timeout(timeout_secs);
        Ok(api
            .list(&lp)
            .await?
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> Result<(), kube::Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), account).await?;
        Ok(())
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> Result<(), kube::Error> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), role).await?;
        Ok(())
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> Result<(), kube::Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), binding).await?;
        Ok(())
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        configmap: &ConfigMap,
    ) -> Result<(), kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), configmap).await?;
        Ok(())
    }

    async fn create_workflow(
        &self,
        namespace: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, kube::Error> {
        self.workflows(namespace)
            .create(&PostParams::default(), workflow)
            .await
    }

    async fn list_workflows(&self, namespace: &str) -> Result<Vec<Workflow>, kube::Error> {
        Ok(self
            .workflows(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, kube::Error> {
        self.workflows(namespace).get(name).await
    }

    async fn delete_workflow(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.workflows(namespace)
            .delete(name, &Default::default())
            .await?;
        Ok(())
    }
}
