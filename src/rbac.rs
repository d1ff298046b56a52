//! Per-namespace identity provisioning
//!
//! Every user's first job provisions a service account named after them,
//! a fixed role, and the binding between the two, all inside the user's
//! namespace. The role is versioned with this service and is not
//! user-configurable: it grants exactly what a dispatched workload needs
//! to manipulate its own namespace's workflow resources, nothing wider.
//!
//! Creation is sequenced account -> role -> binding. The platform does not
//! enforce that ordering, the provisioner does. Each step follows the
//! ensure-exists policy, so a pipeline that died between steps resumes and
//! completes on the next submission.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use crate::cluster::ClusterOps;
use crate::ensure::create_or_accept;
use crate::Result;
use crate::{ACCOUNT_SUFFIX, OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE};

/// A provisioned per-namespace service identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespacedIdentity {
    /// Service account name, deterministic per user
    pub account: String,
    /// Namespace the identity is scoped to
    pub namespace: String,
}

/// Deterministic account name for a user
pub fn account_name(escaped_user: &str) -> String {
    format!("{escaped_user}-{ACCOUNT_SUFFIX}")
}

fn metadata(account: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(account.to_string()),
        labels: Some(BTreeMap::from([(
            OWNERSHIP_LABEL_KEY.to_string(),
            OWNERSHIP_LABEL_VALUE.to_string(),
        )])),
        ..Default::default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The fixed rule list granted to every dispatched workload
fn policy_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(strings(&["argoproj.io"])),
            resources: Some(strings(&["workflows", "workflows/finalizers"])),
            verbs: strings(&["get", "list", "watch", "update", "patch", "delete"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&["argoproj.io"])),
            resources: Some(strings(&[
                "workflowtemplates",
                "workflowtemplates/finalizers",
            ])),
            verbs: strings(&["get", "list", "watch"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&[""])),
            resources: Some(strings(&["secrets"])),
            verbs: strings(&["get"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&[""])),
            resources: Some(strings(&["configmaps"])),
            verbs: strings(&["list"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&[""])),
            resources: Some(strings(&["pods", "services"])),
            verbs: strings(&["get", "list", "watch", "create", "delete"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&[""])),
            resources: Some(strings(&["pods/log", "serviceaccounts"])),
            verbs: strings(&["get", "list"]),
            ..Default::default()
        },
    ]
}

/// Define the three managed objects for one user in one namespace
pub fn define_identity_objects(
    account: &str,
    namespace: &str,
) -> (ServiceAccount, Role, RoleBinding) {
    let svcacct = ServiceAccount {
        metadata: metadata(account),
        ..Default::default()
    };
    let role = Role {
        metadata: metadata(account),
        rules: Some(policy_rules()),
    };
    let binding = RoleBinding {
        metadata: metadata(account),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: account.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: account.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    };
    (svcacct, role, binding)
}

/// Idempotently ensure the user's service identity exists in the namespace
pub async fn ensure_identity(
    ops: &dyn ClusterOps,
    escaped_user: &str,
    namespace: &str,
) -> Result<NamespacedIdentity> {
    let account = account_name(escaped_user);
    info!(account = %account, namespace = %namespace, "ensuring namespaced service account");
    let (svcacct, role, binding) = define_identity_objects(&account, namespace);

    create_or_accept(&account, ops.create_service_account(namespace, &svcacct)).await?;
    create_or_accept(&account, ops.create_role(namespace, &role)).await?;
    create_or_accept(&account, ops.create_role_binding(namespace, &binding)).await?;

    Ok(NamespacedIdentity {
        account,
        namespace: namespace.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_name_is_deterministic_per_user() {
        assert_eq!(account_name("gregor-samsa"), "gregor-samsa-argo");
        assert_eq!(account_name("gregor-samsa"), account_name("gregor-samsa"));
        assert_ne!(account_name("alice"), account_name("bob"));
    }

    #[test]
    fn objects_share_name_and_ownership_label() {
        let (sa, role, binding) = define_identity_objects("alice-argo", "nublado-alice");
        for meta in [&sa.metadata, &role.metadata, &binding.metadata] {
            assert_eq!(meta.name.as_deref(), Some("alice-argo"));
            assert_eq!(
                meta.labels.as_ref().unwrap().get(OWNERSHIP_LABEL_KEY),
                Some(&OWNERSHIP_LABEL_VALUE.to_string())
            );
        }
    }

    #[test]
    fn binding_links_account_to_role() {
        let (_, _, binding) = define_identity_objects("alice-argo", "nublado-alice");
        assert_eq!(binding.role_ref.kind, "Role");
        assert_eq!(binding.role_ref.name, "alice-argo");
        let subject = &binding.subjects.as_ref().unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.name, "alice-argo");
        assert_eq!(subject.namespace.as_deref(), Some("nublado-alice"));
    }

    #[test]
    fn role_grants_workflow_manipulation_only_in_namespace() {
        let (_, role, _) = define_identity_objects("alice-argo", "nublado-alice");
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 6);

        let wf_rule = &rules[0];
        assert_eq!(
            wf_rule.resources.as_ref().unwrap(),
            &["workflows", "workflows/finalizers"]
        );
        assert!(wf_rule.verbs.contains(&"delete".to_string()));
        // No create verb on workflows: only the dispatcher submits
        assert!(!wf_rule.verbs.contains(&"create".to_string()));

        let secret_rule = &rules[2];
        assert_eq!(secret_rule.verbs, ["get"]);
    }

    #[test]
    fn definitions_are_stable_across_calls() {
        let a = define_identity_objects("alice-argo", "nublado-alice");
        let b = define_identity_objects("alice-argo", "nublado-alice");
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
        assert_eq!(a.2, b.2);
    }

    // =========================================================================
    // Story: Idempotent Provisioning
    // =========================================================================

    use crate::cluster::MockClusterOps;
    use crate::ensure::tests::api_error;
    use mockall::Sequence;

    #[tokio::test]
    async fn ensuring_twice_succeeds_without_duplicates() {
        // First call creates all three objects; the second gets a conflict
        // for each and must still succeed without touching anything else.
        let mut ops = MockClusterOps::new();
        let mut calls = 0;
        ops.expect_create_service_account()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Ok(())
                } else {
                    Err(api_error(409))
                }
            });
        let mut calls = 0;
        ops.expect_create_role().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(())
            } else {
                Err(api_error(409))
            }
        });
        let mut calls = 0;
        ops.expect_create_role_binding()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Ok(())
                } else {
                    Err(api_error(409))
                }
            });

        let first = ensure_identity(&ops, "alice", "nublado-alice").await.unwrap();
        let second = ensure_identity(&ops, "alice", "nublado-alice").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.account, "alice-argo");
    }

    #[tokio::test]
    async fn provisioning_resumes_after_partial_failure() {
        // A pipeline that died after creating the account but before the
        // binding completes the missing steps on the next attempt.
        let mut ops = MockClusterOps::new();
        ops.expect_create_service_account()
            .times(1)
            .returning(|_, _| Err(api_error(409)));
        ops.expect_create_role()
            .times(1)
            .returning(|_, _| Err(api_error(409)));
        ops.expect_create_role_binding()
            .times(1)
            .returning(|_, _| Ok(()));

        let identity = ensure_identity(&ops, "alice", "nublado-alice").await.unwrap();
        assert_eq!(identity.namespace, "nublado-alice");
    }

    #[tokio::test]
    async fn creation_is_sequenced_account_role_binding() {
        let mut ops = MockClusterOps::new();
        let mut seq = Sequence::new();
        ops.expect_create_service_account()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        ops.expect_create_role()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        ops.expect_create_role_binding()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        ensure_identity(&ops, "alice", "nublado-alice").await.unwrap();
    }

    #[tokio::test]
    async fn non_conflict_failure_is_fatal_and_stops_the_sequence() {
        let mut ops = MockClusterOps::new();
        ops.expect_create_service_account()
            .times(1)
            .returning(|_, _| Ok(()));
        ops.expect_create_role()
            .times(1)
            .returning(|_, _| Err(api_error(403)));
        // No binding expectation: reaching it would fail the test

        let result = ensure_identity(&ops, "alice", "nublado-alice").await;
        assert!(matches!(result, Err(crate::Error::Kube(_))));
    }
}
