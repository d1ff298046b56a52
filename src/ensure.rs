//! Idempotent create-or-accept helper
//!
//! All provisioned objects (service account, role, binding, command
//! ConfigMap, namespace) are keyed deterministically and immutable once
//! created, so concurrent creators converge on the same target. The
//! uniform policy: attempt creation, treat a remote "already exists"
//! conflict as success, and propagate anything else as fatal. The caller's
//! retry of the whole pipeline is the recovery mechanism; no retries here.

use std::future::Future;

use tracing::info;

/// Outcome of an ensure-exists creation attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ensured {
    /// The object was created by this call
    Created,
    /// The object already existed; treated as success
    AlreadyExists,
}

/// True if the error is a remote "already exists" conflict
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Run a creation call, accepting an existing object with the same name
/// as success
pub async fn create_or_accept<T>(
    name: &str,
    create: impl Future<Output = Result<T, kube::Error>>,
) -> Result<Ensured, kube::Error> {
    match create.await {
        Ok(_) => Ok(Ensured::Created),
        Err(e) if is_conflict(&e) => {
            info!(name = %name, "object already exists");
            Ok(Ensured::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    pub(crate) fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "remote error".to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn conflict_is_409_only() {
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(403)));
        assert!(!is_conflict(&api_error(500)));
    }

    #[tokio::test]
    async fn successful_creation_reports_created() {
        let result = create_or_accept("obj", async { Ok(()) }).await;
        assert_eq!(result.unwrap(), Ensured::Created);
    }

    #[tokio::test]
    async fn conflict_is_accepted_as_success() {
        let result = create_or_accept("obj", async { Err::<(), _>(api_error(409)) }).await;
        assert_eq!(result.unwrap(), Ensured::AlreadyExists);
    }

    #[tokio::test]
    async fn other_failures_propagate() {
        let result = create_or_accept("obj", async { Err::<(), _>(api_error(403)) }).await;
        assert!(result.is_err());
    }
}
