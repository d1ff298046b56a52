//! Verified caller identity
//!
//! Token verification is the fronting auth proxy's job. By the time a
//! request reaches this service the proxy has already authenticated the
//! caller and recorded the result in trusted headers; this module only
//! lifts those headers into a typed identity. The identity determines the
//! target namespace for every cluster operation.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::Error;

/// Header carrying the verified user name
pub const USER_HEADER: &str = "x-auth-user";

/// Header carrying the caller's external uid
pub const UID_HEADER: &str = "x-auth-uid";

/// Header carrying the caller's external groups (`name:gid,...`)
pub const GROUPS_HEADER: &str = "x-auth-groups";

/// The authenticated caller of a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    /// Verified user name, as reported by the auth proxy
    pub name: String,
    /// External uid, passed through to the workload
    pub uid: String,
    /// External group string, passed through to the workload
    pub groups: String,
}

impl UserIdentity {
    /// DNS-1123-safe form of the user name, used for namespace, account,
    /// and workflow naming
    pub fn escaped_name(&self) -> String {
        escape_name(&self.name)
    }
}

/// Lowercase and replace everything outside `[a-z0-9-]` with `-`
pub fn escape_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Result<String, Error> {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::Unauthorized(format!("missing {name} header")))
        };

        Ok(UserIdentity {
            name: header(USER_HEADER)?,
            uid: header(UID_HEADER)?,
            groups: parts
                .headers
                .get(GROUPS_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        })
    }
}
