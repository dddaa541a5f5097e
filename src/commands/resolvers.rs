//! Prefix and permission resolvers
//!
//! Literal specifications and computed resolvers are unified behind tagged
//! variants so the dispatch path has a single calling convention.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::message::Message;

/// Computed prefix resolver: yields the accepted prefixes for a message.
pub type PrefixFn = Arc<dyn Fn(&Message) -> Vec<String> + Send + Sync>;

/// A prefix specification: a literal, a list of literals, or a resolver
/// computed per message.
#[derive(Clone)]
pub enum Prefix {
    Literal(String),
    List(Vec<String>),
    Computed(PrefixFn),
}

impl Prefix {
    pub fn literal(prefix: impl Into<String>) -> Self {
        Prefix::Literal(prefix.into())
    }

    pub fn list(prefixes: Vec<String>) -> Self {
        Prefix::List(prefixes)
    }

    pub fn computed<F>(resolver: F) -> Self
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
    {
        Prefix::Computed(Arc::new(resolver))
    }

    /// The candidate prefixes for a message.
    pub fn resolve(&self, message: &Message) -> Vec<String> {
        match self {
            Prefix::Literal(prefix) => vec![prefix.clone()],
            Prefix::List(prefixes) => prefixes.clone(),
            Prefix::Computed(resolver) => resolver(message),
        }
    }

    /// Whether two specifications denote the same resolver: literals by
    /// value, computed resolvers by pointer identity.
    pub(crate) fn same_resolver(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::Literal(a), Prefix::Literal(b)) => a == b,
            (Prefix::List(a), Prefix::List(b)) => a == b,
            (Prefix::Computed(a), Prefix::Computed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Literal(prefix) => f.debug_tuple("Literal").field(prefix).finish(),
            Prefix::List(prefixes) => f.debug_tuple("List").field(prefixes).finish(),
            Prefix::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Prefix {
    fn from(prefix: &str) -> Self {
        Prefix::Literal(prefix.to_string())
    }
}

impl From<String> for Prefix {
    fn from(prefix: String) -> Self {
        Prefix::Literal(prefix)
    }
}

impl From<Vec<String>> for Prefix {
    fn from(prefixes: Vec<String>) -> Self {
        Prefix::List(prefixes)
    }
}

/// Future returned by a computed permission predicate.
pub type PermissionFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Computed permission predicate; may suspend (e.g. to consult an external
/// service) and reports pass/fail only.
pub type PermissionFn = Arc<dyn Fn(&Message) -> PermissionFuture + Send + Sync>;

/// A permission requirement: a literal set checked against the resolved
/// permissions, or a computed predicate.
#[derive(Clone)]
pub enum PermissionSpec {
    Literal(Vec<String>),
    Computed(PermissionFn),
}

impl PermissionSpec {
    pub fn literal(permissions: Vec<String>) -> Self {
        PermissionSpec::Literal(permissions)
    }

    pub fn computed<F>(predicate: F) -> Self
    where
        F: Fn(&Message) -> PermissionFuture + Send + Sync + 'static,
    {
        PermissionSpec::Computed(Arc::new(predicate))
    }

    /// Evaluate against a message and the permission set `granted` to the
    /// checked party.
    pub async fn check(&self, message: &Message, granted: &[String]) -> PermissionCheck {
        match self {
            PermissionSpec::Literal(required) => {
                let missing: Vec<String> = required
                    .iter()
                    .filter(|permission| !granted.contains(permission))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    PermissionCheck::Granted
                } else {
                    PermissionCheck::Missing(missing)
                }
            }
            PermissionSpec::Computed(predicate) => {
                if predicate(message).await {
                    PermissionCheck::Granted
                } else {
                    PermissionCheck::Denied
                }
            }
        }
    }
}

impl fmt::Debug for PermissionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionSpec::Literal(permissions) => {
                f.debug_tuple("Literal").field(permissions).finish()
            }
            PermissionSpec::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Granted,
    /// A literal requirement was not met; carries the missing set.
    Missing(Vec<String>),
    /// A computed predicate returned false; no missing set is known.
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new("chan", "user", "?ping")
            .with_author_permissions(vec!["send-messages".into()])
    }

    #[tokio::test]
    async fn literal_spec_reports_missing_set() {
        let spec =
            PermissionSpec::literal(vec!["send-messages".into(), "manage-messages".into()]);
        let check = spec.check(&message(), &["send-messages".to_string()]).await;
        assert_eq!(
            check,
            PermissionCheck::Missing(vec!["manage-messages".to_string()])
        );
    }

    #[tokio::test]
    async fn computed_spec_reports_pass_fail_only() {
        let spec = PermissionSpec::computed(|message| {
            let owner = message.author_id == "owner";
            Box::pin(async move { owner })
        });
        assert_eq!(
            spec.check(&message(), &[]).await,
            PermissionCheck::Denied
        );
    }

    #[test]
    fn literal_prefixes_compare_by_value() {
        assert!(Prefix::from("?").same_resolver(&Prefix::from("?")));
        assert!(!Prefix::from("?").same_resolver(&Prefix::from("!")));
    }

    #[test]
    fn computed_prefixes_compare_by_identity() {
        let a = Prefix::computed(|_| vec!["$".to_string()]);
        let b = Prefix::computed(|_| vec!["$".to_string()]);
        assert!(a.same_resolver(&a.clone()));
        assert!(!a.same_resolver(&b));
    }
}
