use std::fmt;

use kube::ResourceExt;

use super::ReconcileError;

/// `namespace/name` identity of an object, `name` alone when cluster scoped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ReconcileKey {
    pub fn for_object<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }

    /// Parse a queue item. Accepts `name` and `namespace/name`.
    pub fn parse(raw: &str) -> Result<Self, ReconcileError> {
        let malformed = || ReconcileError::MalformedKey(raw.to_string());
        let mut parts = raw.split('/');
        let key = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Self {
                namespace: None,
                name: name.to_string(),
            },
            (Some(ns), Some(name), None) => Self {
                namespace: (!ns.is_empty()).then(|| ns.to_string()),
                name: name.to_string(),
            },
            _ => return Err(malformed()),
        };
        if key.name.is_empty() {
            return Err(malformed());
        }
        Ok(key)
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cluster_and_namespaced_keys() {
        let k = ReconcileKey::parse("core").unwrap();
        assert_eq!(k.namespace, None);
        assert_eq!(k.name, "core");
        assert_eq!(k.to_string(), "core");

        let k = ReconcileKey::parse("default/core").unwrap();
        assert_eq!(k.namespace.as_deref(), Some("default"));
        assert_eq!(k.to_string(), "default/core");

        let k = ReconcileKey::parse("/core").unwrap();
        assert_eq!(k.namespace, None);
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["", "a/b/c", "ns/", "/"] {
            assert!(
                matches!(
                    ReconcileKey::parse(raw),
                    Err(ReconcileError::MalformedKey(_))
                ),
                "{raw:?} should be malformed"
            );
        }
    }
}
