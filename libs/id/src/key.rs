//! Namespaced object keys.

use std::fmt;
use std::str::FromStr;

use crate::IdError;

const MAX_NAMESPACE_LEN: usize = 63;
const MAX_NAME_LEN: usize = 253;

/// The `(namespace, name)` identity of a stored object.
///
/// Keys are immutable once an object is created. Ordering is namespace
/// first, then name, which keeps `list` output stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Creates a validated key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let name = name.into();
        validate_namespace(&namespace)?;
        validate_name(&name)?;
        Ok(Self { namespace, name })
    }

    /// Parses `namespace/name`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some((namespace, name)) = s.split_once('/') else {
            return Err(IdError::InvalidKey(s.to_string()));
        };
        Self::new(namespace, name)
    }

    /// Key of a derived object living next to this one: same namespace,
    /// name `<name><suffix>`.
    ///
    /// Derived keys are not re-validated; derivation must stay total even
    /// for names close to the length limit. Check them with
    /// [`ObjectKey::validate`] before storing anything under them.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: format!("{}{}", self.name, suffix),
        }
    }

    /// Re-check the naming rules `new` enforces.
    pub fn validate(&self) -> Result<(), IdError> {
        validate_namespace(&self.namespace)?;
        validate_name(&self.name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ObjectKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ObjectKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both ends.
fn validate_namespace(namespace: &str) -> Result<(), IdError> {
    validate_label("namespace", namespace, namespace, MAX_NAMESPACE_LEN)
}

/// DNS-1123 subdomain: dot-separated labels.
fn validate_name(name: &str) -> Result<(), IdError> {
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name", name, "must be at most 253 characters"));
    }
    name.split('.')
        .try_for_each(|label| validate_label("name", name, label, MAX_NAME_LEN))
}

fn validate_label(
    field: &'static str,
    whole: &str,
    label: &str,
    max_len: usize,
) -> Result<(), IdError> {
    if whole.is_empty() {
        return Err(IdError::Empty);
    }
    if label.is_empty() {
        return Err(invalid(field, whole, "must not contain empty segments"));
    }
    if label.len() > max_len {
        return Err(invalid(field, whole, "is too long"));
    }
    if !label
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(
            field,
            whole,
            "must consist of lowercase alphanumerics and '-'",
        ));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(invalid(field, whole, "must start and end with an alphanumeric"));
    }
    Ok(())
}

fn invalid(field: &'static str, value: &str, message: &'static str) -> IdError {
    IdError::InvalidName {
        field,
        value: value.to_string(),
        message,
    }
}
