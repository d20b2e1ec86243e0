//! Prefixed ULID identities.

use ulid::Ulid;

use crate::IdError;

/// Splits `{prefix}_{ulid}` and checks the prefix.
pub(crate) fn parse_prefixed(s: &str, prefix: &'static str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    let (actual, ulid) = s.split_once('_').ok_or(IdError::MissingSeparator)?;
    if actual != prefix {
        return Err(IdError::InvalidPrefix {
            expected: prefix,
            actual: actual.to_string(),
        });
    }
    ulid.parse::<Ulid>()
        .map_err(|e| IdError::InvalidUlid(e.to_string()))
}

/// Declares a copyable ULID newtype rendered as `{prefix}_{ulid}`, in text
/// and in serde.
macro_rules! prefixed_id {
    ($(#[$doc:meta])* $name:ident = $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(::ulid::Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// A fresh identity.
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(::ulid::Ulid::new())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::macros::parse_prefixed(s, Self::PREFIX).map(Self)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use prefixed_id;
