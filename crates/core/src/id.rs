//! Identifiers for workflows and their graph elements.
//!
//! Ids are opaque strings on the wire so graphs authored elsewhere (the
//! editor uses short numeric strings) load unchanged. Freshly minted ids are
//! ULIDs.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Ulid::new().to_string())
            }

            /// Borrow the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id! {
    /// Unique identifier for a workflow.
    WorkflowId
}

string_id! {
    /// Unique, stable identifier for a node within a workflow.
    NodeId
}

string_id! {
    /// Unique identifier for an edge within a workflow.
    EdgeId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = NodeId::from("1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1\"");
        let back: NodeId = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(back, id);
    }
}
