//! Optional field that remembers whether it was omitted or written as
//! `null`, so editor documents survive a load and save unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An optional value with three wire states.
///
/// Use with `#[serde(default, skip_serializing_if = "Nullable::is_absent")]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Nullable<T> {
    /// Key not present
    #[default]
    Absent,
    /// Key present with `null`
    Null,
    /// Key present with a value
    Value(T),
}

impl<T> Nullable<T> {
    /// Whether the key was omitted.
    pub fn is_absent(&self) -> bool {
        matches!(self, Nullable::Absent)
    }

    /// Whether a value is present.
    pub fn is_some(&self) -> bool {
        matches!(self, Nullable::Value(_))
    }

    /// Whether no value is present, omitted or null.
    pub fn is_none(&self) -> bool {
        !self.is_some()
    }

    /// Borrow the value.
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Nullable::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow the value.
    pub fn as_mut(&mut self) -> Option<&mut T> {
        match self {
            Nullable::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Take the value, dropping the omitted/null distinction.
    pub fn into_option(self) -> Option<T> {
        match self {
            Nullable::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Replace the value. `None` keeps an explicit `null` as `null`.
    pub fn set(&mut self, value: Option<T>) {
        *self = match (value, &*self) {
            (Some(value), _) => Nullable::Value(value),
            (None, Nullable::Null) => Nullable::Null,
            (None, _) => Nullable::Absent,
        };
    }
}

impl<T: Copy> Nullable<T> {
    /// Copy the value out.
    pub fn get(&self) -> Option<T> {
        self.as_ref().copied()
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Nullable::Value(value),
            None => Nullable::Absent,
        }
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Nullable::Value(value) => serializer.serialize_some(value),
            // Absent is skipped by the containing struct
            Nullable::Absent | Nullable::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Nullable::Value(value),
            None => Nullable::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(default, skip_serializing_if = "Nullable::is_absent")]
        proof: Nullable<String>,
    }

    #[test]
    fn keeps_all_three_states() {
        for raw in [json!({}), json!({"proof": null}), json!({"proof": "a.jpg"})] {
            let doc: Doc = serde_json::from_value(raw.clone()).unwrap();
            assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
        }
    }

    #[test]
    fn clearing_keeps_explicit_null() {
        let mut proof = Nullable::Null;
        proof.set(Some("a.jpg".to_string()));
        assert_eq!(proof.as_ref().map(String::as_str), Some("a.jpg"));

        proof.set(None);
        assert!(proof.is_absent());

        let mut proof: Nullable<String> = Nullable::Null;
        proof.set(None);
        assert_eq!(proof, Nullable::Null);
    }
}
