//! Builder signatures and their fixed-size lock keys.
//!
//! A signature is the ordered tuple of a builder's unique property values.
//! Relation signatures nest the signatures of their source and target
//! entities ahead of their own values, so `(("X",), ("Y",))` is the
//! signature of a relation between entities named `X` and `Y` that declares
//! no unique properties of its own.
//!
//! [`SignatureKey`] is the BLAKE3 hash of the signature's canonical JSON
//! encoding and is what the lock table is keyed on.

use std::fmt;

use grano_core::GranoError;
use serde::Serialize;

use crate::error::Result;

/// One position of a signature tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SignaturePart {
    /// Current value of a unique property; `None` when unset.
    Value(Option<String>),
    /// Signature of a related builder.
    Nested(Signature),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Signature(Vec<SignaturePart>);

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flat signature of property values.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            values
                .into_iter()
                .map(|v| SignaturePart::Value(Some(v.into())))
                .collect(),
        )
    }

    pub fn push_value(&mut self, value: Option<String>) {
        self.0.push(SignaturePart::Value(value));
    }

    pub fn push_nested(&mut self, signature: Signature) {
        self.0.push(SignaturePart::Nested(signature));
    }

    pub fn parts(&self) -> &[SignaturePart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lock-table key: BLAKE3 over the canonical JSON encoding.
    pub fn key(&self) -> Result<SignatureKey> {
        let json = serde_json::to_vec(self).map_err(GranoError::from)?;
        Ok(SignatureKey(*blake3::hash(&json).as_bytes()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("<unencodable>"),
        }
    }
}

/// Fixed-size hash of a [`Signature`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureKey([u8; 32]);

impl SignatureKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Debug for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_encoding() {
        let mut relation = Signature::new();
        relation.push_nested(Signature::from_values(["X"]));
        relation.push_nested(Signature::from_values(["Y"]));
        assert_eq!(serde_json::to_value(&relation).unwrap(), json!([["X"], ["Y"]]));
        assert_eq!(relation.to_string(), r#"[["X"],["Y"]]"#);
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = Signature::from_values(["Angela Merkel", "1954"]);
        let b = Signature::from_values(["Angela Merkel", "1954"]);
        assert_eq!(a.key().unwrap(), b.key().unwrap());
        assert_eq!(a.key().unwrap().to_hex().len(), 64);
    }

    #[test]
    fn test_key_distinguishes_order_and_nesting() {
        let ab = Signature::from_values(["a", "b"]);
        let ba = Signature::from_values(["b", "a"]);
        assert_ne!(ab.key().unwrap(), ba.key().unwrap());

        let mut nested = Signature::new();
        nested.push_nested(Signature::from_values(["a"]));
        nested.push_nested(Signature::from_values(["b"]));
        assert_ne!(ab.key().unwrap(), nested.key().unwrap());
    }

    #[test]
    fn test_unset_value_is_null() {
        let mut sig = Signature::new();
        sig.push_value(None);
        assert_eq!(serde_json::to_value(&sig).unwrap(), json!([null]));
        assert_ne!(sig.key().unwrap(), Signature::new().key().unwrap());
    }
}
