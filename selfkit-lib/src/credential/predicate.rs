//! Predicate trees evaluated against credential documents.
//!
//! Fields are JSON pointers into the serialized credential, e.g. `/type` or
//! `/credentialSubject/emailAddress`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    VerifiableCredential, CREDENTIAL_TYPE_CUSTOMER, CREDENTIAL_TYPE_EMAIL,
    CREDENTIAL_TYPE_LIVENESS, CREDENTIAL_TYPE_PASSPORT, FIELD_SUBJECT_EMAIL_ADDRESS,
    FIELD_SUBJECT_LIVENESS_SOURCE_IMAGE_HASH, FIELD_SUBJECT_NAME,
    FIELD_SUBJECT_PASSPORT_DOCUMENT_NUMBER, FIELD_TYPE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Field is an array containing `value`, or a scalar equal to it.
    Contains { field: String, value: Value },
    /// Field is present and not null, `""`, `[]` or `{}`.
    NotEmpty { field: String },
    /// Field equals `value`.
    Equals { field: String, value: Value },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
}

impl Predicate {
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_empty(field: impl Into<String>) -> Self {
        Self::NotEmpty {
            field: field.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction with another predicate, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And { mut all } => {
                all.push(other);
                Self::And { all }
            }
            first => Self::And {
                all: vec![first, other],
            },
        }
    }

    /// Disjunction with another predicate, flattening nested `Or`s.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or { mut any } => {
                any.push(other);
                Self::Or { any }
            }
            first => Self::Or {
                any: vec![first, other],
            },
        }
    }

    /// Liveness credential with a source image hash.
    pub fn liveness() -> Self {
        Self::of_type(CREDENTIAL_TYPE_LIVENESS, FIELD_SUBJECT_LIVENESS_SOURCE_IMAGE_HASH)
    }

    /// Email credential with an address.
    pub fn email() -> Self {
        Self::of_type(CREDENTIAL_TYPE_EMAIL, FIELD_SUBJECT_EMAIL_ADDRESS)
    }

    /// Passport credential with a document number.
    pub fn passport() -> Self {
        Self::of_type(CREDENTIAL_TYPE_PASSPORT, FIELD_SUBJECT_PASSPORT_DOCUMENT_NUMBER)
    }

    /// Customer credential with a name.
    pub fn customer() -> Self {
        Self::of_type(CREDENTIAL_TYPE_CUSTOMER, FIELD_SUBJECT_NAME)
    }

    fn of_type(credential_type: &str, required_field: &str) -> Self {
        Self::contains(FIELD_TYPE, credential_type).and(Self::not_empty(required_field))
    }

    /// Evaluate against a JSON document.
    pub fn evaluate(&self, document: &Value) -> bool {
        match self {
            Self::Contains { field, value } => match document.pointer(field) {
                Some(Value::Array(items)) => items.contains(value),
                Some(other) => other == value,
                None => false,
            },
            Self::NotEmpty { field } => match document.pointer(field) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                Some(Value::Object(map)) => !map.is_empty(),
                Some(_) => true,
            },
            Self::Equals { field, value } => document.pointer(field) == Some(value),
            Self::And { all } => all.iter().all(|p| p.evaluate(document)),
            Self::Or { any } => any.iter().any(|p| p.evaluate(document)),
        }
    }

    /// Evaluate against a credential's serialized document.
    pub fn matches(&self, credential: &VerifiableCredential) -> bool {
        credential
            .to_document()
            .map(|document| self.evaluate(&document))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_document(address: &str) -> Value {
        json!({
            "type": ["VerifiableCredential", "EmailCredential"],
            "credentialSubject": { "id": "00", "emailAddress": address }
        })
    }

    #[test]
    fn test_contains_array_and_scalar() {
        let doc = email_document("a@b.c");
        assert!(Predicate::contains("/type", "EmailCredential").evaluate(&doc));
        assert!(!Predicate::contains("/type", "PassportCredential").evaluate(&doc));
        assert!(Predicate::contains("/credentialSubject/emailAddress", "a@b.c").evaluate(&doc));
        assert!(!Predicate::contains("/missing", "x").evaluate(&doc));
    }

    #[test]
    fn test_not_empty() {
        assert!(Predicate::email().evaluate(&email_document("a@b.c")));
        assert!(!Predicate::email().evaluate(&email_document("")));
        assert!(!Predicate::liveness().evaluate(&email_document("a@b.c")));
    }

    #[test]
    fn test_combinators_flatten() {
        let p = Predicate::not_empty("/a")
            .and(Predicate::not_empty("/b"))
            .and(Predicate::not_empty("/c"));
        match &p {
            Predicate::And { all } => assert_eq!(all.len(), 3),
            other => panic!("unexpected {:?}", other),
        }

        let either = Predicate::email().or(Predicate::passport());
        assert!(either.evaluate(&email_document("a@b.c")));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Predicate::not_empty("/x")).unwrap();
        assert_eq!(json, json!({"op": "not_empty", "field": "/x"}));
        let back: Predicate = serde_json::from_value(json).unwrap();
        assert_eq!(back, Predicate::not_empty("/x"));
    }
}
