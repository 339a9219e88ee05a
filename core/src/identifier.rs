//! UUID-or-name identifiers for batch requests.
//!
//! Every batch endpoint takes a JSON array of single-key objects, either
//! `{"uuid": ...}` or `{"name": ...}`. Callers pass plain strings and the
//! key is picked by [`is_uuid`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// True iff `s` is a UUID in canonical 36-character hyphenated form.
pub fn is_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    let hyphens_in_place = s
        .char_indices()
        .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));
    hyphens_in_place && Uuid::try_parse(s).is_ok()
}

/// A resource reference as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identifier {
    Uuid(String),
    Name(String),
}

impl Identifier {
    /// Classify `s` as a UUID or a name.
    pub fn parse(s: impl Into<String>) -> Self {
        let s = s.into();
        if is_uuid(&s) {
            Identifier::Uuid(s)
        } else {
            Identifier::Name(s)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Uuid(s) | Identifier::Name(s) => s,
        }
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::parse(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::parse(s)
    }
}

impl From<Uuid> for Identifier {
    fn from(u: Uuid) -> Self {
        Identifier::Uuid(u.to_string())
    }
}

/// How a list of raw identifiers should be keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Decide per identifier with [`is_uuid`].
    Detect,
    Uuid,
    Name,
}

/// Turn caller-supplied identifiers into keyed wire items, preserving order.
///
/// Fails without I/O when the list or any identifier is empty.
pub fn classify<I, S>(ids: I, kind: IdentifierKind) -> Result<Vec<Identifier>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids: Vec<Identifier> = ids
        .into_iter()
        .map(|id| {
            let id = id.into();
            if id.is_empty() {
                return Err(Error::Validation("identifier must not be empty".to_string()));
            }
            Ok(match kind {
                IdentifierKind::Detect => Identifier::parse(id),
                IdentifierKind::Uuid => Identifier::Uuid(id),
                IdentifierKind::Name => Identifier::Name(id),
            })
        })
        .collect::<Result<_>>()?;

    if ids.is_empty() {
        return Err(Error::Validation(
            "at least one identifier is required".to_string(),
        ));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_uuids_are_detected() {
        assert!(is_uuid("00000000-0000-0000-0000-000000000001"));
        assert!(is_uuid("6f1c2e5a-8b3d-4c7e-9a0f-1b2c3d4e5f60"));
        assert!(is_uuid("6F1C2E5A-8B3D-4C7E-9A0F-1B2C3D4E5F60"));
    }

    #[test]
    fn non_canonical_forms_are_names() {
        assert!(!is_uuid("my-name"));
        assert!(!is_uuid(""));
        assert!(!is_uuid("6f1c2e5a8b3d4c7e9a0f1b2c3d4e5f60"));
        assert!(!is_uuid("{6f1c2e5a-8b3d-4c7e-9a0f-1b2c3d4e5f6}"));
        assert!(!is_uuid("6f1c2e5a-8b3d-4c7e-9a0f-1b2c3d4e5f6g"));
        assert!(!is_uuid("6f1c2e5a-8b3d4-c7e-9a0f-1b2c3d4e5f60"));
    }

    #[test]
    fn identifiers_serialize_as_single_key_objects() {
        let ids = classify(
            ["00000000-0000-0000-0000-000000000001", "my-name"],
            IdentifierKind::Detect,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_string(&ids).unwrap(),
            r#"[{"uuid":"00000000-0000-0000-0000-000000000001"},{"name":"my-name"}]"#
        );
    }

    #[test]
    fn forced_kind_skips_detection() {
        let ids = classify(["00000000-0000-0000-0000-000000000001"], IdentifierKind::Name).unwrap();
        assert_eq!(
            ids,
            vec![Identifier::Name("00000000-0000-0000-0000-000000000001".to_string())]
        );
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let none: [&str; 0] = [];
        assert!(matches!(
            classify(none, IdentifierKind::Detect),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            classify(["ok", ""], IdentifierKind::Detect),
            Err(Error::Validation(_))
        ));
    }
}
