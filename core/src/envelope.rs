//! The response envelope shared by every endpoint.
//!
//! # Design
//! Every response body has the same outer shape:
//!
//! ```json
//! {"status": "success", "message": "...", "errors": [{"status": 404}],
//!  "data": {"instances": [ ... ]}}
//! ```
//!
//! The single key under `data` is named after the resource, so decoding
//! treats it as opaque: parse `data` as an object, reject more than one key,
//! and decode the lone value as an array of `T`. That keeps one decoder for
//! every resource client.
//!
//! Each item also embeds a [`ResponseCommon`] header so a batch can report
//! per-item failures; [`Envelope::all_or_err`] folds those into one
//! aggregate error without dropping any item.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level and per-item status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Header fields present on every item of every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<i64>,
}

impl ResponseCommon {
    /// The item's own failure, if the server attached an error code to it.
    pub fn error(&self) -> Option<Error> {
        self.error.map(|code| Error::Item {
            message: self.message.clone().unwrap_or_default(),
            code,
        })
    }
}

/// Implemented by every item type that embeds [`ResponseCommon`].
pub trait ApiItem {
    fn common(&self) -> &ResponseCommon;
}

/// One entry of the envelope's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub status: ResponseStatus,
    pub message: Option<String>,
    pub errors: Vec<RequestError>,
    /// Items under the single `data` key. `None` when `data` was absent or
    /// null; empty when `data` was an empty object.
    pub entries: Option<Vec<T>>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    status: ResponseStatus,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Vec<RequestError>>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        let entries = match raw.data {
            None => None,
            Some(data) => decode_data(data).map_err(de::Error::custom)?,
        };
        Ok(Envelope {
            status: raw.status,
            message: raw.message.filter(|m| !m.is_empty()),
            errors: raw.errors.unwrap_or_default(),
            entries,
        })
    }
}

/// Take the only value of the `data` object and decode it as `[T]`.
fn decode_data<T: DeserializeOwned>(data: Map<String, Value>) -> std::result::Result<Option<Vec<T>>, String> {
    if data.len() > 1 {
        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        return Err(format!(
            "expected a single data attribute, found [{}]",
            keys.join(" ")
        ));
    }
    match data.into_iter().next() {
        None => Ok(Some(Vec::new())),
        Some((_, Value::Null)) => Ok(None),
        Some((key, value)) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("data attribute {key:?}: {e}")),
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode a raw response body.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

impl<T> Envelope<T> {
    /// Whether the envelope itself signals failure. A `success` status with a
    /// non-empty `errors` array counts as failure.
    pub fn is_failure(&self) -> bool {
        match self.status {
            ResponseStatus::Error => true,
            ResponseStatus::PartialSuccess => true,
            ResponseStatus::Success => !self.errors.is_empty(),
        }
    }

    /// Envelope-level error, independent of the items.
    pub fn envelope_error(&self) -> Option<Error> {
        if !self.is_failure() {
            return None;
        }
        if let Some(message) = &self.message {
            return Some(Error::Envelope(message.clone()));
        }
        match self.status {
            // per-item errors carry the detail for a partial success
            ResponseStatus::PartialSuccess if self.errors.is_empty() => None,
            _ if !self.errors.is_empty() => {
                let codes: Vec<String> = self.errors.iter().map(|e| e.status.to_string()).collect();
                Some(Error::Envelope(format!(
                    "request failed with status codes [{}]",
                    codes.join(" ")
                )))
            }
            _ => Some(Error::Envelope("request failed".to_string())),
        }
    }

    /// First item (if any) and, independently, the envelope's error.
    ///
    /// The error is set for an `error` status, for `success` with a
    /// non-empty `errors` array, or when `data` was absent altogether. A
    /// `partial_success` is not an error here whether or not it carries a
    /// message; use [`Envelope::all_or_err`] to see the failed items.
    pub fn first_or_err(self) -> (Option<T>, Result<()>) {
        let failed = match self.status {
            ResponseStatus::PartialSuccess => None,
            _ => self.envelope_error(),
        };
        let err = match (failed, &self.entries) {
            (Some(err), _) => Some(err),
            (None, None) => Some(Error::Decode("response carries no data entries".to_string())),
            (None, Some(_)) => None,
        };
        let first = self.entries.and_then(|entries| entries.into_iter().next());
        (first, err.map_or(Ok(()), Err))
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ApiItem> Envelope<T> {
    /// Every item plus an aggregate of the envelope error and each item's
    /// `"<message> (code=<error>)"`.
    pub fn all_or_err(self) -> (Vec<T>, Result<()>) {
        let mut errors: Vec<Error> = self.envelope_error().into_iter().collect();
        if self.entries.is_none() && errors.is_empty() {
            errors.push(Error::Decode("response carries no data entries".to_string()));
        }
        let entries = self.entries.unwrap_or_default();
        errors.extend(entries.iter().filter_map(|item| item.common().error()));

        match Error::join(errors) {
            Some(err) => (entries, Err(err)),
            None => (entries, Ok(())),
        }
    }

    /// The first item, failing if the envelope or that item reports an
    /// error or if there is no item at all.
    pub fn into_first(self) -> Result<T> {
        let (first, result) = self.first_or_err();
        match (first, result) {
            (Some(item), Ok(())) => match item.common().error() {
                Some(err) => Err(err),
                None => Ok(item),
            },
            (Some(item), Err(err)) => match item.common().error() {
                Some(item_err) => Err(Error::Aggregate(vec![err, item_err])),
                None => Err(err),
            },
            (None, Err(err)) => Err(err),
            (None, Ok(())) => Err(Error::Decode("response carries no items".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Item {
        #[serde(default)]
        uuid: String,
        #[serde(flatten)]
        common: ResponseCommon,
    }

    impl ApiItem for Item {
        fn common(&self) -> &ResponseCommon {
            &self.common
        }
    }

    fn decode(body: &str) -> Result<Envelope<Item>> {
        Envelope::from_json(body)
    }

    #[test]
    fn single_key_is_opaque() {
        let env = decode(r#"{"status":"success","data":{"whatever":[{"uuid":"a"},{"uuid":"b"}]}}"#).unwrap();
        assert_eq!(env.status, ResponseStatus::Success);
        let (items, result) = env.all_or_err();
        assert!(result.is_ok());
        assert_eq!(items.iter().map(|i| i.uuid.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn zero_keys_yield_empty_entries() {
        let env = decode(r#"{"status":"success","data":{}}"#).unwrap();
        assert_eq!(env.entries, Some(Vec::new()));
        let (first, result) = env.first_or_err();
        assert!(first.is_none());
        assert!(result.is_ok());
    }

    #[test]
    fn multiple_keys_are_rejected_by_name() {
        let err = decode(r#"{"status":"success","data":{"a":[],"b":[]}}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().contains("[a b]"), "{err}");
    }

    #[test]
    fn missing_data_is_an_error_for_accessors() {
        let env = decode(r#"{"status":"success"}"#).unwrap();
        assert!(env.entries.is_none());
        let (first, result) = env.first_or_err();
        assert!(first.is_none());
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn error_status_surfaces_message() {
        let env = decode(r#"{"status":"error","message":"no such instance","data":{"instances":[{"status":"error","message":"not found","error":6}]}}"#).unwrap();
        let (first, result) = env.first_or_err();
        assert!(first.is_some());
        assert_eq!(result.unwrap_err().to_string(), "no such instance");
    }

    #[test]
    fn error_status_without_items_does_not_panic() {
        let env = decode(r#"{"status":"error","message":"unauthorized"}"#).unwrap();
        let err = env.into_first().unwrap_err();
        assert_eq!(err.to_string(), "unauthorized");
    }

    #[test]
    fn partial_success_keeps_every_item() {
        let env = decode(
            r#"{"status":"partial_success","message":"some failed","data":{"instances":[
                {"uuid":"u1","status":"success"},
                {"uuid":"u2","status":"error","message":"quota","error":7}]}}"#,
        )
        .unwrap();
        let (items, result) = env.all_or_err();
        assert_eq!(items.len(), 2);
        let err = result.unwrap_err();
        let causes: Vec<String> = err.causes().iter().map(|e| e.to_string()).collect();
        assert_eq!(causes, ["some failed", "quota (code=7)"]);
    }

    #[test]
    fn first_or_err_ignores_partial_success_message() {
        let items = r#""data":{"instances":[
                {"uuid":"a","status":"success"},
                {"uuid":"b","status":"error","message":"quota","error":7}]}"#;
        for body in [
            format!(r#"{{"status":"partial_success","message":"Failed to perform some operations",{items}}}"#),
            format!(r#"{{"status":"partial_success",{items}}}"#),
        ] {
            let (first, result) = decode(&body).unwrap().first_or_err();
            assert_eq!(first.map(|i| i.uuid), Some("a".to_string()), "{body}");
            assert!(result.is_ok(), "{body}: {result:?}");
        }
    }

    #[test]
    fn success_with_errors_counts_as_failure() {
        let env = decode(r#"{"status":"success","errors":[{"status":500}],"data":{"volumes":[]}}"#).unwrap();
        assert!(env.is_failure());
        let (_, result) = env.all_or_err();
        assert_eq!(
            result.unwrap_err().to_string(),
            "request failed with status codes [500]"
        );
    }

    #[test]
    fn into_first_reports_item_error() {
        let env = decode(r#"{"status":"success","data":{"volumes":[{"uuid":"v","message":"in use","error":16}]}}"#).unwrap();
        let err = env.into_first().unwrap_err();
        assert_eq!(err.to_string(), "in use (code=16)");
    }

    #[test]
    fn malformed_items_fail_decoding() {
        let err = decode(r#"{"status":"success","data":{"instances":{"uuid":"x"}}}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().contains("instances"));
    }
}
