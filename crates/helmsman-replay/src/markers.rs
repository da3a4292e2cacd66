//! Marker recording and replay.
//!
//! Markers let workflow code run a side-effecting computation once and read
//! the recorded value on every subsequent replay. Each marker name keeps a
//! map `id -> {data, replayed}`; during replay a stored marker is re-emitted
//! once per epoch so the command's event id lines up with the original run.
//!
//! The marker's identity travels in a JSON header under the
//! `MutableMarkerHeader` header field; markers recorded without that header
//! fall back to a plain JSON body carrying the same fields.

use helmsman_types::event::MarkerRecordedAttributes;
use helmsman_types::Header;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SIDE_EFFECT_MARKER_NAME: &str = "SideEffect";
pub const MUTABLE_SIDE_EFFECT_MARKER_NAME: &str = "MutableSideEffect";
pub const VERSION_MARKER_NAME: &str = "Version";
pub const LOCAL_ACTIVITY_MARKER_NAME: &str = "LocalActivity";

pub const MUTABLE_MARKER_HEADER_KEY: &str = "MutableMarkerHeader";

/// Version returned for change ids that have no recorded marker in a
/// replayed history: the code path did not exist when the execution ran.
pub const DEFAULT_VERSION: i32 = -1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkerHeader {
    pub id: String,
    pub event_id: i64,
    pub access_count: i32,
}

/// Marker payload as written by this library: identity in the event header,
/// data in the event details.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MarkerData {
    pub header: MarkerHeader,
    pub data: Option<Vec<u8>>,
}

/// Fallback body for markers whose identity is inlined in the details.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlainMarkerData {
    id: String,
    #[serde(default)]
    event_id: i64,
    #[serde(default)]
    data: Option<Vec<u8>>,
    #[serde(default)]
    access_count: i32,
}

impl MarkerData {
    pub fn new(id: impl Into<String>, event_id: i64, data: Option<Vec<u8>>, access_count: i32) -> Self {
        Self {
            header: MarkerHeader {
                id: id.into(),
                event_id,
                access_count,
            },
            data,
        }
    }

    /// Event header carrying the serialized marker header.
    pub fn to_event_header(&self) -> Header {
        let bytes =
            serde_json::to_vec(&self.header).expect("marker header is always serializable");
        Header::new().with_field(MUTABLE_MARKER_HEADER_KEY, bytes)
    }

    /// Recover `(id, data)` from a recorded marker event.
    pub fn from_attributes(
        attributes: &MarkerRecordedAttributes,
    ) -> Result<(String, Option<Vec<u8>>), serde_json::Error> {
        if let Some(bytes) = attributes
            .header
            .as_ref()
            .and_then(|h| h.fields.get(MUTABLE_MARKER_HEADER_KEY))
        {
            let header: MarkerHeader = serde_json::from_slice(bytes)?;
            return Ok((header.id, attributes.details.clone()));
        }
        let plain: PlainMarkerData =
            serde_json::from_slice(attributes.details.as_deref().unwrap_or(b"null"))?;
        Ok((plain.id, plain.data))
    }
}

/// Stored outcome for one marker id.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MarkerResult {
    pub data: Option<Vec<u8>>,
    /// Whether the marker has been re-emitted in the current epoch. Reset
    /// when the recorded event is dispatched after the scheduler pass.
    pub replayed: bool,
}

/// Per-marker-name replay store. The decider orchestrates when to call the
/// producer and when to emit `RecordMarker`; this type only owns the state.
#[derive(Clone, Debug)]
pub(crate) struct MarkerHandler {
    pub marker_name: &'static str,
    results: HashMap<String, MarkerResult>,
}

impl MarkerHandler {
    pub fn new(marker_name: &'static str) -> Self {
        Self {
            marker_name,
            results: HashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&MarkerResult> {
        self.results.get(id)
    }

    /// Store the value observed in a `MarkerRecorded` history event. Always
    /// overwrites, clearing the per-epoch replayed flag.
    pub fn store_recorded(&mut self, id: impl Into<String>, data: Option<Vec<u8>>) {
        self.results.insert(
            id.into(),
            MarkerResult {
                data,
                replayed: false,
            },
        );
    }

    /// Bookkeeping for a marker decision we just emitted: a known id is
    /// flagged as re-emitted for this epoch, a new id stores its data.
    pub fn note_emitted(&mut self, id: &str, data: Option<Vec<u8>>) {
        match self.results.get_mut(id) {
            Some(result) => result.replayed = true,
            None => {
                self.results.insert(
                    id.to_string(),
                    MarkerResult {
                        data,
                        replayed: false,
                    },
                );
            }
        }
    }

    /// Store data without any command emission (used for the implicit
    /// default version).
    pub fn set_data(&mut self, id: impl Into<String>, data: Option<Vec<u8>>) {
        self.results.insert(
            id.into(),
            MarkerResult {
                data,
                replayed: false,
            },
        );
    }

    pub fn mark_replayed(&mut self, id: &str) {
        if let Some(result) = self.results.get_mut(id) {
            result.replayed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_event_attributes() {
        let marker = MarkerData::new("feat", 7, Some(b"2".to_vec()), 0);
        let attributes = MarkerRecordedAttributes {
            marker_name: VERSION_MARKER_NAME.into(),
            details: marker.data.clone(),
            decision_task_completed_event_id: 6,
            header: Some(marker.to_event_header()),
        };

        let (id, data) = MarkerData::from_attributes(&attributes).unwrap();
        assert_eq!(id, "feat");
        assert_eq!(data, Some(b"2".to_vec()));
    }

    #[test]
    fn plain_body_markers_are_recognized() {
        let details = serde_json::to_vec(&serde_json::json!({
            "id": "legacy",
            "eventId": 5,
            "data": b"1".to_vec(),
            "accessCount": 0,
        }))
        .unwrap();
        let attributes = MarkerRecordedAttributes {
            marker_name: VERSION_MARKER_NAME.into(),
            details: Some(details),
            decision_task_completed_event_id: 4,
            header: None,
        };

        let (id, data) = MarkerData::from_attributes(&attributes).unwrap();
        assert_eq!(id, "legacy");
        assert_eq!(data, Some(b"1".to_vec()));
    }

    #[test]
    fn note_emitted_flags_known_ids_and_stores_new_ones() {
        let mut handler = MarkerHandler::new(VERSION_MARKER_NAME);

        handler.note_emitted("new", Some(b"2".to_vec()));
        assert_eq!(handler.get("new").unwrap().data, Some(b"2".to_vec()));
        assert!(!handler.get("new").unwrap().replayed);

        handler.store_recorded("new", Some(b"2".to_vec()));
        handler.note_emitted("new", Some(b"ignored".to_vec()));
        let result = handler.get("new").unwrap();
        assert!(result.replayed);
        // note_emitted flags without touching stored data.
        assert_eq!(result.data, Some(b"2".to_vec()));
    }

    #[test]
    fn store_recorded_resets_the_replayed_flag() {
        let mut handler = MarkerHandler::new(VERSION_MARKER_NAME);
        handler.store_recorded("feat", Some(b"1".to_vec()));
        handler.mark_replayed("feat");
        assert!(handler.get("feat").unwrap().replayed);

        handler.store_recorded("feat", Some(b"1".to_vec()));
        assert!(!handler.get("feat").unwrap().replayed);
    }
}
