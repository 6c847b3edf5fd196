//! Wire format exchanged between the collection, the saver and the server.
//!
//! Objects without an `id` have not been created on the server yet. The
//! client ID travels alongside every exported object but is never serialized,
//! so the saver can map server responses back onto live objects.

use serde::{Deserialize, Serialize};

use crate::model::label::{AttributeId, Attributes};
use crate::model::object_state::{ClientId, Frame, ServerId};

/// One attribute assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub spec_id: AttributeId,
    pub value: String,
}

impl AttributeValue {
    pub fn new(spec_id: AttributeId, value: impl Into<String>) -> Self {
        Self {
            spec_id,
            value: value.into(),
        }
    }
}

/// Convert an attribute map into wire entries, ordered by spec ID.
pub fn attributes_to_wire(attributes: &Attributes) -> Vec<AttributeValue> {
    attributes
        .iter()
        .map(|(id, value)| AttributeValue::new(*id, value.clone()))
        .collect()
}

/// Convert wire entries into an attribute map. Later duplicates win.
pub fn attributes_from_wire(attributes: &[AttributeValue]) -> Attributes {
    attributes
        .iter()
        .map(|a| (a.spec_id, a.value.clone()))
        .collect()
}

/// A single-frame shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledShape {
    /// Server ID, absent until created on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,

    /// Client ID of the exported object (never serialized).
    #[serde(skip)]
    pub client_id: Option<ClientId>,

    /// Geometry kind name ("rectangle", "polygon", "polyline", "points").
    #[serde(rename = "type")]
    pub shape_type: String,

    pub frame: Frame,

    pub label_id: u32,

    #[serde(default)]
    pub group: u32,

    #[serde(default)]
    pub occluded: bool,

    #[serde(default)]
    pub z_order: u32,

    pub points: Vec<f64>,

    #[serde(default)]
    pub attributes: Vec<AttributeValue>,
}

/// One keyframe of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,

    #[serde(rename = "type")]
    pub shape_type: String,

    pub frame: Frame,

    #[serde(default)]
    pub occluded: bool,

    #[serde(default)]
    pub z_order: u32,

    pub points: Vec<f64>,

    #[serde(default)]
    pub outside: bool,

    /// Mutable attribute values set on this keyframe.
    #[serde(default)]
    pub attributes: Vec<AttributeValue>,
}

/// A multi-frame track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledTrack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,

    #[serde(skip)]
    pub client_id: Option<ClientId>,

    /// First keyframe of the track.
    pub frame: Frame,

    pub label_id: u32,

    #[serde(default)]
    pub group: u32,

    /// Immutable attribute values of the whole track.
    #[serde(default)]
    pub attributes: Vec<AttributeValue>,

    #[serde(default)]
    pub shapes: Vec<TrackedShape>,
}

/// A frame-level tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,

    #[serde(skip)]
    pub client_id: Option<ClientId>,

    pub frame: Frame,

    pub label_id: u32,

    #[serde(default)]
    pub group: u32,

    #[serde(default)]
    pub attributes: Vec<AttributeValue>,
}

/// Common access to the three wire object kinds.
pub trait WireObject: Serialize + Clone {
    fn server_id(&self) -> Option<ServerId>;
    fn client_id(&self) -> Option<ClientId>;
}

macro_rules! impl_wire_object {
    ($($ty:ty),*) => {
        $(impl WireObject for $ty {
            fn server_id(&self) -> Option<ServerId> {
                self.id
            }

            fn client_id(&self) -> Option<ClientId> {
                self.client_id
            }
        })*
    };
}

impl_wire_object!(LabeledShape, LabeledTrack, LabeledTag);

/// Annotations of a session plus the server-side version they refer to.
///
/// Used both as the export of a collection and as the payload and response
/// of server calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationsData {
    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub shapes: Vec<LabeledShape>,

    #[serde(default)]
    pub tracks: Vec<LabeledTrack>,

    #[serde(default)]
    pub tags: Vec<LabeledTag>,
}

impl AnnotationsData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same objects, different version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Total number of objects.
    pub fn len(&self) -> usize {
        self.shapes.len() + self.tracks.len() + self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical JSON of the objects, ignoring the version.
    ///
    /// Keys are emitted in a fixed order, so equal content gives equal text.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("version");
        }
        serde_json::to_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> LabeledShape {
        LabeledShape {
            id: None,
            client_id: Some(7),
            shape_type: "rectangle".into(),
            frame: 2,
            label_id: 1,
            group: 0,
            occluded: false,
            z_order: 0,
            points: vec![1.0, 2.0, 3.0, 4.0],
            attributes: vec![AttributeValue::new(3, "x")],
        }
    }

    #[test]
    fn test_client_id_and_missing_id_not_serialized() {
        let json = serde_json::to_value(shape()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("client_id"));
        assert_eq!(obj["type"], "rectangle");
    }

    #[test]
    fn test_deserialize_server_response() {
        let json = r#"{
            "version": 4,
            "shapes": [{"id": 10, "type": "polygon", "frame": 1, "label_id": 2,
                        "points": [0, 0, 1, 0, 1, 1]}],
            "tracks": [{"id": 11, "frame": 0, "label_id": 2, "group": 1,
                        "shapes": [{"id": 12, "type": "points", "frame": 0, "points": [5, 5], "outside": true}]}]
        }"#;
        let data: AnnotationsData = serde_json::from_str(json).unwrap();
        assert_eq!(data.version, 4);
        assert_eq!(data.len(), 2);
        assert!(data.tags.is_empty());
        assert_eq!(data.shapes[0].client_id, None);
        assert!(data.tracks[0].shapes[0].outside);
    }

    #[test]
    fn test_canonical_json_ignores_version() {
        let mut a = AnnotationsData::new();
        a.shapes.push(shape());
        let b = a.clone().with_version(9);
        assert_eq!(a.canonical_json().unwrap(), b.canonical_json().unwrap());
    }

    #[test]
    fn test_attribute_conversion() {
        let wire = vec![AttributeValue::new(2, "b"), AttributeValue::new(1, "a")];
        let map = attributes_from_wire(&wire);
        let back = attributes_to_wire(&map);
        assert_eq!(back[0], AttributeValue::new(1, "a"));
        assert_eq!(back[1], AttributeValue::new(2, "b"));
    }
}
