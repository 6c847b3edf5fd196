//! Frame-bound value snapshots of annotation objects.
//!
//! An [`ObjectState`] is what the engine hands to its consumers. Consumers
//! edit it through the validating setters, which record the touched fields in
//! [`UpdateFlags`], and hand it back to [`Collection::save`]. The state does
//! not reference its entity: it carries the client ID and frame, and the
//! collection resolves them.
//!
//! [`Collection::save`]: crate::collection::Collection::save

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AnnotationError, Result};
use crate::model::geometry::{Point, ShapeType, to_flat, to_points};
use crate::model::label::{AttributeId, Attributes, Label};

/// Frame number within a session.
pub type Frame = u32;

/// Locally unique object identifier, assigned by the collection.
pub type ClientId = u32;

/// Identifier assigned by the server on the first save.
pub type ServerId = u64;

/// Kind of annotation object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// Single-frame geometry
    Shape,
    /// Interpolated multi-frame geometry
    Track,
    /// Frame-level label without geometry
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Shape => "shape",
            ObjectType::Track => "track",
            ObjectType::Tag => "tag",
        }
    }
}

/// Fields of an [`ObjectState`] changed since it was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFlags {
    pub label: bool,
    pub attributes: bool,
    pub points: bool,
    pub occluded: bool,
    pub outside: bool,
    pub z_order: bool,
    pub keyframe: bool,
    pub group: bool,
    pub lock: bool,
    pub color: bool,
}

impl UpdateFlags {
    /// Whether any field was changed.
    pub fn any(&self) -> bool {
        self.label
            || self.attributes
            || self.points
            || self.occluded
            || self.outside
            || self.z_order
            || self.keyframe
            || self.group
            || self.lock
            || self.color
    }

    /// Whether the change moves the object geometry at its frame.
    pub fn position(&self) -> bool {
        self.points || self.occluded || self.outside || self.z_order
    }

    /// Clear all flags.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot of one annotation object at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    pub(crate) object_type: ObjectType,
    pub(crate) shape_type: Option<ShapeType>,
    pub(crate) client_id: Option<ClientId>,
    /// Collection generation the client ID belongs to
    pub(crate) epoch: u64,
    pub(crate) server_id: Option<ServerId>,
    pub(crate) frame: Frame,
    pub(crate) label: Arc<Label>,
    pub(crate) points: Vec<f64>,
    pub(crate) occluded: bool,
    pub(crate) outside: bool,
    pub(crate) keyframe: bool,
    pub(crate) z_order: u32,
    pub(crate) group: u32,
    pub(crate) lock: bool,
    pub(crate) color: String,
    pub(crate) attributes: Attributes,
    pub(crate) updated: UpdateFlags,
}

impl ObjectState {
    /// Create a state for an object that does not exist in a collection yet.
    ///
    /// Pass the result to [`Collection::put`](crate::collection::Collection::put).
    /// Shapes and tracks need a shape type; tags must not have one.
    pub fn new(
        object_type: ObjectType,
        shape_type: Option<ShapeType>,
        frame: Frame,
        label: Arc<Label>,
    ) -> Result<Self> {
        match (object_type, shape_type) {
            (ObjectType::Tag, Some(_)) => {
                return Err(AnnotationError::argument("Tags do not have a shape type"));
            }
            (ObjectType::Shape | ObjectType::Track, None) => {
                return Err(AnnotationError::argument(format!(
                    "A {} requires a shape type",
                    object_type.as_str()
                )));
            }
            _ => {}
        }

        Ok(Self {
            object_type,
            shape_type,
            client_id: None,
            epoch: 0,
            server_id: None,
            frame,
            label,
            points: Vec::new(),
            occluded: false,
            outside: false,
            keyframe: object_type == ObjectType::Track,
            z_order: 0,
            group: 0,
            lock: false,
            color: String::new(),
            attributes: Attributes::new(),
            updated: UpdateFlags::default(),
        })
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn shape_type(&self) -> Option<ShapeType> {
        self.shape_type
    }

    /// Client ID of the owning object, None for states not yet put.
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn server_id(&self) -> Option<ServerId> {
        self.server_id
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn label(&self) -> &Arc<Label> {
        &self.label
    }

    /// Flat coordinate sequence.
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Coordinates as points.
    pub fn position(&self) -> Vec<Point> {
        to_points(&self.points)
    }

    pub fn occluded(&self) -> bool {
        self.occluded
    }

    pub fn outside(&self) -> bool {
        self.outside
    }

    /// Whether the state sits on an authored keyframe (tracks only).
    pub fn keyframe(&self) -> bool {
        self.keyframe
    }

    pub fn z_order(&self) -> u32 {
        self.z_order
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn lock(&self) -> bool {
        self.lock
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Fields changed through setters.
    pub fn updated(&self) -> &UpdateFlags {
        &self.updated
    }

    /// Replace the label. The collection checks that it belongs to the session.
    ///
    /// Attributes are reset to the new label's defaults.
    pub fn set_label(&mut self, label: Arc<Label>) {
        self.attributes = label.default_attributes();
        self.label = label;
        self.updated.label = true;
    }

    /// Set one attribute value, validated against the current label.
    pub fn set_attribute(&mut self, id: AttributeId, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.label.validate_attribute(id, &value)?;
        self.attributes.insert(id, value);
        self.updated.attributes = true;
        Ok(())
    }

    /// Set several attribute values. Nothing is written if one is invalid.
    pub fn set_attributes(&mut self, attributes: Attributes) -> Result<()> {
        for (id, value) in &attributes {
            self.label.validate_attribute(*id, value)?;
        }
        self.attributes.extend(attributes);
        self.updated.attributes = true;
        Ok(())
    }

    /// Set the flat coordinate sequence.
    pub fn set_points(&mut self, points: Vec<f64>) -> Result<()> {
        let Some(shape_type) = self.shape_type else {
            return Err(AnnotationError::argument("Tags do not have points"));
        };
        shape_type.validate_points(&points)?;
        self.points = points;
        self.updated.points = true;
        Ok(())
    }

    /// Set coordinates from points.
    pub fn set_position(&mut self, position: &[Point]) -> Result<()> {
        self.set_points(to_flat(position))
    }

    pub fn set_occluded(&mut self, occluded: bool) {
        self.occluded = occluded;
        self.updated.occluded = true;
    }

    pub fn set_outside(&mut self, outside: bool) {
        self.outside = outside;
        self.updated.outside = true;
    }

    /// Add (true) or remove (false) the keyframe at this state's frame.
    pub fn set_keyframe(&mut self, keyframe: bool) {
        self.keyframe = keyframe;
        self.updated.keyframe = true;
    }

    pub fn set_lock(&mut self, lock: bool) {
        self.lock = lock;
        self.updated.lock = true;
    }

    /// Set the z-order. Must be a non-negative integer.
    pub fn set_z_order(&mut self, z_order: i64) -> Result<()> {
        self.z_order = non_negative("zOrder", z_order)?;
        self.updated.z_order = true;
        Ok(())
    }

    /// Set the group. Must be a non-negative integer, 0 means no group.
    pub fn set_group(&mut self, group: i64) -> Result<()> {
        self.group = non_negative("group", group)?;
        self.updated.group = true;
        Ok(())
    }

    /// Set the colour as `#RRGGBB`.
    pub fn set_color(&mut self, color: impl Into<String>) -> Result<()> {
        let color = color.into();
        validate_color(&color)?;
        self.color = color;
        self.updated.color = true;
        Ok(())
    }
}

fn non_negative(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        AnnotationError::argument(format!(
            "Value of \"{field}\" must be a non-negative integer, got {value}"
        ))
    })
}

/// Check that a colour is written as `#RRGGBB`.
pub fn validate_color(color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(AnnotationError::argument(format!(
            "Got invalid color value: \"{color}\""
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::label::{AttributeSpec, InputType};

    fn label() -> Arc<Label> {
        Arc::new(Label::new(1, "car").with_attribute(AttributeSpec::new(
            5,
            "color",
            InputType::Select,
            false,
            "red",
            vec!["red".into(), "blue".into()],
        )))
    }

    fn rectangle_state() -> ObjectState {
        ObjectState::new(ObjectType::Shape, Some(ShapeType::Rectangle), 3, label()).unwrap()
    }

    #[test]
    fn test_new_requires_consistent_shape_type() {
        assert!(ObjectState::new(ObjectType::Tag, Some(ShapeType::Points), 0, label()).is_err());
        assert!(ObjectState::new(ObjectType::Track, None, 0, label()).is_err());
        assert!(ObjectState::new(ObjectType::Tag, None, 0, label()).is_ok());
    }

    #[test]
    fn test_setters_record_flags() {
        let mut state = rectangle_state();
        assert!(!state.updated().any());

        state.set_points(vec![0.0, 0.0, 10.0, 10.0]).unwrap();
        state.set_occluded(true);
        assert!(state.updated().points);
        assert!(state.updated().occluded);
        assert!(state.updated().position());
        assert!(!state.updated().label);
    }

    #[test]
    fn test_points_validation() {
        let mut state = rectangle_state();
        assert!(state.set_points(vec![0.0, 0.0, 10.0]).is_err());
        assert!(state.set_position(&[Point::new(0.0, 0.0)]).is_err());
        assert!(!state.updated().points);

        let mut tag = ObjectState::new(ObjectType::Tag, None, 0, label()).unwrap();
        assert!(matches!(
            tag.set_points(vec![0.0, 0.0]),
            Err(AnnotationError::Argument(_))
        ));
    }

    #[test]
    fn test_integer_fields_reject_negative() {
        let mut state = rectangle_state();
        assert!(state.set_z_order(-1).is_err());
        assert!(state.set_group(-3).is_err());
        state.set_group(4).unwrap();
        assert_eq!(state.group(), 4);
    }

    #[test]
    fn test_attribute_validation() {
        let mut state = rectangle_state();
        state.set_attribute(5, "blue").unwrap();
        assert_eq!(state.attributes()[&5], "blue");
        assert!(state.set_attribute(5, "green").is_err());
        assert!(state.set_attribute(6, "red").is_err());
    }

    #[test]
    fn test_color_validation() {
        let mut state = rectangle_state();
        assert!(state.set_color("#a0B1c2").is_ok());
        assert!(state.set_color("a0B1c2").is_err());
        assert!(state.set_color("#12345G").is_err());
    }
}
