//! Annotation entities owned by a collection.
//!
//! [`Annotation`] is a sum type over the three object kinds. Each kind
//! carries the common [`ObjectData`] and, for shapes and tracks, a
//! [`ShapeType`] that selects the geometry rules. Edits are applied to a copy
//! of the entity and swapped in only after every field validated, so a
//! failing `save` never leaves partial writes behind.

mod shape;
mod tag;
mod track;

use std::sync::Arc;

use crate::config::InterpolationConfig;
use crate::error::{AnnotationError, Result};
use crate::format::wire::{AttributeValue, attributes_from_wire};
use crate::model::geometry::ShapeType;
use crate::model::label::{Attributes, Label, LabelSet};
use crate::model::object_state::{ClientId, Frame, ObjectState, ObjectType, ServerId, UpdateFlags};

pub use shape::ShapeObject;
pub use tag::TagObject;
pub use track::{Keyframe, TrackObject, TrackPosition};

/// Fields shared by every annotation kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData {
    pub client_id: ClientId,
    pub server_id: Option<ServerId>,
    pub label: Arc<Label>,
    /// Frame of a shape or tag, first keyframe of a track
    pub frame: Frame,
    /// 0 means no group
    pub group: u32,
    pub attributes: Attributes,
    pub removed: bool,
    pub lock: bool,
    pub color: String,
}

impl ObjectData {
    /// Build the common data, back-filling unset attributes with label defaults.
    ///
    /// Attribute IDs the label does not know are dropped.
    pub(crate) fn new(
        client_id: ClientId,
        server_id: Option<ServerId>,
        label: Arc<Label>,
        frame: Frame,
        group: u32,
        attributes: &[AttributeValue],
        color: String,
    ) -> Self {
        let attributes = known_attributes(&label, attributes_from_wire(attributes), client_id);
        let mut merged = label.default_attributes();
        merged.extend(attributes);

        Self {
            client_id,
            server_id,
            label,
            frame,
            group,
            attributes: merged,
            removed: false,
            lock: false,
            color,
        }
    }

    /// True when `state` must not change this object.
    ///
    /// A locked object only accepts a patch that unlocks it.
    pub(crate) fn rejects(&self, state: &ObjectState) -> bool {
        self.lock && !(state.updated.lock && !state.lock)
    }

    /// Apply label, group, lock and colour edits of `state`.
    ///
    /// A label edit resets the attributes to the new label's defaults.
    pub(crate) fn apply_common(&mut self, state: &ObjectState, labels: &LabelSet) -> Result<()> {
        let updated = &state.updated;

        if updated.label {
            let label = resolve_label(&state.label, labels)?;
            self.attributes = label.default_attributes();
            self.label = label;
        }
        if updated.group {
            self.group = state.group;
        }
        if updated.lock {
            self.lock = state.lock;
        }
        if updated.color {
            crate::model::object_state::validate_color(&state.color)?;
            self.color = state.color.clone();
        }

        Ok(())
    }

    /// Snapshot skeleton for this object at `frame`.
    pub(crate) fn state(
        &self,
        object_type: ObjectType,
        shape_type: Option<ShapeType>,
        frame: Frame,
    ) -> ObjectState {
        ObjectState {
            object_type,
            shape_type,
            client_id: Some(self.client_id),
            epoch: 0,
            server_id: self.server_id,
            frame,
            label: Arc::clone(&self.label),
            points: Vec::new(),
            occluded: false,
            outside: false,
            keyframe: false,
            z_order: 0,
            group: self.group,
            lock: self.lock,
            color: self.color.clone(),
            attributes: self.attributes.clone(),
            updated: UpdateFlags::default(),
        }
    }
}

/// Look up the session's copy of a label referenced by a state.
pub(crate) fn resolve_label(label: &Label, labels: &LabelSet) -> Result<Arc<Label>> {
    if !labels.contains(label) {
        return Err(AnnotationError::argument(format!(
            "Label \"{}\" (id {}) does not belong to this session",
            label.name, label.id
        )));
    }
    labels.require(label.id).cloned()
}

/// Validate every attribute of `state` against `label`.
pub(crate) fn validated_attributes(label: &Label, state: &ObjectState) -> Result<Attributes> {
    for (id, value) in &state.attributes {
        label.validate_attribute(*id, value)?;
    }
    Ok(state.attributes.clone())
}

/// Keep only attributes the label defines.
pub(crate) fn known_attributes(label: &Label, attributes: Attributes, client_id: ClientId) -> Attributes {
    attributes
        .into_iter()
        .filter(|(id, _)| {
            let known = label.attribute(*id).is_some();
            if !known {
                log::warn!(
                    "Dropping unknown attribute {} of object {} (label \"{}\")",
                    id,
                    client_id,
                    label.name
                );
            }
            known
        })
        .collect()
}

/// An annotation object of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Shape(ShapeObject),
    Track(TrackObject),
    Tag(TagObject),
}

impl Annotation {
    pub fn data(&self) -> &ObjectData {
        match self {
            Annotation::Shape(s) => &s.data,
            Annotation::Track(t) => &t.data,
            Annotation::Tag(t) => &t.data,
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut ObjectData {
        match self {
            Annotation::Shape(s) => &mut s.data,
            Annotation::Track(t) => &mut t.data,
            Annotation::Tag(t) => &mut t.data,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.data().client_id
    }

    pub fn server_id(&self) -> Option<ServerId> {
        self.data().server_id
    }

    pub fn is_removed(&self) -> bool {
        self.data().removed
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Annotation::Shape(_) => ObjectType::Shape,
            Annotation::Track(_) => ObjectType::Track,
            Annotation::Tag(_) => ObjectType::Tag,
        }
    }

    pub fn shape_type(&self) -> Option<ShapeType> {
        match self {
            Annotation::Shape(s) => Some(s.shape_type),
            Annotation::Track(t) => Some(t.shape_type),
            Annotation::Tag(_) => None,
        }
    }

    /// Materialize the object at `frame`.
    pub fn get(&self, frame: Frame, config: &InterpolationConfig) -> Result<ObjectState> {
        match self {
            Annotation::Shape(s) => s.get(frame),
            Annotation::Track(t) => t.get(frame, config),
            Annotation::Tag(t) => t.get(frame),
        }
    }

    /// Apply the flagged edits of `state` at `frame`.
    pub fn save(
        &mut self,
        frame: Frame,
        state: &ObjectState,
        labels: &LabelSet,
        config: &InterpolationConfig,
    ) -> Result<()> {
        match self {
            Annotation::Shape(s) => s.save(frame, state, labels),
            Annotation::Track(t) => t.save(frame, state, labels, config),
            Annotation::Tag(t) => t.save(frame, state, labels),
        }
    }

    /// Soft-delete the object. Locked objects need `force`.
    pub fn delete(&mut self, force: bool) -> bool {
        match self {
            Annotation::Shape(s) => s.delete(force),
            Annotation::Track(t) => t.delete(force),
            Annotation::Tag(t) => t.delete(force),
        }
    }
}
