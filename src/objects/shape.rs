//! Single-frame shapes.

use std::sync::Arc;

use crate::error::{AnnotationError, Result};
use crate::format::wire::{LabeledShape, attributes_to_wire};
use crate::model::geometry::ShapeType;
use crate::model::label::{Label, LabelSet};
use crate::model::object_state::{ClientId, Frame, ObjectState, ObjectType};

use super::{ObjectData, validated_attributes};

/// A shape that exists on exactly one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeObject {
    pub data: ObjectData,
    pub shape_type: ShapeType,
    pub points: Vec<f64>,
    pub occluded: bool,
    pub z_order: u32,
}

impl ShapeObject {
    /// Build a shape from its wire form.
    pub(crate) fn from_wire(
        wire: &LabeledShape,
        client_id: ClientId,
        label: Arc<Label>,
        color: String,
    ) -> Result<Self> {
        let shape_type: ShapeType = wire.shape_type.parse()?;
        shape_type
            .validate_points(&wire.points)
            .map_err(|e| AnnotationError::data(format!("Shape {client_id}: {e}")))?;

        Ok(Self {
            data: ObjectData::new(
                client_id,
                wire.id,
                label,
                wire.frame,
                wire.group,
                &wire.attributes,
                color,
            ),
            shape_type,
            points: wire.points.clone(),
            occluded: wire.occluded,
            z_order: wire.z_order,
        })
    }

    pub fn to_wire(&self) -> LabeledShape {
        LabeledShape {
            id: self.data.server_id,
            client_id: Some(self.data.client_id),
            shape_type: self.shape_type.as_str().to_string(),
            frame: self.data.frame,
            label_id: self.data.label.id,
            group: self.data.group,
            occluded: self.occluded,
            z_order: self.z_order,
            points: self.points.clone(),
            attributes: attributes_to_wire(&self.data.attributes),
        }
    }

    /// State of the shape. Fails when asked for a frame it does not live on.
    pub fn get(&self, frame: Frame) -> Result<ObjectState> {
        self.check_frame(frame)?;

        let mut state = self
            .data
            .state(ObjectType::Shape, Some(self.shape_type), frame);
        state.points = self.points.clone();
        state.occluded = self.occluded;
        state.z_order = self.z_order;
        Ok(state)
    }

    /// Apply the flagged fields of `state`. Nothing changes on error.
    pub fn save(&mut self, frame: Frame, state: &ObjectState, labels: &LabelSet) -> Result<()> {
        self.check_frame(frame)?;
        if self.data.rejects(state) {
            log::debug!("Shape {} is locked, ignoring update", self.data.client_id);
            return Ok(());
        }

        let updated = &state.updated;
        let mut copy = self.clone();
        copy.data.apply_common(state, labels)?;

        if updated.attributes {
            let attributes = validated_attributes(&copy.data.label, state)?;
            copy.data.attributes.extend(attributes);
        }
        if updated.points {
            copy.shape_type.validate_points(&state.points)?;
            copy.points = state.points.clone();
        }
        if updated.occluded {
            copy.occluded = state.occluded;
        }
        if updated.z_order {
            copy.z_order = state.z_order;
        }

        *self = copy;
        Ok(())
    }

    pub fn delete(&mut self, force: bool) -> bool {
        if self.data.lock && !force {
            return false;
        }
        self.data.removed = true;
        true
    }

    fn check_frame(&self, frame: Frame) -> Result<()> {
        if frame != self.data.frame {
            return Err(AnnotationError::scripting(format!(
                "Got frame {frame}, but shape {} lives on frame {}",
                self.data.client_id, self.data.frame
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::wire::AttributeValue;
    use crate::model::label::{AttributeSpec, InputType};

    fn labels() -> LabelSet {
        LabelSet::new([
            Label::new(1, "car").with_attribute(AttributeSpec::new(
                7,
                "model",
                InputType::Select,
                false,
                "sedan",
                vec!["sedan".into(), "suv".into()],
            )),
            Label::new(2, "person"),
        ])
    }

    fn shape(labels: &LabelSet) -> ShapeObject {
        let wire = LabeledShape {
            id: Some(40),
            client_id: None,
            shape_type: "rectangle".into(),
            frame: 3,
            label_id: 1,
            group: 0,
            occluded: false,
            z_order: 1,
            points: vec![0.0, 0.0, 10.0, 10.0],
            attributes: vec![],
        };
        ShapeObject::from_wire(&wire, 0, Arc::clone(labels.get(1).unwrap()), "#ff0000".into())
            .unwrap()
    }

    #[test]
    fn test_import_backfills_defaults() {
        let labels = labels();
        let shape = shape(&labels);
        assert_eq!(shape.data.attributes[&7], "sedan");
        assert_eq!(shape.data.server_id, Some(40));
    }

    #[test]
    fn test_import_rejects_unknown_type() {
        let labels = labels();
        let mut wire = shape(&labels).to_wire();
        wire.shape_type = "ellipse".into();
        let result = ShapeObject::from_wire(&wire, 0, Arc::clone(labels.get(1).unwrap()), "#000000".into());
        assert!(matches!(result, Err(AnnotationError::Data(_))));
    }

    #[test]
    fn test_get_on_other_frame_is_scripting_error() {
        let labels = labels();
        let shape = shape(&labels);
        assert!(matches!(shape.get(4), Err(AnnotationError::Scripting(_))));
        assert_eq!(shape.get(3).unwrap().points(), &[0.0, 0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_save_applies_flagged_fields_only() {
        let labels = labels();
        let mut shape = shape(&labels);
        let mut state = shape.get(3).unwrap();
        state.set_points(vec![1.0, 1.0, 5.0, 5.0]).unwrap();
        state.set_attribute(7, "suv").unwrap();
        // Unflagged change must be ignored
        state.occluded = true;

        shape.save(3, &state, &labels).unwrap();
        assert_eq!(shape.points, vec![1.0, 1.0, 5.0, 5.0]);
        assert_eq!(shape.data.attributes[&7], "suv");
        assert!(!shape.occluded);
    }

    #[test]
    fn test_failed_save_changes_nothing() {
        let labels = labels();
        let mut shape = shape(&labels);
        let before = shape.clone();

        let mut state = shape.get(3).unwrap();
        state.set_points(vec![2.0, 2.0, 4.0, 4.0]).unwrap();
        state.set_label(Arc::new(Label::new(9, "ghost")));

        assert!(matches!(
            shape.save(3, &state, &labels),
            Err(AnnotationError::Argument(_))
        ));
        assert_eq!(shape, before);
    }

    #[test]
    fn test_label_change_resets_attributes() {
        let labels = labels();
        let mut shape = shape(&labels);
        let mut state = shape.get(3).unwrap();
        state.set_attribute(7, "suv").unwrap();
        shape.save(3, &state, &labels).unwrap();

        let mut state = shape.get(3).unwrap();
        state.set_label(Arc::clone(labels.get(2).unwrap()));
        shape.save(3, &state, &labels).unwrap();
        assert_eq!(shape.data.label.id, 2);
        assert!(shape.data.attributes.is_empty());
        assert!(shape.to_wire().attributes.is_empty());
    }

    #[test]
    fn test_locked_shape_ignores_edits_until_unlocked() {
        let labels = labels();
        let mut shape = shape(&labels);
        shape.data.lock = true;

        let mut state = shape.get(3).unwrap();
        state.set_points(vec![5.0, 5.0, 6.0, 6.0]).unwrap();
        shape.save(3, &state, &labels).unwrap();
        assert_eq!(shape.points, vec![0.0, 0.0, 10.0, 10.0]);
        assert!(!shape.delete(false));

        let mut state = shape.get(3).unwrap();
        state.set_lock(false);
        state.set_points(vec![5.0, 5.0, 6.0, 6.0]).unwrap();
        shape.save(3, &state, &labels).unwrap();
        assert!(!shape.data.lock);
        assert_eq!(shape.points, vec![5.0, 5.0, 6.0, 6.0]);
    }

    #[test]
    fn test_wire_keeps_attribute_values() {
        let labels = labels();
        let mut wire = shape(&labels).to_wire();
        wire.attributes = vec![AttributeValue::new(7, "suv"), AttributeValue::new(99, "x")];
        let shape =
            ShapeObject::from_wire(&wire, 5, Arc::clone(labels.get(1).unwrap()), "#000000".into())
                .unwrap();
        assert_eq!(shape.to_wire().attributes, vec![AttributeValue::new(7, "suv")]);
        assert_eq!(shape.to_wire().client_id, Some(5));
    }
}
