//! Operations creating or reshaping several objects at once.

use std::collections::BTreeMap;

use crate::error::{AnnotationError, Result};
use crate::format::wire::{LabeledShape, LabeledTag, LabeledTrack, TrackedShape, attributes_to_wire};
use crate::model::label::{Attributes, Label};
use crate::model::object_state::{ClientId, Frame, ObjectState, ObjectType};
use crate::objects::{Annotation, ShapeObject, TagObject, TrackObject};

use super::Collection;

/// Split attributes into (immutable, mutable) by the label's specs.
fn split_attributes(label: &Label, attributes: &Attributes) -> (Attributes, Attributes) {
    attributes
        .iter()
        .map(|(id, value)| (*id, value.clone()))
        .partition(|(id, _)| !label.is_mutable(*id))
}

impl Collection {
    /// Create objects from states that are not in a collection yet.
    ///
    /// Validates every state before anything is inserted. Returns the new
    /// client IDs in input order.
    pub fn put(&mut self, states: &[ObjectState]) -> Result<Vec<ClientId>> {
        let mut created = Vec::with_capacity(states.len());
        let mut count = self.count;

        for state in states {
            let client_id = count;
            count += 1;
            created.push(self.build_from_state(state, client_id)?);
        }

        let ids: Vec<ClientId> = created.iter().map(Annotation::client_id).collect();
        for object in created {
            self.insert(object);
        }
        log::debug!("Put {} new objects", ids.len());
        Ok(ids)
    }

    fn build_from_state(&self, state: &ObjectState, client_id: ClientId) -> Result<Annotation> {
        if let Some(existing) = state.client_id {
            return Err(AnnotationError::argument(format!(
                "Object {existing} already belongs to a collection"
            )));
        }
        let label = crate::objects::resolve_label(&state.label, &self.labels)?;
        if state.frame < self.start_frame || state.frame > self.stop_frame {
            return Err(AnnotationError::argument(format!(
                "Frame {} is outside of the session range {}..={}",
                state.frame, self.start_frame, self.stop_frame
            )));
        }
        for (id, value) in &state.attributes {
            label.validate_attribute(*id, value)?;
        }

        let color = if state.updated.color {
            state.color.clone()
        } else {
            self.config.color_for(client_id)
        };

        let mut object = match state.object_type {
            ObjectType::Tag => {
                let wire = LabeledTag {
                    id: None,
                    client_id: None,
                    frame: state.frame,
                    label_id: label.id,
                    group: state.group,
                    attributes: attributes_to_wire(&state.attributes),
                };
                Annotation::Tag(TagObject::from_wire(&wire, client_id, label, color))
            }
            ObjectType::Shape | ObjectType::Track => {
                let shape_type = state
                    .shape_type
                    .ok_or_else(|| AnnotationError::argument("A shape type is required"))?;
                shape_type.validate_points(&state.points)?;

                if state.object_type == ObjectType::Shape {
                    let wire = LabeledShape {
                        id: None,
                        client_id: None,
                        shape_type: shape_type.as_str().to_string(),
                        frame: state.frame,
                        label_id: label.id,
                        group: state.group,
                        occluded: state.occluded,
                        z_order: state.z_order,
                        points: state.points.clone(),
                        attributes: attributes_to_wire(&state.attributes),
                    };
                    Annotation::Shape(ShapeObject::from_wire(&wire, client_id, label, color)?)
                } else {
                    let (immutable, mutable) = split_attributes(&label, &state.attributes);
                    let wire = LabeledTrack {
                        id: None,
                        client_id: None,
                        frame: state.frame,
                        label_id: label.id,
                        group: state.group,
                        attributes: attributes_to_wire(&immutable),
                        shapes: vec![TrackedShape {
                            id: None,
                            shape_type: shape_type.as_str().to_string(),
                            frame: state.frame,
                            occluded: state.occluded,
                            z_order: state.z_order,
                            points: state.points.clone(),
                            outside: state.outside,
                            attributes: attributes_to_wire(&mutable),
                        }],
                    };
                    let track = TrackObject::from_wire(&wire, client_id, label, color)?
                        .ok_or_else(|| AnnotationError::scripting("Track built without keyframes"))?;
                    Annotation::Track(track)
                }
            }
        };

        object.data_mut().lock = state.lock;
        Ok(object)
    }

    /// Resolve the live entities of several states.
    fn resolve_all(&self, states: &[ObjectState]) -> Result<Vec<ClientId>> {
        states.iter().map(|state| self.resolve(state)).collect()
    }

    /// Put the objects of `states` into a new group, or remove them from any
    /// group when `reset` is set. Returns the group ID assigned.
    pub fn group(&mut self, states: &[ObjectState], reset: bool) -> Result<u32> {
        let ids = self.resolve_all(states)?;
        let group = if reset { 0 } else { self.max_group + 1 };

        for id in &ids {
            if let Some(object) = self.objects.get_mut(id) {
                object.data_mut().group = group;
            }
        }
        self.max_group = self.max_group.max(group);
        log::debug!("Assigned group {group} to {} objects", ids.len());
        Ok(group)
    }

    /// Merge shapes and tracks of one label and shape type into a new track.
    ///
    /// Each shape becomes a keyframe followed by an outside keyframe on the
    /// next frame; track keyframes are copied. Only one visible keyframe per
    /// frame is allowed. The merged objects are removed. Returns the client
    /// ID of the new track.
    pub fn merge(&mut self, states: &[ObjectState]) -> Result<ClientId> {
        let ids = self.resolve_all(states)?;
        let Some(first) = ids.first().and_then(|id| self.objects.get(id)) else {
            return Err(AnnotationError::argument("Nothing to merge"));
        };

        let label = first.data().label.clone();
        let Some(shape_type) = first.shape_type() else {
            return Err(AnnotationError::argument("Tags can not be merged"));
        };

        let mut keyframes: BTreeMap<Frame, TrackedShape> = BTreeMap::new();
        let (immutable, _) = split_attributes(&label, &first.data().attributes);

        for id in &ids {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            if object.shape_type() != Some(shape_type) || object.data().label.id != label.id {
                return Err(AnnotationError::argument(
                    "All merged objects must have the same label and shape type",
                ));
            }

            match object {
                Annotation::Shape(shape) => {
                    let frame = shape.data.frame;
                    if keyframes.get(&frame).is_some_and(|k| !k.outside) {
                        return Err(AnnotationError::argument(format!(
                            "Expected only one visible shape on frame {frame}"
                        )));
                    }
                    let (_, mutable) = split_attributes(&label, &shape.data.attributes);
                    let keyframe = TrackedShape {
                        id: None,
                        shape_type: shape_type.as_str().to_string(),
                        frame,
                        occluded: shape.occluded,
                        z_order: shape.z_order,
                        points: shape.points.clone(),
                        outside: false,
                        attributes: attributes_to_wire(&mutable),
                    };

                    if frame < self.stop_frame && !keyframes.contains_key(&(frame + 1)) {
                        let mut hidden = keyframe.clone();
                        hidden.frame = frame + 1;
                        hidden.outside = true;
                        keyframes.insert(frame + 1, hidden);
                    }
                    keyframes.insert(frame, keyframe);
                }
                Annotation::Track(track) => {
                    for (frame, source) in track.keyframes() {
                        if keyframes.get(frame).is_some_and(|k| !k.outside) {
                            if source.outside {
                                continue;
                            }
                            return Err(AnnotationError::argument(format!(
                                "Expected only one visible shape on frame {frame}"
                            )));
                        }
                        keyframes.insert(
                            *frame,
                            TrackedShape {
                                id: None,
                                shape_type: shape_type.as_str().to_string(),
                                frame: *frame,
                                occluded: source.occluded,
                                z_order: source.z_order,
                                points: source.points.clone(),
                                outside: source.outside,
                                attributes: attributes_to_wire(&source.attributes),
                            },
                        );
                    }
                }
                Annotation::Tag(_) => {
                    return Err(AnnotationError::argument("Tags can not be merged"));
                }
            }
        }

        // Leading outside keyframes carry no information
        while let Some(entry) = keyframes.first_entry() {
            if !entry.get().outside {
                break;
            }
            entry.remove();
        }
        let Some(&start) = keyframes.keys().next() else {
            return Err(AnnotationError::argument("Merged objects are never visible"));
        };

        let client_id = self.next_client_id();
        let wire = LabeledTrack {
            id: None,
            client_id: None,
            frame: start,
            label_id: label.id,
            group: 0,
            attributes: attributes_to_wire(&immutable),
            shapes: keyframes.into_values().collect(),
        };
        let color = self.config.color_for(client_id);
        let track = TrackObject::from_wire(&wire, client_id, label, color)?
            .ok_or_else(|| AnnotationError::scripting("Merged track has no keyframes"))?;

        for id in &ids {
            if let Some(object) = self.objects.get_mut(id) {
                object.delete(true);
            }
        }
        self.insert(Annotation::Track(track));
        log::info!("Merged {} objects into track {client_id}", ids.len());
        Ok(client_id)
    }

    /// Split a track into two at `frame`.
    ///
    /// The first track ends with an outside keyframe at `frame`; the second
    /// starts with the position the original had at `frame`. The original is
    /// removed. Returns the client IDs of both new tracks.
    pub fn split(&mut self, state: &ObjectState, frame: Frame) -> Result<(ClientId, ClientId)> {
        let client_id = self.resolve(state)?;
        let Some(Annotation::Track(track)) = self.objects.get(&client_id) else {
            return Err(AnnotationError::argument("Only tracks can be split"));
        };
        match track.first_frame() {
            Some(first) if frame > first => {}
            _ => {
                return Err(AnnotationError::argument(format!(
                    "Track {client_id} can not be split at frame {frame}"
                )));
            }
        }

        let position = track.get_position(frame, &self.config.interpolation)?;
        let attributes = track.get_attributes(frame);
        let label = track.data.label.clone();
        let (_, mutable) = split_attributes(&label, &attributes);

        let exported = track.to_wire();
        let shape_type = track.shape_type;
        let at_frame = |outside: bool, attributes: &Attributes| TrackedShape {
            id: None,
            shape_type: shape_type.as_str().to_string(),
            frame,
            occluded: position.occluded,
            z_order: position.z_order,
            points: position.points.clone(),
            outside,
            attributes: attributes_to_wire(attributes),
        };

        let strip = |shape: &TrackedShape| TrackedShape {
            id: None,
            ..shape.clone()
        };
        let mut before: Vec<TrackedShape> = exported
            .shapes
            .iter()
            .filter(|s| s.frame < frame)
            .map(strip)
            .collect();
        before.push(at_frame(true, &Attributes::new()));

        let mut after = vec![at_frame(position.outside, &mutable)];
        after.extend(exported.shapes.iter().filter(|s| s.frame > frame).map(strip));

        let build = |collection: &mut Collection, shapes: Vec<TrackedShape>| -> Result<TrackObject> {
            let id = collection.next_client_id();
            let wire = LabeledTrack {
                id: None,
                client_id: None,
                frame: shapes.first().map(|s| s.frame).unwrap_or(frame),
                shapes,
                ..exported.clone()
            };
            let color = collection.config.color_for(id);
            TrackObject::from_wire(&wire, id, label.clone(), color)?
                .ok_or_else(|| AnnotationError::scripting("Split produced an empty track"))
        };

        let first = build(self, before)?;
        let second = build(self, after)?;
        let ids = (first.data.client_id, second.data.client_id);

        if let Some(original) = self.objects.get_mut(&client_id) {
            original.delete(true);
        }
        self.insert(Annotation::Track(first));
        self.insert(Annotation::Track(second));
        log::info!("Split track {client_id} at frame {frame} into {} and {}", ids.0, ids.1);
        Ok(ids)
    }
}
