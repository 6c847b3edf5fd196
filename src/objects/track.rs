//! Multi-frame tracks defined by keyframes.
//!
//! The position of a track at a frame between two keyframes is interpolated
//! (see [`crate::interpolation`]) and memoized per frame. Attributes are
//! split by mutability: immutable values live on the track, mutable values
//! can be overridden on every keyframe and hold until the next override.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use crate::config::InterpolationConfig;
use crate::error::{AnnotationError, Result};
use crate::format::wire::{LabeledTrack, TrackedShape, attributes_from_wire, attributes_to_wire};
use crate::interpolation::interpolate_points;
use crate::model::geometry::ShapeType;
use crate::model::label::{Attributes, Label, LabelSet};
use crate::model::object_state::{ClientId, Frame, ObjectState, ObjectType, ServerId};

use super::{ObjectData, known_attributes, validated_attributes};

/// An authored position of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub server_id: Option<ServerId>,
    pub points: Vec<f64>,
    pub occluded: bool,
    pub outside: bool,
    pub z_order: u32,
    /// Mutable attribute overrides starting at this keyframe
    pub attributes: Attributes,
}

/// Derived position of a track at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPosition {
    pub points: Vec<f64>,
    pub occluded: bool,
    pub outside: bool,
    pub z_order: u32,
    /// True when the frame holds an authored keyframe
    pub keyframe: bool,
}

impl TrackPosition {
    fn from_keyframe(keyframe: &Keyframe, is_keyframe: bool) -> Self {
        Self {
            points: keyframe.points.clone(),
            occluded: keyframe.occluded,
            outside: keyframe.outside,
            z_order: keyframe.z_order,
            keyframe: is_keyframe,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackObject {
    pub data: ObjectData,
    pub shape_type: ShapeType,
    pub(crate) shapes: BTreeMap<Frame, Keyframe>,
    cache: RefCell<HashMap<Frame, TrackPosition>>,
}

impl PartialEq for TrackObject {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.shape_type == other.shape_type && self.shapes == other.shapes
    }
}

impl TrackObject {
    /// Build a track from its wire form.
    ///
    /// Returns `Ok(None)` for a track without keyframes, which cannot be
    /// positioned on any frame.
    pub(crate) fn from_wire(
        wire: &LabeledTrack,
        client_id: ClientId,
        label: Arc<Label>,
        color: String,
    ) -> Result<Option<Self>> {
        let Some(first) = wire.shapes.first() else {
            log::warn!(
                "Skipping track {} (server id {:?}) without keyframes",
                client_id,
                wire.id
            );
            return Ok(None);
        };

        let shape_type: ShapeType = first.shape_type.parse()?;
        let mut shapes = BTreeMap::new();
        for shape in &wire.shapes {
            let kind: ShapeType = shape.shape_type.parse()?;
            if kind != shape_type {
                return Err(AnnotationError::data(format!(
                    "Track {client_id} mixes {shape_type} and {kind} keyframes"
                )));
            }
            kind.validate_points(&shape.points).map_err(|e| {
                AnnotationError::data(format!("Track {client_id}, frame {}: {e}", shape.frame))
            })?;

            let attributes = known_attributes(&label, attributes_from_wire(&shape.attributes), client_id);
            shapes.insert(
                shape.frame,
                Keyframe {
                    server_id: shape.id,
                    points: shape.points.clone(),
                    occluded: shape.occluded,
                    outside: shape.outside,
                    z_order: shape.z_order,
                    attributes,
                },
            );
        }

        // Tracks start on their first keyframe
        let frame = shapes.keys().next().copied().unwrap_or(wire.frame);
        Ok(Some(Self {
            data: ObjectData::new(
                client_id,
                wire.id,
                label,
                frame,
                wire.group,
                &wire.attributes,
                color,
            ),
            shape_type,
            shapes,
            cache: RefCell::new(HashMap::new()),
        }))
    }

    /// Wire form. Track-level attributes carry immutable values only,
    /// keyframes carry mutable overrides only.
    pub fn to_wire(&self) -> LabeledTrack {
        let label = &self.data.label;
        let immutable: Attributes = self
            .data
            .attributes
            .iter()
            .filter(|(id, _)| !label.is_mutable(**id))
            .map(|(id, value)| (*id, value.clone()))
            .collect();

        LabeledTrack {
            id: self.data.server_id,
            client_id: Some(self.data.client_id),
            frame: self.data.frame,
            label_id: label.id,
            group: self.data.group,
            attributes: attributes_to_wire(&immutable),
            shapes: self
                .shapes
                .iter()
                .map(|(frame, keyframe)| {
                    let mutable: Attributes = keyframe
                        .attributes
                        .iter()
                        .filter(|(id, _)| label.is_mutable(**id))
                        .map(|(id, value)| (*id, value.clone()))
                        .collect();
                    TrackedShape {
                        id: keyframe.server_id,
                        shape_type: self.shape_type.as_str().to_string(),
                        frame: *frame,
                        occluded: keyframe.occluded,
                        z_order: keyframe.z_order,
                        points: keyframe.points.clone(),
                        outside: keyframe.outside,
                        attributes: attributes_to_wire(&mutable),
                    }
                })
                .collect(),
        }
    }

    pub fn keyframes(&self) -> &BTreeMap<Frame, Keyframe> {
        &self.shapes
    }

    pub fn first_frame(&self) -> Option<Frame> {
        self.shapes.keys().next().copied()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.shapes.keys().next_back().copied()
    }

    /// Nearest keyframe at or before `target` and nearest keyframe after it.
    pub fn neighbors_frames(&self, target: Frame) -> (Option<Frame>, Option<Frame>) {
        let left = self.shapes.range(..=target).next_back().map(|(f, _)| *f);
        let right = self
            .shapes
            .range((Excluded(target), Unbounded))
            .next()
            .map(|(f, _)| *f);
        (left, right)
    }

    /// Position of the track at `target`, memoized.
    pub fn get_position(&self, target: Frame, config: &InterpolationConfig) -> Result<TrackPosition> {
        if let Some(position) = self.cache.borrow().get(&target) {
            return Ok(position.clone());
        }

        let position = self.compute_position(target, config)?;
        self.cache.borrow_mut().insert(target, position.clone());
        Ok(position)
    }

    fn compute_position(&self, target: Frame, config: &InterpolationConfig) -> Result<TrackPosition> {
        let (left, right) = self.neighbors_frames(target);
        let left = left.and_then(|f| self.shapes.get(&f).map(|k| (f, k)));
        let right = right.and_then(|f| self.shapes.get(&f).map(|k| (f, k)));

        match (left, right) {
            (Some((left_frame, keyframe)), _) if left_frame == target => {
                Ok(TrackPosition::from_keyframe(keyframe, true))
            }
            (Some((left_frame, left)), Some((right_frame, right))) => {
                Ok(self.interpolate(left_frame, left, right_frame, right, target, config))
            }
            (None, Some((_, right))) => Ok(TrackPosition {
                points: right.points.clone(),
                occluded: right.occluded,
                outside: true,
                z_order: 0,
                keyframe: false,
            }),
            (Some((_, left)), None) => Ok(TrackPosition {
                points: left.points.clone(),
                occluded: left.occluded,
                outside: left.outside,
                z_order: 0,
                keyframe: false,
            }),
            (None, None) => Err(AnnotationError::scripting(format!(
                "No neighbour frame found for frame {target} of track {}",
                self.data.client_id
            ))),
        }
    }

    fn interpolate(
        &self,
        left_frame: Frame,
        left: &Keyframe,
        right_frame: Frame,
        right: &Keyframe,
        target: Frame,
        config: &InterpolationConfig,
    ) -> TrackPosition {
        if left.outside {
            return TrackPosition::from_keyframe(left, false);
        }

        let offset = f64::from(target - left_frame) / f64::from(right_frame - left_frame);
        TrackPosition {
            points: interpolate_points(self.shape_type, &left.points, &right.points, offset, config),
            occluded: left.occluded,
            outside: left.outside,
            z_order: left.z_order,
            keyframe: false,
        }
    }

    /// Attribute values in effect at `target`.
    pub fn get_attributes(&self, target: Frame) -> Attributes {
        let label = &self.data.label;
        let mut result = self.data.attributes.clone();
        for keyframe in self.shapes.range(..=target).map(|(_, k)| k) {
            for (id, value) in &keyframe.attributes {
                if label.is_mutable(*id) {
                    result.insert(*id, value.clone());
                }
            }
        }
        result
    }

    pub fn get(&self, frame: Frame, config: &InterpolationConfig) -> Result<ObjectState> {
        let position = self.get_position(frame, config)?;

        let mut state = self
            .data
            .state(ObjectType::Track, Some(self.shape_type), frame);
        state.points = position.points;
        state.occluded = position.occluded;
        state.outside = position.outside;
        state.z_order = position.z_order;
        state.keyframe = position.keyframe;
        state.attributes = self.get_attributes(frame);
        Ok(state)
    }

    /// Apply the flagged fields of `state` at `frame`. Nothing changes on error.
    pub fn save(
        &mut self,
        frame: Frame,
        state: &ObjectState,
        labels: &LabelSet,
        config: &InterpolationConfig,
    ) -> Result<()> {
        if self.data.rejects(state) {
            log::debug!("Track {} is locked, ignoring update", self.data.client_id);
            return Ok(());
        }

        let updated = &state.updated;
        let mut copy = self.clone();
        copy.data.apply_common(state, labels)?;

        if updated.label {
            let mutable_defaults = copy.data.label.defaults_where(|a| a.mutable);
            for (keyframe_frame, keyframe) in copy.shapes.iter_mut() {
                keyframe.attributes = if *keyframe_frame == frame {
                    mutable_defaults.clone()
                } else {
                    Attributes::new()
                };
            }
        }

        let mut mutable = Attributes::new();
        if updated.attributes {
            for (id, value) in validated_attributes(&copy.data.label, state)? {
                if copy.data.label.is_mutable(id) {
                    mutable.insert(id, value);
                } else {
                    copy.data.attributes.insert(id, value);
                }
            }
        }
        if updated.points {
            copy.shape_type.validate_points(&state.points)?;
        }

        if updated.keyframe && !state.keyframe {
            if copy.shapes.contains_key(&frame) {
                if copy.shapes.len() == 1 {
                    return Err(AnnotationError::argument(format!(
                        "Cannot remove the only keyframe of track {}",
                        copy.data.client_id
                    )));
                }
                copy.shapes.remove(&frame);
                copy.invalidate_from(frame);
            }
        } else if updated.position() || updated.attributes || updated.keyframe {
            let mut keyframe = match copy.shapes.get(&frame) {
                Some(existing) => existing.clone(),
                None => {
                    let position = copy.get_position(frame, config)?;
                    Keyframe {
                        server_id: None,
                        points: position.points,
                        occluded: position.occluded,
                        outside: position.outside,
                        z_order: position.z_order,
                        attributes: Attributes::new(),
                    }
                }
            };

            if updated.points {
                keyframe.points = state.points.clone();
            }
            if updated.occluded {
                keyframe.occluded = state.occluded;
            }
            if updated.outside {
                keyframe.outside = state.outside;
            }
            if updated.z_order {
                keyframe.z_order = state.z_order;
            }
            keyframe.attributes.extend(mutable);

            copy.shapes.insert(frame, keyframe);
            copy.invalidate_from(frame);
        }

        if let Some(first) = copy.first_frame() {
            copy.data.frame = first;
        }

        *self = copy;
        Ok(())
    }

    pub fn delete(&mut self, force: bool) -> bool {
        if self.data.lock && !force {
            return false;
        }
        self.data.removed = true;
        self.reset_cache();
        true
    }

    /// Drop every memoized position.
    pub fn reset_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Drop memoized positions that can depend on the keyframe at `frame`.
    fn invalidate_from(&self, frame: Frame) {
        let previous = self.shapes.range(..frame).next_back().map(|(f, _)| *f);
        let mut cache = self.cache.borrow_mut();
        match previous {
            Some(previous) => cache.retain(|cached, _| *cached <= previous),
            None => cache.clear(),
        }
    }

    /// Adopt keyframe server IDs from a server response, matched by frame.
    pub(crate) fn adopt_keyframe_ids(&mut self, shapes: &[TrackedShape]) {
        for shape in shapes {
            if let Some(keyframe) = self.shapes.get_mut(&shape.frame) {
                keyframe.server_id = shape.id;
            }
        }
        self.reset_cache();
    }

    pub(crate) fn clear_keyframe_ids(&mut self) {
        for keyframe in self.shapes.values_mut() {
            keyframe.server_id = None;
        }
    }

    /// Take the server IDs of `other`'s keyframes on the same frames.
    pub(crate) fn inherit_keyframe_ids(&mut self, other: &TrackObject) {
        for (frame, keyframe) in &mut self.shapes {
            if let Some(id) = other.shapes.get(frame).and_then(|k| k.server_id) {
                keyframe.server_id = Some(id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_frames(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.cache.borrow().keys().copied().collect();
        frames.sort_unstable();
        frames
    }
}
