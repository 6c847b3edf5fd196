//! Frame-level tags.

use std::sync::Arc;

use crate::error::{AnnotationError, Result};
use crate::format::wire::{LabeledTag, attributes_to_wire};
use crate::model::label::{Label, LabelSet};
use crate::model::object_state::{ClientId, Frame, ObjectState, ObjectType};

use super::{ObjectData, validated_attributes};

/// A label attached to a whole frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TagObject {
    pub data: ObjectData,
}

impl TagObject {
    pub(crate) fn from_wire(wire: &LabeledTag, client_id: ClientId, label: Arc<Label>, color: String) -> Self {
        Self {
            data: ObjectData::new(
                client_id,
                wire.id,
                label,
                wire.frame,
                wire.group,
                &wire.attributes,
                color,
            ),
        }
    }

    pub fn to_wire(&self) -> LabeledTag {
        LabeledTag {
            id: self.data.server_id,
            client_id: Some(self.data.client_id),
            frame: self.data.frame,
            label_id: self.data.label.id,
            group: self.data.group,
            attributes: attributes_to_wire(&self.data.attributes),
        }
    }

    pub fn get(&self, frame: Frame) -> Result<ObjectState> {
        self.check_frame(frame)?;
        Ok(self.data.state(ObjectType::Tag, None, frame))
    }

    /// Apply label, attribute, group, lock and colour edits.
    pub fn save(&mut self, frame: Frame, state: &ObjectState, labels: &LabelSet) -> Result<()> {
        self.check_frame(frame)?;
        if self.data.rejects(state) {
            log::debug!("Tag {} is locked, ignoring update", self.data.client_id);
            return Ok(());
        }

        let mut copy = self.clone();
        copy.data.apply_common(state, labels)?;
        if state.updated.attributes {
            let attributes = validated_attributes(&copy.data.label, state)?;
            copy.data.attributes.extend(attributes);
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
                "Got frame {frame}, but tag {} lives on frame {}",
                self.data.client_id, self.data.frame
            )));
        }
        Ok(())
    }
}
