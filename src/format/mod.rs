//! Server wire format of annotations.

pub mod wire;

pub use wire::{
    AnnotationsData, AttributeValue, LabeledShape, LabeledTag, LabeledTrack, TrackedShape,
    WireObject,
};
