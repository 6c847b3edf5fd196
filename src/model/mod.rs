//! Data models shared by the annotation engine.

pub mod geometry;
pub mod label;
pub mod object_state;

pub use geometry::{BoundingBox, Point, ShapeType};
pub use label::{AttributeId, AttributeSpec, Attributes, InputType, Label, LabelSet};
pub use object_state::{ClientId, Frame, ObjectState, ObjectType, ServerId, UpdateFlags};
