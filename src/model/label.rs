//! Label data model: annotation categories and their attribute specs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AnnotationError, Result};

/// Identifier of an attribute spec.
pub type AttributeId = u32;

/// Attribute values of one object, keyed by attribute spec ID.
pub type Attributes = BTreeMap<AttributeId, String>;

/// How an attribute value is entered and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Checkbox,
    Radio,
    Select,
    Number,
    Text,
}

/// Specification of one label attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Unique identifier of the attribute spec
    pub id: AttributeId,
    /// Display name
    pub name: String,
    /// Mutable attributes may change from keyframe to keyframe of a track
    pub mutable: bool,
    /// Input type used for validation
    pub input_type: InputType,
    /// Value assigned when an object does not set the attribute
    pub default_value: String,
    /// Allowed values. For numbers this is `[min, max, step]`.
    #[serde(default)]
    pub values: Vec<String>,
}

impl AttributeSpec {
    /// Create a new attribute spec.
    pub fn new(
        id: AttributeId,
        name: impl Into<String>,
        input_type: InputType,
        mutable: bool,
        default_value: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            mutable,
            input_type,
            default_value: default_value.into(),
            values,
        }
    }

    /// Check whether a value is acceptable for this attribute.
    pub fn is_valid_value(&self, value: &str) -> bool {
        match self.input_type {
            InputType::Checkbox => value == "true" || value == "false",
            InputType::Number => {
                let Ok(number) = value.trim().parse::<f64>() else {
                    return false;
                };
                if !number.is_finite() {
                    return false;
                }
                let bounds: Vec<f64> = self
                    .values
                    .iter()
                    .filter_map(|v| v.trim().parse::<f64>().ok())
                    .collect();
                match bounds.as_slice() {
                    [min, max, ..] => number >= *min && number <= *max,
                    _ => true,
                }
            }
            InputType::Select | InputType::Radio => self.values.iter().any(|v| v == value),
            InputType::Text => true,
        }
    }
}

/// An annotation label with its attribute specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Unique identifier for the label
    pub id: u32,
    /// Display name of the label
    pub name: String,
    /// Ordered attribute specs
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
}

impl Label {
    /// Create a label without attributes.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute spec.
    pub fn with_attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    /// Look up an attribute spec by ID.
    pub fn attribute(&self, id: AttributeId) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Default values of all attributes matching `filter`.
    pub fn defaults_where(&self, filter: impl Fn(&AttributeSpec) -> bool) -> Attributes {
        self.attributes
            .iter()
            .filter(|spec| filter(spec))
            .map(|spec| (spec.id, spec.default_value.clone()))
            .collect()
    }

    /// Default values of every attribute.
    pub fn default_attributes(&self) -> Attributes {
        self.defaults_where(|_| true)
    }

    /// Whether the attribute is mutable. Unknown attributes are treated as immutable.
    pub fn is_mutable(&self, id: AttributeId) -> bool {
        self.attribute(id).map(|a| a.mutable).unwrap_or(false)
    }

    /// Validate a single attribute assignment.
    pub fn validate_attribute(&self, id: AttributeId, value: &str) -> Result<()> {
        match self.attribute(id) {
            Some(spec) if spec.is_valid_value(value) => Ok(()),
            _ => Err(AnnotationError::argument(format!(
                "Trying to save unknown attribute with id {id} and value \"{value}\" for label \"{}\"",
                self.name
            ))),
        }
    }
}

/// The label set of a session, shared by every annotation.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    labels: HashMap<u32, Arc<Label>>,
}

impl LabelSet {
    /// Build a label set. Later duplicates of an ID replace earlier ones.
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|label| (label.id, Arc::new(label)))
                .collect(),
        }
    }

    /// Get a label by ID.
    pub fn get(&self, id: u32) -> Option<&Arc<Label>> {
        self.labels.get(&id)
    }

    /// Get a label by ID, failing with an argument error.
    pub fn require(&self, id: u32) -> Result<&Arc<Label>> {
        self.get(id)
            .ok_or_else(|| AnnotationError::argument(format!("Unknown label for the session: {id}")))
    }

    /// Whether this exact label belongs to the set.
    pub fn contains(&self, label: &Label) -> bool {
        self.labels.get(&label.id).is_some_and(|l| **l == *label)
    }

    /// Iterate labels ordered by ID.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Label>> {
        let mut labels: Vec<&Arc<Label>> = self.labels.values().collect();
        labels.sort_by_key(|l| l.id);
        labels.into_iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
