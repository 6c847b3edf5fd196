//! Per-label annotation statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::geometry::ShapeType;
use crate::objects::Annotation;

use super::Collection;

/// Number of shapes and tracks of one geometry kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCount {
    pub shape: usize,
    pub track: usize,
}

/// Counts for one label, or the total over all labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelStatistics {
    pub rectangle: KindCount,
    pub polygon: KindCount,
    pub polyline: KindCount,
    pub points: KindCount,
    pub tags: usize,
    /// Frames with an authored, visible annotation
    pub manually: usize,
    /// Frames where a visible track position is interpolated
    pub interpolated: usize,
    pub total: usize,
}

impl LabelStatistics {
    fn kind_mut(&mut self, shape_type: ShapeType) -> &mut KindCount {
        match shape_type {
            ShapeType::Rectangle => &mut self.rectangle,
            ShapeType::Polygon => &mut self.polygon,
            ShapeType::Polyline => &mut self.polyline,
            ShapeType::Points => &mut self.points,
        }
    }

    fn add(&mut self, other: &LabelStatistics) {
        for shape_type in ShapeType::all() {
            let source = *other.kind(*shape_type);
            let target = self.kind_mut(*shape_type);
            target.shape += source.shape;
            target.track += source.track;
        }
        self.tags += other.tags;
        self.manually += other.manually;
        self.interpolated += other.interpolated;
        self.total += other.total;
    }

    pub fn kind(&self, shape_type: ShapeType) -> &KindCount {
        match shape_type {
            ShapeType::Rectangle => &self.rectangle,
            ShapeType::Polygon => &self.polygon,
            ShapeType::Polyline => &self.polyline,
            ShapeType::Points => &self.points,
        }
    }
}

/// Statistics of a collection, keyed by label name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub labels: BTreeMap<String, LabelStatistics>,
    pub total: LabelStatistics,
}

impl Collection {
    /// Count live objects and annotated frames per label.
    ///
    /// Visible track frames after the last keyframe count as interpolated up
    /// to the stop frame of the session.
    pub fn statistics(&self) -> Statistics {
        let mut labels: BTreeMap<String, LabelStatistics> = self
            .labels
            .iter()
            .map(|label| (label.name.clone(), LabelStatistics::default()))
            .collect();

        for object in self.objects.values().filter(|o| !o.is_removed()) {
            let entry = labels.entry(object.data().label.name.clone()).or_default();
            match object {
                Annotation::Shape(shape) => {
                    entry.kind_mut(shape.shape_type).shape += 1;
                    entry.manually += 1;
                    entry.total += 1;
                }
                Annotation::Tag(_) => {
                    entry.tags += 1;
                    entry.manually += 1;
                    entry.total += 1;
                }
                Annotation::Track(track) => {
                    entry.kind_mut(track.shape_type).track += 1;

                    let mut previous: Option<u32> = None;
                    let mut visible = false;
                    for (frame, keyframe) in track.keyframes() {
                        if let (true, Some(previous)) = (visible, previous) {
                            let interpolated = (frame - previous - 1) as usize;
                            entry.interpolated += interpolated;
                            entry.total += interpolated;
                        }
                        visible = !keyframe.outside;
                        previous = Some(*frame);
                        if visible {
                            entry.manually += 1;
                            entry.total += 1;
                        }
                    }

                    if let (true, Some(last)) = (visible, previous) {
                        let interpolated = self.stop_frame.saturating_sub(last) as usize;
                        entry.interpolated += interpolated;
                        entry.total += interpolated;
                    }
                }
            }
        }

        let mut total = LabelStatistics::default();
        for entry in labels.values() {
            total.add(entry);
        }
        Statistics { labels, total }
    }
}
