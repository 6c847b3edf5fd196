//! End-to-end session flow: edit, interpolate, save, undo.

use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;

use vatcore::{
    AnnotationSession, AnnotationsData, EngineConfig, Label, LabelSet, ObjectState, ObjectType,
    Result, SaveAction, ServerProxy, SessionType, ShapeType,
};

/// Server that numbers every new object and keyframe from 1.
#[derive(Default)]
struct Server {
    next_id: Cell<u64>,
    requests: Cell<usize>,
}

impl Server {
    fn next(&self) -> u64 {
        self.next_id.set(self.next_id.get() + 1);
        self.next_id.get()
    }
}

impl ServerProxy for Server {
    fn update_annotations(
        &self,
        _session_type: SessionType,
        _session_id: u64,
        payload: &AnnotationsData,
        action: SaveAction,
    ) -> impl Future<Output = Result<AnnotationsData>> {
        self.requests.set(self.requests.get() + 1);
        let mut response = payload.clone().with_version(payload.version + 1);
        if matches!(action, SaveAction::Create | SaveAction::Put) {
            for shape in &mut response.shapes {
                shape.id.get_or_insert_with(|| self.next());
            }
            for track in &mut response.tracks {
                track.id.get_or_insert_with(|| self.next());
                for keyframe in &mut track.shapes {
                    keyframe.id.get_or_insert_with(|| self.next());
                }
            }
        }
        std::future::ready(Ok(response))
    }
}

fn init_logging(config: &EngineConfig) {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(config.log_level.to_level_filter())
        .try_init();
}

fn open() -> AnnotationSession<Server> {
    let config = EngineConfig::default();
    init_logging(&config);
    AnnotationSession::new(
        SessionType::Job,
        3,
        LabelSet::new([Label::new(1, "car")]),
        (0, 30),
        config,
        &AnnotationsData::new(),
        Server::default(),
    )
    .unwrap()
}

fn track_state(session: &AnnotationSession<Server>) -> ObjectState {
    let label = Arc::clone(session.collection().labels().get(1).unwrap());
    let mut state =
        ObjectState::new(ObjectType::Track, Some(ShapeType::Rectangle), 0, label).unwrap();
    state.set_points(vec![0.0, 0.0, 10.0, 10.0]).unwrap();
    state
}

#[test]
fn track_is_interpolated_saved_and_undone() {
    let mut session = open();
    session.put(&[track_state(&session)]).unwrap();

    let mut state = session.get(10).unwrap().remove(0);
    assert!(!state.keyframe());
    state.set_points(vec![10.0, 10.0, 20.0, 20.0]).unwrap();
    session.save_state(&state).unwrap();

    let middle = session.get(5).unwrap().remove(0);
    assert_eq!(middle.points(), &[5.0, 5.0, 15.0, 15.0]);
    assert!(!middle.keyframe());

    pollster::block_on(session.save(|_| {})).unwrap();
    assert!(!session.has_unsaved_changes());
    let exported = session.export();
    assert_eq!(exported.tracks[0].id, Some(1));
    assert_eq!(exported.tracks[0].shapes.len(), 2);

    // Undo drops the second keyframe but keeps the IDs the server assigned
    assert_eq!(session.undo(), Some(10));
    let exported = session.export();
    assert_eq!(exported.tracks[0].id, Some(1));
    assert_eq!(exported.tracks[0].shapes.len(), 1);
    assert_eq!(exported.tracks[0].shapes[0].id, Some(2));
    assert_eq!(session.get(5).unwrap()[0].points(), &[0.0, 0.0, 10.0, 10.0]);

    pollster::block_on(session.save(|_| {})).unwrap();
    assert_eq!(session.saver().proxy().requests.get(), 2);
    assert!(!session.has_unsaved_changes());
}

#[test]
fn statistics_follow_edits() {
    let mut session = open();
    session.put(&[track_state(&session)]).unwrap();

    let car = &session.statistics().labels["car"];
    assert_eq!(car.rectangle.track, 1);
    assert_eq!(car.manually, 1);

    let state = session.get(0).unwrap().remove(0);
    session.delete_state(&state, false).unwrap();
    assert_eq!(session.statistics().labels["car"].total, 0);

    session.undo();
    assert_eq!(session.statistics().labels["car"].manually, 1);
}
