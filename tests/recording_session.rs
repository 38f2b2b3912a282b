// Copyright (c) 2024 Mike Tsao

use chordflow::{prelude::*, recording::JsonFileStorage};

#[test]
fn session_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let session_dir = dir.path().join("take-1");
    let storage = JsonFileStorage::new_with(&session_dir).unwrap();
    let mut recorder = RecorderAudioEvent::new_with("take 1", Box::new(storage));
    recorder.set_enabled(true);

    let settings = PipelineSettings::from_json(
        r#"{"transformers": [{"type": "transposer", "semitones": 12}]}"#,
    )
    .unwrap();
    let manager = settings
        .build_manager(&BuiltInTransformers::factory())
        .unwrap();
    let mut performance = Performance::new_with(manager, recorder);
    let mut transport = settings.transport();
    transport.start();

    for note in [48, 50, 52] {
        performance.tick(
            vec![AudioCommand::note_on(note, &transport, "keyboard")],
            &transport,
        );
        transport.advance(Seconds(0.5));
        performance.tick(
            vec![AudioCommand::note_off(note, &transport, "keyboard")],
            &transport,
        );
    }
    // A note still held when the session ends.
    performance.tick(
        vec![AudioCommand::note_on(55, &transport, "keyboard")],
        &transport,
    );

    let (exported, report) = performance.recorder().export_with_report();
    assert_eq!(report.matched, 3);
    assert_eq!(report.orphan_note_ons, 1);
    assert_eq!(exported.len(), 7);
    assert!(exported
        .iter()
        .filter(|c| c.is_note_on())
        .all(|c| c.number >= 60));

    let notes = performance.recorder().notes();
    assert_eq!(
        notes.iter().map(|n| n.number).collect::<Vec<_>>(),
        vec![60, 62, 64]
    );
    assert!(notes.iter().all(|n| n.duration == Seconds(0.5)));

    let reopened = JsonFileStorage::new_with(&session_dir).unwrap();
    assert_eq!(reopened.load_events().unwrap(), performance.recorder().events());
    let metadata = reopened.load_metadata().unwrap().unwrap();
    assert_eq!(metadata.name, "take 1");
    assert_eq!(metadata.duration, Seconds(1.5));

    performance.recorder_mut().clear();
    assert!(reopened.load_events().unwrap().is_empty());
}

#[test]
fn session_with_a_nan_time_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let session_dir = dir.path().join("glitchy");
    let storage = JsonFileStorage::new_with(&session_dir).unwrap();
    let mut recorder = RecorderAudioEvent::new_with("glitchy", Box::new(storage));
    recorder.set_enabled(true);

    let transport = Transport::default();
    recorder.add_events(&[
        AudioCommand::note_on(60, &transport, "keyboard"),
        AudioCommand::note_off(60, &transport, "keyboard").with_start_at(Seconds(f64::NAN)),
        AudioCommand::note_on(62, &transport, "keyboard")
            .with_start_at(Seconds(1.0))
            .with_end_at(Seconds(f64::INFINITY)),
    ]);
    assert_eq!(recorder.events().len(), 3);

    let reopened = JsonFileStorage::new_with(&session_dir).unwrap();
    let loaded = reopened.load_events().unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0], recorder.events()[0]);
    assert!(loaded[1].is_note_off());
    assert!(loaded[1].start_at.0.is_nan());
    assert_eq!(loaded[2].start_at, Seconds(1.0));
    assert_eq!(loaded[2].end_at, Some(Seconds(f64::INFINITY)));
}
