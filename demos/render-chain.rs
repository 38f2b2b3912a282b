// Copyright (c) 2024 Mike Tsao

//! Plays a short phrase through a transformer chain and prints what came out.
//!
//! `cargo run --example render-chain [pipeline.json]`
//!
//! Without an argument, a built-in chain is used. Set `RUST_LOG=debug` to see
//! what the stages are doing.

use chordflow::{prelude::*, types::note_name};
use std::path::PathBuf;

const DEFAULT_CHAIN: &str = r#"{
    "tempo": 100.0,
    "transformers": [
        {"type": "filter", "lower": 48, "upper": 84},
        {"type": "transposer", "semitones": 2, "mode": "major", "root": 0},
        {"type": "quantise", "subdivision": "sixteenth"},
        {"type": "repeater", "repeats": 2, "delay-ms": 250, "note-duration-ms": 100}
    ]
}"#;

// (note, start, length) in seconds.
const PHRASE: [(u8, f64, f64); 5] = [
    (60, 0.02, 0.4),
    (64, 0.61, 0.3),
    (67, 1.19, 0.5),
    (30, 1.5, 0.2),
    (72, 1.83, 0.6),
];

const TICK: Seconds = Seconds(0.01);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => PipelineSettings::load(&PathBuf::from(path))?,
        None => PipelineSettings::from_json(DEFAULT_CHAIN)?,
    };
    let manager = settings.build_manager(&BuiltInTransformers::factory())?;
    for state in manager.states() {
        println!("stage {}: {}", state.uid, state.config.key());
    }

    let mut recorder = RecorderAudioEvent::default();
    recorder.set_enabled(true);
    let mut performance = Performance::new_with(manager, recorder);
    let log = NoteLog::default();
    performance.add_output(Box::new(log.clone()));

    let mut transport = settings.transport();
    transport.start();
    let end = PHRASE
        .iter()
        .map(|(_, start, length)| start + length)
        .fold(0.0, f64::max)
        + 1.0;
    while transport.now().0 < end {
        let now = transport.now();
        let batch = PHRASE
            .iter()
            .flat_map(|&(note, start, length)| {
                let mut r = Vec::default();
                if (now.0..now.0 + TICK.0).contains(&start) {
                    r.push(AudioCommand::note_on(note, &transport, "phrase"));
                }
                if (now.0..now.0 + TICK.0).contains(&(start + length)) {
                    r.push(AudioCommand::note_off(note, &transport, "phrase"));
                }
                r
            })
            .collect();
        performance.tick(batch, &transport);
        transport.advance(TICK);
    }
    performance.stop();

    println!("{} output calls", log.drain().len());
    for note in performance.recorder().notes() {
        println!(
            "{:>4} at {:>7} for {}",
            note_name(note.number),
            note.start,
            note.duration
        );
    }
    Ok(())
}
