// Copyright (c) 2024 Mike Tsao

//! The timed note/control event that flows through the pipeline.

use crate::{
    timing::Timer,
    types::{MidiChannel, MidiNote, Seconds, MIDI_NOTE_MAX},
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// The velocity a command gets when its creator doesn't say otherwise.
pub const DEFAULT_VELOCITY: u8 = 100;

/// The highest velocity.
pub const MAX_VELOCITY: u8 = 127;

/// What an [AudioCommand] asks its recipient to do.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    Eq,
    Hash,
    IntoStaticStr,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CommandKind {
    #[allow(missing_docs)]
    NoteOn,
    #[allow(missing_docs)]
    NoteOff,
    /// `value` is the controller value and `number` the controller number.
    ControlChange,
    /// `value` is the 14-bit bend amount; 8192 is centered.
    PitchBend,
    /// Lyrics, markers, and other text. See [AudioCommand::text].
    Text,
    /// Bytes we don't interpret. See [AudioCommand::data].
    Raw,
}

/// A single timed note or control event.
///
/// Identity (`kind` and `number`) doesn't change once a command has left the
/// input stage. A transformer that needs a different pitch or time builds a
/// new command with [AudioCommand::derive()] or [AudioCommand::retimed()];
/// the original might still be referenced by an in-flight pairing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AudioCommand {
    #[allow(missing_docs)]
    pub kind: CommandKind,

    /// The note number (or controller number), 0..=127.
    pub number: MidiNote,

    /// Mirrors `number` for note kinds. Carries the controller value or bend
    /// amount otherwise.
    pub value: i32,

    #[allow(missing_docs)]
    pub velocity: u8,

    /// When this command was created, according to the timer.
    pub time: Seconds,

    /// When this command should take effect.
    pub start_at: Seconds,

    /// When the note that this command starts should end. Unknown at
    /// creation; resolved by pairing. `None` marks an orphan.
    pub end_at: Option<Seconds>,

    /// Who produced this command. Diagnostic only.
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub channel: Option<MidiChannel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[allow(missing_docs)]
    pub data: Vec<u8>,
}
impl AudioCommand {
    /// The single factory for commands. Stamps `time` (and, until the caller
    /// says otherwise, `start_at`) with the timer's current time, clamps the
    /// note number to the MIDI range, and uses [DEFAULT_VELOCITY].
    pub fn new_with(kind: CommandKind, number: u8, timer: &dyn Timer, source: &str) -> Self {
        let now = timer.now();
        let number = number.min(MIDI_NOTE_MAX);
        Self {
            kind,
            number,
            value: number as i32,
            velocity: DEFAULT_VELOCITY,
            time: now,
            start_at: now,
            end_at: None,
            source: source.to_string(),
            channel: None,
            text: None,
            data: Vec::default(),
        }
    }

    /// Convenience for a Note-On.
    pub fn note_on(number: u8, timer: &dyn Timer, source: &str) -> Self {
        Self::new_with(CommandKind::NoteOn, number, timer, source)
    }

    /// Convenience for a Note-Off.
    pub fn note_off(number: u8, timer: &dyn Timer, source: &str) -> Self {
        Self::new_with(CommandKind::NoteOff, number, timer, source)
    }

    /// Convenience for a control change.
    pub fn control_change(controller: u8, value: u8, timer: &dyn Timer, source: &str) -> Self {
        let mut r = Self::new_with(CommandKind::ControlChange, controller, timer, source);
        r.value = value.min(MAX_VELOCITY) as i32;
        r
    }

    /// Sets velocity, clamped to 0..=127. A Note-On with velocity zero is a
    /// Note-Off by MIDI convention, so it becomes one here.
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity.min(MAX_VELOCITY);
        if self.kind == CommandKind::NoteOn && self.velocity == 0 {
            self.kind = CommandKind::NoteOff;
        }
        self
    }

    #[allow(missing_docs)]
    pub fn with_start_at(mut self, start_at: Seconds) -> Self {
        self.start_at = start_at;
        self
    }

    #[allow(missing_docs)]
    pub fn with_end_at(mut self, end_at: Seconds) -> Self {
        self.end_at = Some(end_at);
        self
    }

    #[allow(missing_docs)]
    pub fn with_channel(mut self, channel: MidiChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    #[allow(missing_docs)]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Returns a new command that is a copy of this one, but for a different
    /// note number and with a new source tag.
    pub fn derive(&self, number: u8, source: &str) -> Self {
        let number = number.min(MIDI_NOTE_MAX);
        let mut r = self.clone();
        r.number = number;
        if r.is_note() {
            r.value = number as i32;
        }
        r.source = source.to_string();
        r
    }

    /// Returns a new command that is a copy of this one, but starting at a
    /// different time.
    pub fn retimed(&self, start_at: Seconds, source: &str) -> Self {
        let mut r = self.clone();
        r.start_at = start_at;
        r.source = source.to_string();
        r
    }

    /// Returns a Note-Off that closes this note at the given time. Velocity
    /// and channel carry over.
    pub fn paired_note_off(&self, start_at: Seconds, source: &str) -> Self {
        let mut r = self.retimed(start_at, source);
        r.kind = CommandKind::NoteOff;
        r.end_at = None;
        r
    }

    /// Whether this is a Note-On or Note-Off.
    pub fn is_note(&self) -> bool {
        matches!(self.kind, CommandKind::NoteOn | CommandKind::NoteOff)
    }

    #[allow(missing_docs)]
    pub fn is_note_on(&self) -> bool {
        self.kind == CommandKind::NoteOn
    }

    #[allow(missing_docs)]
    pub fn is_note_off(&self) -> bool {
        self.kind == CommandKind::NoteOff
    }

    /// The note's length, if its end has been resolved.
    pub fn duration(&self) -> Option<Seconds> {
        self.end_at.map(|end_at| end_at - self.start_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimerSnapshot;

    #[test]
    fn factory_stamps_time_and_default_velocity() {
        let timer = TimerSnapshot::new_with(120.0, Seconds(3.5), Seconds::zero());
        let c = AudioCommand::note_on(64, &timer, "keyboard");
        assert_eq!(c.time, Seconds(3.5));
        assert_eq!(c.start_at, Seconds(3.5));
        assert_eq!(c.end_at, None);
        assert_eq!(c.number, 64);
        assert_eq!(c.value, 64);
        assert_eq!(
            c.velocity, DEFAULT_VELOCITY,
            "velocity must not be aliased to the note number"
        );
        assert_eq!(c.source, "keyboard");
    }

    #[test]
    fn factory_clamps_note_number() {
        let timer = TimerSnapshot::default();
        let c = AudioCommand::note_on(200, &timer, "test");
        assert_eq!(c.number, MIDI_NOTE_MAX);
        assert_eq!(c.value, MIDI_NOTE_MAX as i32);
    }

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        let timer = TimerSnapshot::default();
        let c = AudioCommand::note_on(60, &timer, "test").with_velocity(0);
        assert!(c.is_note_off());
        let c = AudioCommand::note_on(60, &timer, "test").with_velocity(255);
        assert_eq!(c.velocity, MAX_VELOCITY);
    }

    #[test]
    fn derive_leaves_original_alone() {
        let timer = TimerSnapshot::default();
        let original = AudioCommand::note_on(60, &timer, "keyboard");
        let derived = original.derive(62, "transposer");
        assert_eq!(original.number, 60);
        assert_eq!(original.source, "keyboard");
        assert_eq!(derived.number, 62);
        assert_eq!(derived.value, 62);
        assert_eq!(derived.source, "transposer");

        let cc = AudioCommand::control_change(7, 90, &timer, "knob");
        assert_eq!(cc.derive(8, "x").value, 90, "non-note value isn't a pitch");
    }

    #[test]
    fn paired_note_off() {
        let timer = TimerSnapshot::default();
        let on = AudioCommand::note_on(60, &timer, "keyboard")
            .with_velocity(90)
            .with_channel(MidiChannel(3));
        let off = on.paired_note_off(Seconds(0.5), "repeater");
        assert!(off.is_note_off());
        assert_eq!(off.number, 60);
        assert_eq!(off.velocity, 90);
        assert_eq!(off.channel, Some(MidiChannel(3)));
        assert_eq!(off.start_at, Seconds(0.5));
        assert_eq!(off.source, "repeater");
        assert!(on.is_note_on(), "the original is untouched");
    }

    #[test]
    fn wire_format_is_kebab_case() {
        let timer = TimerSnapshot::default();
        let c = AudioCommand::note_on(60, &timer, "keyboard").with_end_at(Seconds(1.0));
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"kind\":\"note-on\""));
        assert!(json.contains("\"start-at\""));
        assert!(json.contains("\"end-at\":1.0"));
        let back: AudioCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
