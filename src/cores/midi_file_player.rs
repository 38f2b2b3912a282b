// Copyright (c) 2024 Mike Tsao

use crate::{
    error::ConfigError,
    timing::Timer,
    traits::{Configures, Serializable, TransformerCore, TransformsCommands},
    transformers::{validate, Category, Field, FieldValue, TransformerConfig},
    types::{AudioCommand, CommandKind, MidiChannel, MidiNote, Seconds},
};
use anyhow::{anyhow, Context};
use derivative::Derivative;
use derive_builder::Builder;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether a [MidiFilePlayerCore] has something to play.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PlayerStatus {
    /// No file configured.
    #[default]
    Empty,
    /// A file is loaded and playing (or finished).
    Loaded,
    /// A file is configured but couldn't be read or parsed. The message says
    /// why.
    Unavailable(String),
}

/// One event from a file, timed relative to the start of the file.
#[derive(Clone, Debug, PartialEq)]
struct FileEvent {
    at: Seconds,
    kind: CommandKind,
    number: MidiNote,
    value: i32,
    velocity: u8,
    channel: Option<MidiChannel>,
    text: Option<String>,
}
impl FileEvent {
    fn from_track_event(at: Seconds, kind: &TrackEventKind) -> Option<Self> {
        match kind {
            TrackEventKind::Midi { channel, message } => {
                let (kind, number, value, velocity) = match *message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                        (CommandKind::NoteOff, key.as_int(), key.as_int() as i32, 0)
                    }
                    MidiMessage::NoteOn { key, vel } => (
                        CommandKind::NoteOn,
                        key.as_int(),
                        key.as_int() as i32,
                        vel.as_int(),
                    ),
                    MidiMessage::NoteOff { key, vel } => (
                        CommandKind::NoteOff,
                        key.as_int(),
                        key.as_int() as i32,
                        vel.as_int(),
                    ),
                    MidiMessage::Controller { controller, value } => (
                        CommandKind::ControlChange,
                        controller.as_int(),
                        value.as_int() as i32,
                        0,
                    ),
                    MidiMessage::PitchBend { bend } => {
                        (CommandKind::PitchBend, 0, bend.0.as_int() as i32, 0)
                    }
                    _ => return None,
                };
                Some(Self {
                    at,
                    kind,
                    number,
                    value,
                    velocity,
                    channel: Some(MidiChannel::from(*channel)),
                    text: None,
                })
            }
            TrackEventKind::Meta(MetaMessage::Lyric(text) | MetaMessage::Marker(text)) => {
                Some(Self {
                    at,
                    kind: CommandKind::Text,
                    number: 0,
                    value: 0,
                    velocity: 0,
                    channel: None,
                    text: Some(String::from_utf8_lossy(text).into_owned()),
                })
            }
            _ => None,
        }
    }
}

/// Plays a Standard MIDI File into the pipeline, in step with the timer.
///
/// While a file is loaded, incoming notes are dropped and everything else
/// passes through. While nothing is loaded, the stage passes everything
/// through, so a missing file never breaks a pipeline.
#[derive(Clone, Builder, Debug, Derivative, Serialize, Deserialize)]
#[builder_impl_attr(allow(missing_docs))]
#[derivative(Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
#[builder(default)]
pub struct MidiFilePlayerCore {
    file: Option<PathBuf>,

    looping: bool,

    #[serde(skip)]
    #[builder(setter(skip))]
    #[derivative(PartialEq = "ignore")]
    e: MidiFilePlayerEphemerals,
}
#[derive(Clone, Debug, Default)]
pub struct MidiFilePlayerEphemerals {
    status: PlayerStatus,
    events: Vec<FileEvent>,
    /// Time of the file's last event, including end-of-track.
    length: Seconds,
    cursor: usize,
    /// The transport time that corresponds to the start of the file.
    origin: Option<Seconds>,
    /// File Note-Ons we've played whose Note-Offs haven't come up yet.
    sounding: Vec<AudioCommand>,
}
impl MidiFilePlayerCore {
    /// The MIDI default when a file doesn't set a tempo: 120 BPM.
    pub const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

    #[allow(missing_docs)]
    pub fn status(&self) -> &PlayerStatus {
        &self.e.status
    }

    #[allow(missing_docs)]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    #[allow(missing_docs)]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// How long the loaded file runs.
    pub fn length(&self) -> Seconds {
        self.e.length
    }

    /// How many playable events the loaded file has.
    pub fn event_count(&self) -> usize {
        self.e.events.len()
    }

    /// Whether a non-looping file has played to its end.
    pub fn is_finished(&self) -> bool {
        self.e.status == PlayerStatus::Loaded && self.e.cursor >= self.e.events.len()
    }

    /// Parses file contents and starts playing them from the top.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let (events, length) = Self::parse(bytes)?;
        self.e.events = events;
        self.e.length = length;
        self.e.status = PlayerStatus::Loaded;
        self.rewind();
        Ok(())
    }

    /// Reads and parses a file from disk.
    pub fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        self.load_bytes(&bytes)
            .with_context(|| format!("parsing {}", path.display()))?;
        log::info!(
            "midi-file-player: loaded {} events ({}) from {}",
            self.e.events.len(),
            self.e.length,
            path.display()
        );
        Ok(())
    }

    /// Forgets the loaded file's contents. The configured path stays.
    pub fn unload(&mut self) {
        self.e.events.clear();
        self.e.length = Seconds::zero();
        self.e.status = PlayerStatus::Empty;
        self.rewind();
    }

    fn rewind(&mut self) {
        self.e.cursor = 0;
        self.e.origin = None;
        self.e.sounding.clear();
    }

    fn track(&mut self, command: &AudioCommand) {
        if command.is_note_on() {
            self.e.sounding.push(command.clone());
        } else if command.is_note_off() {
            if let Some(i) = self
                .e
                .sounding
                .iter()
                .position(|on| on.number == command.number && on.channel == command.channel)
            {
                self.e.sounding.remove(i);
            }
        }
    }

    /// Loads whatever `file` says. A failure leaves us passing commands
    /// through, with the reason in [PlayerStatus::Unavailable].
    fn reload(&mut self) {
        let Some(path) = self.file.clone() else {
            self.unload();
            return;
        };
        if let Err(e) = self.load_file(&path) {
            log::warn!("midi-file-player: {e:#}");
            self.unload();
            self.e.status = PlayerStatus::Unavailable(format!("{e:#}"));
        }
    }

    /// Merges all tracks and converts ticks to seconds, following the file's
    /// tempo map.
    fn parse(bytes: &[u8]) -> anyhow::Result<(Vec<FileEvent>, Seconds)> {
        let smf = Smf::parse(bytes)?;
        let mut merged = Vec::default();
        for track in smf.tracks.iter() {
            let mut tick = 0u64;
            for event in track.iter() {
                tick += event.delta.as_int() as u64;
                merged.push((tick, &event.kind));
            }
        }
        merged.sort_by_key(|(tick, _)| *tick);

        let mut events = Vec::default();
        let mut length = Seconds::zero();
        match smf.header.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = ticks_per_beat.as_int() as f64;
                if ticks_per_beat == 0.0 {
                    return Err(anyhow!("file declares zero ticks per beat"));
                }
                let mut microseconds_per_beat = Self::DEFAULT_MICROSECONDS_PER_BEAT as f64;
                let (mut last_tick, mut last_seconds) = (0u64, 0.0);
                for (tick, kind) in merged {
                    let seconds = last_seconds
                        + (tick - last_tick) as f64 * microseconds_per_beat
                            / ticks_per_beat
                            / 1_000_000.0;
                    (last_tick, last_seconds) = (tick, seconds);
                    length = Seconds(seconds);
                    if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = kind {
                        microseconds_per_beat = tempo.as_int() as f64;
                    } else if let Some(event) = FileEvent::from_track_event(Seconds(seconds), kind)
                    {
                        events.push(event);
                    }
                }
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = fps.as_f32() as f64 * subframes as f64;
                if ticks_per_second <= 0.0 {
                    return Err(anyhow!("file declares zero subframes per frame"));
                }
                for (tick, kind) in merged {
                    let at = Seconds(tick as f64 / ticks_per_second);
                    length = at;
                    if let Some(event) = FileEvent::from_track_event(at, kind) {
                        events.push(event);
                    }
                }
            }
        }
        Ok((events, length))
    }

    fn to_command(event: &FileEvent, origin: Seconds, timer: &dyn Timer) -> AudioCommand {
        let mut r = AudioCommand::new_with(event.kind, event.number, timer, Self::KEY)
            .with_start_at(origin + event.at);
        r.value = event.value;
        r.velocity = event.velocity;
        r.channel = event.channel;
        r.text = event.text.clone();
        r
    }
}
impl TransformsCommands for MidiFilePlayerCore {
    fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> anyhow::Result<Vec<AudioCommand>> {
        if self.e.status != PlayerStatus::Loaded || self.e.events.is_empty() {
            return Ok(commands);
        }
        let mut r: Vec<AudioCommand> = commands.into_iter().filter(|c| !c.is_note()).collect();
        let now = timer.now();
        if !now.is_finite() {
            return Ok(r);
        }

        let mut origin = *self.e.origin.get_or_insert(now);
        loop {
            while let Some(event) = self.e.events.get(self.e.cursor) {
                if origin + event.at > now {
                    break;
                }
                let command = Self::to_command(event, origin, timer);
                self.track(&command);
                r.push(command);
                self.e.cursor += 1;
            }
            if self.e.cursor < self.e.events.len() || !self.looping || self.e.length.0 <= 0.0 {
                break;
            }
            origin = origin + self.e.length;
            self.e.cursor = 0;
            if now - origin >= self.e.length {
                log::warn!("midi-file-player: fell more than a loop behind; restarting at {now}");
                origin = now;
            }
        }
        self.e.origin = Some(origin);
        Ok(r)
    }

    fn flush(&mut self, timer: &dyn Timer) -> Vec<AudioCommand> {
        let now = timer.now();
        self.e
            .sounding
            .drain(..)
            .map(|on| on.paired_note_off(now.max(on.start_at), Self::KEY))
            .collect()
    }

    fn reset(&mut self) {
        self.rewind();
    }

    fn destroy(&mut self) {
        self.unload();
    }
}
impl Configures for MidiFilePlayerCore {
    fn fields() -> Vec<Field> {
        vec![
            Field::text("file", "MIDI file"),
            Field::toggle("looping", "Loop"),
        ]
    }

    fn config_value(&self, name: &str) -> Result<FieldValue, ConfigError> {
        match name {
            "file" => Ok(FieldValue::Text(
                self.file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )),
            "looping" => Ok(FieldValue::Bool(self.looping)),
            _ => Err(ConfigError::unknown_field(name)),
        }
    }

    fn with(&self, name: &str, value: &FieldValue) -> Result<Self, ConfigError> {
        validate(&Self::fields(), name, value)?;
        let mut r = self.clone();
        match name {
            "file" => {
                r.file = value
                    .as_text()
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from);
                r.reload();
            }
            "looping" => r.looping = value.as_bool().unwrap_or_default(),
            _ => return Err(ConfigError::unknown_field(name)),
        }
        Ok(r)
    }
}
impl Serializable for MidiFilePlayerCore {
    fn after_deser(&mut self) {
        self.reload();
    }
}
impl TransformerCore for MidiFilePlayerCore {
    const KEY: &'static str = "midi-file-player";
    const NAME: &'static str = "MIDI File Player";
    const CATEGORY: Category = Category::Generative;

    fn to_config(&self) -> TransformerConfig {
        TransformerConfig::MidiFilePlayer(self.clone())
    }

    fn from_config(config: TransformerConfig) -> Option<Self> {
        match config {
            TransformerConfig::MidiFilePlayer(core) => Some(core),
            _ => None,
        }
    }
}
