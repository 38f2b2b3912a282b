// Copyright (c) 2024 Mike Tsao

use super::{notes, pair_events, PairingReport, RecordedNote, RecordingStorage, SessionMetadata};
use crate::types::{AudioCommand, Seconds};

/// Captures the output of a pipeline over a session, and reconstructs note
/// durations on export.
///
/// While disabled, events are ignored. While enabled, they're appended in
/// arrival order and, if storage is attached, persisted one at a time along
/// with refreshed [SessionMetadata]. Exporting never changes the recording.
#[derive(Debug, Default)]
pub struct RecorderAudioEvent {
    is_enabled: bool,
    events: Vec<AudioCommand>,
    duration: Seconds,
    metadata: SessionMetadata,
    storage: Option<Box<dyn RecordingStorage>>,
}
impl RecorderAudioEvent {
    /// A recorder that persists to `storage` under the given session name.
    pub fn new_with(name: &str, storage: Box<dyn RecordingStorage>) -> Self {
        Self {
            metadata: SessionMetadata::new_with(name),
            storage: Some(storage),
            ..Default::default()
        }
    }

    #[allow(missing_docs)]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    #[allow(missing_docs)]
    pub fn set_enabled(&mut self, is_enabled: bool) {
        self.is_enabled = is_enabled;
    }

    /// Appends one event if recording is enabled. Returns whether it was
    /// kept.
    pub fn add_event(&mut self, command: &AudioCommand) -> bool {
        if !self.is_enabled {
            return false;
        }
        if command.start_at.is_finite() && command.start_at > self.duration {
            self.duration = command.start_at;
        }
        self.events.push(command.clone());
        self.metadata.touch(self.duration);
        if let Some(storage) = self.storage.as_mut() {
            if let Err(e) = storage.add_event(command) {
                log::error!("recorder: couldn't store event: {e:#}");
            }
            if let Err(e) = storage.write_metadata(&self.metadata) {
                log::error!("recorder: couldn't store session metadata: {e:#}");
            }
        }
        true
    }

    /// Appends each event in order. Returns how many were kept.
    pub fn add_events(&mut self, commands: &[AudioCommand]) -> usize {
        commands.iter().filter(|c| self.add_event(c)).count()
    }

    /// Everything recorded so far, in arrival order.
    pub fn events(&self) -> &[AudioCommand] {
        &self.events
    }

    /// The latest `start_at` recorded.
    pub fn duration(&self) -> Seconds {
        self.duration
    }

    #[allow(missing_docs)]
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// Empties the recording and any attached storage.
    pub fn clear(&mut self) {
        self.events.clear();
        self.duration = Seconds::zero();
        self.metadata.touch(self.duration);
        if let Some(storage) = self.storage.as_mut() {
            if let Err(e) = storage.clear() {
                log::error!("recorder: couldn't clear storage: {e:#}");
            }
        }
    }

    /// A copy of the recording with every resolvable `end_at` filled in. See
    /// [pair_events()].
    pub fn export_data(&self) -> Vec<AudioCommand> {
        self.export_with_report().0
    }

    /// Like [RecorderAudioEvent::export_data()], but also says what the
    /// pairing found.
    pub fn export_with_report(&self) -> (Vec<AudioCommand>, PairingReport) {
        let (events, report) = pair_events(&self.events);
        if !report.is_clean() {
            log::warn!("recorder: export of '{}' found {report:?}", self.metadata.name);
        }
        (events, report)
    }

    /// The complete notes in the recording.
    pub fn notes(&self) -> Vec<RecordedNote> {
        notes(&self.export_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        recording::MemoryStorage,
        timing::TimerSnapshot,
        types::CommandKind,
    };

    fn at(kind: CommandKind, note: u8, t: f64) -> AudioCommand {
        AudioCommand::new_with(kind, note, &TimerSnapshot::default(), "test")
            .with_start_at(Seconds(t))
    }

    #[derive(Debug)]
    struct BrokenStorage;
    impl RecordingStorage for BrokenStorage {
        fn add_event(&mut self, _command: &AudioCommand) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }

        fn write_metadata(&mut self, _metadata: &SessionMetadata) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }

        fn clear(&mut self) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
    }

    #[test]
    fn records_only_while_enabled() {
        let mut recorder = RecorderAudioEvent::default();
        assert!(!recorder.add_event(&at(CommandKind::NoteOn, 60, 0.0)));
        assert!(recorder.events().is_empty());

        recorder.set_enabled(true);
        assert_eq!(
            recorder.add_events(&[
                at(CommandKind::NoteOn, 60, 0.5),
                at(CommandKind::NoteOff, 60, 2.0),
                at(CommandKind::NoteOn, 62, 1.0),
                at(CommandKind::NoteOn, 64, f64::NAN),
            ]),
            4
        );
        assert_eq!(recorder.duration(), Seconds(2.0), "high-water mark");
        assert_eq!(recorder.events().len(), 4);
    }

    #[test]
    fn export_is_non_destructive() {
        let mut recorder = RecorderAudioEvent::default();
        recorder.set_enabled(true);
        recorder.add_events(&[
            at(CommandKind::NoteOn, 60, 0.0),
            at(CommandKind::NoteOff, 60, 1.0),
            at(CommandKind::NoteOn, 62, 1.5),
        ]);
        let (exported, report) = recorder.export_with_report();
        assert_eq!(exported.len(), 3);
        assert_eq!(exported[0].end_at, Some(Seconds(1.0)));
        assert_eq!(exported[2].end_at, None);
        assert_eq!(report.orphan_note_ons, 1);
        assert!(recorder.events().iter().all(|e| e.end_at.is_none()));
        assert_eq!(recorder.export_data(), exported, "exporting twice is stable");

        let notes = recorder.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].duration, Seconds(1.0));
    }

    #[test]
    fn persists_and_clears_storage() {
        let storage = MemoryStorage::default();
        let mut recorder = RecorderAudioEvent::new_with("take 1", Box::new(storage.clone()));
        recorder.set_enabled(true);
        recorder.add_event(&at(CommandKind::NoteOn, 60, 0.25));
        recorder.add_event(&at(CommandKind::NoteOff, 60, 0.75));
        assert_eq!(storage.events().len(), 2);
        let metadata = storage.metadata().unwrap();
        assert_eq!(metadata.name, "take 1");
        assert_eq!(metadata.duration, Seconds(0.75));

        recorder.clear();
        assert!(recorder.events().is_empty());
        assert_eq!(recorder.duration(), Seconds::zero());
        assert!(storage.events().is_empty());
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let mut recorder = RecorderAudioEvent::new_with("doomed", Box::new(BrokenStorage));
        recorder.set_enabled(true);
        assert!(recorder.add_event(&at(CommandKind::NoteOn, 60, 0.0)));
        assert_eq!(recorder.events().len(), 1);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
