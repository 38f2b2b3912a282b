// Copyright (c) 2024 Mike Tsao

use super::TransformerManager;
use crate::{
    recording::RecorderAudioEvent,
    timing::Timer,
    traits::PlaysNotes,
    types::{AudioCommand, CommandKind, MidiNote, Seconds},
    util::CrossbeamChannel,
};

/// Ties a pipeline to the world around it. Each tick, the input batch goes
/// through the [TransformerManager], and the result is appended to the
/// recorder and scheduled for playback.
///
/// Outputs hear each command once the timer reaches its `start_at`, so a
/// repeat scheduled 125ms out is played on the first tick at or after that
/// time, not on the tick that produced it.
#[derive(Debug, Default)]
pub struct Performance {
    manager: TransformerManager,
    outputs: Vec<Box<dyn PlaysNotes + Send>>,
    recorder: RecorderAudioEvent,
    dropped_batches: usize,

    /// Commands waiting for their `start_at`, in ascending order. Commands
    /// that share a start time keep the order they were produced in.
    pending: Vec<AudioCommand>,
}
impl Performance {
    #[allow(missing_docs)]
    pub fn new_with(manager: TransformerManager, recorder: RecorderAudioEvent) -> Self {
        Self {
            manager,
            recorder,
            ..Default::default()
        }
    }

    #[allow(missing_docs)]
    pub fn add_output(&mut self, output: Box<dyn PlaysNotes + Send>) {
        self.outputs.push(output);
    }

    /// Processes one batch and returns what the pipeline produced. Whatever
    /// is due by `timer.now()`, from this batch or earlier ones, is played.
    ///
    /// If a stage fails, the batch is logged and dropped, and nothing is
    /// recorded for it. Commands scheduled by earlier batches still play.
    pub fn tick(&mut self, batch: Vec<AudioCommand>, timer: &dyn Timer) -> Vec<AudioCommand> {
        let commands = match self.manager.transform(batch, timer) {
            Ok(commands) => {
                self.recorder.add_events(&commands);
                self.schedule(&commands);
                commands
            }
            Err(e) => {
                self.dropped_batches += 1;
                log::warn!("dropping batch at {}: {e}", timer.now());
                Vec::default()
            }
        };
        self.dispatch_due(timer.now());
        commands
    }

    fn schedule(&mut self, commands: &[AudioCommand]) {
        for command in commands.iter().filter(|c| c.is_note()) {
            if !command.start_at.is_finite() {
                log::debug!(
                    "note {} has no usable start time ({}); playing it now",
                    command.number,
                    command.start_at
                );
                self.dispatch(command);
                continue;
            }
            let at = self
                .pending
                .partition_point(|p| p.start_at <= command.start_at);
            self.pending.insert(at, command.clone());
        }
    }

    fn dispatch_due(&mut self, now: Seconds) {
        let due = self.pending.partition_point(|p| p.start_at <= now);
        if due == 0 {
            return;
        }
        let due: Vec<AudioCommand> = self.pending.drain(..due).collect();
        for command in due.iter() {
            self.dispatch(command);
        }
    }

    fn dispatch(&mut self, command: &AudioCommand) {
        match command.kind {
            CommandKind::NoteOn => self
                .outputs
                .iter_mut()
                .for_each(|o| o.note_on(command.number, command.velocity)),
            CommandKind::NoteOff => self
                .outputs
                .iter_mut()
                .for_each(|o| o.note_off(command.number)),
            _ => {}
        }
    }

    /// Call when the transport stops. Forgets everything still scheduled,
    /// clears every stage's transient state, and silences every output.
    pub fn stop(&mut self) {
        if !self.pending.is_empty() {
            log::debug!("stop: discarding {} scheduled commands", self.pending.len());
            self.pending.clear();
        }
        self.manager.reset();
        self.outputs.iter_mut().for_each(|o| o.all_notes_off());
    }

    /// How many commands are waiting for their start time.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// How many batches have been lost to stage failures.
    pub fn dropped_batches(&self) -> usize {
        self.dropped_batches
    }

    #[allow(missing_docs)]
    pub fn manager(&self) -> &TransformerManager {
        &self.manager
    }

    #[allow(missing_docs)]
    pub fn manager_mut(&mut self) -> &mut TransformerManager {
        &mut self.manager
    }

    #[allow(missing_docs)]
    pub fn recorder(&self) -> &RecorderAudioEvent {
        &self.recorder
    }

    #[allow(missing_docs)]
    pub fn recorder_mut(&mut self) -> &mut RecorderAudioEvent {
        &mut self.recorder
    }
}

/// One call made on a [NoteLog].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteEvent {
    #[allow(missing_docs)]
    On(MidiNote, u8),
    #[allow(missing_docs)]
    Off(MidiNote),
    #[allow(missing_docs)]
    AllOff,
}

/// An output that writes down what it's asked to play. Clones share the same
/// log, so you can hand one to a [Performance] and read from another.
#[derive(Clone, Debug, Default)]
pub struct NoteLog {
    channel: CrossbeamChannel<NoteEvent>,
}
impl NoteLog {
    /// Everything played since the last call.
    pub fn drain(&self) -> Vec<NoteEvent> {
        self.channel.drain()
    }

    fn log(&self, event: NoteEvent) {
        let _ = self.channel.sender.send(event);
    }
}
impl PlaysNotes for NoteLog {
    fn note_on(&mut self, note: MidiNote, velocity: u8) {
        self.log(NoteEvent::On(note, velocity));
    }

    fn note_off(&mut self, note: MidiNote) {
        self.log(NoteEvent::Off(note));
    }

    fn all_notes_off(&mut self) {
        self.log(NoteEvent::AllOff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cores::{FilterCoreBuilder, RepeaterCore, RepeaterCoreBuilder, TransposerCoreBuilder},
        orchestration::manager::tests::UnluckyCore,
        timing::TimerSnapshot,
        traits::Transformer,
        transformers::TransformerStage,
        types::Uid,
    };

    fn stage<C: crate::traits::TransformerCore>(core: C) -> Box<dyn Transformer> {
        Box::new(TransformerStage::new_with(Uid::default(), core))
    }

    #[test]
    fn tick_plays_and_records() {
        let timer = TimerSnapshot::default();
        let mut manager = TransformerManager::default();
        manager
            .add_transformer(stage(
                FilterCoreBuilder::default().lower(60).upper(72).build().unwrap(),
            ))
            .unwrap();
        let mut recorder = RecorderAudioEvent::default();
        recorder.set_enabled(true);
        let mut performance = Performance::new_with(manager, recorder);
        let log = NoteLog::default();
        performance.add_output(Box::new(log.clone()));

        let out = performance.tick(
            vec![
                AudioCommand::note_on(48, &timer, "k"),
                AudioCommand::note_on(64, &timer, "k").with_velocity(90),
                AudioCommand::control_change(7, 100, &timer, "k"),
                AudioCommand::note_off(64, &timer, "k"),
            ],
            &timer,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(
            log.drain(),
            vec![NoteEvent::On(64, 90), NoteEvent::Off(64)],
            "control changes aren't notes"
        );
        assert_eq!(performance.recorder().events().len(), 3);

        performance.stop();
        assert_eq!(log.drain(), vec![NoteEvent::AllOff]);
    }

    #[test]
    fn failed_batch_is_dropped_and_next_one_recovers() {
        let timer = TimerSnapshot::default();
        let mut performance = Performance::default();
        performance.recorder_mut().set_enabled(true);
        performance
            .manager_mut()
            .add_transformer(stage(UnluckyCore::default()))
            .unwrap();
        let log = NoteLog::default();
        performance.add_output(Box::new(log.clone()));

        assert!(performance
            .tick(vec![AudioCommand::note_on(13, &timer, "k")], &timer)
            .is_empty());
        assert_eq!(performance.dropped_batches(), 1);
        assert!(log.drain().is_empty());
        assert!(performance.recorder().events().is_empty());

        assert_eq!(
            performance
                .tick(vec![AudioCommand::note_on(60, &timer, "k")], &timer)
                .len(),
            1
        );
        assert_eq!(log.drain().len(), 1);
    }

    #[test]
    fn commands_wait_for_their_start_time() {
        let mut timer = TimerSnapshot::new_with(120.0, Seconds::zero(), Seconds::zero());
        let mut performance = Performance::default();
        performance
            .manager_mut()
            .add_transformer(stage(
                RepeaterCoreBuilder::default()
                    .repeats(3)
                    .delay_ms(125)
                    .note_duration_ms(100)
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        let log = NoteLog::default();
        performance.add_output(Box::new(log.clone()));

        let out = performance.tick(vec![AudioCommand::note_on(60, &timer, "k")], &timer);
        assert_eq!(out.len(), 6, "the whole burst is produced at once");
        assert_eq!(log.drain(), vec![NoteEvent::On(60, 100)], "but only the first is due");
        assert_eq!(performance.pending_count(), 5);

        let mut played = Vec::default();
        for ms in [50.0, 110.0, 130.0, 230.0, 240.0, 260.0, 400.0] {
            timer = timer.at(Seconds::from_millis(ms));
            performance.tick(Vec::default(), &timer);
            played.push(log.drain());
        }
        assert_eq!(
            played,
            vec![
                vec![],
                vec![NoteEvent::Off(60)],
                vec![NoteEvent::On(60, 100)],
                vec![NoteEvent::Off(60)],
                vec![],
                vec![NoteEvent::On(60, 100)],
                vec![NoteEvent::Off(60)],
            ]
        );
        assert_eq!(performance.pending_count(), 0);
    }

    #[test]
    fn stop_discards_scheduled_commands() {
        let timer = TimerSnapshot::new_with(120.0, Seconds::zero(), Seconds::zero());
        let mut performance = Performance::default();
        performance
            .manager_mut()
            .add_transformer(stage(RepeaterCore::default()))
            .unwrap();
        let log = NoteLog::default();
        performance.add_output(Box::new(log.clone()));
        performance.tick(vec![AudioCommand::note_on(60, &timer, "k")], &timer);
        assert!(performance.pending_count() > 0);
        log.drain();

        performance.stop();
        assert_eq!(performance.pending_count(), 0);
        performance.tick(Vec::default(), &timer.at(Seconds(10.0)));
        assert_eq!(log.drain(), vec![NoteEvent::AllOff]);
    }

    #[test]
    fn disabling_a_transposer_releases_the_note_it_sounded() {
        let timer = TimerSnapshot::default();
        let mut performance = Performance::default();
        let uid = performance
            .manager_mut()
            .add_transformer(stage(
                TransposerCoreBuilder::default().semitones(2).build().unwrap(),
            ))
            .unwrap();
        let log = NoteLog::default();
        performance.add_output(Box::new(log.clone()));

        performance.tick(vec![AudioCommand::note_on(60, &timer, "k")], &timer);
        performance
            .manager_mut()
            .transformer_mut(uid)
            .unwrap()
            .set_enabled(false);
        performance.tick(vec![AudioCommand::note_off(60, &timer, "k")], &timer);
        assert_eq!(
            log.drain(),
            vec![
                NoteEvent::On(62, 100),
                NoteEvent::Off(62),
                NoteEvent::Off(60)
            ]
        );
    }

    #[test]
    fn stop_resets_stages() {
        let timer = TimerSnapshot::default();
        let mut performance = Performance::default();
        let uid = performance
            .manager_mut()
            .add_transformer(stage(RepeaterCore::default()))
            .unwrap();
        performance.tick(vec![AudioCommand::note_on(60, &timer, "k")], &timer);
        assert!(performance
            .manager()
            .stage::<RepeaterCore>(uid)
            .unwrap()
            .inner()
            .owns(60));
        performance.stop();
        assert!(!performance
            .manager()
            .stage::<RepeaterCore>(uid)
            .unwrap()
            .inner()
            .owns(60));
    }
}
