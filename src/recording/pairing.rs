// Copyright (c) 2024 Mike Tsao

use crate::types::{AudioCommand, CommandKind, MidiChannel, MidiNote, Seconds};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// What [pair_events()] found. Orphans and bad times aren't errors; live MIDI
/// streams produce them routinely (for example, when recording starts
/// mid-note).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PairingReport {
    /// Note-Ons that found their Note-Off.
    pub matched: usize,
    /// Note-Ons with no following Note-Off. Their `end_at` stays unresolved.
    pub orphan_note_ons: usize,
    /// Note-Offs that closed nothing.
    pub orphan_note_offs: usize,
    /// Events whose `start_at` is NaN or infinite.
    pub nan_times: usize,
}
impl PairingReport {
    /// Whether every note was matched and every time was usable.
    pub fn is_clean(&self) -> bool {
        self.orphan_note_ons == 0 && self.orphan_note_offs == 0 && self.nan_times == 0
    }
}

/// Resolves each Note-On's `end_at` from the Note-Off that closes it.
///
/// The input is untouched. The output has the same length and order, with
/// `end_at` filled in where a match exists.
///
/// Scanning backward, each note number remembers the most recent unmatched
/// Note-Off seen so far. A Note-On takes that Note-Off, so a Note-On is closed
/// by the *nearest following* Note-Off for its number. When two Note-Ons for
/// the same number precede one Note-Off, the later Note-On gets it and the
/// earlier one stays an orphan. A matched Note-Off gets `end_at == start_at`.
pub fn pair_events(events: &[AudioCommand]) -> (Vec<AudioCommand>, PairingReport) {
    let mut r = events.to_vec();
    let mut report = PairingReport::default();
    let mut open_note_offs: FxHashMap<MidiNote, usize> = FxHashMap::default();

    for i in (0..r.len()).rev() {
        if !r[i].start_at.is_finite() {
            report.nan_times += 1;
            log::warn!(
                "recorder: {} for note {} has unusable start time {}",
                r[i].kind,
                r[i].number,
                r[i].start_at
            );
        }
        match r[i].kind {
            CommandKind::NoteOff => {
                if let Some(unmatched) = open_note_offs.insert(r[i].number, i) {
                    report.orphan_note_offs += 1;
                    log::warn!(
                        "recorder: orphan Note-Off for note {} at {}",
                        r[unmatched].number,
                        r[unmatched].start_at
                    );
                }
            }
            CommandKind::NoteOn => {
                if let Some(j) = open_note_offs.remove(&r[i].number) {
                    let end_at = r[j].start_at;
                    r[j].end_at = Some(end_at);
                    r[i].end_at = Some(end_at);
                    report.matched += 1;
                    let duration = end_at - r[i].start_at;
                    if !duration.is_finite() {
                        log::warn!(
                            "recorder: note {} at {} has unusable duration {duration}",
                            r[i].number,
                            r[i].start_at
                        );
                    }
                } else {
                    report.orphan_note_ons += 1;
                    log::warn!(
                        "recorder: orphan Note-On for note {} at {}",
                        r[i].number,
                        r[i].start_at
                    );
                }
            }
            _ => {}
        }
    }
    for j in open_note_offs.into_values() {
        report.orphan_note_offs += 1;
        log::warn!(
            "recorder: orphan Note-Off for note {} at {}",
            r[j].number,
            r[j].start_at
        );
    }
    (r, report)
}

/// A complete note reconstructed from a matched pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RecordedNote {
    #[allow(missing_docs)]
    pub number: MidiNote,
    #[allow(missing_docs)]
    pub velocity: u8,
    #[allow(missing_docs)]
    pub channel: Option<MidiChannel>,
    #[allow(missing_docs)]
    pub start: Seconds,
    #[allow(missing_docs)]
    pub duration: Seconds,
}

/// Turns the output of [pair_events()] into notes. Orphans and notes with
/// unusable durations are left out.
pub fn notes(paired: &[AudioCommand]) -> Vec<RecordedNote> {
    paired
        .iter()
        .filter(|c| c.is_note_on())
        .filter_map(|c| {
            c.duration()
                .filter(|d| d.is_finite())
                .map(|duration| RecordedNote {
                    number: c.number,
                    velocity: c.velocity,
                    channel: c.channel,
                    start: c.start_at,
                    duration,
                })
        })
        .collect()
}
