//! Note lists: the in-memory score and the parser for `.bmusic` text files.

pub mod parser;

pub use parser::{parse, parse_file, parse_reader, ParseError};

pub use crate::dsp::oscillator::WaveformKind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single tone: pitch in Hz held for a number of milliseconds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Frequency in Hz (0 is allowed and renders as silence or DC)
    pub frequency: u32,
    /// How long the note lasts, in milliseconds
    pub duration_ms: u32,
    pub waveform: WaveformKind,
}

impl Note {
    pub const fn new(frequency: u32, duration_ms: u32, waveform: WaveformKind) -> Self {
        Self {
            frequency,
            duration_ms,
            waveform,
        }
    }
}

/// Notes in playback order.
///
/// The order notes were parsed in is the order they are rendered in. A score
/// only grows while it is being parsed; afterwards it is read-only.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    notes: Vec<Note>,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    /// Append a note, failing instead of aborting if the list cannot grow.
    pub(crate) fn try_push(&mut self, note: Note) -> Result<(), std::collections::TryReserveError> {
        self.notes.try_reserve(1)?;
        self.notes.push(note);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Score {
    type Item = &'a Note;
    type IntoIter = std::slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

impl FromIterator<Note> for Score {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        Self {
            notes: iter.into_iter().collect(),
        }
    }
}
