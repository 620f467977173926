use std::collections::TryReserveError;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use thiserror::Error;

use super::{Note, Score, WaveformKind};

/*
Score File Format
=================

A score is a flat list of notes, one per line. There is no header, footer or
section marker.

  # Twinkle, first bar         <- comment: '#' in the first column
  262 400                      <- note: frequency (Hz), duration (ms)
  262 400
  392 400   sol                <- anything after the second number is ignored

                               <- blank line
  440 400
  hello                        <- anything else is skipped, not an error

Lines are classified one at a time; nothing carries over between lines.


Scanning a Note Line
--------------------

A note line is read the way `"%u %u"` would read it:

    [ws] [+] digits [ws] [+] digits [anything]

  - leading whitespace before each number is skipped
  - each number may carry a '+' sign, never a '-'
  - each number is a non-empty run of ASCII digits
  - whatever follows the second number is never looked at

So "440 500", "  440\t500", "+440 500", "440 500 extra" and "440 500ms" are
all the note (440 Hz, 500 ms), while "440", "440 x 500", "+ 440 500" and
"-3 100" are not notes.
Numbers that do not fit in 32 bits make the line a non-note.

The parser is deliberately forgiving: a stray line in the middle of a long
score must not throw away everything else.
*/

/// Errors that can occur while reading a score
#[derive(Debug, Error)]
pub enum ParseError {
    /// The score file could not be opened
    #[error("failed to open score {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Reading from an already-open source failed
    #[error("failed to read score: {0}")]
    Read(#[from] io::Error),
    /// The note list could not grow
    #[error("out of memory while collecting notes: {0}")]
    Allocation(#[from] TryReserveError),
}

/// How a single line of input was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Blank,
    Comment,
    Note { frequency: u32, duration_ms: u32 },
    Other,
}

/// Parse a score held in memory.
pub fn parse(source: &str, waveform: WaveformKind) -> Result<Score, ParseError> {
    parse_reader(source.as_bytes(), waveform)
}

/// Parse the score file at `path`.
pub fn parse_file(path: impl AsRef<Path>, waveform: WaveformKind) -> Result<Score, ParseError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ParseError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("parsing score {}", path.display());
    parse_reader(BufReader::new(file), waveform)
}

/// Parse a score from any buffered reader.
///
/// Lines are read as raw bytes, so a score containing non-UTF-8 comments
/// still parses.
pub fn parse_reader<R: BufRead>(mut reader: R, waveform: WaveformKind) -> Result<Score, ParseError> {
    let mut score = Score::new();
    let mut line = Vec::new();
    let mut line_number = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_number += 1;

        match classify(strip_line_ending(&line)) {
            Line::Note {
                frequency,
                duration_ms,
            } => score.try_push(Note::new(frequency, duration_ms, waveform))?,
            Line::Other => trace!("line {line_number}: not a note, skipped"),
            Line::Blank | Line::Comment => {}
        }
    }

    debug!("parsed {} notes from {line_number} lines", score.len());
    Ok(score)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn classify(line: &[u8]) -> Line {
    match line.first() {
        None => Line::Blank,
        Some(b'#') => Line::Comment,
        Some(_) => scan_note(line).map_or(Line::Other, |(frequency, duration_ms)| Line::Note {
            frequency,
            duration_ms,
        }),
    }
}

fn scan_note(line: &[u8]) -> Option<(u32, u32)> {
    let (frequency, rest) = scan_u32(line)?;
    let (duration_ms, _) = scan_u32(rest)?;
    Some((frequency, duration_ms))
}

/// Skip leading whitespace and an optional '+', then read one unsigned
/// decimal integer. Returns the value and the unread remainder.
fn scan_u32(input: &[u8]) -> Option<(u32, &[u8])> {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace() && *b != b'\x0b')?;
    let input = &input[start..];
    let input = input.strip_prefix(b"+").unwrap_or(input);
    let digits = input.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    let value = input[..digits].iter().try_fold(0u32, |acc, &b| {
        acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
    })?;
    Some((value, &input[digits..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(text: &str) -> Vec<(u32, u32)> {
        parse(text, WaveformKind::Sine)
            .unwrap()
            .iter()
            .map(|n| (n.frequency, n.duration_ms))
            .collect()
    }

    #[test]
    fn test_parse_simple_notes() {
        assert_eq!(notes("440 500\n262 250\n"), vec![(440, 500), (262, 250)]);
    }

    #[test]
    fn test_trailing_tokens_and_whitespace() {
        assert_eq!(notes("440 500 extra tokens"), vec![(440, 500)]);
        assert_eq!(notes("  440 \t  500   "), vec![(440, 500)]);
        assert_eq!(notes("440 500ms"), vec![(440, 500)]);
        assert_eq!(notes("440 500 600"), vec![(440, 500)]);
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let text = "# header\n\n440 500\n#440 500\n\n";
        assert_eq!(notes(text), vec![(440, 500)]);
    }

    #[test]
    fn test_stray_lines_are_ignored() {
        let text = "hello\n440\n440 x 500\n-3 100\n330 100\n";
        assert_eq!(notes(text), vec![(330, 100)]);
    }

    #[test]
    fn test_only_first_column_hash_is_a_comment() {
        // Not a comment, but not a note either
        assert!(notes("  # 440 500").is_empty());
    }

    #[test]
    fn test_windows_line_endings() {
        assert_eq!(notes("440 500\r\n\r\n262 250\r\n"), vec![(440, 500), (262, 250)]);
    }

    #[test]
    fn test_overflowing_number_skips_line() {
        assert!(notes("4294967296 100").is_empty());
        assert_eq!(notes("4294967295 100"), vec![(u32::MAX, 100)]);
    }

    #[test]
    fn test_waveform_applied_to_every_note() {
        let score = parse("440 10\n220 10\n", WaveformKind::Square).unwrap();
        assert!(score.iter().all(|n| n.waveform == WaveformKind::Square));
    }

    #[test]
    fn test_zero_values_are_valid_notes() {
        assert_eq!(notes("0 250\n440 0\n"), vec![(0, 250), (440, 0)]);
    }

    #[test]
    fn test_empty_score_is_not_an_error() {
        let score = parse("# comment\n\n", WaveformKind::Sine).unwrap();
        assert!(score.is_empty());
    }

    #[test]
    fn test_non_utf8_comment() {
        let bytes: &[u8] = b"# \xff\xfe\n440 500\n";
        let score = parse_reader(bytes, WaveformKind::Sine).unwrap();
        assert_eq!(score.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let result = parse_file("/nonexistent/score.bmusic", WaveformKind::Sine);
        assert!(matches!(result, Err(ParseError::Open { .. })));
    }

    #[test]
    fn test_order_is_preserved() {
        let score = parse("1 1\n2 2\n3 3\n", WaveformKind::Sine).unwrap();
        let freqs: Vec<u32> = score.iter().map(|n| n.frequency).collect();
        assert_eq!(freqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_plus_sign_is_accepted() {
        assert_eq!(notes("+440 500\n440 +500\n  +262\t+125\n"), vec![(440, 500), (440, 500), (262, 125)]);
    }

    #[test]
    fn test_minus_and_bare_signs_are_not_notes() {
        assert!(notes("-440 500\n440 -500\n+ 440 500\n++440 500\n").is_empty());
    }
}
