//! Signal generation primitives.
//!
//! Everything here is a pure function over sample slices: no I/O, no shared
//! state, and no knowledge of where the samples end up.

/// Sine and square tone generation.
pub mod oscillator;

pub use oscillator::{fill, generate, WaveformKind, AMPLITUDE};
