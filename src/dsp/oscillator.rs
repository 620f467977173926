#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::SAMPLE_RATE;

/*
Tone Generation
===============

Each note is synthesized on its own, straight into 16-bit PCM.

  ω          Angular step per sample: 2π · frequency / sample_rate.

  i          Sample index, counted from 0 at the start of the note.

  amplitude  32760, a hair under i16::MAX so no sample can wrap.

Sine:    sample[i] = round(32760 · sin(i·ω))
Square:  sample[i] = +32760 when sin(i·ω) ≥ 0, otherwise -32760

The square wave is derived from the sign of the sine rather than from a phase
accumulator, so both waveforms cross zero at exactly the same samples.


Phase Is Not Carried Between Notes
----------------------------------

`i` restarts at 0 for every note. Two consecutive notes therefore both begin
at phase 0, even if the previous note stopped halfway through a cycle:

    note A ends here
            │
    ╱╲  ╱╲  │╱╲
      ╲╱  ╲╱│  ╲╱   ← note B restarts the cycle
            │

At note boundaries this can produce an audible click. Rendering is kept this
way so that every note's samples depend only on that note.


Edge Cases
----------

  frequency = 0   ω = 0, so sin(i·ω) = 0 for all i.
                  Sine renders silence, square renders a constant +32760.
*/

/// Peak sample value produced by the generator.
pub const AMPLITUDE: i16 = 32760;

/// Shape of the generated tone
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveformKind {
    Square,
    #[default]
    Sine,
}

/// Synthesize `sample_count` samples of `kind` at `frequency_hz`.
pub fn generate(kind: WaveformKind, frequency_hz: u32, sample_count: usize) -> Vec<i16> {
    let mut samples = vec![0; sample_count];
    fill(kind, frequency_hz, &mut samples);
    samples
}

/// Overwrite `out` with a tone, starting at phase 0.
///
/// Pure with respect to everything but `out`, so disjoint ranges of one
/// buffer can be filled in any order.
pub fn fill(kind: WaveformKind, frequency_hz: u32, out: &mut [i16]) {
    let omega = angular_step(frequency_hz);
    let amplitude = f64::from(AMPLITUDE);

    match kind {
        WaveformKind::Sine => {
            for (i, sample) in out.iter_mut().enumerate() {
                let value = (amplitude * (i as f64 * omega).sin()).round();
                *sample = value.clamp(-amplitude, amplitude) as i16;
            }
        }
        WaveformKind::Square => {
            for (i, sample) in out.iter_mut().enumerate() {
                *sample = if (i as f64 * omega).sin() >= 0.0 {
                    AMPLITUDE
                } else {
                    -AMPLITUDE
                };
            }
        }
    }
}

#[inline]
fn angular_step(frequency_hz: u32) -> f64 {
    std::f64::consts::TAU * f64::from(frequency_hz) / f64::from(SAMPLE_RATE)
}
