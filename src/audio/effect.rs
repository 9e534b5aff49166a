//! Effect kinds and parameter descriptors
//!
//! A descriptor is an immutable snapshot of one effect node's parameters.
//! Changing a node's parameters replaces its descriptor wholesale.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Filter cutoff range (Hz)
pub const FREQUENCY_RANGE: RangeInclusive<f64> = 20.0..=20_000.0;
/// Delay time range (seconds)
pub const DELAY_TIME_RANGE: RangeInclusive<f64> = 0.01..=1.0;
/// Delay feedback range (ratio)
pub const FEEDBACK_RANGE: RangeInclusive<f64> = 0.0..=0.95;
/// Reverb room size range (ratio)
pub const ROOM_SIZE_RANGE: RangeInclusive<f64> = 0.1..=1.0;
/// Reverb decay range (seconds)
pub const DECAY_RANGE: RangeInclusive<f64> = 0.1..=10.0;
/// Pitch shift range (semitones)
pub const SEMITONE_RANGE: RangeInclusive<i32> = -10..=10;

fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

/// Kind tag of an effect node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    HighPass,
    LowPass,
    Delay,
    Reverb,
    PitchShift,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::HighPass,
        EffectKind::LowPass,
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::PitchShift,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EffectKind::HighPass => "High Pass Filter",
            EffectKind::LowPass => "Low Pass Filter",
            EffectKind::Delay => "Delay",
            EffectKind::Reverb => "Reverb",
            EffectKind::PitchShift => "Pitch Shift",
        }
    }

    /// Descriptor holding this kind's default parameters
    pub fn default_descriptor(&self) -> EffectDescriptor {
        match self {
            EffectKind::HighPass => EffectDescriptor::HighPass(FilterParams::default()),
            EffectKind::LowPass => EffectDescriptor::LowPass(FilterParams::default()),
            EffectKind::Delay => EffectDescriptor::Delay(DelayParams::default()),
            EffectKind::Reverb => EffectDescriptor::Reverb(ReverbParams::default()),
            EffectKind::PitchShift => EffectDescriptor::PitchShift(PitchShiftParams::default()),
        }
    }
}

/// Parameters shared by the high-pass and low-pass filters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    /// Cutoff frequency in Hz
    #[serde(rename = "frequency")]
    pub frequency_hz: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self { frequency_hz: 1000.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayParams {
    /// Delay time in seconds
    pub delay_time: f64,
    /// Feedback ratio
    pub feedback: f64,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_time: 0.25,
            feedback: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverbParams {
    /// Room size ratio
    pub room_size: f64,
    /// Decay in seconds
    pub decay: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.7,
            decay: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PitchShiftParams {
    /// Semitone offset (may be negative)
    pub semitones: i32,
}

/// Parameter snapshot for one effect node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectDescriptor {
    HighPass(FilterParams),
    LowPass(FilterParams),
    Delay(DelayParams),
    Reverb(ReverbParams),
    PitchShift(PitchShiftParams),
}

impl EffectDescriptor {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectDescriptor::HighPass(_) => EffectKind::HighPass,
            EffectDescriptor::LowPass(_) => EffectKind::LowPass,
            EffectDescriptor::Delay(_) => EffectKind::Delay,
            EffectDescriptor::Reverb(_) => EffectKind::Reverb,
            EffectDescriptor::PitchShift(_) => EffectKind::PitchShift,
        }
    }

    /// Copy with every value pinned to its range
    pub fn clamped(&self) -> Self {
        match *self {
            EffectDescriptor::HighPass(p) => EffectDescriptor::HighPass(FilterParams {
                frequency_hz: clamp_to(p.frequency_hz, &FREQUENCY_RANGE),
            }),
            EffectDescriptor::LowPass(p) => EffectDescriptor::LowPass(FilterParams {
                frequency_hz: clamp_to(p.frequency_hz, &FREQUENCY_RANGE),
            }),
            EffectDescriptor::Delay(p) => EffectDescriptor::Delay(DelayParams {
                delay_time: clamp_to(p.delay_time, &DELAY_TIME_RANGE),
                feedback: clamp_to(p.feedback, &FEEDBACK_RANGE),
            }),
            EffectDescriptor::Reverb(p) => EffectDescriptor::Reverb(ReverbParams {
                room_size: clamp_to(p.room_size, &ROOM_SIZE_RANGE),
                decay: clamp_to(p.decay, &DECAY_RANGE),
            }),
            EffectDescriptor::PitchShift(p) => EffectDescriptor::PitchShift(PitchShiftParams {
                semitones: p
                    .semitones
                    .clamp(*SEMITONE_RANGE.start(), *SEMITONE_RANGE.end()),
            }),
        }
    }
}
