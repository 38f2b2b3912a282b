// Copyright (c) 2024 Mike Tsao

//! Handles wall-clock and musical time.

use anyhow::{anyhow, Error};
use core::{
    fmt::{self, Display},
    ops::{Add, Div, Mul, Sub},
};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, FromRepr, IntoStaticStr};
use synonym::Synonym;

/// Beats per minute.
#[derive(Synonym, Serialize, Deserialize, Clone, Copy, Debug, Derivative, PartialEq)]
#[derivative(Default)]
#[synonym(skip(Default, Clone, Copy, Debug, Display, PartialEq))]
#[serde(rename_all = "kebab-case")]
pub struct Tempo(#[derivative(Default(value = "128.0"))] pub f64);
impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:0.2} BPM", self.0))
    }
}
impl From<u16> for Tempo {
    fn from(value: u16) -> Self {
        Self(value as f64)
    }
}
impl Tempo {
    /// The largest value we'll allow.
    pub const MAX_VALUE: f64 = 1024.0;

    /// The smallest value we'll allow. Zero itself is degenerate; see
    /// [Tempo::is_valid()].
    pub const MIN_VALUE: f64 = 0.0;

    /// Beats per second.
    pub fn bps(&self) -> f64 {
        self.0 / 60.0
    }

    /// Whether this tempo can be used for time conversions. A zero, negative,
    /// or non-finite tempo can't.
    pub fn is_valid(&self) -> bool {
        self.0.is_finite() && self.0 > Self::MIN_VALUE
    }

    /// MIN..=MAX
    pub const fn range() -> core::ops::RangeInclusive<f64> {
        Self::MIN_VALUE..=Self::MAX_VALUE
    }
}

/// [TimeSignature] represents a music [time
/// signature](https://en.wikipedia.org/wiki/Time_signature).
///
/// The top number tells how many beats are in a measure. The bottom number
/// tells the value of a beat. At 120 BPM in 4/4, each beat takes a half-second
/// and a measure takes two seconds.
#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSignature {
    /// The number of beats in a measure.
    #[derivative(Default(value = "4"))]
    pub top: usize,

    /// The value of a beat. Expressed as a reciprocal; for example, if it's 4,
    /// then the beat value is 1/4 or a quarter note.
    #[derivative(Default(value = "4"))]
    pub bottom: usize,
}
impl Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}/{}", self.top, self.bottom))
    }
}
#[allow(missing_docs)]
impl TimeSignature {
    /// C time = common time = 4/4
    pub const COMMON_TIME: Self = TimeSignature { top: 4, bottom: 4 };

    /// Cut time = alla breve = 2/2
    pub const CUT_TIME: Self = TimeSignature { top: 2, bottom: 2 };

    pub fn new_with(top: usize, bottom: usize) -> anyhow::Result<Self, Error> {
        if top == 0 {
            Err(anyhow!("Time signature top can't be zero."))
        } else if bottom.is_power_of_two() && (1..=64).contains(&bottom) {
            Ok(Self { top, bottom })
        } else {
            Err(anyhow!("Time signature bottom was out of range."))
        }
    }

    /// The length of one bar, measured in quarter notes. 4/4 is four quarter
    /// notes; 6/8 is three.
    pub fn quarters_per_bar(&self) -> f64 {
        if self.bottom == 0 {
            return 0.0;
        }
        self.top as f64 * 4.0 / self.bottom as f64
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }
}

/// Represents the [seconds](https://en.wikipedia.org/wiki/Second) unit of time.
///
/// Serializes as a plain number. JSON has no NaN or infinity, so those are
/// written as the strings `"NaN"`, `"inf"` and `"-inf"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "SecondsRepr", into = "SecondsRepr")]
pub struct Seconds(pub f64);

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum SecondsRepr {
    Finite(f64),
    NonFinite(NonFinite),
    /// Older files wrote non-finite times as `null`.
    Null(()),
}
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
enum NonFinite {
    #[serde(rename = "NaN")]
    NaN,
    #[serde(rename = "inf")]
    Infinity,
    #[serde(rename = "-inf")]
    NegInfinity,
}
impl From<Seconds> for SecondsRepr {
    fn from(value: Seconds) -> Self {
        match value.0 {
            v if v.is_finite() => SecondsRepr::Finite(v),
            v if v.is_nan() => SecondsRepr::NonFinite(NonFinite::NaN),
            v if v > 0.0 => SecondsRepr::NonFinite(NonFinite::Infinity),
            _ => SecondsRepr::NonFinite(NonFinite::NegInfinity),
        }
    }
}
impl From<SecondsRepr> for Seconds {
    fn from(value: SecondsRepr) -> Self {
        Seconds(match value {
            SecondsRepr::Finite(v) => v,
            SecondsRepr::NonFinite(NonFinite::NaN) | SecondsRepr::Null(()) => f64::NAN,
            SecondsRepr::NonFinite(NonFinite::Infinity) => f64::INFINITY,
            SecondsRepr::NonFinite(NonFinite::NegInfinity) => f64::NEG_INFINITY,
        })
    }
}
impl Seconds {
    /// Zero seconds.
    pub const fn zero() -> Seconds {
        Seconds(0.0)
    }

    /// Converts milliseconds to [Seconds].
    pub fn from_millis(millis: f64) -> Seconds {
        Seconds(millis / 1000.0)
    }

    /// Whether this is a usable time. NaN and infinities aren't.
    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    #[allow(missing_docs)]
    pub fn max(self, other: Seconds) -> Seconds {
        Seconds(self.0.max(other.0))
    }
}
impl Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:0.3}s", self.0))
    }
}
impl From<f64> for Seconds {
    fn from(value: f64) -> Self {
        Self(value)
    }
}
impl From<Seconds> for f64 {
    fn from(value: Seconds) -> Self {
        value.0
    }
}
impl Add for Seconds {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}
impl Sub for Seconds {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}
impl Mul<f64> for Seconds {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}
impl Div<usize> for Seconds {
    type Output = Self;

    fn div(self, rhs: usize) -> Self::Output {
        Self(self.0 / rhs as f64)
    }
}

/// The grid sizes used for quantising and for stepping generative stages.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    EnumIter,
    EnumString,
    Eq,
    FromRepr,
    IntoStaticStr,
    PartialEq,
    Serialize,
    Deserialize,
    StrumDisplay,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Subdivision {
    /// One whole bar of the current time signature.
    Bar,
    /// minim
    Half,
    /// crotchet
    Quarter,
    /// quaver
    Eighth,
    /// semiquaver
    #[default]
    Sixteenth,
    /// demisemiquaver
    ThirtySecond,
}
impl Subdivision {
    /// The length of this subdivision in ticks, given a time signature (which
    /// matters only for [Subdivision::Bar]).
    pub fn ticks(&self, time_signature: &TimeSignature) -> f64 {
        let ppq = crate::timing::PPQ as f64;
        match self {
            Subdivision::Bar => ppq * time_signature.quarters_per_bar(),
            Subdivision::Half => ppq * 2.0,
            Subdivision::Quarter => ppq,
            Subdivision::Eighth => ppq / 2.0,
            Subdivision::Sixteenth => ppq / 4.0,
            Subdivision::ThirtySecond => ppq / 8.0,
        }
    }
}
