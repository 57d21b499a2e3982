//! Codec for the delimited sensation code format.
//!
//! A sensation code looks like `index~name~micro&micro~icon~`, where every
//! micro-sensation is `frequency,duration,intensity,fade_in,fade_out,exit_time,name|shock,shock`.
//! Tokens are kept as text; only `duration` and `exit_time` are read as numbers,
//! and only when [`ParsedSensation::total_duration`] is asked for.

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

pub const SEGMENT_DELIMITER: char = '~';
pub const MICRO_DELIMITER: char = '&';
pub const PART_DELIMITER: char = '|';
pub const FIELD_DELIMITER: char = ',';

const SEGMENT_COUNT: usize = 5;
const PART_COUNT: usize = 2;
const METRIC_COUNT: usize = 7;
const DECISECONDS_PER_SECOND: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("sensation code \"{input}\" doesn't have the appropriate number of segments: expected {expected}, received {actual}")]
    WrongSegmentCount {
        input: String,
        expected: usize,
        actual: usize,
    },
    #[error("sensation code \"{input}\" must end with '~' but carries trailing text \"{trailing}\"")]
    TrailingSegment { input: String, trailing: String },
    #[error("micro sensation \"{input}\" doesn't have the appropriate number of parts: expected {expected}, received {actual}")]
    WrongPartCount {
        input: String,
        expected: usize,
        actual: usize,
    },
    #[error("micro sensation metrics \"{input}\" don't have the appropriate number of fields: expected {expected}, received {actual}")]
    WrongFieldCount {
        input: String,
        expected: usize,
        actual: usize,
    },
    #[error("micro sensation field `{field}` is not a non-negative number: \"{value}\"")]
    InvalidNumber { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroSensation {
    pub frequency: String,
    /// Deciseconds.
    pub duration: String,
    pub intensity: String,
    pub fade_in: String,
    pub fade_out: String,
    /// Deciseconds.
    pub exit_time: String,
    pub name: String,
    pub shocks: Vec<String>,
}

impl MicroSensation {
    pub fn parse(input: &str) -> Result<Self, FormatError> {
        let parts: Vec<&str> = input.split(PART_DELIMITER).collect();
        if parts.len() != PART_COUNT {
            return Err(FormatError::WrongPartCount {
                input: input.to_string(),
                expected: PART_COUNT,
                actual: parts.len(),
            });
        }

        let metrics = split_trimmed(parts[0]);
        let fields: [String; METRIC_COUNT] =
            metrics
                .try_into()
                .map_err(|metrics: Vec<String>| FormatError::WrongFieldCount {
                    input: parts[0].to_string(),
                    expected: METRIC_COUNT,
                    actual: metrics.len(),
                })?;
        let [frequency, duration, intensity, fade_in, fade_out, exit_time, name] = fields;

        Ok(Self {
            frequency,
            duration,
            intensity,
            fade_in,
            fade_out,
            exit_time,
            name,
            shocks: split_trimmed(parts[1]),
        })
    }

    pub fn seconds(&self) -> Result<f64, FormatError> {
        let duration = parse_deciseconds("duration", &self.duration)?;
        let exit_time = parse_deciseconds("exit_time", &self.exit_time)?;
        Ok((duration + exit_time) / DECISECONDS_PER_SECOND)
    }
}

impl fmt::Display for MicroSensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics = [
            &self.frequency,
            &self.duration,
            &self.intensity,
            &self.fade_in,
            &self.fade_out,
            &self.exit_time,
            &self.name,
        ];
        write_joined(f, metrics, FIELD_DELIMITER)?;
        write!(f, "{PART_DELIMITER}")?;
        write_joined(f, &self.shocks, FIELD_DELIMITER)
    }
}

impl FromStr for MicroSensation {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Micro-sensations in playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensationCode(pub Vec<MicroSensation>);

impl SensationCode {
    pub fn parse(input: &str) -> Result<Self, FormatError> {
        input
            .split(MICRO_DELIMITER)
            .map(MicroSensation::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn micros(&self) -> &[MicroSensation] {
        &self.0
    }

    pub fn total_seconds(&self) -> Result<f64, FormatError> {
        self.0.iter().map(MicroSensation::seconds).sum()
    }
}

impl fmt::Display for SensationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, &self.0, MICRO_DELIMITER)
    }
}

impl FromStr for SensationCode {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSensation {
    pub index: String,
    pub name: String,
    pub code: SensationCode,
    pub icon: String,
}

impl ParsedSensation {
    pub fn parse(input: &str) -> Result<Self, FormatError> {
        let segments: Vec<&str> = input.split(SEGMENT_DELIMITER).collect();
        if segments.len() != SEGMENT_COUNT {
            return Err(FormatError::WrongSegmentCount {
                input: input.to_string(),
                expected: SEGMENT_COUNT,
                actual: segments.len(),
            });
        }
        if !segments[4].is_empty() {
            return Err(FormatError::TrailingSegment {
                input: input.to_string(),
                trailing: segments[4].to_string(),
            });
        }

        Ok(Self {
            index: segments[0].to_string(),
            name: segments[1].to_string(),
            code: SensationCode::parse(segments[2])?,
            icon: segments[3].to_string(),
        })
    }

    pub fn total_duration(&self) -> Result<Duration, FormatError> {
        let seconds = self.code.total_seconds()?;
        Duration::try_from_secs_f64(seconds).map_err(|_| FormatError::InvalidNumber {
            field: "total_duration",
            value: seconds.to_string(),
        })
    }
}

impl fmt::Display for ParsedSensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = SEGMENT_DELIMITER;
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}{sep}",
            self.index, self.name, self.code, self.icon
        )
    }
}

impl FromStr for ParsedSensation {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn parse(input: &str) -> Result<ParsedSensation, FormatError> {
    ParsedSensation::parse(input)
}

pub fn serialize(sensation: &ParsedSensation) -> String {
    sensation.to_string()
}

fn split_trimmed(input: &str) -> Vec<String> {
    input
        .split(FIELD_DELIMITER)
        .map(|token| token.trim().to_string())
        .collect()
}

fn parse_deciseconds(field: &'static str, value: &str) -> Result<f64, FormatError> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => Ok(parsed),
        _ => Err(FormatError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

fn write_joined<I>(f: &mut fmt::Formatter<'_>, items: I, sep: char) -> fmt::Result
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    for (position, item) in items.into_iter().enumerate() {
        if position > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
