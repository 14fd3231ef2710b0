//! Register word codec.
//!
//! Everything here is pure: slices of 16-bit register words go in, typed
//! values come out. Scale-factor validation never fails loudly; a value that
//! cannot be trusted becomes `None` and is logged.

use crate::prelude::*;

/// Longest string a bitmask field renders to.
pub const MAX_STRING_LEN: usize = 255;

/// Largest plausible magnitude of a SunSpec scale factor. Anything outside
/// this (notably the not-implemented sentinel 0x8000) is treated as garbage.
const MAX_SCALE_FACTOR: i16 = 10;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum WordOrder {
    /// High word first.
    #[default]
    Big,
    Little,
}

fn expect_len(registers: &[u16], expected: usize) -> Result<(), CodecError> {
    if registers.len() != expected {
        return Err(CodecError::Size {
            expected,
            got: registers.len(),
        });
    }
    Ok(())
}

pub fn to_u16(registers: &[u16]) -> Result<u16, CodecError> {
    expect_len(registers, 1)?;
    Ok(registers[0])
}

pub fn to_i16(registers: &[u16]) -> Result<i16, CodecError> {
    expect_len(registers, 1)?;
    Ok(registers[0] as i16)
}

pub fn to_u32(registers: &[u16], order: WordOrder) -> Result<u32, CodecError> {
    expect_len(registers, 2)?;
    let (high, low) = match order {
        WordOrder::Big => (registers[0], registers[1]),
        WordOrder::Little => (registers[1], registers[0]),
    };
    Ok((u32::from(high) << 16) | u32::from(low))
}

/// Decode a fixed-length, NUL padded string field.
pub fn to_string(registers: &[u16], order: WordOrder) -> String {
    let mut words = registers.to_vec();
    if order == WordOrder::Little {
        words.reverse();
    }

    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    strip_escapes(&String::from_utf8_lossy(&bytes))
}

/// Remove ASCII control characters and surrounding whitespace.
pub fn strip_escapes(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(*c, '\u{00}'..='\u{1f}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `round(value * 10^sf, digits)`, or `None` when the inputs are not usable
/// or the result falls outside `[lower, upper]`.
pub fn calculate_value(
    value: f64,
    sf: i16,
    digits: u32,
    lower: Option<f64>,
    upper: Option<f64>,
) -> Option<f64> {
    if !value.is_finite() || sf.abs() > MAX_SCALE_FACTOR {
        debug!("unusable raw value {} with scale factor {}", value, sf);
        return None;
    }

    let scaled = round(value * 10f64.powi(i32::from(sf)), digits);

    if lower.is_some_and(|l| scaled < l) || upper.is_some_and(|u| scaled > u) {
        error!(
            "value {} out of range [{:?}, {:?}], raw {} sf {}",
            scaled, lower, upper, value, sf
        );
        return None;
    }

    Some(scaled)
}

pub fn round(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// A validated bit index to label table for one bitmask register field.
#[derive(Clone, Debug)]
pub struct BitLabels {
    width: u8,
    labels: &'static [(u8, &'static str)],
}

impl BitLabels {
    pub fn new(width: u8, labels: &'static [(u8, &'static str)]) -> Result<Self, CodecError> {
        for (i, (bit, _)) in labels.iter().enumerate() {
            if *bit >= width {
                return Err(CodecError::BitOutOfRange { bit: *bit, width });
            }
            if labels[..i].iter().any(|(other, _)| other == bit) {
                return Err(CodecError::DuplicateBit(*bit));
            }
        }

        Ok(Self { width, labels })
    }

    fn label(&self, bit: u8) -> Option<&'static str> {
        self.labels
            .iter()
            .find(|(b, _)| *b == bit)
            .map(|(_, label)| *label)
    }

    /// Labels for every set bit, lowest first.
    pub fn to_strings(&self, mask: u32) -> Vec<String> {
        (0..self.width)
            .filter(|bit| mask & (1u32 << bit) != 0)
            .map(|bit| match self.label(bit) {
                Some(label) => label.to_string(),
                None => format!("bit {} undefined", bit),
            })
            .collect()
    }

    pub fn to_string(&self, mask: u32, default: &str) -> String {
        strings_to_string(&self.to_strings(mask), default)
    }
}

/// Join with `,`; empty input renders as `default`; capped at
/// [`MAX_STRING_LEN`] characters.
pub fn strings_to_string(strings: &[String], default: &str) -> String {
    if strings.is_empty() {
        return default.to_string();
    }
    strings.join(",").chars().take(MAX_STRING_LEN).collect()
}

/// Typed, bounds-checked access into a block of registers read in one go.
/// Offsets are relative to the start of the block.
#[derive(Clone, Copy, Debug)]
pub struct RegisterBlock<'a> {
    words: &'a [u16],
}

impl<'a> RegisterBlock<'a> {
    pub fn new(words: &'a [u16], expected: u16) -> Result<Self, CodecError> {
        expect_len(words, usize::from(expected))?;
        Ok(Self { words })
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u16], CodecError> {
        self.words
            .get(offset..offset + len)
            .ok_or(CodecError::Size {
                expected: offset + len,
                got: self.words.len(),
            })
    }

    pub fn u16(&self, offset: usize) -> Result<u16, CodecError> {
        to_u16(self.slice(offset, 1)?)
    }

    pub fn i16(&self, offset: usize) -> Result<i16, CodecError> {
        to_i16(self.slice(offset, 1)?)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, CodecError> {
        to_u32(self.slice(offset, 2)?, WordOrder::Big)
    }

    pub fn string(&self, offset: usize, len: usize) -> Result<String, CodecError> {
        Ok(to_string(self.slice(offset, len)?, WordOrder::Big))
    }
}
