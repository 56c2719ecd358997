// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt::{self, Debug, Display, Formatter};
use core::str::FromStr;

use serde::ser::Serializer;
use serde::Serialize;

const F64_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Numeric payload of a [`crate::Value`].
///
/// Record documents only ever carry JSON numbers, so there is no arbitrary precision here:
/// integers that fit in 64 bits stay exact, everything else is a float.
#[derive(Clone, Copy)]
pub enum Number {
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_exact_i128(&self) -> Option<i128> {
        match self {
            Number::UInt(v) => Some(*v as i128),
            Number::Int(v) => Some(*v as i128),
            Number::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() <= F64_SAFE_INTEGER {
                    Some(*f as i128)
                } else {
                    None
                }
            }
        }
    }

    fn to_f64_lossy(self) -> f64 {
        match self {
            Number::UInt(v) => v as f64,
            Number::Int(v) => v as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.as_exact_i128().is_some()
    }

    pub fn format_decimal(&self) -> String {
        match self {
            Number::UInt(v) => v.to_string(),
            Number::Int(v) => v.to_string(),
            Number::Float(f) => match self.as_exact_i128() {
                Some(i) => i.to_string(),
                None if f.is_nan() => "NaN".to_string(),
                None => f.to_string(),
            },
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Integral floats are written without a fractional part.
        match (self, self.as_exact_i128()) {
            (Number::UInt(v), _) => serializer.serialize_u64(*v),
            (Number::Int(v), _) => serializer.serialize_i64(*v),
            (Number::Float(_), Some(i)) if i >= 0 => serializer.serialize_u64(i as u64),
            (Number::Float(_), Some(i)) => serializer.serialize_i64(i as i64),
            (Number::Float(f), None) => serializer.serialize_f64(*f),
        }
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Number::UInt(value)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number::UInt(value as u64)
    }
}

impl From<u32> for Number {
    fn from(value: u32) -> Self {
        Number::UInt(u64::from(value))
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        if value >= 0 {
            Number::UInt(value as u64)
        } else {
            Number::Int(value)
        }
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::from(i64::from(value))
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseNumberError;

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(u) = trimmed.parse::<u64>() {
            return Ok(Number::UInt(u));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        trimmed
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| ParseNumberError)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_exact_i128(), other.as_exact_i128()) {
            return a == b;
        }
        let (a, b) = (self.to_f64_lossy(), other.to_f64_lossy());
        !a.is_nan() && !b.is_nan() && a == b
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_exact_i128(), other.as_exact_i128()) {
            return a.cmp(&b);
        }
        self.to_f64_lossy()
            .partial_cmp(&other.to_f64_lossy())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
