//! Kubernetes resource quantities for the two dimensions a quota caps.
//!
//! Only what quota policies need: parse the usual notations (`500m`, `1.5`,
//! `1Gi`, `512M`, `1e3`) into integral millicores / bytes, rounding up like the
//! API server does, and format them back in canonical form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid quantity {input:?}: {reason}")]
pub struct QuantityError {
    pub input: String,
    pub reason: &'static str,
}

fn err(input: &str, reason: &'static str) -> QuantityError {
    QuantityError { input: input.to_string(), reason }
}

/// Multiplier and divisor for a suffix, or `None` when the suffix is unknown.
fn suffix_scale(suffix: &str) -> Option<(u128, u128)> {
    const K: u128 = 1024;
    let s = match suffix {
        "" => (1, 1),
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (K, 1),
        "Mi" => (K.pow(2), 1),
        "Gi" => (K.pow(3), 1),
        "Ti" => (K.pow(4), 1),
        "Pi" => (K.pow(5), 1),
        "Ei" => (K.pow(6), 1),
        exp if exp.len() > 1 && (exp.starts_with('e') || exp.starts_with('E')) => {
            let n: i32 = exp[1..].parse().ok()?;
            let p = 10u128.checked_pow(n.unsigned_abs())?;
            if n >= 0 { (p, 1) } else { (1, p) }
        }
        _ => return None,
    };
    Some(s)
}

/// Parse a quantity into thousandths of its base unit, rounding up.
fn parse_milli(input: &str) -> Result<u128, QuantityError> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.starts_with('-') {
        return Err(err(input, "negative quantities are not allowed"));
    }
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(err(input, "missing number"));
    }
    if frac_part.contains('.') {
        return Err(err(input, "more than one decimal point"));
    }
    let (mul, div) = suffix_scale(suffix).ok_or_else(|| err(input, "unknown suffix"))?;

    let digits: u128 = format!("{int_part}{frac_part}")
        .parse()
        .map_err(|_| err(input, "number out of range"))?;
    let frac_den = 10u128
        .checked_pow(frac_part.len() as u32)
        .ok_or_else(|| err(input, "too many decimal places"))?;

    let num = digits
        .checked_mul(mul)
        .and_then(|v| v.checked_mul(1000))
        .ok_or_else(|| err(input, "number out of range"))?;
    let den = frac_den.checked_mul(div).ok_or_else(|| err(input, "number out of range"))?;
    Ok(num.div_ceil(den))
}

/// CPU amount in millicores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpu(u64);

impl Cpu {
    pub const fn millis(m: u64) -> Self { Self(m) }
    pub const fn cores(c: u64) -> Self { Self(c * 1000) }
    pub const fn as_millis(self) -> u64 { self.0 }
}

impl FromStr for Cpu {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let m = parse_milli(s)?;
        u64::try_from(m).map(Cpu).map_err(|_| err(s, "number out of range"))
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 { write!(f, "{}", self.0 / 1000) } else { write!(f, "{}m", self.0) }
    }
}

/// Memory amount in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Memory(u64);

impl Memory {
    pub const fn bytes(b: u64) -> Self { Self(b) }
    pub const fn mib(n: u64) -> Self { Self(n << 20) }
    pub const fn gib(n: u64) -> Self { Self(n << 30) }
    pub const fn as_bytes(self) -> u64 { self.0 }
}

impl FromStr for Memory {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = parse_milli(s)?.div_ceil(1000);
        u64::try_from(b).map(Memory).map_err(|_| err(s, "number out of range"))
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(&str, u32); 6] = [("Ei", 60), ("Pi", 50), ("Ti", 40), ("Gi", 30), ("Mi", 20), ("Ki", 10)];
        if self.0 != 0 {
            for (suffix, shift) in UNITS {
                let unit = 1u64 << shift;
                if self.0 % unit == 0 {
                    return write!(f, "{}{}", self.0 / unit, suffix);
                }
            }
        }
        write!(f, "{}", self.0)
    }
}

macro_rules! string_conversions {
    ($t:ty) => {
        impl TryFrom<String> for $t {
            type Error = QuantityError;
            fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
        }

        impl From<$t> for String {
            fn from(v: $t) -> String { v.to_string() }
        }
    };
}

string_conversions!(Cpu);
string_conversions!(Memory);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_notations() {
        assert_eq!("1".parse::<Cpu>().unwrap(), Cpu::cores(1));
        assert_eq!("500m".parse::<Cpu>().unwrap(), Cpu::millis(500));
        assert_eq!("1.5".parse::<Cpu>().unwrap(), Cpu::millis(1500));
        assert_eq!("0.1".parse::<Cpu>().unwrap(), Cpu::millis(100));
        // sub-millicore rounds up
        assert_eq!("1n".parse::<Cpu>().unwrap(), Cpu::millis(1));
        assert_eq!("2e3".parse::<Cpu>().unwrap(), Cpu::cores(2000));
    }

    #[test]
    fn memory_notations() {
        assert_eq!("1Gi".parse::<Memory>().unwrap(), Memory::gib(1));
        assert_eq!("512Mi".parse::<Memory>().unwrap(), Memory::mib(512));
        assert_eq!("1G".parse::<Memory>().unwrap(), Memory::bytes(1_000_000_000));
        assert_eq!("1024".parse::<Memory>().unwrap(), Memory::bytes(1024));
        assert_eq!("1.5Gi".parse::<Memory>().unwrap(), Memory::mib(1536));
        assert_eq!("1E".parse::<Memory>().unwrap(), Memory::bytes(1_000_000_000_000_000_000));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "abc", "-1", "1.2.3", "5Xi", "."] {
            assert!(bad.parse::<Cpu>().is_err(), "{bad}");
            assert!(bad.parse::<Memory>().is_err(), "{bad}");
        }
    }

    #[test]
    fn canonical_formatting() {
        assert_eq!(Cpu::cores(5).to_string(), "5");
        assert_eq!(Cpu::millis(250).to_string(), "250m");
        assert_eq!(Memory::gib(5).to_string(), "5Gi");
        assert_eq!(Memory::mib(1536).to_string(), "1536Mi");
        assert_eq!(Memory::bytes(1_000_000_000).to_string(), "1000000000");
        assert_eq!(Memory::bytes(0).to_string(), "0");
    }

    #[test]
    fn serde_uses_quantity_strings() {
        let v = serde_json::to_value(Memory::gib(1)).unwrap();
        assert_eq!(v, serde_json::json!("1Gi"));
        let back: Cpu = serde_json::from_value(serde_json::json!("1500m")).unwrap();
        assert_eq!(back, Cpu::millis(1500));
    }
}
