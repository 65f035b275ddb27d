//! Physical units attached to pixel sizes.
//!
//! Only the subset needed to carry ICS `parameter units` values through a
//! read/write cycle is understood: products of SI-prefixed base units with
//! optional integer powers, plus a few long spellings that microscopy
//! software commonly writes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const BASE_UNITS: &[&str] = &["cd", "mol", "rad", "sr", "Hz", "deg", "cycle", "m", "s", "g", "A", "K"];

const PREFIXES: &[(&str, &str)] = &[
    ("y", "y"), ("z", "z"), ("a", "a"), ("f", "f"), ("p", "p"), ("n", "n"),
    ("u", "u"), ("\u{b5}", "u"), ("\u{3bc}", "u"), ("m", "m"), ("c", "c"),
    ("d", "d"), ("k", "k"), ("M", "M"), ("G", "G"), ("T", "T"), ("P", "P"),
    ("E", "E"), ("Z", "Z"), ("Y", "Y"),
];

const LONG_NAMES: &[(&str, &str)] = &[
    ("meter", "m"), ("meters", "m"), ("metre", "m"), ("metres", "m"),
    ("millimeter", "mm"), ("millimeters", "mm"),
    ("micrometer", "um"), ("micrometers", "um"), ("micron", "um"), ("microns", "um"),
    ("nanometer", "nm"), ("nanometers", "nm"),
    ("second", "s"), ("seconds", "s"), ("millisecond", "ms"), ("milliseconds", "ms"),
    ("radian", "rad"), ("radians", "rad"), ("degree", "deg"), ("degrees", "deg"),
];

/// A unit expression such as `um`, `ms` or `m.s^-1`.
///
/// The empty unit is dimensionless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    text: String,
}

impl Units {
    pub fn dimensionless() -> Self {
        Self::default()
    }

    /// Parses a unit string. `""`, `"undefined"`, `"pixel"` and `"px"`
    /// are dimensionless.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("undefined") || matches!(s, "px" | "pixel" | "pixels") {
            return Ok(Self::dimensionless());
        }
        if let Some((_, short)) = LONG_NAMES.iter().find(|(long, _)| long.eq_ignore_ascii_case(s)) {
            return Ok(Self { text: (*short).to_string() });
        }

        let mut factors = Vec::new();
        let mut sign = 1i32;
        let mut rest = s;
        loop {
            let end = rest.find(['.', '/']).unwrap_or(rest.len());
            let (symbol, power) = parse_factor(&rest[..end]).ok_or_else(|| Error::InvalidUnits(s.to_string()))?;
            factors.push((symbol, power * sign));
            if end == rest.len() {
                break;
            }
            if rest[end..].starts_with('/') {
                sign = -1;
            }
            rest = &rest[end + 1..];
        }

        let text = factors
            .iter()
            .map(|(symbol, power)| match power {
                1 => symbol.clone(),
                p => format!("{}^{}", symbol, p),
            })
            .collect::<Vec<_>>()
            .join(".");
        Ok(Self { text })
    }

    pub fn is_dimensionless(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Splits `[prefix]base[^power]` into a normalized symbol and its power.
fn parse_factor(factor: &str) -> Option<(String, i32)> {
    let (symbol, power) = match factor.split_once('^') {
        Some((symbol, power)) => (symbol, power.parse::<i32>().ok()?),
        None => (factor, 1),
    };
    if power == 0 || symbol.is_empty() {
        return None;
    }
    if BASE_UNITS.contains(&symbol) {
        return Some((symbol.to_string(), power));
    }
    PREFIXES.iter().find_map(|(prefix, normalized)| {
        let base = symbol.strip_prefix(prefix)?;
        BASE_UNITS
            .contains(&base)
            .then(|| (format!("{}{}", normalized, base), power))
    })
}

/// A magnitude with units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalQuantity {
    pub magnitude: f64,
    pub units: Units,
}

impl PhysicalQuantity {
    pub fn new(magnitude: f64, units: Units) -> Self {
        Self { magnitude, units }
    }

    /// A scale-only quantity.
    pub fn dimensionless(magnitude: f64) -> Self {
        Self::new(magnitude, Units::dimensionless())
    }

    /// One dimensionless unit, the size of a pixel without calibration.
    pub fn pixel() -> Self {
        Self::dimensionless(1.0)
    }

    pub fn is_pixel(&self) -> bool {
        self.magnitude == 1.0 && self.units.is_dimensionless()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert_eq!(Units::parse("um").unwrap().as_str(), "um");
        assert_eq!(Units::parse("\u{3bc}m").unwrap().as_str(), "um");
        assert_eq!(Units::parse("micrometers").unwrap().as_str(), "um");
        assert_eq!(Units::parse("cd").unwrap().as_str(), "cd");
        assert_eq!(Units::parse("mm").unwrap().as_str(), "mm");
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(Units::parse("m/s").unwrap().as_str(), "m.s^-1");
        assert_eq!(Units::parse("m^2.s").unwrap().as_str(), "m^2.s");
    }

    #[test]
    fn test_dimensionless() {
        assert!(Units::parse("undefined").unwrap().is_dimensionless());
        assert!(Units::parse("").unwrap().is_dimensionless());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Units::parse("furlongs"), Err(Error::InvalidUnits(_))));
        assert!(Units::parse("m^x").is_err());
        assert!(Units::parse("m..s").is_err());
    }
}
