//! Dated build-number parsing (`YYYYMMDD.R`).

use std::fmt;
use std::str::FromStr;

/// A dated build number, e.g. `20260315.2`.
///
/// Display reproduces the canonical form, so `parse` followed by `to_string`
/// is the round-trip validity test used by exact-version lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BuildNumber {
    /// Date component as `YYYYMMDD`.
    pub date: u32,
    /// Revision within the day, starting at 1.
    pub revision: u32,
}

impl FromStr for BuildNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date_part, rev_part) = s
            .split_once('.')
            .ok_or_else(|| format!("build number '{s}' has no '.' separator"))?;

        if date_part.len() != 8 {
            return Err(format!("build number '{s}' date part is not 8 digits"));
        }

        let date: u32 = date_part
            .parse()
            .map_err(|_| format!("build number '{s}' has a non-numeric date part"))?;
        let revision: u32 = rev_part
            .parse()
            .map_err(|_| format!("build number '{s}' has a non-numeric revision"))?;

        // Leading zeros in the revision would not round-trip
        if rev_part != revision.to_string() {
            return Err(format!("build number '{s}' revision is not canonical"));
        }

        Ok(Self { date, revision })
    }
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}.{}", self.date, self.revision)
    }
}

/// Whether `s` survives a parse/display round-trip unchanged.
pub fn round_trips(s: &str) -> bool {
    s.parse::<BuildNumber>()
        .map(|n| n.to_string() == s)
        .unwrap_or(false)
}
