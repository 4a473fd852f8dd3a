//! Plate identifier generation
//!
//! Identifiers follow the fixed format `LLL-YYYYMMDD-RNN-DDDDDD`:
//! the first three characters of the media lot number, the generation date,
//! the plate role (`S` for sample, `NC` for negative control) with a
//! two-digit sequence, and a caller-supplied six-digit disambiguator.
//! The generator performs no uniqueness tracking of its own; the
//! disambiguator (typically derived from a millisecond timestamp) keeps
//! repeated generations on the same date distinct.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::PlateId;

/// Role a plate plays within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateRole {
    Sample,
    NegativeControl,
}

impl PlateRole {
    pub fn code(&self) -> &'static str {
        match self {
            PlateRole::Sample => "S",
            PlateRole::NegativeControl => "NC",
        }
    }
}

/// Build a plate identifier.
///
/// `sequence` is 1-based and restarts independently per role within a
/// session. `disambiguator` must already be six digits; longer inputs are
/// truncated to their trailing six characters, shorter ones zero-padded.
pub fn plate_id(
    lot_number: &str,
    date: NaiveDate,
    role: PlateRole,
    sequence: u32,
    disambiguator: &str,
) -> PlateId {
    let prefix: String = lot_number.chars().take(3).collect();
    let date_str = date.format("%Y%m%d");
    let suffix = normalize_disambiguator(disambiguator);

    PlateId::new(format!(
        "{}-{}-{}{:02}-{}",
        prefix,
        date_str,
        role.code(),
        sequence,
        suffix
    ))
}

/// Derive a six-digit disambiguator from a millisecond timestamp
pub fn disambiguator_from_millis(millis: i64) -> String {
    format!("{:06}", millis.rem_euclid(1_000_000))
}

fn normalize_disambiguator(raw: &str) -> String {
    // Character-based so arbitrary caller input cannot split a multi-byte
    // character
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() >= 6 {
        chars[chars.len() - 6..].iter().collect()
    } else {
        format!("{:0>6}", raw)
    }
}
