use serde::{Deserialize, Serialize};

/// Overtime component of a schedule cell, `(+1)` through `(+4)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Overtime {
    Plus1,
    Plus2,
    Plus3,
    Plus4,
}

impl Overtime {
    fn from_digit(d: u8) -> Option<Overtime> {
        match d {
            b'1' => Some(Overtime::Plus1),
            b'2' => Some(Overtime::Plus2),
            b'3' => Some(Overtime::Plus3),
            b'4' => Some(Overtime::Plus4),
            _ => None,
        }
    }

    pub fn hours(&self) -> u8 {
        match self {
            Overtime::Plus1 => 1,
            Overtime::Plus2 => 2,
            Overtime::Plus3 => 3,
            Overtime::Plus4 => 4,
        }
    }

    /// Attendance-bonus standard code awarded per occurrence.
    pub fn bonus_code(&self) -> &'static str {
        match self {
            Overtime::Plus1 => "+A03",
            Overtime::Plus2 => "+A04",
            Overtime::Plus3 => "+A05",
            Overtime::Plus4 => "+A06",
        }
    }
}

/// Classification of one raw schedule cell.
///
/// The parser is total: every string maps to exactly one token and never
/// fails. An overtime suffix composes with R-shifts, national-holiday
/// R-shifts and normal shifts, so one cell can carry two bonus-relevant
/// components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShiftToken {
    /// Cell contains `(假)` — any leave variant.
    Off { reason: String },
    /// `R(國)/...` — R-shift duty on a national holiday.
    NationalHolidayRShift {
        suffix: String,
        overtime: Option<Overtime>,
    },
    /// `R/...` — regular R-shift duty.
    RShift {
        suffix: String,
        overtime: Option<Overtime>,
    },
    /// Any other non-empty cell, kept verbatim.
    Normal {
        code: String,
        overtime: Option<Overtime>,
    },
    /// Empty or whitespace-only cell.
    NoShift,
}

impl ShiftToken {
    /// Classify a raw cell. Rules apply in order: leave marker, national
    /// holiday R-shift, R-shift, overtime suffix, empty, normal.
    pub fn parse(raw: &str) -> ShiftToken {
        let cell = raw.trim();
        if cell.is_empty() {
            return ShiftToken::NoShift;
        }
        if cell.contains("(假)") {
            return ShiftToken::Off {
                reason: cell.to_string(),
            };
        }
        let (body, overtime) = split_overtime(cell);
        if let Some(suffix) = body.strip_prefix("R(國)/") {
            return ShiftToken::NationalHolidayRShift {
                suffix: suffix.to_string(),
                overtime,
            };
        }
        if let Some(suffix) = body.strip_prefix("R/") {
            return ShiftToken::RShift {
                suffix: suffix.to_string(),
                overtime,
            };
        }
        ShiftToken::Normal {
            code: body.to_string(),
            overtime,
        }
    }

    pub fn overtime(&self) -> Option<Overtime> {
        match self {
            ShiftToken::NationalHolidayRShift { overtime, .. }
            | ShiftToken::RShift { overtime, .. }
            | ShiftToken::Normal { overtime, .. } => *overtime,
            _ => None,
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, ShiftToken::Off { .. })
    }

    pub fn is_r_shift(&self) -> bool {
        matches!(self, ShiftToken::RShift { .. })
    }

    pub fn is_national_holiday_r_shift(&self) -> bool {
        matches!(self, ShiftToken::NationalHolidayRShift { .. })
    }
}

/// Peel a trailing `(+N)` with N in 1..=4 off the cell body.
fn split_overtime(cell: &str) -> (&str, Option<Overtime>) {
    let bytes = cell.as_bytes();
    if bytes.len() >= 4 && cell.ends_with(')') {
        let open = bytes.len() - 4;
        if bytes[open] == b'(' && bytes[open + 1] == b'+' {
            if let Some(overtime) = Overtime::from_digit(bytes[open + 2]) {
                return (cell[..open].trim_end(), Some(overtime));
            }
        }
    }
    (cell, None)
}
