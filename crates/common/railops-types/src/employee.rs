use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::department::Department;
use crate::error::DomainError;

/// Externally-assigned driver identifier, format `\d{4}[A-Z]\d{4}`.
///
/// The leading four digits encode the hire year-month as `YYMM` with the
/// year offset by 2000, e.g. `2305A0017` was hired 2023-05.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmployeeCode(String);

impl EmployeeCode {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let s = raw.trim();
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 9
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[4].is_ascii_uppercase()
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(DomainError::MalformedEmployeeCode(s.to_string()));
        }
        let month: u32 = s[2..4].parse().expect("digits checked above");
        if !(1..=12).contains(&month) {
            return Err(DomainError::MalformedEmployeeCode(s.to_string()));
        }
        Ok(EmployeeCode(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hire year and month derived from the code prefix.
    pub fn hire_year_month(&self) -> (i32, u32) {
        let year: i32 = self.0[..2].parse().expect("validated at construction");
        let month: u32 = self.0[2..4].parse().expect("validated at construction");
        (2000 + year, month)
    }
}

impl fmt::Display for EmployeeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EmployeeCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmployeeCode::new(s)
    }
}

impl TryFrom<String> for EmployeeCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EmployeeCode::new(&value)
    }
}

impl From<EmployeeCode> for String {
    fn from(code: EmployeeCode) -> Self {
        code.0
    }
}

/// Driver personnel record. Never deleted; lifecycle ends at
/// `is_resigned = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub code: EmployeeCode,
    pub name: String,
    pub department: Department,
    pub is_resigned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Immutable log entry recording a department move. Committing one advances
/// the employee's `department`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub employee_code: EmployeeCode,
    pub from_department: Department,
    pub to_department: Department,
    pub effective_date: NaiveDate,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_codes() {
        let code = EmployeeCode::new("2305A0017").unwrap();
        assert_eq!(code.hire_year_month(), (2023, 5));
        assert_eq!(code.as_str(), "2305A0017");
    }

    #[test]
    fn rejects_malformed_codes() {
        for bad in ["", "2305a0017", "23050017", "2313A0017", "9900B00170", "abcd"] {
            assert!(EmployeeCode::new(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn serde_round_trips_through_string() {
        let code = EmployeeCode::new("2411B0333").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"2411B0333\"");
        let back: EmployeeCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
        assert!(serde_json::from_str::<EmployeeCode>("\"nope\"").is_err());
    }
}
