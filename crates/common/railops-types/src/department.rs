use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Operational tenant. Every tenant-scoped record carries one; data is never
/// merged across departments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    Tanhai,
    Ankeng,
}

impl Department {
    pub const ALL: [Department; 2] = [Department::Tanhai, Department::Ankeng];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Tanhai => "tanhai",
            Department::Ankeng => "ankeng",
        }
    }

    /// Suffix used for per-department environment variables
    /// (`GOOGLE_SERVICE_ACCOUNT_TANHAI`, `GOOGLE_SHEETS_ID_ANKENG`, ...).
    pub fn env_suffix(&self) -> &'static str {
        match self {
            Department::Tanhai => "TANHAI",
            Department::Ankeng => "ANKENG",
        }
    }

    /// Label used in human-facing documents and Drive folder paths.
    pub fn label(&self) -> &'static str {
        match self {
            Department::Tanhai => "淡海",
            Department::Ankeng => "安坑",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanhai" => Ok(Department::Tanhai),
            "ankeng" => Ok(Department::Ankeng),
            other => Err(DomainError::UnknownDepartment(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Tanhai".parse::<Department>().unwrap(), Department::Tanhai);
        assert_eq!(" ankeng ".parse::<Department>().unwrap(), Department::Ankeng);
        assert!("taipei".parse::<Department>().is_err());
    }

    #[test]
    fn serde_round_trip_uses_lowercase() {
        let json = serde_json::to_string(&Department::Tanhai).unwrap();
        assert_eq!(json, "\"tanhai\"");
        let back: Department = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Department::Tanhai);
    }
}
