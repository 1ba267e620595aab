use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Number of items on the incident fault checklist.
pub const CHECKLIST_FLAGS: usize = 9;

/// Responsibility grade derived from the number of checklist flags set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Responsibility {
    /// 1–3 flags, coefficient 0.3.
    Minor,
    /// 4–6 flags, coefficient 0.7.
    Major,
    /// 7–9 flags, coefficient 1.0.
    Full,
}

impl Responsibility {
    pub fn coefficient_tenths(&self) -> i64 {
        match self {
            Responsibility::Minor => 3,
            Responsibility::Major => 7,
            Responsibility::Full => 10,
        }
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient_tenths() as f64 / 10.0
    }
}

/// Nine-item fault checklist attached to r-fault assessment records, with
/// the incident timeline (T0 dispatch notice through T4 service resumed) and
/// the measured delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultChecklist {
    pub flags: Vec<bool>,
    pub timeline: [Option<DateTime<Utc>>; 5],
    pub delay_seconds: i64,
}

impl FaultChecklist {
    pub fn new(
        flags: Vec<bool>,
        timeline: [Option<DateTime<Utc>>; 5],
        delay_seconds: i64,
    ) -> Result<Self, DomainError> {
        if flags.len() != CHECKLIST_FLAGS {
            return Err(DomainError::ChecklistSize {
                expected: CHECKLIST_FLAGS,
                got: flags.len(),
            });
        }
        Ok(FaultChecklist {
            flags,
            timeline,
            delay_seconds,
        })
    }

    pub fn flags_set(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }

    /// Responsibility grade for this checklist. Zero flags set is rejected:
    /// an r-fault record with no fault indicators is nonsensical input.
    pub fn responsibility(&self) -> Result<Responsibility, DomainError> {
        match self.flags_set() {
            0 => Err(DomainError::EmptyChecklist),
            1..=3 => Ok(Responsibility::Minor),
            4..=6 => Ok(Responsibility::Major),
            _ => Ok(Responsibility::Full),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist_with(set: usize) -> FaultChecklist {
        let mut flags = vec![false; CHECKLIST_FLAGS];
        for flag in flags.iter_mut().take(set) {
            *flag = true;
        }
        FaultChecklist::new(flags, [None; 5], 0).unwrap()
    }

    #[test]
    fn grades_follow_flag_count_boundaries() {
        assert!(checklist_with(0).responsibility().is_err());
        assert_eq!(checklist_with(1).responsibility().unwrap(), Responsibility::Minor);
        assert_eq!(checklist_with(3).responsibility().unwrap(), Responsibility::Minor);
        assert_eq!(checklist_with(4).responsibility().unwrap(), Responsibility::Major);
        assert_eq!(checklist_with(6).responsibility().unwrap(), Responsibility::Major);
        assert_eq!(checklist_with(7).responsibility().unwrap(), Responsibility::Full);
        assert_eq!(checklist_with(9).responsibility().unwrap(), Responsibility::Full);
    }

    #[test]
    fn rejects_wrong_flag_count() {
        let err = FaultChecklist::new(vec![true; 8], [None; 5], 0).unwrap_err();
        assert_eq!(err, DomainError::ChecklistSize { expected: 9, got: 8 });
    }
}
