use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed variant a basic profile can be converted into. `Basic` is the
/// untyped starting state; each non-basic type carries one sub-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Basic,
    EventInvestigation,
    PersonnelInterview,
    CorrectiveMeasures,
    AssessmentNotice,
}

impl ProfileType {
    pub const CONVERTIBLE: [ProfileType; 4] = [
        ProfileType::EventInvestigation,
        ProfileType::PersonnelInterview,
        ProfileType::CorrectiveMeasures,
        ProfileType::AssessmentNotice,
    ];

    /// Short code embedded in barcodes and file names.
    pub fn code(&self) -> &'static str {
        match self {
            ProfileType::Basic => "BS",
            ProfileType::EventInvestigation => "EI",
            ProfileType::PersonnelInterview => "PI",
            ProfileType::CorrectiveMeasures => "CM",
            ProfileType::AssessmentNotice => "AN",
        }
    }

    /// Label used for the Drive folder segment and document titles.
    pub fn label(&self) -> &'static str {
        match self {
            ProfileType::Basic => "基本資料",
            ProfileType::EventInvestigation => "事件調查",
            ProfileType::PersonnelInterview => "人員約談",
            ProfileType::CorrectiveMeasures => "矯正措施",
            ProfileType::AssessmentNotice => "考核通知",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Profile lifecycle state. Advances only; regression requires the explicit
/// admin reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Pending,
    Converted,
    Completed,
}

impl ConversionStatus {
    /// Whether a transition from `self` to `next` is a forward move.
    pub fn can_advance_to(&self, next: ConversionStatus) -> bool {
        matches!(
            (self, next),
            (ConversionStatus::Pending, ConversionStatus::Converted)
                | (ConversionStatus::Converted, ConversionStatus::Completed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_advances() {
        use ConversionStatus::*;
        assert!(Pending.can_advance_to(Converted));
        assert!(Converted.can_advance_to(Completed));
        assert!(!Converted.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Converted));
        assert!(!Pending.can_advance_to(Completed));
    }
}
