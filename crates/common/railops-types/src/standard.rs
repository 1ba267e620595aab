use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::points::Points;

/// One-letter (or `+X` reward) classification of assessment standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryCode {
    #[serde(rename = "D")]
    Driving,
    #[serde(rename = "W")]
    WorkRules,
    #[serde(rename = "O")]
    Operations,
    #[serde(rename = "S")]
    Safety,
    #[serde(rename = "R")]
    Incident,
    #[serde(rename = "+M")]
    MonthlyReward,
    #[serde(rename = "+A")]
    AttendanceReward,
    #[serde(rename = "+B")]
    ProposalReward,
    #[serde(rename = "+C")]
    CommendationReward,
    #[serde(rename = "+R")]
    SpecialReward,
}

impl CategoryCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryCode::Driving => "D",
            CategoryCode::WorkRules => "W",
            CategoryCode::Operations => "O",
            CategoryCode::Safety => "S",
            CategoryCode::Incident => "R",
            CategoryCode::MonthlyReward => "+M",
            CategoryCode::AttendanceReward => "+A",
            CategoryCode::ProposalReward => "+B",
            CategoryCode::CommendationReward => "+C",
            CategoryCode::SpecialReward => "+R",
        }
    }

    /// Deduction categories are the ones that cost points and feed the
    /// monthly-reward eligibility rules.
    pub fn is_deduction(&self) -> bool {
        matches!(
            self,
            CategoryCode::Driving
                | CategoryCode::WorkRules
                | CategoryCode::Operations
                | CategoryCode::Safety
                | CategoryCode::Incident
        )
    }
}

impl fmt::Display for CategoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "D" => Ok(CategoryCode::Driving),
            "W" => Ok(CategoryCode::WorkRules),
            "O" => Ok(CategoryCode::Operations),
            "S" => Ok(CategoryCode::Safety),
            "R" => Ok(CategoryCode::Incident),
            "+M" => Ok(CategoryCode::MonthlyReward),
            "+A" => Ok(CategoryCode::AttendanceReward),
            "+B" => Ok(CategoryCode::ProposalReward),
            "+C" => Ok(CategoryCode::CommendationReward),
            "+R" => Ok(CategoryCode::SpecialReward),
            other => Err(DomainError::UnknownCategory(other.to_string())),
        }
    }
}

/// Catalog row describing one assessment rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentStandard {
    pub code: String,
    pub category: CategoryCode,
    pub base_points: Points,
    /// Whether repeat occurrences within a year aggravate the multiplier.
    pub has_cumulative: bool,
    /// True for the incident standards scored through the fault checklist.
    pub is_r_fault_type: bool,
    pub description: String,
}

impl AssessmentStandard {
    fn new(
        code: &str,
        category: CategoryCode,
        base_tenths: i64,
        has_cumulative: bool,
        is_r_fault_type: bool,
        description: &str,
    ) -> Self {
        AssessmentStandard {
            code: code.to_string(),
            category,
            base_points: Points::from_tenths(base_tenths),
            has_cumulative,
            is_r_fault_type,
            description: description.to_string(),
        }
    }
}

/// Built-in standard catalog seeded at first start-up.
///
/// Cumulative aggravation is driven entirely by `has_cumulative`; the
/// documented opt-outs (D05, W04, W05, W07, S13, S16) are plain rows with
/// the flag off, not engine special cases.
pub fn builtin_standards() -> Vec<AssessmentStandard> {
    use CategoryCode::*;
    vec![
        AssessmentStandard::new("D01", Driving, -10, true, false, "未依標準程序操作列車"),
        AssessmentStandard::new("D02", Driving, -10, true, false, "進站未依規定鳴笛或廣播"),
        AssessmentStandard::new("D03", Driving, -20, true, false, "超速行駛"),
        AssessmentStandard::new("D04", Driving, -20, true, false, "闖越號誌"),
        AssessmentStandard::new("D05", Driving, -10, false, false, "其他行車疏失（單次計點）"),
        AssessmentStandard::new("W01", WorkRules, -10, true, false, "遲到或早退"),
        AssessmentStandard::new("W02", WorkRules, -10, true, false, "服儀不整"),
        AssessmentStandard::new("W03", WorkRules, -20, true, false, "值勤中使用私人手機"),
        AssessmentStandard::new("W04", WorkRules, -10, false, false, "未依規定交接班（單次計點）"),
        AssessmentStandard::new("W05", WorkRules, -10, false, false, "漏填值勤紀錄（單次計點）"),
        AssessmentStandard::new("W06", WorkRules, -20, true, false, "無故未到勤"),
        AssessmentStandard::new("W07", WorkRules, -10, false, false, "其他工作規定違反（單次計點）"),
        AssessmentStandard::new("O01", Operations, -10, true, false, "未依規定執行月台確認"),
        AssessmentStandard::new("O02", Operations, -20, true, false, "車門操作不當"),
        AssessmentStandard::new("O03", Operations, -10, true, false, "延誤發車"),
        AssessmentStandard::new("S11", Safety, -20, true, false, "未執行出車前安全檢查"),
        AssessmentStandard::new("S12", Safety, -20, true, false, "違反安全作業程序"),
        AssessmentStandard::new("S13", Safety, -30, false, false, "重大安全違規（單次計點）"),
        AssessmentStandard::new("S14", Safety, -20, true, false, "未通報安全異常"),
        AssessmentStandard::new("S15", Safety, -10, true, false, "防護裝備未確實配戴"),
        AssessmentStandard::new("S16", Safety, -30, false, false, "酒測未通過（單次計點）"),
        AssessmentStandard::new("R01", Incident, -10, true, false, "一般行車異常事件"),
        AssessmentStandard::new("R02", Incident, -20, true, true, "行車事故（輕微）"),
        AssessmentStandard::new("R03", Incident, -20, true, true, "行車事故（一般）"),
        AssessmentStandard::new("R04", Incident, -30, true, true, "行車事故（重大）"),
        AssessmentStandard::new("R05", Incident, -50, true, true, "行車事故（特別重大）"),
        AssessmentStandard::new("+M01", MonthlyReward, 30, false, false, "全月全勤"),
        AssessmentStandard::new("+M02", MonthlyReward, 10, false, false, "當月無行車/安全事件"),
        AssessmentStandard::new("+M03", MonthlyReward, 20, false, false, "當月無任何扣點紀錄"),
        AssessmentStandard::new("+A01", AttendanceReward, 30, false, false, "R班出勤"),
        AssessmentStandard::new("+A02", AttendanceReward, 10, false, false, "國定假日R班出勤"),
        AssessmentStandard::new("+A03", AttendanceReward, 5, false, false, "加班一小時"),
        AssessmentStandard::new("+A04", AttendanceReward, 10, false, false, "加班二小時"),
        AssessmentStandard::new("+A05", AttendanceReward, 15, false, false, "加班三小時"),
        AssessmentStandard::new("+A06", AttendanceReward, 20, false, false, "加班四小時"),
        AssessmentStandard::new("+B01", ProposalReward, 10, false, false, "改善提案獲採用"),
        AssessmentStandard::new("+C01", CommendationReward, 20, false, false, "旅客表揚或主管嘉獎"),
        AssessmentStandard::new("+R01", SpecialReward, 30, false, false, "特殊貢獻獎勵"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_codes_are_unique() {
        let standards = builtin_standards();
        let mut codes: Vec<&str> = standards.iter().map(|s| s.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), standards.len());
    }

    #[test]
    fn r_fault_rows_are_r02_through_r05() {
        let standards = builtin_standards();
        let r_faults: Vec<&str> = standards
            .iter()
            .filter(|s| s.is_r_fault_type)
            .map(|s| s.code.as_str())
            .collect();
        assert_eq!(r_faults, vec!["R02", "R03", "R04", "R05"]);
    }

    #[test]
    fn documented_opt_outs_skip_cumulation() {
        let standards = builtin_standards();
        for code in ["D05", "W04", "W05", "W07", "S13", "S16"] {
            let row = standards.iter().find(|s| s.code == code).unwrap();
            assert!(!row.has_cumulative, "{code} must not cumulate");
        }
        let s12 = standards.iter().find(|s| s.code == "S12").unwrap();
        assert!(s12.has_cumulative);
        assert_eq!(s12.base_points.as_f64(), -2.0);
    }

    #[test]
    fn category_serde_uses_letter_codes() {
        assert_eq!(serde_json::to_string(&CategoryCode::Incident).unwrap(), "\"R\"");
        assert_eq!(
            serde_json::to_string(&CategoryCode::MonthlyReward).unwrap(),
            "\"+M\""
        );
        let back: CategoryCode = serde_json::from_str("\"+A\"").unwrap();
        assert_eq!(back, CategoryCode::AttendanceReward);
    }
}
