use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use railops_types::ProfileType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarcodePayloadError {
    #[error("barcode payload must have four |-separated segments, got {0}")]
    SegmentCount(usize),

    #[error("barcode segment is not valid: {0}")]
    InvalidSegment(String),
}

/// Payload stamped into every generated document barcode:
/// `{profile_id}|{type_code}|{YYYY}|{MM}`.
///
/// The helper scans this out of uploaded PDFs to route each split file back
/// to its profile, so the format is part of the frozen contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodePayload {
    pub profile_id: Uuid,
    pub profile_type: ProfileType,
    pub year: i32,
    pub month: u32,
}

impl BarcodePayload {
    pub fn new(profile_id: Uuid, profile_type: ProfileType, year: i32, month: u32) -> Self {
        BarcodePayload {
            profile_id,
            profile_type,
            year,
            month,
        }
    }
}

impl fmt::Display for BarcodePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{:04}|{:02}",
            self.profile_id,
            self.profile_type.code(),
            self.year,
            self.month
        )
    }
}

impl FromStr for BarcodePayload {
    type Err = BarcodePayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('|').collect();
        if segments.len() != 4 {
            return Err(BarcodePayloadError::SegmentCount(segments.len()));
        }
        let profile_id = Uuid::parse_str(segments[0])
            .map_err(|_| BarcodePayloadError::InvalidSegment(segments[0].to_string()))?;
        let profile_type = match segments[1] {
            "BS" => ProfileType::Basic,
            "EI" => ProfileType::EventInvestigation,
            "PI" => ProfileType::PersonnelInterview,
            "CM" => ProfileType::CorrectiveMeasures,
            "AN" => ProfileType::AssessmentNotice,
            other => return Err(BarcodePayloadError::InvalidSegment(other.to_string())),
        };
        let year: i32 = segments[2]
            .parse()
            .map_err(|_| BarcodePayloadError::InvalidSegment(segments[2].to_string()))?;
        let month: u32 = segments[3]
            .parse()
            .map_err(|_| BarcodePayloadError::InvalidSegment(segments[3].to_string()))?;
        if !(1..=12).contains(&month) {
            return Err(BarcodePayloadError::InvalidSegment(segments[3].to_string()));
        }
        Ok(BarcodePayload {
            profile_id,
            profile_type,
            year,
            month,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let payload = BarcodePayload::new(
            Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
            ProfileType::EventInvestigation,
            2026,
            3,
        );
        let encoded = payload.to_string();
        assert_eq!(
            encoded,
            "67e55044-10b1-426f-9247-bb680e5fe0c8|EI|2026|03"
        );
        assert_eq!(encoded.parse::<BarcodePayload>().unwrap(), payload);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!("one|two".parse::<BarcodePayload>().is_err());
        assert!("not-a-uuid|EI|2026|03".parse::<BarcodePayload>().is_err());
        assert!(
            "67e55044-10b1-426f-9247-bb680e5fe0c8|XX|2026|03"
                .parse::<BarcodePayload>()
                .is_err()
        );
        assert!(
            "67e55044-10b1-426f-9247-bb680e5fe0c8|EI|2026|13"
                .parse::<BarcodePayload>()
                .is_err()
        );
    }
}
