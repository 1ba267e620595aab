pub mod barcode;
pub mod templates;

use std::collections::HashMap;
use std::io::{Cursor, Write};

use chrono::Datelike;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use railops_helper_protocol::BarcodePayload;
use railops_types::{FaultChecklist, Points, CHECKLIST_FLAGS};

use crate::error::ApiError;
use crate::models::{Profile, ProfileDetails};
use self::templates::Template;

const EMU_PER_PIXEL: u32 = 9525;
const BARCODE_MODULE_WIDTH: u32 = 2;
const BARCODE_HEIGHT: u32 = 60;

/// Labels for the nine fault-checklist items, in checklist order.
const CHECKLIST_LABELS: [&str; CHECKLIST_FLAGS] = [
    "未依標準程序操作",
    "未確認號誌狀態",
    "未依規定通報",
    "未執行安全防護",
    "延誤處置時機",
    "誤判現場狀況",
    "未依規定速度行駛",
    "設備操作不當",
    "其他人為疏失",
];

/// Rendered document plus its deterministic file name.
pub struct RenderedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Populate the template matching a converted profile and return the docx
/// bytes. Same inputs produce identical bytes: the zip entries carry a
/// fixed timestamp and the content embeds nothing time-dependent.
pub fn render_document(
    profile: &Profile,
    details: &ProfileDetails,
    employee_name: &str,
) -> Result<RenderedDocument, ApiError> {
    let template = select_template(details);
    let values = collect_values(profile, details, employee_name);
    let checklist = checklist_of(details);

    let barcode_payload = BarcodePayload::new(
        profile.id,
        profile.profile_type,
        profile.event_date.year(),
        profile.event_date.month(),
    )
    .to_string();
    let barcode_png =
        barcode::png(&barcode_payload, BARCODE_MODULE_WIDTH, BARCODE_HEIGHT).map_err(|e| {
            ApiError::internal(format!("barcode encoding failed: {e}"))
        })?;

    let document_xml = build_document_xml(template, &values, checklist, &barcode_png);
    let bytes = build_docx(&document_xml, &barcode_png)?;

    Ok(RenderedDocument {
        file_name: crate::google::DriveDispatcher::file_name(profile),
        bytes,
    })
}

fn select_template(details: &ProfileDetails) -> &'static Template {
    match details {
        ProfileDetails::EventInvestigation(_) => &templates::EVENT_INVESTIGATION,
        ProfileDetails::PersonnelInterview(_) => &templates::PERSONNEL_INTERVIEW,
        ProfileDetails::CorrectiveMeasures(_) => &templates::CORRECTIVE_MEASURES,
        ProfileDetails::AssessmentNotice(form) => {
            if form.points.is_negative() {
                &templates::ASSESSMENT_NOTICE_DEDUCTION
            } else {
                &templates::ASSESSMENT_NOTICE_REWARD
            }
        }
    }
}

fn collect_values(
    profile: &Profile,
    details: &ProfileDetails,
    employee_name: &str,
) -> HashMap<&'static str, String> {
    let mut values: HashMap<&'static str, String> = HashMap::new();
    values.insert("department", profile.department.label().to_string());
    values.insert("employee_code", profile.employee_code.to_string());
    values.insert("employee_name", employee_name.to_string());
    values.insert("event_date", profile.event_date.format("%Y-%m-%d").to_string());
    values.insert(
        "event_time",
        profile
            .event_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default(),
    );
    values.insert(
        "event_location",
        profile.event_location.clone().unwrap_or_default(),
    );
    values.insert(
        "train_number",
        profile.train_number.clone().unwrap_or_default(),
    );

    match details {
        ProfileDetails::EventInvestigation(form) => {
            values.insert("summary", form.summary.clone());
            values.insert("cause_analysis", form.cause_analysis.clone());
            values.insert("handling_process", form.handling_process.clone());
            values.insert("improvement_actions", form.improvement_actions.clone());
        }
        ProfileDetails::PersonnelInterview(form) => {
            values.insert("interviewer", form.interviewer.clone());
            values.insert(
                "interview_date",
                form.interview_date.format("%Y-%m-%d").to_string(),
            );
            values.insert("topic", form.topic.clone());
            values.insert("statement", form.statement.clone());
            values.insert("follow_up", form.follow_up.clone().unwrap_or_default());
        }
        ProfileDetails::CorrectiveMeasures(form) => {
            values.insert("deficiency", form.deficiency.clone());
            values.insert("measure", form.measure.clone());
            values.insert("deadline", form.deadline.format("%Y-%m-%d").to_string());
            values.insert("responsible_person", form.responsible_person.clone());
            values.insert(
                "verified",
                if form.verified { "已查證" } else { "未查證" }.to_string(),
            );
        }
        ProfileDetails::AssessmentNotice(form) => {
            values.insert("standard_code", form.standard_code.clone());
            values.insert("points", format_points(form.points));
            values.insert("reason", form.reason.clone());
        }
    }
    values
}

fn format_points(points: Points) -> String {
    if points.is_negative() {
        points.to_string()
    } else {
        format!("+{points}")
    }
}

fn checklist_of(details: &ProfileDetails) -> Option<&FaultChecklist> {
    match details {
        ProfileDetails::EventInvestigation(form) => form.checklist.as_ref(),
        _ => None,
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn paragraph(text: &str) -> String {
    format!(
        "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        xml_escape(text)
    )
}

fn heading(text: &str) -> String {
    format!(
        "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr><w:r><w:rPr><w:b/><w:sz w:val=\"36\"/></w:rPr><w:t>{}</w:t></w:r></w:p>",
        xml_escape(text)
    )
}

fn build_document_xml(
    template: &Template,
    values: &HashMap<&'static str, String>,
    checklist: Option<&FaultChecklist>,
    barcode_png: &[u8],
) -> String {
    let mut body = String::new();
    body.push_str(&heading(template.title));

    for (label, key) in template.fields {
        let value = values.get(key).map(String::as_str).unwrap_or("");
        body.push_str(&paragraph(&format!("{label}：{value}")));
    }

    if template.has_checklist {
        if let Some(checklist) = checklist {
            body.push_str(&paragraph("肇因檢核表："));
            for (flag, label) in checklist.flags.iter().zip(CHECKLIST_LABELS.iter()) {
                let glyph = if *flag { "☑" } else { "☐" };
                body.push_str(&paragraph(&format!("{glyph} {label}")));
            }
        }
    }

    body.push_str(&barcode_drawing(barcode_png));

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
         xmlns:wp=\"http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing\">\
         <w:body>{body}<w:sectPr/></w:body></w:document>"
    )
}

fn barcode_drawing(png: &[u8]) -> String {
    // Dimensions are derived from the PNG header (width/height at fixed
    // offsets in the IHDR chunk) so the drawing extent matches the image.
    let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
    let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    let cx = width * EMU_PER_PIXEL;
    let cy = height * EMU_PER_PIXEL;
    format!(
        "<w:p><w:r><w:drawing><wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">\
         <wp:extent cx=\"{cx}\" cy=\"{cy}\"/><wp:docPr id=\"1\" name=\"barcode\"/>\
         <a:graphic xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\">\
         <a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">\
         <pic:pic xmlns:pic=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">\
         <pic:nvPicPr><pic:cNvPr id=\"1\" name=\"barcode.png\"/><pic:cNvPicPr/></pic:nvPicPr>\
         <pic:blipFill><a:blip r:embed=\"rId1\"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>\
         <pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>\
         <a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>\
         </a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"
    )
}

fn build_docx(document_xml: &str, barcode_png: &[u8]) -> Result<Vec<u8>, ApiError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let entries: [(&str, &[u8]); 5] = [
        (
            "[Content_Types].xml",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
        ),
        (
            "word/_rels/document.xml.rels",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/barcode.png"/></Relationships>"#,
        ),
        ("word/document.xml", document_xml.as_bytes()),
        ("word/media/barcode.png", barcode_png),
    ];

    for (name, content) in entries {
        writer
            .start_file(name, options)
            .and_then(|_| writer.write_all(content).map_err(zip::result::ZipError::Io))
            .map_err(|e| ApiError::internal(format!("docx build failed: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| ApiError::internal(format!("docx build failed: {e}")))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use railops_types::{ConversionStatus, Department, EmployeeCode, ProfileType};
    use uuid::Uuid;

    fn sample() -> (Profile, ProfileDetails) {
        let profile = Profile {
            id: Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
            department: Department::Tanhai,
            employee_code: EmployeeCode::new("2305A0017").unwrap(),
            event_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            event_time: None,
            event_location: Some("紅樹林站".to_string()),
            train_number: Some("0905".to_string()),
            event_title: None,
            event_description: "進站超速".to_string(),
            profile_type: ProfileType::EventInvestigation,
            conversion_status: ConversionStatus::Converted,
            version: 2,
            drive_link: None,
            assessment_record_id: None,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let details = ProfileDetails::EventInvestigation(crate::models::EventInvestigationForm {
            summary: "進站超速 5 km/h".to_string(),
            cause_analysis: "注意力分散".to_string(),
            handling_process: "當場提醒並回報".to_string(),
            improvement_actions: "加強宣導".to_string(),
            checklist: None,
        });
        (profile, details)
    }

    #[test]
    fn renders_docx_with_zip_magic() {
        let (profile, details) = sample();
        let doc = render_document(&profile, &details, "林小明").unwrap();
        assert!(doc.bytes.len() > 500);
        assert_eq!(&doc.bytes[..2], b"PK");
        assert!(doc.file_name.ends_with(".docx"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let (profile, details) = sample();
        let first = render_document(&profile, &details, "林小明").unwrap();
        let second = render_document(&profile, &details, "林小明").unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn escapes_xml_significant_characters() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
