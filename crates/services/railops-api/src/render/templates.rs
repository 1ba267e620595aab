/// Document templates, one per generated form. Each line is a label and the
/// substitution key filled from the profile and its sub-form; `checklist`
/// lines render as checked/unchecked glyph rows.
pub struct Template {
    pub title: &'static str,
    pub fields: &'static [(&'static str, &'static str)],
    pub has_checklist: bool,
}

pub const EVENT_INVESTIGATION: Template = Template {
    title: "行車事件調查報告",
    fields: &[
        ("部門", "department"),
        ("員工編號", "employee_code"),
        ("姓名", "employee_name"),
        ("事件日期", "event_date"),
        ("事件時間", "event_time"),
        ("地點", "event_location"),
        ("車次", "train_number"),
        ("事件摘要", "summary"),
        ("原因分析", "cause_analysis"),
        ("處置經過", "handling_process"),
        ("改善對策", "improvement_actions"),
    ],
    has_checklist: true,
};

pub const PERSONNEL_INTERVIEW: Template = Template {
    title: "人員約談紀錄",
    fields: &[
        ("部門", "department"),
        ("員工編號", "employee_code"),
        ("姓名", "employee_name"),
        ("約談日期", "interview_date"),
        ("約談人", "interviewer"),
        ("約談主題", "topic"),
        ("談話內容", "statement"),
        ("後續追蹤", "follow_up"),
    ],
    has_checklist: false,
};

pub const CORRECTIVE_MEASURES: Template = Template {
    title: "矯正措施通知單",
    fields: &[
        ("部門", "department"),
        ("員工編號", "employee_code"),
        ("姓名", "employee_name"),
        ("缺失事項", "deficiency"),
        ("矯正措施", "measure"),
        ("完成期限", "deadline"),
        ("負責人", "responsible_person"),
        ("查證結果", "verified"),
    ],
    has_checklist: false,
};

pub const ASSESSMENT_NOTICE_DEDUCTION: Template = Template {
    title: "考核扣點通知單",
    fields: &[
        ("部門", "department"),
        ("員工編號", "employee_code"),
        ("姓名", "employee_name"),
        ("事件日期", "event_date"),
        ("考核代碼", "standard_code"),
        ("考核點數", "points"),
        ("事由", "reason"),
    ],
    has_checklist: false,
};

pub const ASSESSMENT_NOTICE_REWARD: Template = Template {
    title: "考核獎勵通知單",
    fields: &[
        ("部門", "department"),
        ("員工編號", "employee_code"),
        ("姓名", "employee_name"),
        ("事件日期", "event_date"),
        ("考核代碼", "standard_code"),
        ("獎勵點數", "points"),
        ("事由", "reason"),
    ],
    has_checklist: false,
};
