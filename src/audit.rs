// 🔎 Audit Rule Engine - Fraud and inconsistency signals
// Scans a batch of legacy records with a fixed, ordered rule set:
// duplicate identifier → income ceiling → minor with income → missing fields

use crate::config::AuditSettings;
use crate::records::{age_on, LegacyEntry, LegacyRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Placeholder for name / tax id when the record has none
const UNKNOWN: &str = "Unknown";

// ============================================================================
// AUDIT SUBJECT
// ============================================================================

/// Anything shaped like a legacy record.
///
/// Accessors return `None` when the value is absent or cannot be read, so
/// the engine can audit validated entries and raw payloads alike.
pub trait AuditSubject {
    fn subject_id(&self) -> i64;
    fn subject_name(&self) -> Option<&str>;
    fn subject_tax_id(&self) -> Option<&str>;
    fn subject_birth_date(&self) -> Option<NaiveDate>;
    fn subject_income(&self) -> Option<f64>;

    /// Human-readable list of absent, malformed or unreadable fields
    fn field_issues(&self) -> Vec<String>;
}

impl AuditSubject for LegacyEntry {
    fn subject_id(&self) -> i64 {
        self.id()
    }

    fn subject_name(&self) -> Option<&str> {
        Some(self.name())
    }

    fn subject_tax_id(&self) -> Option<&str> {
        Some(self.tax_id().as_str())
    }

    fn subject_birth_date(&self) -> Option<NaiveDate> {
        Some(self.birth_date())
    }

    fn subject_income(&self) -> Option<f64> {
        Some(self.gross_income())
    }

    fn field_issues(&self) -> Vec<String> {
        Vec::new()
    }
}

impl AuditSubject for LegacyRecord {
    fn subject_id(&self) -> i64 {
        self.id
    }

    fn subject_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    fn subject_tax_id(&self) -> Option<&str> {
        self.tax_id.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    fn subject_birth_date(&self) -> Option<NaiveDate> {
        self.parsed_birth_date()
    }

    fn subject_income(&self) -> Option<f64> {
        self.parsed_gross_income()
    }

    fn field_issues(&self) -> Vec<String> {
        self.field_problems()
            .iter()
            .map(|p| p.to_string())
            .collect()
    }
}

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    DuplicateIdentifier,
    IncomeAboveCeiling,
    MinorWithIncome,
    MissingRequiredFields,
}

impl AuditReason {
    /// Evaluation order; findings for one record follow it
    pub const ORDERED: [AuditReason; 4] = [
        AuditReason::DuplicateIdentifier,
        AuditReason::IncomeAboveCeiling,
        AuditReason::MinorWithIncome,
        AuditReason::MissingRequiredFields,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            AuditReason::DuplicateIdentifier => "duplicate_identifier",
            AuditReason::IncomeAboveCeiling => "income_above_ceiling",
            AuditReason::MinorWithIncome => "minor_with_income",
            AuditReason::MissingRequiredFields => "missing_required_fields",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AuditReason::DuplicateIdentifier => "Duplicate identifier",
            AuditReason::IncomeAboveCeiling => "Income above ceiling",
            AuditReason::MinorWithIncome => "Minor with income",
            AuditReason::MissingRequiredFields => "Missing required fields",
        }
    }
}

/// One (record, reason) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousRecord {
    pub record_id: i64,
    pub name: String,
    #[serde(rename = "cpf")]
    pub tax_id: String,
    pub reason: AuditReason,
    /// Human-readable form of `reason`
    pub description: String,
    /// What triggered the rule, e.g. the offending value
    pub detail: String,
}

impl SuspiciousRecord {
    fn new<S: AuditSubject>(subject: &S, reason: AuditReason, detail: String) -> Self {
        SuspiciousRecord {
            record_id: subject.subject_id(),
            name: subject.subject_name().unwrap_or(UNKNOWN).to_string(),
            tax_id: subject.subject_tax_id().unwrap_or(UNKNOWN).to_string(),
            reason,
            description: reason.description().to_string(),
            detail,
        }
    }
}

// ============================================================================
// AUDIT REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub id: Uuid,
    pub total_checked: usize,
    /// Distinct records with at least one finding
    pub total_suspect: usize,
    pub findings: Vec<SuspiciousRecord>,
    pub generated_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn summary(&self) -> String {
        format!(
            "{} records checked, {} suspect, {} findings",
            self.total_checked,
            self.total_suspect,
            self.findings.len()
        )
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings for one record id, in rule order
    pub fn findings_for(&self, record_id: i64) -> Vec<&SuspiciousRecord> {
        self.findings
            .iter()
            .filter(|f| f.record_id == record_id)
            .collect()
    }

    pub fn count_by_reason(&self, reason: AuditReason) -> usize {
        self.findings.iter().filter(|f| f.reason == reason).count()
    }
}

// ============================================================================
// AUDIT ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct AuditEngine {
    /// Incomes strictly above this are flagged (default: 1,000,000)
    pub income_ceiling: f64,

    /// Age from which a taxpayer counts as an adult (default: 18)
    pub adult_age: i32,
}

impl AuditEngine {
    /// Create engine with default thresholds
    pub fn new() -> Self {
        AuditEngine::with_settings(&AuditSettings::default())
    }

    pub fn with_settings(settings: &AuditSettings) -> Self {
        AuditEngine {
            income_ceiling: settings.income_ceiling,
            adult_age: settings.adult_age,
        }
    }

    /// Audit a batch as of now
    pub fn run<S: AuditSubject>(&self, records: &[S]) -> AuditReport {
        self.run_at(records, Utc::now())
    }

    /// Audit a batch as of `now`; ages are computed on `now`'s UTC date
    pub fn run_at<S: AuditSubject>(&self, records: &[S], now: DateTime<Utc>) -> AuditReport {
        let identifier_counts = count_identifiers(records);
        let today = now.date_naive();

        let mut findings = Vec::new();
        let mut total_suspect = 0;

        for record in records {
            let before = findings.len();

            for reason in AuditReason::ORDERED {
                if let Some(detail) = self.evaluate(reason, record, &identifier_counts, today) {
                    debug!(
                        record_id = record.subject_id(),
                        reason = reason.code(),
                        detail = %detail,
                        "audit finding"
                    );
                    findings.push(SuspiciousRecord::new(record, reason, detail));
                }
            }

            if findings.len() > before {
                total_suspect += 1;
            }
        }

        let report = AuditReport {
            id: Uuid::new_v4(),
            total_checked: records.len(),
            total_suspect,
            findings,
            generated_at: now,
        };

        info!(
            report_id = %report.id,
            total_checked = report.total_checked,
            total_suspect = report.total_suspect,
            findings = report.findings.len(),
            "audit complete"
        );

        report
    }

    fn evaluate<S: AuditSubject>(
        &self,
        reason: AuditReason,
        record: &S,
        identifier_counts: &HashMap<&str, usize>,
        today: NaiveDate,
    ) -> Option<String> {
        match reason {
            AuditReason::DuplicateIdentifier => check_duplicate(record, identifier_counts),
            AuditReason::IncomeAboveCeiling => self.check_income_ceiling(record),
            AuditReason::MinorWithIncome => self.check_minor_with_income(record, today),
            AuditReason::MissingRequiredFields => check_missing_fields(record),
        }
    }

    // ========================================================================
    // RULES
    // ========================================================================

    fn check_income_ceiling<S: AuditSubject>(&self, record: &S) -> Option<String> {
        let income = record.subject_income()?;
        (income > self.income_ceiling).then(|| {
            format!(
                "income {:.2} exceeds ceiling {:.2}",
                income, self.income_ceiling
            )
        })
    }

    fn check_minor_with_income<S: AuditSubject>(&self, record: &S, today: NaiveDate) -> Option<String> {
        let birth_date = record.subject_birth_date()?;
        let income = record.subject_income()?;
        let age = age_on(birth_date, today);

        (age < self.adult_age && income > 0.0)
            .then(|| format!("age {} with income {:.2}", age, income))
    }
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Occurrences of each non-empty tax id in the batch
fn count_identifiers<S: AuditSubject>(records: &[S]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for tax_id in records.iter().filter_map(|r| r.subject_tax_id()) {
        *counts.entry(tax_id).or_insert(0) += 1;
    }
    counts
}

fn check_duplicate<S: AuditSubject>(record: &S, counts: &HashMap<&str, usize>) -> Option<String> {
    let tax_id = record.subject_tax_id()?;
    let occurrences = counts.get(tax_id).copied().unwrap_or(0);
    (occurrences > 1).then(|| format!("identifier {} appears {} times", tax_id, occurrences))
}

fn check_missing_fields<S: AuditSubject>(record: &S) -> Option<String> {
    let issues = record.field_issues();
    (!issues.is_empty()).then(|| issues.join("; "))
}

/// Audit a batch with default thresholds as of now
pub fn run_audit<S: AuditSubject>(records: &[S]) -> AuditReport {
    AuditEngine::new().run(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{legacy_records_from_json, read_legacy_csv, RawAmount};
    use chrono::TimeZone;

    fn audit_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(id: i64, tax_id: &str, birth: NaiveDate, income: f64) -> LegacyEntry {
        LegacyEntry::new(id, &format!("Taxpayer {}", id), tax_id, birth, income, "").unwrap()
    }

    fn adult(id: i64, tax_id: &str, income: f64) -> LegacyEntry {
        entry(id, tax_id, date(1980, 1, 1), income)
    }

    #[test]
    fn test_empty_batch() {
        let engine = AuditEngine::new();
        let report = engine.run_at::<LegacyEntry>(&[], audit_time());

        assert_eq!(report.total_checked, 0);
        assert_eq!(report.total_suspect, 0);
        assert!(report.findings.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_clean_batch() {
        let records = vec![
            adult(1, "111.111.111-11", 50_000.0),
            adult(2, "222.222.222-22", 0.0),
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.total_checked, 2);
        assert_eq!(report.total_suspect, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_duplicate_identifier_flags_every_occurrence() {
        let records = vec![
            adult(1, "111.222.333-44", 1000.0),
            adult(2, "555.666.777-88", 1000.0),
            adult(3, "111.222.333-44", 1000.0),
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.total_checked, 3);
        assert_eq!(report.total_suspect, 2);
        assert_eq!(report.count_by_reason(AuditReason::DuplicateIdentifier), 2);
        assert_eq!(report.findings_for(1)[0].reason, AuditReason::DuplicateIdentifier);
        assert_eq!(report.findings_for(3)[0].tax_id, "111.222.333-44");
        assert!(report.findings_for(2).is_empty());
    }

    #[test]
    fn test_income_ceiling_is_strict() {
        let records = vec![
            adult(1, "111.111.111-11", 1_000_000.0),
            adult(2, "222.222.222-22", 1_000_000.01),
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert!(report.findings_for(1).is_empty());
        assert_eq!(report.findings_for(2).len(), 1);
        assert_eq!(report.findings_for(2)[0].reason, AuditReason::IncomeAboveCeiling);
        assert_eq!(report.total_suspect, 1);
    }

    #[test]
    fn test_minor_with_income_boundary() {
        let records = vec![
            // Exactly 18 on audit day: adult
            entry(1, "111.111.111-11", date(2007, 6, 1), 10.0),
            // One day short of 18
            entry(2, "222.222.222-22", date(2007, 6, 2), 10.0),
            // Minor without income
            entry(3, "333.333.333-33", date(2015, 1, 1), 0.0),
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert!(report.findings_for(1).is_empty());
        assert_eq!(report.findings_for(2)[0].reason, AuditReason::MinorWithIncome);
        assert!(report.findings_for(3).is_empty());
        assert_eq!(report.total_suspect, 1);
    }

    #[test]
    fn test_one_finding_per_rule_in_fixed_order() {
        let records = vec![
            entry(1, "111.222.333-44", date(2015, 3, 3), 2_000_000.0),
            adult(2, "111.222.333-44", 10.0),
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());
        let reasons: Vec<AuditReason> = report.findings_for(1).iter().map(|f| f.reason).collect();

        assert_eq!(
            reasons,
            vec![
                AuditReason::DuplicateIdentifier,
                AuditReason::IncomeAboveCeiling,
                AuditReason::MinorWithIncome,
            ]
        );
        assert_eq!(report.findings.len(), 4);
        assert_eq!(report.total_suspect, 2);
    }

    #[test]
    fn test_missing_fields_on_loose_records() {
        let records = vec![
            LegacyRecord {
                id: 1,
                name: None,
                tax_id: Some("111.222.333-44".to_string()),
                birth_date: Some("1980-01-01".to_string()),
                gross_income: Some(RawAmount::Number(100.0)),
                ..Default::default()
            },
            LegacyRecord {
                id: 2,
                name: Some("Bea".to_string()),
                tax_id: Some("".to_string()),
                birth_date: None,
                gross_income: None,
                ..Default::default()
            },
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.total_suspect, 2);
        let first = report.findings_for(1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].reason, AuditReason::MissingRequiredFields);
        assert_eq!(first[0].name, "Unknown");

        let second = report.findings_for(2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].tax_id, "Unknown");
        assert!(second[0].detail.contains("cpf"));
        assert!(second[0].detail.contains("birth_date"));
        assert!(second[0].detail.contains("gross_income"));
    }

    #[test]
    fn test_malformed_birth_date_becomes_finding_not_error() {
        let records = vec![LegacyRecord {
            id: 9,
            name: Some("Caio".to_string()),
            tax_id: Some("999.888.777-66".to_string()),
            birth_date: Some("31/12/2010".to_string()),
            gross_income: Some(RawAmount::Number(500.0)),
            ..Default::default()
        }];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.total_checked, 1);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].reason, AuditReason::MissingRequiredFields);
        assert!(report.findings[0].detail.contains("31/12/2010"));
    }

    #[test]
    fn test_non_canonical_identifier_is_invalid_field() {
        let records = vec![LegacyRecord {
            id: 4,
            name: Some("Duda".to_string()),
            tax_id: Some("11122233344".to_string()),
            birth_date: Some("1980-01-01".to_string()),
            gross_income: Some(RawAmount::Text("$1,000".to_string())),
            ..Default::default()
        }];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].reason, AuditReason::MissingRequiredFields);
        assert_eq!(report.findings[0].tax_id, "11122233344");
    }

    #[test]
    fn test_bad_csv_row_is_audited_not_fatal() {
        let data = "\
id,name,cpf,birth_date,gross_income,timestamp
1,Ana Lima,123.456.789-10,1978-01-15,6100.00,2025-05-06T14:28:41Z
2,Bea Souza,111.222.333-44,1990-01-01,100,yesterday
";
        let records = read_legacy_csv(data.as_bytes()).unwrap();
        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.total_checked, 2);
        assert_eq!(report.total_suspect, 1);
        assert!(report.findings_for(1).is_empty());

        let bad = report.findings_for(2);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].reason, AuditReason::MissingRequiredFields);
        assert!(bad[0].detail.contains("yesterday"));
    }

    #[test]
    fn test_unreadable_json_element_is_audited_not_fatal() {
        let values: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"id": 1, "name": "Ana", "cpf": "123.456.789-10",
                 "birth_date": "1978-01-15", "gross_income": 6100},
                {"id": "not-a-number", "name": "Bea"}
            ]"#,
        )
        .unwrap();

        let records = legacy_records_from_json(values);
        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.total_checked, 2);
        let bad = report.findings_for(2);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].reason, AuditReason::MissingRequiredFields);
        assert_eq!(bad[0].name, "Unknown");
        assert!(bad[0].detail.starts_with("Unreadable record"));
    }

    #[test]
    fn test_blank_identifiers_are_not_duplicates() {
        let records = vec![
            LegacyRecord {
                id: 1,
                name: Some("A".to_string()),
                birth_date: Some("1980-01-01".to_string()),
                gross_income: Some(RawAmount::Number(1.0)),
                ..Default::default()
            },
            LegacyRecord {
                id: 2,
                name: Some("B".to_string()),
                birth_date: Some("1980-01-01".to_string()),
                gross_income: Some(RawAmount::Number(1.0)),
                ..Default::default()
            },
        ];

        let report = AuditEngine::new().run_at(&records, audit_time());

        assert_eq!(report.count_by_reason(AuditReason::DuplicateIdentifier), 0);
        assert_eq!(report.count_by_reason(AuditReason::MissingRequiredFields), 2);
    }

    #[test]
    fn test_custom_thresholds() {
        let engine = AuditEngine::with_settings(&AuditSettings {
            income_ceiling: 100.0,
            adult_age: 21,
        });
        let records = vec![entry(1, "111.111.111-11", date(2005, 1, 1), 150.0)];

        let report = engine.run_at(&records, audit_time());

        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].reason, AuditReason::IncomeAboveCeiling);
        assert_eq!(report.findings[1].reason, AuditReason::MinorWithIncome);
    }

    #[test]
    fn test_report_serializes_reason_codes() {
        let records = vec![adult(1, "111.111.111-11", 2_000_000.0)];
        let report = AuditEngine::new().run_at(&records, audit_time());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_checked"], 1);
        assert_eq!(json["total_suspect"], 1);
        assert_eq!(json["findings"][0]["reason"], "income_above_ceiling");
        assert_eq!(json["findings"][0]["description"], "Income above ceiling");
        assert_eq!(json["findings"][0]["cpf"], "111.111.111-11");
        assert_eq!(AuditReason::IncomeAboveCeiling.code(), "income_above_ceiling");
    }

    #[test]
    fn test_report_summary() {
        let records = vec![adult(1, "111.111.111-11", 1.0)];
        let report = run_audit(&records);

        assert_eq!(report.summary(), "1 records checked, 0 suspect, 0 findings");
    }
}
