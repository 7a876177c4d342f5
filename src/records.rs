// 🗂️ Tax Records - Legacy and Modern value types
// Records captured from legacy systems, their loose input shape, and the
// normalized projection produced by the transformer

use crate::error::RecordError;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

static TAX_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}\.\d{3}\.\d{3}-\d{2}$").expect("tax id pattern is valid"));

static ISO_DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

// ============================================================================
// TAX IDENTIFIER
// ============================================================================

/// National tax identifier (CPF) in canonical `NNN.NNN.NNN-NN` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

impl TaxId {
    /// Validate and wrap a canonical identifier. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, RecordError> {
        let trimmed = raw.trim();
        if TAX_ID_PATTERN.is_match(trimmed) {
            Ok(TaxId(trimmed.to_string()))
        } else {
            Err(RecordError::InvalidIdentifierFormat(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The eleven digits with punctuation stripped
    pub fn digits(&self) -> String {
        self.0.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    /// `NNN-NN-NNNN` from the first nine digits; always available for a canonical id
    pub fn modern_identifier(&self) -> String {
        punctuate_identifier(&self.digits())
    }
}

/// `NNN-NN-NNNN` from the first nine of `digits`, which must hold at least nine ASCII digits
pub(crate) fn punctuate_identifier(digits: &str) -> String {
    format!("{}-{}-{}", &digits[0..3], &digits[3..5], &digits[5..9])
}

impl TryFrom<String> for TaxId {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TaxId::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(id: TaxId) -> Self {
        id.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Taxpayer record confirmed active
    #[serde(rename = "Ativo", alias = "Active")]
    Active,

    /// Awaiting review; default when the legacy system carries no status
    #[default]
    #[serde(rename = "Pending", alias = "Pendente")]
    Pending,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Active => "Ativo",
            EntryStatus::Pending => "Pending",
        }
    }

    /// Case-insensitive lookup accepting both the Portuguese and English labels
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "ativo" | "active" => Some(EntryStatus::Active),
            "pending" | "pendente" => Some(EntryStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LOOSE INPUT SHAPE
// ============================================================================

/// Amount as received: a JSON number or free text such as `"$45,000.00"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    /// Numeric value, if it can be read as a finite number.
    /// Text has currency symbol, grouping commas and whitespace removed first.
    pub fn to_amount(&self) -> Option<f64> {
        let value = match self {
            RawAmount::Number(n) => *n,
            RawAmount::Text(text) => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
                    .collect();
                cleaned.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, RawAmount::Text(text) if text.trim().is_empty())
    }

    fn describe(&self) -> String {
        match self {
            RawAmount::Number(n) => n.to_string(),
            RawAmount::Text(text) => text.clone(),
        }
    }
}

impl From<f64> for RawAmount {
    fn from(value: f64) -> Self {
        RawAmount::Number(value)
    }
}

/// Legacy record exactly as supplied by an API payload or CSV batch.
///
/// Nothing here is validated; `LegacyEntry::try_from` enforces the invariants.
/// Every field is read leniently (numbers, booleans and text all land as
/// text) so that absent or malformed values become audit findings instead
/// of deserialization errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(default, deserialize_with = "deserialize_loose_id")]
    pub id: i64,

    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub name: Option<String>,

    #[serde(
        default,
        rename = "cpf",
        alias = "tax_id",
        deserialize_with = "deserialize_loose_text"
    )]
    pub tax_id: Option<String>,

    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub birth_date: Option<String>,

    #[serde(default, alias = "income", deserialize_with = "deserialize_loose_amount")]
    pub gross_income: Option<RawAmount>,

    #[serde(default, deserialize_with = "deserialize_loose_amount")]
    pub tax_paid: Option<RawAmount>,

    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub raw_line: Option<String>,

    /// Capture time as received; see [`parse_capture_time`]
    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub timestamp: Option<String>,

    /// Status label as received; see [`EntryStatus::from_label`]
    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub status: Option<String>,

    /// Why the source row could not be read, for placeholder records
    #[serde(skip)]
    pub unreadable: Option<String>,
}

impl LegacyRecord {
    /// Stand-in for a row or payload element that failed to deserialize.
    /// It keeps its place in the batch and reports `reason` as its only problem.
    pub fn unreadable(id: i64, raw_line: Option<String>, reason: impl Into<String>) -> Self {
        LegacyRecord {
            id,
            raw_line,
            unreadable: Some(reason.into()),
            ..LegacyRecord::default()
        }
    }

    /// Every problem that would stop this record from becoming a `LegacyEntry`,
    /// in order: unreadable source, name, tax id, birth date, income, tax paid,
    /// timestamp, status
    pub fn field_problems(&self) -> Vec<RecordError> {
        let mut problems = Vec::new();

        if let Some(reason) = &self.unreadable {
            problems.push(RecordError::Unreadable(reason.clone()));
        }

        problems.extend(self.required_field_problems());

        if let Some(problem) = amount_problem("tax_paid", self.tax_paid.as_ref(), false) {
            problems.push(problem);
        }

        if let Some(raw) = non_blank(self.timestamp.as_deref()) {
            if parse_capture_time(raw).is_none() {
                problems.push(RecordError::MalformedField {
                    field: "timestamp",
                    value: raw.to_string(),
                });
            }
        }

        if let Some(raw) = non_blank(self.status.as_deref()) {
            if EntryStatus::from_label(raw).is_none() {
                problems.push(RecordError::MalformedField {
                    field: "status",
                    value: raw.to_string(),
                });
            }
        }

        problems
    }

    /// Absent, empty or malformed required fields, in order:
    /// name, tax id, birth date, income
    pub fn required_field_problems(&self) -> Vec<RecordError> {
        let mut problems = Vec::new();

        if non_blank(self.name.as_deref()).is_none() {
            problems.push(RecordError::MissingField("name"));
        }

        match non_blank(self.tax_id.as_deref()) {
            None => problems.push(RecordError::MissingField("cpf")),
            Some(raw) => {
                if let Err(e) = TaxId::parse(raw) {
                    problems.push(e);
                }
            }
        }

        match non_blank(self.birth_date.as_deref()) {
            None => problems.push(RecordError::MissingField("birth_date")),
            Some(raw) => {
                if parse_iso_date(raw).is_none() {
                    problems.push(RecordError::MalformedField {
                        field: "birth_date",
                        value: raw.to_string(),
                    });
                }
            }
        }

        if let Some(problem) = amount_problem("gross_income", self.gross_income.as_ref(), true) {
            problems.push(problem);
        }

        problems
    }

    /// Birth date when present and in `YYYY-MM-DD` form
    pub fn parsed_birth_date(&self) -> Option<NaiveDate> {
        non_blank(self.birth_date.as_deref()).and_then(parse_iso_date)
    }

    /// Gross income when present, numeric and non-negative
    pub fn parsed_gross_income(&self) -> Option<f64> {
        self.gross_income
            .as_ref()
            .and_then(RawAmount::to_amount)
            .filter(|v| *v >= 0.0)
    }

    /// Capture time when present and readable
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        non_blank(self.timestamp.as_deref()).and_then(parse_capture_time)
    }

    /// Status signal when present and recognised
    pub fn parsed_status(&self) -> Option<EntryStatus> {
        non_blank(self.status.as_deref()).and_then(EntryStatus::from_label)
    }
}

fn amount_problem(
    field: &'static str,
    raw: Option<&RawAmount>,
    required: bool,
) -> Option<RecordError> {
    let raw = match raw {
        Some(raw) if !raw.is_blank() => raw,
        _ if required => return Some(RecordError::MissingField(field)),
        _ => return None,
    };

    match raw.to_amount() {
        None => Some(RecordError::MalformedField {
            field,
            value: raw.describe(),
        }),
        Some(value) if value < 0.0 => Some(RecordError::NegativeAmount { field, value }),
        Some(_) => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Strict `YYYY-MM-DD`: zero-padded, no sign, no time part
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if !ISO_DATE_PATTERN.is_match(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// Capture timestamps: RFC 3339 with any offset, or naive date-time taken as UTC
pub fn parse_capture_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Scalar as text: strings as-is, numbers and booleans rendered, null as absent.
/// Arrays and objects are kept as their JSON text so they surface as malformed.
fn loose_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn deserialize_loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(loose_text))
}

fn deserialize_loose_amount<'de, D>(deserializer: D) -> Result<Option<RawAmount>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_f64().map(RawAmount::Number),
        other => loose_text(other).map(RawAmount::Text),
    }))
}

/// Integer ids, integral floats and numeric text are accepted; blank means 0.
/// Anything else fails so the caller can substitute an unreadable placeholder.
fn deserialize_loose_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    let id = match &raw {
        None | Some(serde_json::Value::Null) => Some(0),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(serde_json::Value::String(text)) if text.trim().is_empty() => Some(0),
        Some(serde_json::Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    id.ok_or_else(|| {
        let shown = raw.map(|v| v.to_string()).unwrap_or_default();
        serde::de::Error::custom(format!("invalid record id: {}", shown))
    })
}

// ============================================================================
// LEGACY ENTRY
// ============================================================================

/// One validated legacy-system record.
///
/// Built only through [`LegacyEntry::new`] or `TryFrom<LegacyRecord>`, so a
/// value of this type always has a canonical tax id, a non-empty name and
/// non-negative amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyEntry {
    id: i64,
    name: String,
    #[serde(rename = "cpf")]
    tax_id: TaxId,
    birth_date: NaiveDate,
    gross_income: f64,
    tax_paid: f64,
    raw_line: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<EntryStatus>,
}

impl LegacyEntry {
    /// Create an entry captured now, with no tax paid and no status signal
    pub fn new(
        id: i64,
        name: &str,
        tax_id: &str,
        birth_date: NaiveDate,
        gross_income: f64,
        raw_line: &str,
    ) -> Result<Self, RecordError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RecordError::MissingField("name"));
        }

        Ok(LegacyEntry {
            id,
            name: name.to_string(),
            tax_id: TaxId::parse(tax_id)?,
            birth_date,
            gross_income: check_amount("gross_income", gross_income)?,
            tax_paid: 0.0,
            raw_line: raw_line.to_string(),
            timestamp: Utc::now(),
            status: None,
        })
    }

    /// Build from parser output; the fixed-format line carries no tax id
    pub fn from_parsed(
        id: i64,
        tax_id: &str,
        parsed: &crate::parser::ParsedFields,
        raw_line: &str,
    ) -> Result<Self, RecordError> {
        let income = parsed
            .income
            .parse::<f64>()
            .map_err(|_| RecordError::MalformedField {
                field: "gross_income",
                value: parsed.income.clone(),
            })?;

        LegacyEntry::new(id, &parsed.name, tax_id, parsed.birth_date, income, raw_line)
    }

    /// Builder pattern: set tax paid
    pub fn with_tax_paid(mut self, tax_paid: f64) -> Result<Self, RecordError> {
        self.tax_paid = check_amount("tax_paid", tax_paid)?;
        Ok(self)
    }

    /// Builder pattern: set capture timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder pattern: set legacy status signal
    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tax_id(&self) -> &TaxId {
        &self.tax_id
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub fn gross_income(&self) -> f64 {
        self.gross_income
    }

    pub fn tax_paid(&self) -> f64 {
        self.tax_paid
    }

    pub fn raw_line(&self) -> &str {
        &self.raw_line
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> Option<EntryStatus> {
        self.status
    }
}

fn check_amount(field: &'static str, value: f64) -> Result<f64, RecordError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(RecordError::NegativeAmount { field, value })
    }
}

impl TryFrom<LegacyRecord> for LegacyEntry {
    type Error = RecordError;

    fn try_from(record: LegacyRecord) -> Result<Self, Self::Error> {
        if let Some(problem) = record.field_problems().into_iter().next() {
            return Err(problem);
        }

        let birth_date = record
            .parsed_birth_date()
            .ok_or(RecordError::MissingField("birth_date"))?;
        let gross_income = record
            .parsed_gross_income()
            .ok_or(RecordError::MissingField("gross_income"))?;
        let tax_paid = record
            .tax_paid
            .as_ref()
            .filter(|raw| !raw.is_blank())
            .and_then(RawAmount::to_amount)
            .unwrap_or(0.0);

        let mut entry = LegacyEntry::new(
            record.id,
            record.name.as_deref().unwrap_or_default(),
            record.tax_id.as_deref().unwrap_or_default(),
            birth_date,
            gross_income,
            record.raw_line.as_deref().unwrap_or_default(),
        )?
        .with_tax_paid(tax_paid)?;

        if let Some(timestamp) = record.parsed_timestamp() {
            entry = entry.with_timestamp(timestamp);
        }
        if let Some(status) = record.parsed_status() {
            entry = entry.with_status(status);
        }

        Ok(entry)
    }
}

impl From<&LegacyEntry> for LegacyRecord {
    fn from(entry: &LegacyEntry) -> Self {
        LegacyRecord {
            id: entry.id,
            name: Some(entry.name.clone()),
            tax_id: Some(entry.tax_id.to_string()),
            birth_date: Some(entry.birth_date.format("%Y-%m-%d").to_string()),
            gross_income: Some(RawAmount::Number(entry.gross_income)),
            tax_paid: Some(RawAmount::Number(entry.tax_paid)),
            raw_line: Some(entry.raw_line.clone()),
            timestamp: Some(entry.timestamp.to_rfc3339()),
            status: entry.status.map(|status| status.as_str().to_string()),
            unreadable: None,
        }
    }
}

// ============================================================================
// MODERN ENTRY
// ============================================================================

/// Normalized, audit-ready projection of exactly one `LegacyEntry`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModernEntry {
    pub legacy_id: i64,
    pub full_name: String,
    /// Identifier re-punctuated as `NNN-NN-NNNN`
    pub identifier: String,
    pub birth_date: NaiveDate,
    pub income: f64,
    pub taxes: f64,
    pub age: i32,
    pub status: EntryStatus,
    /// Transformation time
    pub timestamp: DateTime<Utc>,
}

/// Whole years between `birth_date` and `today`; a partial year rounds down
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

// ============================================================================
// CSV BATCHES
// ============================================================================

/// Load a batch of legacy records from a CSV file.
///
/// Expected header: `id,name,cpf,birth_date,gross_income,tax_paid,raw_line`
/// (`timestamp` and `status` columns are optional).
pub fn load_legacy_csv(csv_path: &Path) -> Result<Vec<LegacyRecord>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;
    read_legacy_csv(file)
}

/// Read legacy records from any CSV source.
///
/// A row that cannot be deserialized does not fail the batch: it becomes an
/// unreadable placeholder (id = row number) carrying the raw row text.
pub fn read_legacy_csv<R: Read>(reader: R) -> Result<Vec<LegacyRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .byte_headers()
        .context("Failed to read CSV header")?
        .clone();

    let mut records = Vec::new();
    for (index, result) in rdr.byte_records().enumerate() {
        let row = index + 1;
        let raw = result.with_context(|| format!("Failed to read CSV row {}", row))?;

        let record = match raw.deserialize::<LegacyRecord>(Some(&headers)) {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "unreadable legacy record in CSV");
                let raw_line = raw
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).into_owned())
                    .collect::<Vec<_>>()
                    .join(",");
                LegacyRecord::unreadable(row as i64, Some(raw_line), e.to_string())
            }
        };
        records.push(record);
    }

    debug!(count = records.len(), "loaded legacy records from CSV");
    Ok(records)
}

// ============================================================================
// JSON BATCHES
// ============================================================================

/// Convert a JSON batch element by element.
///
/// Elements that are not record objects (or carry an unreadable id) become
/// unreadable placeholders with id = 1-based position.
pub fn legacy_records_from_json(values: Vec<serde_json::Value>) -> Vec<LegacyRecord> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let position = index + 1;
            let raw_line = value.to_string();
            serde_json::from_value::<LegacyRecord>(value).unwrap_or_else(|e| {
                warn!(position, error = %e, "unreadable legacy record in JSON batch");
                LegacyRecord::unreadable(position as i64, Some(raw_line), e.to_string())
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
