// 🏗️ Legacy Parser / Transformer
// Fixed-format COBOL-style lines → structured fields → modern records

use crate::config::TransformSettings;
use crate::error::ParseError;
use crate::records::{
    age_on, parse_iso_date, punctuate_identifier, EntryStatus, LegacyEntry, ModernEntry,
};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A label is a word immediately followed by `:` (whitespace allowed before the colon)
static LABEL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z][A-Za-z_]*)\s*:").expect("label pattern is valid"));

static NUMERIC_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("amount pattern is valid"));

/// Digits needed to produce an `NNN-NN-NNNN` identifier
pub const IDENTIFIER_DIGITS: usize = 9;

// ============================================================================
// CORE TYPES
// ============================================================================

/// LegacyField - The three fields a fixed-format line must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyField {
    Name,
    BirthDate,
    Income,
}

impl LegacyField {
    /// Canonical key in parser output
    pub fn key(&self) -> &'static str {
        match self {
            LegacyField::Name => "name",
            LegacyField::BirthDate => "birth_date",
            LegacyField::Income => "income",
        }
    }

    /// Case-insensitive label lookup (legacy Portuguese labels and English aliases)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "nome" | "name" => Some(LegacyField::Name),
            "nasc" | "birth" => Some(LegacyField::BirthDate),
            "rend" | "income" => Some(LegacyField::Income),
            _ => None,
        }
    }
}

/// ParsedFields - Output of `parse_fixed_text`
///
/// Serializes to exactly `{name, birth_date, income}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    /// Title-cased
    pub name: String,
    pub birth_date: NaiveDate,
    /// Numeric string with currency symbol and grouping removed
    pub income: String,
}

// ============================================================================
// FIXED-FORMAT PARSING
// ============================================================================

/// Split a line into `(label, value)` pairs.
///
/// Each `label:` marker starts a field; its value runs until the next marker
/// or the end of the line, trimmed. Text before the first marker is dropped.
pub fn scan_labels(raw: &str) -> Vec<(String, String)> {
    let markers: Vec<(&str, usize, usize)> = LABEL_MARKER
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?;
            Some((label.as_str(), whole.start(), whole.end()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, (label, _, value_start))| {
            let value_end = markers.get(i + 1).map(|m| m.1).unwrap_or(raw.len());
            (label.to_string(), raw[*value_start..value_end].trim().to_string())
        })
        .collect()
}

/// Parse a line such as `NOME: JOHN DOE   NASC: 1960-05-15   REND: $45000.00`.
///
/// All-or-nothing: every field must be present with a non-empty value, the
/// date must be strict `YYYY-MM-DD` and the income a non-negative number.
/// Unknown labels are ignored; a repeated label keeps its last value.
pub fn parse_fixed_text(raw: &str) -> Result<ParsedFields, ParseError> {
    let mut name: Option<String> = None;
    let mut birth_date: Option<String> = None;
    let mut income: Option<String> = None;

    for (label, value) in scan_labels(raw) {
        match LegacyField::from_label(&label) {
            Some(LegacyField::Name) => name = Some(value),
            Some(LegacyField::BirthDate) => birth_date = Some(value),
            Some(LegacyField::Income) => income = Some(value),
            None => debug!(label = %label, "ignoring unknown label"),
        }
    }

    let name = name.filter(|v| !v.is_empty());
    let birth_date = birth_date.filter(|v| !v.is_empty());
    let income = income.filter(|v| !v.is_empty());

    let missing: Vec<&'static str> = [
        (LegacyField::Name, name.is_none()),
        (LegacyField::BirthDate, birth_date.is_none()),
        (LegacyField::Income, income.is_none()),
    ]
    .iter()
    .filter(|(_, absent)| *absent)
    .map(|(field, _)| field.key())
    .collect();

    let (Some(name), Some(birth_date), Some(income)) = (name, birth_date, income) else {
        return Err(ParseError::IncompleteRecord { missing });
    };

    let birth_date =
        parse_iso_date(&birth_date).ok_or_else(|| ParseError::MalformedDate(birth_date.clone()))?;

    Ok(ParsedFields {
        name: title_case(&name),
        birth_date,
        income: clean_amount(&income)?,
    })
}

/// Strip `$`, grouping commas and whitespace, keeping the numeric text
fn clean_amount(raw: &str) -> Result<String, ParseError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();

    if NUMERIC_AMOUNT.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(ParseError::MalformedIncome(raw.to_string()))
    }
}

/// Upper-case the first letter of every word, lower-case the rest.
/// Any non-letter starts a new word, so `o'neil` becomes `O'Neil`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;

    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }

    out
}

// ============================================================================
// IDENTIFIER REFORMATTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedIdentifier {
    /// `NNN-NN-NNNN` built from the first nine digits
    Formatted(String),

    /// Too few digits; the cleaned digit string as-is
    Unformatted(String),
}

impl FormattedIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            FormattedIdentifier::Formatted(s) | FormattedIdentifier::Unformatted(s) => s,
        }
    }

    pub fn is_formatted(&self) -> bool {
        matches!(self, FormattedIdentifier::Formatted(_))
    }

    pub fn into_string(self) -> String {
        match self {
            FormattedIdentifier::Formatted(s) | FormattedIdentifier::Unformatted(s) => s,
        }
    }
}

/// Re-punctuate an unvalidated tax identifier into the `NNN-NN-NNNN` scheme.
///
/// Validated entries go through `TaxId::modern_identifier` instead; this is
/// for raw strings, where short input falls back to the bare digits.
pub fn reformat_identifier(raw: &str) -> FormattedIdentifier {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < IDENTIFIER_DIGITS {
        warn!(
            digits = digits.as_str(),
            "identifier has fewer than {} digits; left unformatted", IDENTIFIER_DIGITS
        );
        return FormattedIdentifier::Unformatted(digits);
    }

    FormattedIdentifier::Formatted(punctuate_identifier(&digits))
}

// ============================================================================
// LEGACY → MODERN
// ============================================================================

/// Projects legacy entries into modern records
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    default_status: EntryStatus,
}

impl Transformer {
    pub fn new(settings: &TransformSettings) -> Self {
        Transformer {
            default_status: settings.default_status,
        }
    }

    pub fn to_modern(&self, entry: &LegacyEntry) -> ModernEntry {
        self.to_modern_at(entry, Utc::now())
    }

    /// Transform with a fixed clock; `now` drives both age and timestamp
    pub fn to_modern_at(&self, entry: &LegacyEntry, now: DateTime<Utc>) -> ModernEntry {
        ModernEntry {
            legacy_id: entry.id(),
            full_name: title_case(entry.name()),
            identifier: entry.tax_id().modern_identifier(),
            birth_date: entry.birth_date(),
            income: entry.gross_income(),
            taxes: entry.tax_paid(),
            age: age_on(entry.birth_date(), now.date_naive()),
            status: entry.status().unwrap_or(self.default_status),
            timestamp: now,
        }
    }
}

/// Transform with default settings at the current time
pub fn legacy_to_modern(entry: &LegacyEntry) -> ModernEntry {
    Transformer::default().to_modern(entry)
}

/// Transform with default settings at a fixed time
pub fn legacy_to_modern_at(entry: &LegacyEntry, now: DateTime<Utc>) -> ModernEntry {
    Transformer::default().to_modern_at(entry, now)
}

// ============================================================================
// TESTS
// ============================================================================
