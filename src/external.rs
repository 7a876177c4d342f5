// 🏛️ Federal Registry - Validation, income score and debt checks
// The core only sees the `FederalRegistry` capability; callers choose
// between the simulated registry and a deterministic fake.

use crate::error::RecordError;
use crate::records::TaxId;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// Scores are reported in `0..SCORE_RANGE`
pub const SCORE_RANGE: u32 = 1000;

// ============================================================================
// REGISTRY CAPABILITY
// ============================================================================

pub trait FederalRegistry: Send + Sync {
    /// Whether the registry recognises this identifier
    fn validate_identifier(&self, tax_id: &TaxId) -> bool;

    /// Income score in `0..1000`
    fn fetch_score(&self, tax_id: &TaxId) -> u32;

    /// Whether the taxpayer has outstanding debts
    fn check_debts(&self, tax_id: &TaxId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCheckResult {
    #[serde(rename = "cpf")]
    pub tax_id: String,
    pub is_valid: bool,
    pub income_score: u32,
    pub has_debts: bool,
    pub checked_at: DateTime<Utc>,
}

/// Query all three registry capabilities for one identifier
pub fn external_check(
    registry: &dyn FederalRegistry,
    tax_id: &str,
) -> Result<ExternalCheckResult, RecordError> {
    let tax_id = TaxId::parse(tax_id)?;

    let result = ExternalCheckResult {
        is_valid: registry.validate_identifier(&tax_id),
        income_score: registry.fetch_score(&tax_id),
        has_debts: registry.check_debts(&tax_id),
        tax_id: tax_id.to_string(),
        checked_at: Utc::now(),
    };

    debug!(
        tax_id = %result.tax_id,
        is_valid = result.is_valid,
        income_score = result.income_score,
        has_debts = result.has_debts,
        "external check"
    );
    Ok(result)
}

// ============================================================================
// SIMULATED REGISTRY
// ============================================================================

/// Stand-in for the federal services.
///
/// Validation succeeds two times out of three, debts are reported with
/// probability 0.3, and the score is the digit sum modulo 1000.
pub struct SimulatedRegistry {
    rng: Mutex<StdRng>,
    debt_probability: f64,
}

impl SimulatedRegistry {
    pub fn new() -> Self {
        SimulatedRegistry::from_rng(StdRng::from_entropy())
    }

    /// Reproducible sequence of answers
    pub fn seeded(seed: u64) -> Self {
        SimulatedRegistry::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        SimulatedRegistry {
            rng: Mutex::new(rng),
            debt_probability: 0.3,
        }
    }

    fn roll(&self, probability: f64) -> bool {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(probability),
            Err(poisoned) => poisoned.into_inner().gen_bool(probability),
        }
    }
}

impl Default for SimulatedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FederalRegistry for SimulatedRegistry {
    fn validate_identifier(&self, _tax_id: &TaxId) -> bool {
        self.roll(2.0 / 3.0)
    }

    fn fetch_score(&self, tax_id: &TaxId) -> u32 {
        digit_sum(tax_id) % SCORE_RANGE
    }

    fn check_debts(&self, _tax_id: &TaxId) -> bool {
        self.roll(self.debt_probability)
    }
}

fn digit_sum(tax_id: &TaxId) -> u32 {
    tax_id.digits().chars().filter_map(|c| c.to_digit(10)).sum()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRegistry {
        valid: bool,
        score: u32,
        debts: bool,
    }

    impl FederalRegistry for FixedRegistry {
        fn validate_identifier(&self, _tax_id: &TaxId) -> bool {
            self.valid
        }

        fn fetch_score(&self, _tax_id: &TaxId) -> u32 {
            self.score
        }

        fn check_debts(&self, _tax_id: &TaxId) -> bool {
            self.debts
        }
    }

    #[test]
    fn test_external_check_uses_injected_registry() {
        let registry = FixedRegistry {
            valid: true,
            score: 512,
            debts: false,
        };

        let result = external_check(&registry, "123.456.789-10").unwrap();

        assert_eq!(result.tax_id, "123.456.789-10");
        assert!(result.is_valid);
        assert_eq!(result.income_score, 512);
        assert!(!result.has_debts);
    }

    #[test]
    fn test_external_check_rejects_malformed_identifier() {
        let registry = FixedRegistry {
            valid: true,
            score: 0,
            debts: false,
        };

        let result = external_check(&registry, "12345678910");
        assert!(matches!(result, Err(RecordError::InvalidIdentifierFormat(_))));
    }

    #[test]
    fn test_simulated_score_is_digit_sum() {
        let registry = SimulatedRegistry::seeded(7);
        let tax_id = TaxId::parse("123.456.789-10").unwrap();

        // 1+2+3+4+5+6+7+8+9+1+0
        assert_eq!(registry.fetch_score(&tax_id), 46);
    }

    #[test]
    fn test_seeded_registry_is_reproducible() {
        let tax_id = TaxId::parse("111.222.333-44").unwrap();
        let a = SimulatedRegistry::seeded(42);
        let b = SimulatedRegistry::seeded(42);

        let answers_a: Vec<(bool, bool)> = (0..20)
            .map(|_| (a.validate_identifier(&tax_id), a.check_debts(&tax_id)))
            .collect();
        let answers_b: Vec<(bool, bool)> = (0..20)
            .map(|_| (b.validate_identifier(&tax_id), b.check_debts(&tax_id)))
            .collect();

        assert_eq!(answers_a, answers_b);
    }

    #[test]
    fn test_simulated_validation_rate() {
        let registry = SimulatedRegistry::seeded(1);
        let tax_id = TaxId::parse("111.222.333-44").unwrap();

        let valid = (0..3000)
            .filter(|_| registry.validate_identifier(&tax_id))
            .count();

        // Expect roughly two thirds
        assert!(valid > 1800 && valid < 2200, "valid = {}", valid);
    }
}
