//! Engine configuration.

/// One criterion in the autobind group ranking chain. Criteria are
/// applied in order; the first one that separates two candidate
/// groups decides between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankCriterion {
    /// Prefer groups with more host-restricted pools.
    HostAffinity,
    /// Prefer groups with more virt-only pools.
    VirtAffinity,
    /// Prefer groups with a higher average fit score.
    AverageScore,
    /// Prefer groups consuming less total quantity.
    SmallestQuantity,
    /// Prefer a single plain entitlement over a stack.
    PreferUnstacked,
}

/// How a service-level mismatch during eligibility is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlaStrictness {
    /// Mismatch is a warning; the bind may proceed.
    #[default]
    Lenient,
    /// Mismatch is a blocking error.
    Strict,
}

/// Configuration for the policy engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Autobind ranking chain, highest precedence first.
    pub ranking: Vec<RankCriterion>,
    /// Whether service-level mismatches block binds (default: lenient).
    pub sla_strictness: SlaStrictness,
    /// Hours after registration during which a guest may use
    /// unmapped-guest pools (default: 24).
    pub unmapped_guest_grace_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ranking: vec![
                RankCriterion::HostAffinity,
                RankCriterion::VirtAffinity,
                RankCriterion::AverageScore,
                RankCriterion::SmallestQuantity,
                RankCriterion::PreferUnstacked,
            ],
            sla_strictness: SlaStrictness::Lenient,
            unmapped_guest_grace_hours: 24,
        }
    }
}
