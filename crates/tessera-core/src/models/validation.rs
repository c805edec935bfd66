//! Bind validation results.
//!
//! Eligibility checks report their findings as data rather than as
//! `Err` values: a [`ValidationResult`] carries zero or more errors
//! and warnings, and only the caller decides whether warnings block.
//! Errors and warnings carry a stable [`ReasonCode`] plus a rendered
//! message with the concrete ids and values baked in.

use serde::{Deserialize, Serialize};

/// Who is asking for an eligibility verdict. Several checks demote
/// errors to warnings (or skip entirely) depending on the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerType {
    /// An actual bind about to create an entitlement.
    Bind,
    /// Autobind scoring candidate pools.
    BestPools,
    /// A pool listing filtering what to show.
    ListPools,
    /// Quantity adjustments and other internal re-checks.
    Unknown,
}

/// Stable machine-readable codes for refusal reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    PoolNotStarted,
    PoolExpired,
    QuantityExhausted,
    QuantityNotPositive,
    MultiEntitlementUnsupported,
    QuantityIncrement,
    ConsumerTypeMismatch,
    AlreadyEntitled,
    VirtRestricted,
    PhysicalRestricted,
    VirtHostMismatch,
    UnmappedGuestHasHost,
    UnmappedGuestGraceExpired,
    UnmappedGuestFutureBind,
    ManifestRestricted,
    CapabilityUnsupported,
    SlaMismatch,
    RestrictedToUsername,
    ConsumerMismatch,
    ArchMismatch,
    UndersizedSockets,
    UndersizedCores,
    UndersizedRam,
    UndersizedVcpu,
    UndersizedStorageBand,
}

impl ReasonCode {
    pub fn key(&self) -> &'static str {
        match self {
            ReasonCode::PoolNotStarted => "pool.not.started",
            ReasonCode::PoolExpired => "pool.expired",
            ReasonCode::QuantityExhausted => "quantity.exhausted",
            ReasonCode::QuantityNotPositive => "quantity.not.positive",
            ReasonCode::MultiEntitlementUnsupported => "multi.entitlement.unsupported",
            ReasonCode::QuantityIncrement => "quantity.increment.mismatch",
            ReasonCode::ConsumerTypeMismatch => "consumer.type.mismatch",
            ReasonCode::AlreadyEntitled => "already.entitled",
            ReasonCode::VirtRestricted => "virt.only",
            ReasonCode::PhysicalRestricted => "physical.only",
            ReasonCode::VirtHostMismatch => "virt.host.mismatch",
            ReasonCode::UnmappedGuestHasHost => "unmapped.guest.has.host",
            ReasonCode::UnmappedGuestGraceExpired => "unmapped.guest.grace.expired",
            ReasonCode::UnmappedGuestFutureBind => "unmapped.guest.future.bind",
            ReasonCode::ManifestRestricted => "manifest.restricted",
            ReasonCode::CapabilityUnsupported => "capability.unsupported",
            ReasonCode::SlaMismatch => "service.level.mismatch",
            ReasonCode::RestrictedToUsername => "restricted.to.username",
            ReasonCode::ConsumerMismatch => "consumer.mismatch",
            ReasonCode::ArchMismatch => "arch.mismatch",
            ReasonCode::UndersizedSockets => "undersized.sockets",
            ReasonCode::UndersizedCores => "undersized.cores",
            ReasonCode::UndersizedRam => "undersized.ram",
            ReasonCode::UndersizedVcpu => "undersized.vcpu",
            ReasonCode::UndersizedStorageBand => "undersized.storage.band",
        }
    }
}

/// One refusal reason with its rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub message: String,
}

/// The outcome of evaluating one (consumer, pool, quantity) request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<Reason>,
    pub warnings: Vec<Reason>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, code: ReasonCode, message: impl Into<String>) {
        self.errors.push(Reason {
            code,
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, code: ReasonCode, message: impl Into<String>) {
        self.warnings.push(Reason {
            code,
            message: message.into(),
        });
    }

    /// True when no errors were raised. Warnings do not block.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_error(&self, code: ReasonCode) -> bool {
        self.errors.iter().any(|r| r.code == code)
    }

    pub fn has_warning(&self, code: ReasonCode) -> bool {
        self.warnings.iter().any(|r| r.code == code)
    }

    pub fn first_error(&self) -> Option<&Reason> {
        self.errors.first()
    }

    /// One-line summary for error display, listing error keys.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "no errors".into();
        }
        self.errors
            .iter()
            .map(|r| r.code.key())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
