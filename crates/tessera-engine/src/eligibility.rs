//! Pre-entitlement eligibility rules.
//!
//! [`evaluate`] decides whether one consumer may draw a given quantity
//! from one pool. The answer is a [`ValidationResult`]: errors block a
//! bind outright, warnings mark the pool as a poor fit but let the
//! bind proceed. Which side of that line a rule lands on can depend on
//! the caller; listing pools downgrades most restrictions to warnings
//! so the pool still shows up, while bind and autobind enforce them.

use chrono::{DateTime, Duration, Utc};
use tessera_core::models::attributes::{AttributeMap, attr};
use tessera_core::models::consumer::{Consumer, ConsumerKind, facts};
use tessera_core::models::validation::{CallerType, ReasonCode, ValidationResult};
use tessera_core::{TesseraError, TesseraResult};

use crate::config::SlaStrictness;
use crate::snapshot::{EntitlementView, PoolView};
use crate::stacking::{architecture_matches, fact_value};

/// Everything one eligibility decision needs, resolved up front so
/// the rules themselves stay pure.
pub struct EligibilityRequest<'a> {
    pub consumer: &'a Consumer,
    /// Host consumer this guest's virt uuid maps to, when one is
    /// registered.
    pub host: Option<&'a Consumer>,
    pub pool: PoolView<'a>,
    pub quantity: i64,
    pub caller: CallerType,
    /// The consumer's current entitlements.
    pub existing: &'a [EntitlementView<'a>],
    pub now: DateTime<Utc>,
    /// How long after registration a guest may use unmapped-guest
    /// pools.
    pub unmapped_guest_grace: Duration,
    pub sla_strictness: SlaStrictness,
    pub service_level_override: Option<&'a str>,
    pub owner_default_service_level: Option<&'a str>,
    /// Service levels that never participate in matching.
    pub exempt_service_levels: &'a [String],
}

/// Run every rule that applies to the pool and collect the verdict.
///
/// Returns an error only when the pool's own bookkeeping is broken;
/// every consumer-facing refusal comes back inside the result.
pub fn evaluate(request: &EligibilityRequest<'_>) -> TesseraResult<ValidationResult> {
    let pool = request.pool.pool;
    let attrs = request.pool.attrs();
    let mut result = ValidationResult::new();

    if !pool.is_unlimited() && pool.consumed > pool.quantity {
        return Err(TesseraError::Invariant {
            message: format!(
                "pool {} reports {} consumed of {}",
                pool.id, pool.consumed, pool.quantity
            ),
        });
    }

    if request.quantity <= 0 {
        result.add_error(
            ReasonCode::QuantityNotPositive,
            format!("requested quantity {} must be positive", request.quantity),
        );
    }

    check_window(request, &mut result);
    check_availability(request, &mut result);
    check_global(request, &attrs, &mut result);

    if attrs.has(attr::ARCH) {
        check_architecture(request, &attrs, &mut result);
    }
    if attrs.has(attr::SOCKETS) {
        check_sockets(request, &attrs, &mut result);
    }
    if attrs.has(attr::CORES) {
        check_cores(request, &attrs, &mut result);
    }
    if attrs.has(attr::RAM) {
        check_ram(request, &attrs, &mut result);
    }
    if attrs.has(attr::VCPU) {
        check_vcpu(request, &attrs, &mut result);
    }
    if attrs.has(attr::STORAGE_BAND) {
        check_storage_band(request, &attrs, &mut result);
    }
    if attrs.has(attr::REQUIRES_CONSUMER_TYPE) {
        check_consumer_type(request, &attrs, &mut result);
    }
    if attrs.has(attr::VIRT_ONLY) {
        check_virt_only(request, &attrs, &mut result);
    }
    if attrs.has(attr::PHYSICAL_ONLY) {
        check_physical_only(request, &attrs, &mut result);
    }
    if attrs.has(attr::REQUIRES_HOST) {
        check_requires_host(request, &attrs, &mut result);
    }
    if attrs.has(attr::UNMAPPED_GUESTS_ONLY) {
        check_unmapped_guests_only(request, &attrs, &mut result);
    }
    if attrs.has(attr::INSTANCE_MULTIPLIER) {
        check_instance_multiplier(request, &attrs, &mut result);
    }
    if attrs.has(attr::REQUIRES_CONSUMER) {
        check_requires_consumer(request, &attrs, &mut result);
    }
    check_service_level(request, &attrs, &mut result);

    Ok(result)
}

/// Blocking for bind and autobind, advisory everywhere else.
fn deny_or_warn(
    result: &mut ValidationResult,
    caller: CallerType,
    code: ReasonCode,
    message: String,
) {
    match caller {
        CallerType::Bind | CallerType::BestPools => result.add_error(code, message),
        CallerType::ListPools | CallerType::Unknown => result.add_warning(code, message),
    }
}

fn check_window(request: &EligibilityRequest<'_>, result: &mut ValidationResult) {
    let window = request.pool.window();
    if request.now < window.start {
        result.add_error(
            ReasonCode::PoolNotStarted,
            format!("pool does not start until {}", window.start),
        );
    } else if !window.active_on(request.now) {
        result.add_error(
            ReasonCode::PoolExpired,
            format!("pool ended on {}", window.end),
        );
    }
}

fn check_availability(request: &EligibilityRequest<'_>, result: &mut ValidationResult) {
    let pool = request.pool.pool;
    if !pool.is_unlimited() && request.quantity > pool.available() {
        result.add_error(
            ReasonCode::QuantityExhausted,
            format!(
                "requested {} but only {} available",
                request.quantity,
                pool.available()
            ),
        );
    }
}

fn check_global(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let pool = request.pool.pool;

    if request.consumer.kind.is_manifest() {
        // Distributors export almost anything, but a pool carrying a
        // derived product needs a consumer that understands them.
        if pool.derived_product_id.is_some()
            && !request.consumer.has_capability("derived_product")
        {
            deny_or_warn(
                result,
                request.caller,
                ReasonCode::CapabilityUnsupported,
                "consumer does not support pools with a derived product".into(),
            );
        }
        return;
    }

    if !attrs.is_multi_entitlement() {
        if request.caller != CallerType::Unknown && already_entitled(request) {
            result.add_error(
                ReasonCode::AlreadyEntitled,
                format!(
                    "consumer already has an entitlement for product {}",
                    pool.product_id
                ),
            );
        }
        if request.quantity > 1 {
            result.add_error(
                ReasonCode::MultiEntitlementUnsupported,
                "pool does not support multi-entitlement".to_string(),
            );
        }
    }

    // Without an explicit consumer type requirement the pool is for
    // systems; hypervisors count as systems.
    if attrs.product_attribute(attr::REQUIRES_CONSUMER_TYPE).is_none()
        && !matches!(
            request.consumer.kind,
            ConsumerKind::System | ConsumerKind::Hypervisor
        )
    {
        result.add_error(
            ReasonCode::ConsumerTypeMismatch,
            format!(
                "{} consumers cannot use this pool",
                request.consumer.kind.label()
            ),
        );
    }

    if let Some(username) = pool.restricted_to_username.as_deref() {
        if request.consumer.username.as_deref() != Some(username) {
            result.add_error(
                ReasonCode::RestrictedToUsername,
                format!("pool is restricted to user {username}"),
            );
        }
    }
}

/// A second entitlement for the same marketing product is refused on
/// pools without multi-entitlement. Skipped for unknown callers so
/// that quantity adjustments do not trip over the entitlement being
/// adjusted.
fn already_entitled(request: &EligibilityRequest<'_>) -> bool {
    request
        .existing
        .iter()
        .any(|ent| ent.pool.pool.product_id == request.pool.pool.product_id)
}

fn check_architecture(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    if request.consumer.kind.is_manifest() {
        return;
    }
    if !architecture_matches(
        attrs.product_attribute(attr::ARCH),
        request.consumer.arch(),
        request.consumer.kind,
    ) {
        result.add_warning(
            ReasonCode::ArchMismatch,
            format!(
                "product does not support arch {}",
                request.consumer.arch().unwrap_or("unknown")
            ),
        );
    }
}

fn check_sockets(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let consumer = request.consumer;
    if consumer.kind.is_manifest() || consumer.is_guest() {
        return;
    }
    // Skip entirely when the consumer never reported a socket count.
    if consumer.fact(facts::SOCKETS).is_none() || attrs.is_stacked() {
        return;
    }
    if let Some(pool_sockets) = attrs.numeric(attr::SOCKETS) {
        if pool_sockets > 0 && pool_sockets < consumer.sockets() {
            result.add_warning(
                ReasonCode::UndersizedSockets,
                format!(
                    "pool covers {pool_sockets} sockets, consumer has {}",
                    consumer.sockets()
                ),
            );
        }
    }
}

fn check_cores(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let consumer = request.consumer;
    if consumer.kind.is_manifest() {
        if !consumer.has_capability(attr::CORES) {
            deny_or_warn(
                result,
                request.caller,
                ReasonCode::CapabilityUnsupported,
                "consumer does not support core based pools".into(),
            );
        }
        return;
    }
    if consumer.is_guest() || attrs.is_stacked() {
        return;
    }
    let consumer_cores = consumer.total_cores();
    if let Some(pool_cores) = attrs.numeric(attr::CORES) {
        if pool_cores > 0 && pool_cores < consumer_cores {
            result.add_warning(
                ReasonCode::UndersizedCores,
                format!("pool covers {pool_cores} cores, consumer has {consumer_cores}"),
            );
        }
    }
}

fn check_ram(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let consumer = request.consumer;
    if consumer.kind.is_manifest() {
        if !consumer.has_capability(attr::RAM) {
            deny_or_warn(
                result,
                request.caller,
                ReasonCode::CapabilityUnsupported,
                "consumer does not support ram based pools".into(),
            );
        }
        return;
    }
    if attrs.is_stacked() {
        return;
    }
    let consumer_ram = consumer.ram_gb();
    if let Some(pool_ram) = attrs.numeric(attr::RAM) {
        if consumer_ram > pool_ram {
            result.add_warning(
                ReasonCode::UndersizedRam,
                format!("pool covers {pool_ram} GB of ram, consumer has {consumer_ram}"),
            );
        }
    }
}

fn check_vcpu(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let consumer = request.consumer;
    // Manifests have always been allowed to carry vcpu pools.
    if consumer.kind.is_manifest() || !consumer.is_guest() || attrs.is_stacked() {
        return;
    }
    let consumer_vcpus = fact_value(consumer, attr::VCPU);
    if let Some(pool_vcpus) = attrs.numeric(attr::VCPU) {
        if pool_vcpus > 0 && pool_vcpus < consumer_vcpus {
            result.add_warning(
                ReasonCode::UndersizedVcpu,
                format!("pool covers {pool_vcpus} vcpus, consumer has {consumer_vcpus}"),
            );
        }
    }
}

fn check_storage_band(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let consumer = request.consumer;
    if consumer.kind.is_manifest() {
        if !consumer.has_capability(attr::STORAGE_BAND) {
            deny_or_warn(
                result,
                request.caller,
                ReasonCode::CapabilityUnsupported,
                "consumer does not support storage band pools".into(),
            );
        }
        return;
    }
    if attrs.is_stacked() {
        return;
    }
    let usage = consumer.storage_band_usage();
    if let Some(pool_band) = attrs.numeric(attr::STORAGE_BAND) {
        if usage > pool_band {
            result.add_warning(
                ReasonCode::UndersizedStorageBand,
                format!("pool covers {pool_band} TB of storage, consumer uses {usage}"),
            );
        }
    }
}

fn check_consumer_type(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    if request.consumer.kind.is_manifest() {
        return;
    }
    let Some(required) = attrs.attribute(attr::REQUIRES_CONSUMER_TYPE) else {
        return;
    };
    let label = request.consumer.kind.label();
    if required != label {
        let hypervisor_as_system =
            required == "system" && request.consumer.kind == ConsumerKind::Hypervisor;
        if !hypervisor_as_system {
            result.add_error(
                ReasonCode::ConsumerTypeMismatch,
                format!("pool requires {required} consumers, this one is a {label}"),
            );
        }
    }
}

fn check_virt_only(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    if !attrs.is_true(attr::VIRT_ONLY) {
        return;
    }
    if request.consumer.kind.is_manifest() {
        if attrs.is_true(attr::POOL_DERIVED) {
            result.add_error(
                ReasonCode::ManifestRestricted,
                "derived pools are not available to manifest consumers".to_string(),
            );
        }
    } else if !request.consumer.is_guest() {
        deny_or_warn(
            result,
            request.caller,
            ReasonCode::VirtRestricted,
            "pool is restricted to virtual guests".into(),
        );
    }
}

fn check_physical_only(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    if !attrs.is_true(attr::PHYSICAL_ONLY) {
        return;
    }
    if !request.consumer.kind.is_manifest() && request.consumer.is_guest() {
        deny_or_warn(
            result,
            request.caller,
            ReasonCode::PhysicalRestricted,
            "pool is restricted to physical systems".into(),
        );
    }
}

fn check_requires_host(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let Some(required_host) = attrs.attribute(attr::REQUIRES_HOST) else {
        return;
    };
    if request.consumer.kind.is_manifest() {
        result.add_error(
            ReasonCode::ManifestRestricted,
            "host-restricted pools are not available to manifest consumers".to_string(),
        );
        return;
    }
    if request.consumer.virt_uuid().is_none() {
        result.add_error(
            ReasonCode::VirtRestricted,
            "pool is restricted to virtual guests".to_string(),
        );
        return;
    }
    let on_required_host = request
        .host
        .map(|host| host.id.to_string() == required_host)
        .unwrap_or(false);
    if !on_required_host {
        result.add_error(
            ReasonCode::VirtHostMismatch,
            "guest is not running on the host this pool requires".to_string(),
        );
    }
}

fn check_unmapped_guests_only(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    if !attrs.is_true(attr::UNMAPPED_GUESTS_ONLY) {
        return;
    }
    // Errors on purpose even when only listing, so consumers that can
    // never use a temporary pool do not see it at all.
    if request.host.is_some() {
        result.add_error(
            ReasonCode::UnmappedGuestHasHost,
            "temporary pools are only for guests with no reported host".to_string(),
        );
    }
    if !request
        .consumer
        .registered_within(request.unmapped_guest_grace, request.now)
    {
        result.add_error(
            ReasonCode::UnmappedGuestGraceExpired,
            "temporary pools are only for newly registered guests".to_string(),
        );
    }
    if request.caller == CallerType::Bind && request.pool.pool.start_date > request.now {
        result.add_error(
            ReasonCode::UnmappedGuestFutureBind,
            "temporary pools cannot be attached before they start".to_string(),
        );
    }
}

fn check_instance_multiplier(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let consumer = request.consumer;
    if consumer.kind.is_manifest() {
        if !consumer.has_capability(attr::INSTANCE_MULTIPLIER) {
            deny_or_warn(
                result,
                request.caller,
                ReasonCode::CapabilityUnsupported,
                "consumer does not support instance based pools".into(),
            );
        }
        return;
    }
    // Guests attach one at a time regardless of the multiplier.
    if request.caller == CallerType::Bind && !consumer.is_guest() {
        let multiplier = attrs.instance_multiplier();
        if request.quantity % multiplier != 0 {
            result.add_error(
                ReasonCode::QuantityIncrement,
                format!(
                    "quantity {} is not a multiple of the instance multiplier {multiplier}",
                    request.quantity
                ),
            );
        }
    }
}

fn check_requires_consumer(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let Some(required) = attrs.attribute(attr::REQUIRES_CONSUMER) else {
        return;
    };
    if request.consumer.kind.is_manifest() {
        result.add_error(
            ReasonCode::ManifestRestricted,
            "consumer-restricted pools are not available to manifest consumers".to_string(),
        );
        return;
    }
    if request.consumer.id.to_string() != required {
        result.add_error(
            ReasonCode::ConsumerMismatch,
            "pool is reserved for another consumer".to_string(),
        );
    }
}

fn check_service_level(
    request: &EligibilityRequest<'_>,
    attrs: &AttributeMap<'_>,
    result: &mut ValidationResult,
) {
    let Some(pool_level) = attrs.support_level() else {
        return;
    };
    if attrs.support_level_exempt() {
        return;
    }
    if request
        .exempt_service_levels
        .iter()
        .any(|level| level.eq_ignore_ascii_case(pool_level))
    {
        return;
    }
    let effective = request
        .service_level_override
        .or(request.consumer.service_level.as_deref())
        .or(request.owner_default_service_level);
    let Some(wanted) = effective.filter(|level| !level.is_empty()) else {
        return;
    };
    if !pool_level.eq_ignore_ascii_case(wanted) {
        let message = format!("pool service level {pool_level} does not match {wanted}");
        match request.sla_strictness {
            SlaStrictness::Strict => result.add_error(ReasonCode::SlaMismatch, message),
            SlaStrictness::Lenient => result.add_warning(ReasonCode::SlaMismatch, message),
        }
    }
}
