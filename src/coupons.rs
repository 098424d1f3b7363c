//! Coupons
//!
//! User-supplied, code-redeemed discount instruments, and the validator that
//! checks one code against a cart snapshot. Validation is read-only; the
//! redemption counters it consults live in [`crate::usage`].

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rusty_money::{Money, iso::Currency};
use slotmap::new_key_type;
use smallvec::smallvec;
use thiserror::Error;

use crate::{
    candidates::{Allocation, CandidateId, DiscountCandidate},
    cart::{Cart, CartError},
    scope::Scope,
    usage::UsageCounts,
};

new_key_type! {
    /// Coupon Key
    pub struct CouponKey;
}

/// Errors raised while validating a coupon against a cart.
#[derive(Debug, Error)]
pub enum CouponError {
    /// No coupon exists for the supplied code.
    #[error("no coupon matches the supplied code")]
    NotFound,

    /// The coupon exists but has been deactivated by an admin.
    #[error("coupon is not active")]
    Inactive,

    /// The coupon's validity window has not opened yet.
    #[error("coupon is not valid yet")]
    NotYetValid,

    /// The coupon's validity window has closed.
    #[error("coupon has expired")]
    Expired,

    /// The cart subtotal is below the coupon's minimum order value.
    #[error("cart subtotal is below the coupon's minimum order value")]
    MinOrderNotMet,

    /// No cart line falls within the coupon's scope.
    #[error("no cart items are eligible for this coupon")]
    NoApplicableItems,

    /// The coupon's global usage limit has been exhausted.
    #[error("coupon usage limit reached")]
    UsageLimitReached,

    /// The user's per-user redemption limit has been exhausted.
    #[error("per-user coupon limit reached")]
    UserLimitReached,

    /// Wrapped cart arithmetic error.
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Discount configuration of a coupon.
#[derive(Debug, Clone, Copy)]
pub enum CouponKind<'a> {
    /// A percentage off the eligible lines (e.g. "20% off").
    Percentage(Percentage),

    /// A fixed amount off the eligible lines (e.g. "£5 off").
    Fixed(Money<'a, Currency>),

    /// Waives the cart's shipping cost.
    FreeShipping,
}

/// An admin-authored coupon. Read-only to the engine; only the
/// [`crate::usage::UsageTracker`] mutates its redemption counters.
#[derive(Debug, Clone)]
pub struct Coupon<'a> {
    /// Unique redemption code.
    pub code: String,

    /// Discount configuration.
    pub kind: CouponKind<'a>,

    /// Minimum cart subtotal for the coupon to apply.
    pub min_order: Option<Money<'a, Currency>>,

    /// Cap on the total amount this coupon may take off.
    pub max_discount: Option<Money<'a, Currency>>,

    /// Global redemption limit across all users.
    pub usage_limit: Option<u32>,

    /// Redemption limit per user.
    pub per_user_limit: Option<u32>,

    /// Start of the validity window (inclusive).
    pub valid_from: Timestamp,

    /// End of the validity window (inclusive).
    pub valid_until: Timestamp,

    /// Which line items the coupon may touch.
    pub scope: Scope,

    /// Whether the coupon is currently redeemable at all.
    pub active: bool,
}

impl<'a> Coupon<'a> {
    /// Create an always-on coupon with no limits and an "everything" scope.
    /// Fields are public; adjust them before inserting into the engine.
    pub fn new(
        code: impl Into<String>,
        kind: CouponKind<'a>,
        valid_from: Timestamp,
        valid_until: Timestamp,
    ) -> Self {
        Self {
            code: code.into(),
            kind,
            min_order: None,
            max_discount: None,
            usage_limit: None,
            per_user_limit: None,
            valid_from,
            valid_until,
            scope: Scope::all(),
            active: true,
        }
    }
}

/// Validate a coupon against a cart snapshot, short-circuiting on the first
/// failed check: active → validity window → minimum order → scope →
/// global usage limit → per-user limit.
///
/// On success returns a [`DiscountCandidate`] scoped to the intersecting
/// lines. Read-only; reserving the redemption is a separate step.
///
/// # Errors
///
/// Returns the [`CouponError`] for the first check that failed.
pub fn validate<'a>(
    key: CouponKey,
    coupon: &Coupon<'a>,
    cart: &Cart<'a>,
    now: Timestamp,
    counts: &UsageCounts,
) -> Result<DiscountCandidate<'a>, CouponError> {
    if !coupon.active {
        return Err(CouponError::Inactive);
    }

    if now < coupon.valid_from {
        return Err(CouponError::NotYetValid);
    }

    if now > coupon.valid_until {
        return Err(CouponError::Expired);
    }

    if let Some(min_order) = &coupon.min_order {
        if cart.subtotal()?.to_minor_units() < min_order.to_minor_units() {
            return Err(CouponError::MinOrderNotMet);
        }
    }

    let targets = coupon.scope.matching_items(cart);

    if targets.is_empty() {
        return Err(CouponError::NoApplicableItems);
    }

    if let Some(limit) = coupon.usage_limit {
        if counts.global_in_flight() >= limit {
            return Err(CouponError::UsageLimitReached);
        }
    }

    if let Some(limit) = coupon.per_user_limit {
        if counts.user_in_flight() >= limit {
            return Err(CouponError::UserLimitReached);
        }
    }

    let allocation = match coupon.kind {
        CouponKind::Percentage(percent) => Allocation::PercentOfRemaining(percent),
        CouponKind::Fixed(amount) => Allocation::FixedPool(amount),
        CouponKind::FreeShipping => Allocation::Shipping(*cart.shipping()),
    };

    // A shipping coupon discounts no line item.
    let targets = if matches!(coupon.kind, CouponKind::FreeShipping) {
        smallvec![]
    } else {
        targets
    };

    Ok(DiscountCandidate {
        id: CandidateId::Coupon(key),
        targets,
        allocation,
        cap: coupon.max_discount,
        // Coupons carry no stacking flag; a single coupon stacks with
        // promotions and the resolver enforces the one-coupon rule.
        stackable: true,
        priority: 0,
    })
}
