//! Discount Engine
//!
//! The service-layer entry points consumed by the checkout flow: hold the
//! coupon/promotion catalogs, validate and opportunistically reserve the
//! coupon, match promotions, resolve, and return the audit ledger; then
//! commit or release the reservation once the payment outcome is known.

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use thiserror::Error;
use tracing::info;

use crate::{
    coupons::{self, Coupon, CouponError, CouponKey},
    cart::Cart,
    ledger::{LedgerError, LedgerRecord},
    promotions::{MatchError, Promotion, PromotionKey, match_promotions},
    resolver::{ResolveError, resolve},
    usage::{ReservationToken, UsageError, UsageTracker, UserContext},
};

/// Errors surfaced by the engine's entry points.
///
/// Coupon variants are client-fixable validation failures; usage variants are
/// resource contention (retry with another coupon, or immediately if
/// transient); everything else is a system failure and the endpoint fails
/// closed — the discount is rejected, never approximated.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A coupon was inserted with a code that is already taken.
    #[error("coupon code {0:?} already exists")]
    DuplicateCouponCode(String),

    /// Coupon validation failed.
    #[error(transparent)]
    Coupon(#[from] CouponError),

    /// Reserving or finalizing coupon usage failed.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Promotion matching failed.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Building the ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Payment outcome reported back to [`DiscountEngine::finalize_discounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Payment captured; commit the coupon redemption.
    Success,

    /// Checkout failed or was abandoned; return the redemption.
    Failure,
}

/// Result of one resolution call: the audit ledger, plus the coupon
/// reservation to finalize after payment (when a coupon was applied).
#[derive(Debug)]
pub struct Checkout<'a> {
    /// The full audit ledger, ready for receipt display.
    pub ledger: LedgerRecord<'a>,

    /// The live coupon reservation, if a coupon was redeemed.
    pub reservation: Option<ReservationToken>,
}

/// The discount and promotion resolution engine.
///
/// Holds the admin-authored catalogs and the usage tracker. The resolution
/// path is pure over the cart snapshot; the tracker is the only shared
/// mutable state, so resolutions for independent checkouts can run in
/// parallel.
#[derive(Debug, Default)]
pub struct DiscountEngine<'a> {
    coupons: SlotMap<CouponKey, Coupon<'a>>,
    codes: FxHashMap<String, CouponKey>,
    promotions: SlotMap<PromotionKey, Promotion<'a>>,
    usage: UsageTracker,
}

impl<'a> DiscountEngine<'a> {
    /// Create an engine with empty catalogs and a default usage tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine around a pre-configured usage tracker.
    #[must_use]
    pub fn with_usage_tracker(usage: UsageTracker) -> Self {
        Self {
            usage,
            ..Self::default()
        }
    }

    /// Insert a coupon into the catalog, indexing its code.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateCouponCode`] if the code is taken.
    pub fn insert_coupon(&mut self, coupon: Coupon<'a>) -> Result<CouponKey, EngineError> {
        if self.codes.contains_key(&coupon.code) {
            return Err(EngineError::DuplicateCouponCode(coupon.code));
        }

        let code = coupon.code.clone();
        let key = self.coupons.insert(coupon);

        self.codes.insert(code, key);

        Ok(key)
    }

    /// Insert a promotion into the catalog.
    pub fn insert_promotion(&mut self, promotion: Promotion<'a>) -> PromotionKey {
        self.promotions.insert(promotion)
    }

    /// Look up a coupon by its redemption code.
    pub fn coupon_by_code(&self, code: &str) -> Option<(CouponKey, &Coupon<'a>)> {
        let key = self.codes.get(code).copied()?;

        self.coupons.get(key).map(|coupon| (key, coupon))
    }

    /// The coupon catalog, for receipt rendering and admin views.
    #[must_use]
    pub fn coupons(&self) -> &SlotMap<CouponKey, Coupon<'a>> {
        &self.coupons
    }

    /// The promotion catalog, for receipt rendering and admin views.
    #[must_use]
    pub fn promotions(&self) -> &SlotMap<PromotionKey, Promotion<'a>> {
        &self.promotions
    }

    /// The usage tracker, for counter inspection and background sweeps.
    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Resolve all discounts for a cart snapshot.
    ///
    /// Validates the coupon code (if given) and reserves its usage, matches
    /// every live promotion, resolves the merged candidate set, and returns
    /// the audit ledger plus the reservation to finalize after payment.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] for coupon validation failures, usage
    /// contention, or system failures. Promotions that don't apply are not
    /// errors; they appear in the ledger's rejected list.
    #[tracing::instrument(
        name = "engine.resolve_discounts",
        skip(self, cart, user),
        fields(user = %user.id, code = code.unwrap_or("-")),
        err
    )]
    pub fn resolve_discounts(
        &self,
        cart: &Cart<'a>,
        code: Option<&str>,
        user: &UserContext,
        now: Timestamp,
    ) -> Result<Checkout<'a>, EngineError> {
        let mut candidates = match_promotions(&self.promotions, cart, now)?;
        let mut reservation = None;

        if let Some(code) = code {
            let (key, coupon) = self.coupon_by_code(code).ok_or(CouponError::NotFound)?;
            let counts = self.usage.counts(key, user.id)?;

            let candidate = coupons::validate(key, coupon, cart, now, &counts)?;

            reservation = Some(self.usage.reserve(key, coupon, user.id, now)?);
            candidates.push(candidate);
        }

        let resolution = resolve(cart, candidates)?;
        let ledger = LedgerRecord::from_resolution(cart, &resolution)?;

        info!(
            total_discount = ledger.total_discount.to_minor_units(),
            grand_total = ledger.grand_total.to_minor_units(),
            rejected = ledger.rejected.len(),
            "resolved discounts"
        );

        Ok(Checkout {
            ledger,
            reservation,
        })
    }

    /// Finalize a coupon reservation once the payment outcome is known:
    /// commit on success, release on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Usage`] if the reservation is no longer live
    /// (committing) or the counter store is unavailable.
    #[tracing::instrument(name = "engine.finalize_discounts", skip(self), err)]
    pub fn finalize_discounts(
        &self,
        reservation: ReservationToken,
        outcome: CheckoutOutcome,
    ) -> Result<(), EngineError> {
        match outcome {
            CheckoutOutcome::Success => self.usage.commit(reservation)?,
            CheckoutOutcome::Failure => self.usage.release(reservation)?,
        }

        info!(?outcome, "finalized reservation");

        Ok(())
    }
}
