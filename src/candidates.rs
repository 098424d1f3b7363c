//! Discount Candidates
//!
//! A candidate is a computed, not-yet-applied potential discount produced by
//! coupon validation or promotion matching. Candidates are derived fresh for
//! every resolution call and never persisted.

use decimal_percentage::Percentage;
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;

use crate::{coupons::CouponKey, promotions::PromotionKey};

/// Identity of a candidate's source instrument.
///
/// The derived ordering (coupons before promotions, then key order) is the
/// deterministic tie-break for candidates of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateId {
    /// Derived from a validated coupon.
    Coupon(CouponKey),

    /// Derived from a matched promotion.
    Promotion(PromotionKey),
}

impl CandidateId {
    /// Whether this candidate originates from a coupon.
    #[must_use]
    pub fn is_coupon(&self) -> bool {
        matches!(self, CandidateId::Coupon(_))
    }
}

/// How a candidate draws its amount from the target lines.
#[derive(Debug, Clone)]
pub enum Allocation<'a> {
    /// Fixed per-line amounts, precomputed by the matcher (BOGO).
    PerLine(SmallVec<[(usize, Money<'a, Currency>); 4]>),

    /// A percentage of each target line's *remaining* value at application
    /// time, so stacking compounds instead of over-discounting.
    PercentOfRemaining(Percentage),

    /// A fixed pool drawn from the target lines in line order, clamped to
    /// each line's remaining value.
    FixedPool(Money<'a, Currency>),

    /// A discount against the cart's shipping cost, not any line item.
    Shipping(Money<'a, Currency>),
}

/// A computed, not-yet-applied discount.
#[derive(Debug, Clone)]
pub struct DiscountCandidate<'a> {
    /// Source instrument identity.
    pub id: CandidateId,

    /// Indexes of the cart lines this candidate may touch, in cart order.
    pub targets: SmallVec<[usize; 10]>,

    /// Amount-drawing strategy.
    pub allocation: Allocation<'a>,

    /// Cap on the candidate's total applied amount.
    pub cap: Option<Money<'a, Currency>>,

    /// Whether this candidate may combine with others on the same line.
    pub stackable: bool,

    /// Application priority; higher applies first.
    pub priority: i32,
}
