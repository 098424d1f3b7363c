//! Discount Resolver
//!
//! Merges the coupon candidate (if any) and all matched promotion candidates
//! into a single ordered application, respecting priority, stacking and
//! exclusivity, and per-candidate caps. Pure: identical cart + identical
//! candidate set always produces identical output, regardless of the order
//! candidates arrive in.

use rusty_money::{Money, iso::Currency};
use thiserror::Error;

use crate::{
    candidates::{Allocation, CandidateId, DiscountCandidate},
    cart::{Cart, CartError},
    discounts::{DiscountError, percent_of_minor},
};

/// Errors raised during resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Wrapped cart lookup or arithmetic error.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Wrapped discount calculation error.
    #[error(transparent)]
    Discount(#[from] DiscountError),
}

/// Why a candidate was not (fully) applied. Informational; surfaced in the
/// ledger so admins and customers can see why a discount didn't take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Every target line was already claimed, or no discountable value was
    /// left on any target.
    AlreadyDiscounted,

    /// A second coupon-origin candidate appeared in the same resolution.
    MultipleCouponsNotAllowed,
}

impl RejectionReason {
    /// Stable machine-readable label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::AlreadyDiscounted => "already_discounted",
            RejectionReason::MultipleCouponsNotAllowed => "multiple_coupons_not_allowed",
        }
    }
}

/// A discount actually taken off one line item.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDiscount<'a> {
    /// Candidate that produced this application.
    pub candidate: CandidateId,

    /// Index of the line item in the cart snapshot.
    pub item_idx: usize,

    /// Amount taken off this line.
    pub amount: Money<'a, Currency>,
}

/// A candidate that was not applied, with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedCandidate {
    /// The candidate's source identity.
    pub candidate: CandidateId,

    /// Why it was rejected.
    pub reason: RejectionReason,
}

/// The resolver's trace: everything applied, everything rejected.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    /// Per-line applications in application order.
    pub applied: Vec<AppliedDiscount<'a>>,

    /// Amount taken off the cart's shipping cost.
    pub shipping_discount: Money<'a, Currency>,

    /// Total taken off line items (excludes the shipping discount).
    pub total_discount: Money<'a, Currency>,

    /// Candidates that were not applied, with reasons.
    pub rejected: Vec<RejectedCandidate>,
}

/// Resolve a merged candidate set against a cart snapshot.
///
/// Candidates are processed in priority order (descending), tie-broken by
/// [`CandidateId`] ascending. Each line item carries a remaining value
/// (initially its subtotal) that every application draws down and can never
/// push below zero, and a claimed flag set by exclusive candidates that
/// closes the line to everything after.
///
/// # Errors
///
/// Returns a [`ResolveError`] if a candidate targets a line outside the cart
/// or percentage math fails. Candidates that merely don't apply end up in
/// [`Resolution::rejected`] instead.
pub fn resolve<'a>(
    cart: &Cart<'a>,
    mut candidates: Vec<DiscountCandidate<'a>>,
) -> Result<Resolution<'a>, ResolveError> {
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

    let mut remaining: Vec<i64> = cart.iter().map(|item| item.subtotal().to_minor_units()).collect();
    let mut claimed = vec![false; remaining.len()];
    let mut shipping_remaining = cart.shipping().to_minor_units();

    let currency = cart.currency();
    let mut applied = Vec::new();
    let mut rejected = Vec::new();
    let mut shipping_discount_minor = 0i64;
    let mut coupon_seen = false;

    for candidate in candidates {
        if candidate.id.is_coupon() {
            if coupon_seen {
                // CouponValidator's single-code contract should make this
                // unreachable; the resolver still enforces it.
                rejected.push(RejectedCandidate {
                    candidate: candidate.id,
                    reason: RejectionReason::MultipleCouponsNotAllowed,
                });
                continue;
            }

            coupon_seen = true;
        }

        let mut cap_left = candidate
            .cap
            .map_or(i64::MAX, |cap| cap.to_minor_units().max(0));

        if let Allocation::Shipping(amount) = &candidate.allocation {
            let take = amount
                .to_minor_units()
                .max(0)
                .min(shipping_remaining)
                .min(cap_left);

            if take > 0 {
                shipping_discount_minor = shipping_discount_minor.saturating_add(take);
                shipping_remaining -= take;
            } else {
                rejected.push(RejectedCandidate {
                    candidate: candidate.id,
                    reason: RejectionReason::AlreadyDiscounted,
                });
            }

            continue;
        }

        let open_targets: Vec<usize> = candidate
            .targets
            .iter()
            .copied()
            .filter(|&idx| !claimed.get(idx).copied().unwrap_or(true))
            .collect();

        if open_targets.is_empty() {
            rejected.push(RejectedCandidate {
                candidate: candidate.id,
                reason: RejectionReason::AlreadyDiscounted,
            });
            continue;
        }

        let mut candidate_applied = 0i64;

        match &candidate.allocation {
            Allocation::PerLine(amounts) => {
                for &(idx, amount) in amounts {
                    if !open_targets.contains(&idx) {
                        continue;
                    }

                    let line_remaining = remaining
                        .get_mut(idx)
                        .ok_or(CartError::ItemNotFound(idx))?;

                    let take = amount
                        .to_minor_units()
                        .max(0)
                        .min(*line_remaining)
                        .min(cap_left);

                    if take > 0 {
                        *line_remaining -= take;
                        cap_left -= take;
                        candidate_applied = candidate_applied.saturating_add(take);

                        applied.push(AppliedDiscount {
                            candidate: candidate.id,
                            item_idx: idx,
                            amount: Money::from_minor(take, currency),
                        });
                    }
                }
            }
            Allocation::PercentOfRemaining(percent) => {
                for &idx in &open_targets {
                    let line_remaining = remaining
                        .get_mut(idx)
                        .ok_or(CartError::ItemNotFound(idx))?;

                    let take = percent_of_minor(percent, *line_remaining)
                        .map_err(ResolveError::Discount)?
                        .max(0)
                        .min(*line_remaining)
                        .min(cap_left);

                    if take > 0 {
                        *line_remaining -= take;
                        cap_left -= take;
                        candidate_applied = candidate_applied.saturating_add(take);

                        applied.push(AppliedDiscount {
                            candidate: candidate.id,
                            item_idx: idx,
                            amount: Money::from_minor(take, currency),
                        });
                    }
                }
            }
            Allocation::FixedPool(amount) => {
                let mut pool = amount.to_minor_units().max(0).min(cap_left);

                for &idx in &open_targets {
                    if pool == 0 {
                        break;
                    }

                    let line_remaining = remaining
                        .get_mut(idx)
                        .ok_or(CartError::ItemNotFound(idx))?;

                    let take = pool.min(*line_remaining);

                    if take > 0 {
                        *line_remaining -= take;
                        pool -= take;
                        candidate_applied = candidate_applied.saturating_add(take);

                        applied.push(AppliedDiscount {
                            candidate: candidate.id,
                            item_idx: idx,
                            amount: Money::from_minor(take, currency),
                        });
                    }
                }
            }
            Allocation::Shipping(_) => {} // handled above
        }

        if candidate_applied == 0 {
            rejected.push(RejectedCandidate {
                candidate: candidate.id,
                reason: RejectionReason::AlreadyDiscounted,
            });
            continue;
        }

        if !candidate.stackable {
            for &idx in &open_targets {
                if let Some(flag) = claimed.get_mut(idx) {
                    *flag = true;
                }
            }
        }
    }

    let total_discount_minor = applied
        .iter()
        .fold(0i64, |acc, app| acc.saturating_add(app.amount.to_minor_units()));

    Ok(Resolution {
        applied,
        shipping_discount: Money::from_minor(shipping_discount_minor, currency),
        total_discount: Money::from_minor(total_discount_minor, currency),
        rejected,
    })
}
