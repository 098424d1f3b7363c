//! Promotions
//!
//! Always-on promotional rules (percentage, fixed, free-shipping, BOGO) and
//! the matcher that scans them against a cart snapshot into discount
//! candidates. A promotion that intersects no cart line is silently skipped,
//! never an error.

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rusty_money::{Money, iso::Currency};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    candidates::{Allocation, CandidateId, DiscountCandidate},
    cart::{Cart, CartError},
    discounts::{DiscountError, percent_of_minor},
    scope::Scope,
};

new_key_type! {
    /// Promotion Key
    pub struct PromotionKey;
}

/// Errors raised while matching promotions against a cart.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Wrapped cart arithmetic error.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Wrapped discount calculation error.
    #[error(transparent)]
    Discount(#[from] DiscountError),
}

/// How a promotion combines with other discounts on the same line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stacking {
    /// May combine with other discounts on the same line item.
    Stackable,

    /// Claims its line items and blocks further discounting of them.
    Exclusive,
}

/// Discount configuration of a promotion.
///
/// A closed set, matched exhaustively at resolution time — the string-keyed
/// `switch` fallthrough this replaces cannot happen here.
#[derive(Debug, Clone, Copy)]
pub enum PromotionKind<'a> {
    /// A percentage off the eligible lines.
    Percentage(Percentage),

    /// A fixed amount off the eligible lines (clamped to their value).
    Fixed(Money<'a, Currency>),

    /// Waives the cart's shipping cost.
    FreeShipping,

    /// "Buy one get one"-style: for every complete group of `min_quantity`
    /// eligible units, one unit gets `extra_unit_discount` off.
    Bogo {
        /// Units needed to complete one group.
        min_quantity: u32,

        /// Discount applied to the one discounted unit per group.
        extra_unit_discount: Percentage,
    },
}

/// An admin-authored, always-on promotional rule.
#[derive(Debug, Clone)]
pub struct Promotion<'a> {
    /// Display name, shown on receipts and in the admin audit view.
    pub name: String,

    /// Discount configuration.
    pub kind: PromotionKind<'a>,

    /// Which line items the promotion may touch.
    pub scope: Scope,

    /// Minimum cart subtotal for the promotion to apply.
    pub min_order: Option<Money<'a, Currency>>,

    /// Cap on the total amount this promotion may take off.
    pub max_discount: Option<Money<'a, Currency>>,

    /// Start of the validity window (inclusive).
    pub valid_from: Timestamp,

    /// End of the validity window (inclusive).
    pub valid_until: Timestamp,

    /// Application priority; higher applies first.
    pub priority: i32,

    /// Stacking behaviour against other discounts.
    pub stacking: Stacking,

    /// Whether the promotion is currently live at all.
    pub active: bool,
}

impl<'a> Promotion<'a> {
    /// Create a stackable, always-on, priority-zero promotion over
    /// everything. Fields are public; adjust them before inserting.
    pub fn new(
        name: impl Into<String>,
        kind: PromotionKind<'a>,
        valid_from: Timestamp,
        valid_until: Timestamp,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            scope: Scope::all(),
            min_order: None,
            max_discount: None,
            valid_from,
            valid_until,
            priority: 0,
            stacking: Stacking::Stackable,
            active: true,
        }
    }

    /// Whether the promotion is active and inside its validity window.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        self.active && now >= self.valid_from && now <= self.valid_until
    }
}

/// Scan the promotion catalog against a cart snapshot and produce one
/// candidate per matching promotion, in catalog insertion order.
///
/// # Errors
///
/// Returns a [`MatchError`] if cart totals or percentage math fail; a
/// promotion that simply doesn't apply is skipped, not an error.
pub fn match_promotions<'a>(
    promotions: &SlotMap<PromotionKey, Promotion<'a>>,
    cart: &Cart<'a>,
    now: Timestamp,
) -> Result<Vec<DiscountCandidate<'a>>, MatchError> {
    let subtotal_minor = cart.subtotal()?.to_minor_units();
    let mut candidates = Vec::new();

    for (key, promotion) in promotions {
        if !promotion.is_live_at(now) {
            continue;
        }

        if let Some(min_order) = &promotion.min_order {
            if subtotal_minor < min_order.to_minor_units() {
                continue;
            }
        }

        let targets = promotion.scope.matching_items(cart);

        if targets.is_empty() && !matches!(promotion.kind, PromotionKind::FreeShipping) {
            continue;
        }

        let allocation = match promotion.kind {
            PromotionKind::Percentage(percent) => Allocation::PercentOfRemaining(percent),
            PromotionKind::Fixed(amount) => Allocation::FixedPool(amount),
            PromotionKind::FreeShipping => Allocation::Shipping(*cart.shipping()),
            PromotionKind::Bogo {
                min_quantity,
                extra_unit_discount,
            } => {
                let Some(per_line) =
                    bogo_line_amounts(cart, &targets, min_quantity, &extra_unit_discount)?
                else {
                    continue;
                };

                Allocation::PerLine(per_line)
            }
        };

        let targets = if matches!(promotion.kind, PromotionKind::FreeShipping) {
            SmallVec::new()
        } else {
            targets
        };

        candidates.push(DiscountCandidate {
            id: CandidateId::Promotion(key),
            targets,
            allocation,
            cap: promotion.max_discount,
            stackable: promotion.stacking == Stacking::Stackable,
            priority: promotion.priority,
        });
    }

    Ok(candidates)
}

/// Compute the per-line BOGO amounts for the eligible lines.
///
/// All eligible units form one pool, sorted ascending by unit price (the
/// cheapest eligible units are discounted first — customer-favourable). For
/// every complete group of `min_quantity` units exactly one unit receives the
/// extra-unit discount. Returns `None` when no group completes.
fn bogo_line_amounts<'a>(
    cart: &Cart<'a>,
    targets: &[usize],
    min_quantity: u32,
    extra_unit_discount: &Percentage,
) -> Result<Option<SmallVec<[(usize, Money<'a, Currency>); 4]>>, MatchError> {
    if min_quantity == 0 {
        return Ok(None);
    }

    // Expand lines into (unit price, line index) units.
    let mut units: Vec<(i64, usize)> = Vec::new();

    for &idx in targets {
        let item = cart.get_item(idx)?;
        let unit_minor = item.unit_price().to_minor_units();

        for _ in 0..item.quantity() {
            units.push((unit_minor, idx));
        }
    }

    let groups = units.len() / min_quantity as usize;

    if groups == 0 {
        return Ok(None);
    }

    units.sort_unstable();

    let mut per_line: SmallVec<[(usize, i64); 4]> = SmallVec::new();

    for &(unit_minor, idx) in units.iter().take(groups) {
        let amount = percent_of_minor(extra_unit_discount, unit_minor)?;

        match per_line.iter_mut().find(|(line, _)| *line == idx) {
            Some((_, total)) => *total = total.saturating_add(amount),
            None => per_line.push((idx, amount)),
        }
    }

    per_line.sort_unstable_by_key(|&(idx, _)| idx);

    let currency = cart.currency();
    let amounts = per_line
        .into_iter()
        .map(|(idx, minor)| (idx, Money::from_minor(minor, currency)))
        .collect();

    Ok(Some(amounts))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use crate::{
        cart::{CartLineItem, ProductUuid},
        tags::TagSet,
    };

    use super::*;

    fn line<'a>(tags: &[&str], unit_minor: i64, quantity: u32) -> Result<CartLineItem<'a>, CartError> {
        CartLineItem::new(
            ProductUuid::random(),
            TagSet::from_strs(tags),
            Money::from_minor(unit_minor, GBP),
            quantity,
        )
    }

    fn window() -> (Timestamp, Timestamp, Timestamp) {
        (
            "2026-01-01T00:00:00Z".parse().expect("valid timestamp"),
            "2026-12-31T23:59:59Z".parse().expect("valid timestamp"),
            "2026-06-01T12:00:00Z".parse().expect("valid timestamp"),
        )
    }

    #[test]
    fn percentage_promotion_targets_scoped_lines() -> TestResult {
        let (from, until, now) = window();

        let cart = Cart::with_items(
            vec![line(&["supplements"], 5_000, 2)?, line(&["pantry"], 20_000, 1)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        let mut promotion = Promotion::new(
            "Supplement Sale",
            PromotionKind::Percentage(Percentage::from(0.2)),
            from,
            until,
        );
        promotion.scope = Scope::for_tags(TagSet::from_strs(&["supplements"]));
        promotions.insert(promotion);

        let candidates = match_promotions(&promotions, &cart, now)?;

        assert_eq!(candidates.len(), 1);

        let candidate = candidates.first().ok_or("expected candidate")?;
        assert_eq!(candidate.targets.as_slice(), &[0]);
        assert!(matches!(candidate.allocation, Allocation::PercentOfRemaining(_)));

        Ok(())
    }

    #[test]
    fn non_intersecting_promotion_is_silently_skipped() -> TestResult {
        let (from, until, now) = window();

        let cart = Cart::with_items(
            vec![line(&["pantry"], 1_000, 1)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        let mut promotion = Promotion::new(
            "Supplement Sale",
            PromotionKind::Percentage(Percentage::from(0.2)),
            from,
            until,
        );
        promotion.scope = Scope::for_tags(TagSet::from_strs(&["supplements"]));
        promotions.insert(promotion);

        assert!(match_promotions(&promotions, &cart, now)?.is_empty());

        Ok(())
    }

    #[test]
    fn expired_and_inactive_promotions_are_skipped() -> TestResult {
        let (from, until, _) = window();

        let cart = Cart::with_items(
            vec![line(&[], 1_000, 1)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();

        let mut inactive = Promotion::new(
            "Dormant",
            PromotionKind::Percentage(Percentage::from(0.1)),
            from,
            until,
        );
        inactive.active = false;
        promotions.insert(inactive);

        let after: Timestamp = "2027-06-01T00:00:00Z".parse()?;

        promotions.insert(Promotion::new(
            "Window",
            PromotionKind::Percentage(Percentage::from(0.1)),
            from,
            until,
        ));

        // One promotion inactive, the other out of window at `after`.
        assert!(match_promotions(&promotions, &cart, after)?.is_empty());

        Ok(())
    }

    #[test]
    fn promotion_below_min_order_is_skipped() -> TestResult {
        let (from, until, now) = window();

        let cart = Cart::with_items(
            vec![line(&[], 1_000, 1)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        let mut promotion = Promotion::new(
            "Big Spender",
            PromotionKind::Fixed(Money::from_minor(500, GBP)),
            from,
            until,
        );
        promotion.min_order = Some(Money::from_minor(5_000, GBP));
        promotions.insert(promotion);

        assert!(match_promotions(&promotions, &cart, now)?.is_empty());

        Ok(())
    }

    #[test]
    fn free_shipping_promotion_emits_shipping_candidate() -> TestResult {
        let (from, until, now) = window();

        let cart = Cart::with_items(
            vec![line(&[], 1_000, 1)?],
            GBP,
            Money::from_minor(450, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        promotions.insert(Promotion::new(
            "Free Shipping Week",
            PromotionKind::FreeShipping,
            from,
            until,
        ));

        let candidates = match_promotions(&promotions, &cart, now)?;
        let candidate = candidates.first().ok_or("expected candidate")?;

        assert!(candidate.targets.is_empty());
        assert!(matches!(
            candidate.allocation,
            Allocation::Shipping(amount) if amount.to_minor_units() == 450
        ));

        Ok(())
    }

    #[test]
    fn bogo_discounts_one_unit_per_complete_group() -> TestResult {
        let (from, until, now) = window();

        // Three units at 2_000 minor; min_quantity 2 → one free unit.
        let cart = Cart::with_items(
            vec![line(&["snacks"], 2_000, 3)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        let mut promotion = Promotion::new(
            "Snack BOGO",
            PromotionKind::Bogo {
                min_quantity: 2,
                extra_unit_discount: Percentage::from(1.0),
            },
            from,
            until,
        );
        promotion.scope = Scope::for_tags(TagSet::from_strs(&["snacks"]));
        promotions.insert(promotion);

        let candidates = match_promotions(&promotions, &cart, now)?;
        let candidate = candidates.first().ok_or("expected candidate")?;

        match &candidate.allocation {
            Allocation::PerLine(amounts) => {
                assert_eq!(amounts.len(), 1);
                let (idx, amount) = amounts.first().ok_or("expected line amount")?;
                assert_eq!(*idx, 0);
                assert_eq!(amount.to_minor_units(), 2_000);
            }
            other => panic!("expected per-line allocation, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn bogo_discounts_cheapest_units_first() -> TestResult {
        let (from, until, now) = window();

        // Four eligible units across two lines; min_quantity 2 → two groups,
        // so the two cheapest units (both on line 0) are half price.
        let cart = Cart::with_items(
            vec![line(&["snacks"], 1_000, 2)?, line(&["snacks"], 3_000, 2)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        promotions.insert(Promotion::new(
            "Snack BOGO",
            PromotionKind::Bogo {
                min_quantity: 2,
                extra_unit_discount: Percentage::from(0.5),
            },
            from,
            until,
        ));

        let candidates = match_promotions(&promotions, &cart, now)?;
        let candidate = candidates.first().ok_or("expected candidate")?;

        match &candidate.allocation {
            Allocation::PerLine(amounts) => {
                assert_eq!(amounts.len(), 1);
                let (idx, amount) = amounts.first().ok_or("expected line amount")?;
                assert_eq!(*idx, 0);
                // Two units at 1_000, 50% off each.
                assert_eq!(amount.to_minor_units(), 1_000);
            }
            other => panic!("expected per-line allocation, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn bogo_with_incomplete_group_is_skipped() -> TestResult {
        let (from, until, now) = window();

        let cart = Cart::with_items(
            vec![line(&["snacks"], 2_000, 2)?],
            GBP,
            Money::from_minor(0, GBP),
        )?;

        let mut promotions = SlotMap::with_key();
        promotions.insert(Promotion::new(
            "Three For Two",
            PromotionKind::Bogo {
                min_quantity: 3,
                extra_unit_discount: Percentage::from(1.0),
            },
            from,
            until,
        ));

        assert!(match_promotions(&promotions, &cart, now)?.is_empty());

        Ok(())
    }
}
