//! Audit Ledger
//!
//! Turns the resolver's trace into an immutable audit record: per-line
//! subtotals and applied discounts, totals, and every rejected candidate with
//! its reason. A pure transform — safe to rebuild repeatedly for receipt
//! rendering or admin replay.

use std::io;

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use rusty_money::{Money, MoneyError, iso::Currency};
use slotmap::SlotMap;
use smallvec::SmallVec;
use tabled::{
    builder::Builder,
    settings::{Alignment, Style, object::Columns},
};
use thiserror::Error;

use crate::{
    candidates::CandidateId,
    cart::{Cart, CartError},
    coupons::{Coupon, CouponKey},
    promotions::{Promotion, PromotionKey},
    resolver::{AppliedDiscount, RejectedCandidate, Resolution},
};

/// Errors that can occur when building or rendering a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Wrapped money arithmetic error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Wrapped cart arithmetic error.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// IO error while rendering.
    #[error("IO error")]
    IO,
}

/// One cart line with its subtotal and every discount applied to it.
#[derive(Debug, Clone)]
pub struct LedgerLine<'a> {
    /// Index of the line in the cart snapshot.
    pub item_idx: usize,

    /// The line subtotal before discounts.
    pub subtotal: Money<'a, Currency>,

    /// Discounts applied to this line, in application order.
    pub discounts: SmallVec<[AppliedDiscount<'a>; 3]>,
}

/// The immutable audit record of one resolution.
#[derive(Debug, Clone)]
pub struct LedgerRecord<'a> {
    /// One entry per cart line, in cart order.
    pub lines: Vec<LedgerLine<'a>>,

    /// Cart subtotal before discounts and shipping.
    pub subtotal: Money<'a, Currency>,

    /// Total taken off line items.
    pub total_discount: Money<'a, Currency>,

    /// Shipping cost before discounts.
    pub shipping: Money<'a, Currency>,

    /// Amount taken off shipping.
    pub shipping_discount: Money<'a, Currency>,

    /// What the customer is finally charged.
    pub grand_total: Money<'a, Currency>,

    /// Candidates that did not apply, with reasons.
    pub rejected: Vec<RejectedCandidate>,

    currency: &'static Currency,
}

impl<'a> LedgerRecord<'a> {
    /// Build the ledger from a cart snapshot and the resolver's trace.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if money arithmetic fails. The engine's
    /// invariants (per-line discounts never exceed the line subtotal) make
    /// a negative grand total unrepresentable here.
    pub fn from_resolution(
        cart: &Cart<'a>,
        resolution: &Resolution<'a>,
    ) -> Result<Self, LedgerError> {
        let mut lines: Vec<LedgerLine<'a>> = cart
            .iter()
            .enumerate()
            .map(|(item_idx, item)| LedgerLine {
                item_idx,
                subtotal: item.subtotal(),
                discounts: SmallVec::new(),
            })
            .collect();

        for application in &resolution.applied {
            if let Some(line) = lines.get_mut(application.item_idx) {
                line.discounts.push(application.clone());
            }
        }

        let subtotal = cart.subtotal()?;

        let grand_total = subtotal
            .sub(resolution.total_discount)?
            .add(*cart.shipping())?
            .sub(resolution.shipping_discount)?;

        Ok(Self {
            lines,
            subtotal,
            total_discount: resolution.total_discount,
            shipping: *cart.shipping(),
            shipping_discount: resolution.shipping_discount,
            grand_total,
            rejected: resolution.rejected.clone(),
            currency: cart.currency(),
        })
    }

    /// Total savings across line items and shipping.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the addition fails.
    pub fn savings(&self) -> Result<Money<'a, Currency>, MoneyError> {
        self.total_discount.add(self.shipping_discount)
    }

    /// Savings as a fraction of the pre-discount total (subtotal + shipping).
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if money arithmetic fails.
    pub fn savings_percent(&self) -> Result<Percentage, MoneyError> {
        let savings_minor = self.savings()?.to_minor_units();
        let base_minor = self.subtotal.add(self.shipping)?.to_minor_units();

        if base_minor == 0 {
            return Ok(Percentage::from(0.0));
        }

        // Do the ratio in decimal space to avoid integer truncation.
        let savings_dec = Decimal::from_i64(savings_minor).unwrap_or(Decimal::ZERO);
        let base_dec = Decimal::from_i64(base_minor).unwrap_or(Decimal::ZERO);

        Ok(Percentage::from(savings_dec / base_dec))
    }

    /// Currency used for all monetary values.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Render the ledger as a terminal receipt: one row per line item,
    /// indented rows for each applied discount, then a summary block and any
    /// rejected candidates.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if writing fails.
    pub fn write_to(
        &self,
        mut out: impl io::Write,
        coupons: &SlotMap<CouponKey, Coupon<'a>>,
        promotions: &SlotMap<PromotionKey, Promotion<'a>>,
    ) -> Result<(), LedgerError> {
        let mut builder = Builder::default();

        builder.push_record(["Item", "Subtotal", "Discount", "Source"]);

        for line in &self.lines {
            builder.push_record([
                format!("#{}", line.item_idx + 1),
                format!("{}", line.subtotal),
                String::new(),
                String::new(),
            ]);

            for discount in &line.discounts {
                builder.push_record([
                    String::new(),
                    String::new(),
                    format!("-{}", discount.amount),
                    source_label(discount.candidate, coupons, promotions),
                ]);
            }
        }

        let mut table = builder.build();

        table.with(Style::modern_rounded());
        table.modify(Columns::new(1..3), Alignment::right());

        writeln!(out, "{table}").map_err(|_err| LedgerError::IO)?;

        writeln!(out, " Subtotal:  {}", self.subtotal).map_err(|_err| LedgerError::IO)?;
        writeln!(out, " Discounts: -{}", self.total_discount).map_err(|_err| LedgerError::IO)?;

        if self.shipping.to_minor_units() > 0 {
            let shipping_line = if self.shipping_discount.to_minor_units() > 0 {
                format!(" Shipping:  {} (-{})", self.shipping, self.shipping_discount)
            } else {
                format!(" Shipping:  {}", self.shipping)
            };

            writeln!(out, "{shipping_line}").map_err(|_err| LedgerError::IO)?;
        }

        writeln!(out, " Total:     {}", self.grand_total).map_err(|_err| LedgerError::IO)?;

        for rejection in &self.rejected {
            writeln!(
                out,
                " Not applied: {} ({})",
                source_label(rejection.candidate, coupons, promotions),
                rejection.reason.as_str(),
            )
            .map_err(|_err| LedgerError::IO)?;
        }

        Ok(())
    }
}

/// Human-readable label for a candidate's source instrument.
fn source_label<'a>(
    candidate: CandidateId,
    coupons: &SlotMap<CouponKey, Coupon<'a>>,
    promotions: &SlotMap<PromotionKey, Promotion<'a>>,
) -> String {
    match candidate {
        CandidateId::Coupon(key) => coupons
            .get(key)
            .map_or_else(|| "<unknown>".to_string(), |coupon| coupon.code.clone()),
        CandidateId::Promotion(key) => promotions
            .get(key)
            .map_or_else(|| "<unknown>".to_string(), |promotion| promotion.name.clone()),
    }
}
