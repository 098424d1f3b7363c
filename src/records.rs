//! Admin Records
//!
//! JSON wire DTOs for the admin-facing coupon/promotion CRUD collaborator.
//! Dates are ISO-8601, money values are integer minor units and percent
//! points — floats never appear on the wire — and discount kinds are a
//! tagged enum, deserialized exhaustively.

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::{Money, iso::Currency};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cart::ProductUuid,
    coupons::{Coupon, CouponKind},
    promotions::{Promotion, PromotionKind, Stacking},
    scope::Scope,
    uuids::TypedUuid,
};

/// Coupon UUID
pub type CouponUuid = TypedUuid<CouponRecord>;

/// Promotion UUID
pub type PromotionUuid = TypedUuid<PromotionRecord>;

/// Errors converting wire records into engine types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The discount kind is not valid for a coupon (e.g. BOGO).
    #[error("discount kind {0:?} is not valid for a coupon")]
    UnsupportedCouponKind(&'static str),

    /// A minor-unit amount does not fit the engine's money representation.
    #[error("amount {0} is out of range")]
    AmountOutOfRange(u64),
}

/// Discount configuration on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountKindRecord {
    /// Percentage off, in whole percent points (e.g. `20` for 20%).
    Percentage {
        /// Percent points.
        percent: u16,
    },

    /// Fixed amount off, in minor units.
    Fixed {
        /// Minor units.
        amount: u64,
    },

    /// Waives the shipping cost.
    FreeShipping,

    /// BOGO-style extra-unit discount.
    Bogo {
        /// Units needed to complete one group.
        min_quantity: u32,

        /// Discount on the one discounted unit per group, in percent points.
        extra_unit_discount_percent: u16,
    },
}

impl DiscountKindRecord {
    fn kind_label(&self) -> &'static str {
        match self {
            DiscountKindRecord::Percentage { .. } => "percentage",
            DiscountKindRecord::Fixed { .. } => "fixed",
            DiscountKindRecord::FreeShipping => "free_shipping",
            DiscountKindRecord::Bogo { .. } => "bogo",
        }
    }
}

/// Applicability scope on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeRecord {
    /// Inclusion category tags; empty (with empty `products`) means "all".
    #[serde(default)]
    pub tags: Vec<String>,

    /// Inclusion product ids.
    #[serde(default)]
    pub products: Vec<ProductUuid>,

    /// Exclusion category tags; always win over inclusion.
    #[serde(default)]
    pub excluded_tags: Vec<String>,
}

impl From<ScopeRecord> for Scope {
    fn from(record: ScopeRecord) -> Self {
        Scope::new(
            record.tags.iter().map(String::as_str).collect(),
            record.products.iter().copied(),
            record.excluded_tags.iter().map(String::as_str).collect(),
        )
    }
}

/// Stacking behaviour on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StackingRecord {
    /// May combine with other discounts.
    Stackable,

    /// Claims its line items.
    Exclusive,
}

impl From<StackingRecord> for Stacking {
    fn from(record: StackingRecord) -> Self {
        match record {
            StackingRecord::Stackable => Stacking::Stackable,
            StackingRecord::Exclusive => Stacking::Exclusive,
        }
    }
}

/// Coupon Record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponRecord {
    /// Record identifier.
    pub uuid: CouponUuid,

    /// Unique redemption code.
    pub code: String,

    /// Discount configuration.
    #[serde(flatten)]
    pub discount: DiscountKindRecord,

    /// Minimum cart subtotal in minor units.
    #[serde(default)]
    pub min_order_value: Option<u64>,

    /// Cap on the discount in minor units.
    #[serde(default)]
    pub max_discount: Option<u64>,

    /// Global redemption limit.
    #[serde(default)]
    pub usage_limit: Option<u32>,

    /// Per-user redemption limit.
    #[serde(default)]
    pub per_user_limit: Option<u32>,

    /// Start of the validity window.
    pub valid_from: Timestamp,

    /// End of the validity window.
    pub valid_until: Timestamp,

    /// Applicability scope.
    #[serde(default)]
    pub scope: ScopeRecord,

    /// Whether the coupon is redeemable.
    pub active: bool,
}

impl CouponRecord {
    /// Convert into an engine [`Coupon`] priced in the given currency.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] for discount kinds a coupon cannot carry or
    /// out-of-range amounts.
    pub fn into_coupon(self, currency: &'static Currency) -> Result<Coupon<'static>, RecordError> {
        let kind = match &self.discount {
            DiscountKindRecord::Percentage { percent } => {
                CouponKind::Percentage(percent_points(*percent))
            }
            DiscountKindRecord::Fixed { amount } => {
                CouponKind::Fixed(minor_units(*amount, currency)?)
            }
            DiscountKindRecord::FreeShipping => CouponKind::FreeShipping,
            DiscountKindRecord::Bogo { .. } => {
                return Err(RecordError::UnsupportedCouponKind(
                    self.discount.kind_label(),
                ));
            }
        };

        Ok(Coupon {
            code: self.code,
            kind,
            min_order: self
                .min_order_value
                .map(|minor| minor_units(minor, currency))
                .transpose()?,
            max_discount: self
                .max_discount
                .map(|minor| minor_units(minor, currency))
                .transpose()?,
            usage_limit: self.usage_limit,
            per_user_limit: self.per_user_limit,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            scope: self.scope.into(),
            active: self.active,
        })
    }
}

/// Promotion Record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionRecord {
    /// Record identifier.
    pub uuid: PromotionUuid,

    /// Display name.
    pub name: String,

    /// Discount configuration.
    #[serde(flatten)]
    pub discount: DiscountKindRecord,

    /// Application priority; higher applies first.
    #[serde(default)]
    pub priority: i32,

    /// Stacking behaviour.
    pub stacking: StackingRecord,

    /// Minimum cart subtotal in minor units.
    #[serde(default)]
    pub min_order_value: Option<u64>,

    /// Cap on the discount in minor units.
    #[serde(default)]
    pub max_discount: Option<u64>,

    /// Start of the validity window.
    pub valid_from: Timestamp,

    /// End of the validity window.
    pub valid_until: Timestamp,

    /// Applicability scope.
    #[serde(default)]
    pub scope: ScopeRecord,

    /// Whether the promotion is live.
    pub active: bool,
}

impl PromotionRecord {
    /// Convert into an engine [`Promotion`] priced in the given currency.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] for out-of-range amounts.
    pub fn into_promotion(
        self,
        currency: &'static Currency,
    ) -> Result<Promotion<'static>, RecordError> {
        let kind = match &self.discount {
            DiscountKindRecord::Percentage { percent } => {
                PromotionKind::Percentage(percent_points(*percent))
            }
            DiscountKindRecord::Fixed { amount } => {
                PromotionKind::Fixed(minor_units(*amount, currency)?)
            }
            DiscountKindRecord::FreeShipping => PromotionKind::FreeShipping,
            DiscountKindRecord::Bogo {
                min_quantity,
                extra_unit_discount_percent,
            } => PromotionKind::Bogo {
                min_quantity: *min_quantity,
                extra_unit_discount: percent_points(*extra_unit_discount_percent),
            },
        };

        Ok(Promotion {
            name: self.name,
            kind,
            scope: self.scope.into(),
            min_order: self
                .min_order_value
                .map(|minor| minor_units(minor, currency))
                .transpose()?,
            max_discount: self
                .max_discount
                .map(|minor| minor_units(minor, currency))
                .transpose()?,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            priority: self.priority,
            stacking: self.stacking.into(),
            active: self.active,
        })
    }
}

/// Percent points (e.g. `20`) as a fractional percentage (`0.20`).
fn percent_points(points: u16) -> Percentage {
    Percentage::from(Decimal::new(i64::from(points), 2))
}

/// Minor units off the wire as engine money.
fn minor_units(
    minor: u64,
    currency: &'static Currency,
) -> Result<Money<'static, Currency>, RecordError> {
    let minor_i64 = i64::try_from(minor).map_err(|_err| RecordError::AmountOutOfRange(minor))?;

    Ok(Money::from_minor(minor_i64, currency))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::GBP;
    use testresult::TestResult;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn coupon_record_parses_from_admin_json() -> TestResult {
        let json = r#"
            {
                "uuid": "019c8e08-0000-7000-8000-000000000001",
                "code": "FLASH50",
                "kind": "fixed",
                "amount": 5000,
                "min_order_value": 30000,
                "usage_limit": 100,
                "per_user_limit": 1,
                "valid_from": "2026-01-01T00:00:00Z",
                "valid_until": "2026-12-31T23:59:59Z",
                "scope": {
                    "tags": ["supplements"],
                    "excluded_tags": ["gift-card"]
                },
                "active": true
            }
        "#;

        let record: CouponRecord = serde_json::from_str(json)?;

        assert_eq!(record.code, "FLASH50");
        assert_eq!(record.discount, DiscountKindRecord::Fixed { amount: 5_000 });
        assert_eq!(record.min_order_value, Some(30_000));
        assert_eq!(record.max_discount, None);
        assert_eq!(record.per_user_limit, Some(1));

        let coupon = record.into_coupon(GBP)?;

        assert!(matches!(
            coupon.kind,
            CouponKind::Fixed(amount) if amount.to_minor_units() == 5_000
        ));
        assert_eq!(
            coupon.min_order.map(|m| m.to_minor_units()),
            Some(30_000)
        );

        Ok(())
    }

    #[test]
    fn bogo_promotion_record_parses_and_converts() -> TestResult {
        let json = r#"
            {
                "uuid": "019c8e08-0000-7000-8000-000000000002",
                "name": "Snack BOGO",
                "kind": "bogo",
                "min_quantity": 2,
                "extra_unit_discount_percent": 100,
                "priority": 10,
                "stacking": "exclusive",
                "valid_from": "2026-01-01T00:00:00Z",
                "valid_until": "2026-12-31T23:59:59Z",
                "scope": { "tags": ["snacks"] },
                "active": true
            }
        "#;

        let record: PromotionRecord = serde_json::from_str(json)?;

        assert_eq!(record.priority, 10);
        assert_eq!(record.stacking, StackingRecord::Exclusive);

        let promotion = record.into_promotion(GBP)?;

        match promotion.kind {
            PromotionKind::Bogo {
                min_quantity,
                extra_unit_discount,
            } => {
                assert_eq!(min_quantity, 2);
                assert_eq!(extra_unit_discount, Percentage::from(Decimal::ONE));
            }
            other => panic!("expected BOGO kind, got {other:?}"),
        }

        assert_eq!(promotion.stacking, Stacking::Exclusive);

        Ok(())
    }

    #[test]
    fn bogo_coupon_conversion_is_rejected() {
        let record = CouponRecord {
            uuid: CouponUuid::from_uuid(Uuid::from_u128(1)),
            code: "NOPE".to_string(),
            discount: DiscountKindRecord::Bogo {
                min_quantity: 2,
                extra_unit_discount_percent: 100,
            },
            min_order_value: None,
            max_discount: None,
            usage_limit: None,
            per_user_limit: None,
            valid_from: Timestamp::UNIX_EPOCH,
            valid_until: Timestamp::UNIX_EPOCH,
            scope: ScopeRecord::default(),
            active: true,
        };

        assert_eq!(
            record.into_coupon(GBP).err(),
            Some(RecordError::UnsupportedCouponKind("bogo"))
        );
    }

    #[test]
    fn percent_points_are_fractional_percentages() {
        assert_eq!(percent_points(20), Percentage::from(0.2));
        assert_eq!(percent_points(100), Percentage::from(1.0));
    }

    #[test]
    fn records_round_trip_through_json() -> TestResult {
        let record = PromotionRecord {
            uuid: PromotionUuid::from_uuid(Uuid::from_u128(7)),
            name: "Supplement Sale".to_string(),
            discount: DiscountKindRecord::Percentage { percent: 20 },
            priority: 10,
            stacking: StackingRecord::Stackable,
            min_order_value: None,
            max_discount: Some(10_000),
            valid_from: "2026-01-01T00:00:00Z".parse()?,
            valid_until: "2026-12-31T23:59:59Z".parse()?,
            scope: ScopeRecord {
                tags: vec!["supplements".to_string()],
                products: vec![],
                excluded_tags: vec![],
            },
            active: true,
        };

        let json = serde_json::to_string(&record)?;
        let back: PromotionRecord = serde_json::from_str(&json)?;

        assert_eq!(back, record);

        Ok(())
    }
}
