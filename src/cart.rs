//! Cart Snapshot
//!
//! The immutable cart handed to the engine for one resolution call. Loosely
//! typed product shapes are normalized into [`CartLineItem`] at this boundary;
//! the engine never sees anything else.

use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::{tags::TagSet, uuids::TypedUuid};

/// Marker for product identifiers minted by the catalog collaborator.
#[derive(Debug, Clone, Copy)]
pub struct ProductRecord;

/// Product UUID
pub type ProductUuid = TypedUuid<ProductRecord>;

/// Errors related to cart construction or totals.
#[derive(Debug, Error)]
pub enum CartError {
    /// A line item's unit price was negative.
    #[error("Line item has a negative unit price")]
    NegativeUnitPrice,

    /// A line item had a zero quantity.
    #[error("Line item has a zero quantity")]
    ZeroQuantity,

    /// A line item's currency differs from the cart currency (index, item currency, cart currency).
    #[error("Line item {0} has currency {1}, but cart has currency {2}")]
    CurrencyMismatch(usize, &'static str, &'static str),

    /// A line item was not found in the cart.
    #[error("Line item {0} not found")]
    ItemNotFound(usize),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// One normalized line of the cart: a product, its category tags, a unit
/// price, and how many units are being bought.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLineItem<'a> {
    product: ProductUuid,
    tags: TagSet,
    unit_price: Money<'a, Currency>,
    quantity: u32,
}

impl<'a> CartLineItem<'a> {
    /// Create a line item, enforcing unit price ≥ 0 and quantity ≥ 1.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] when either invariant is violated.
    pub fn new(
        product: ProductUuid,
        tags: TagSet,
        unit_price: Money<'a, Currency>,
        quantity: u32,
    ) -> Result<Self, CartError> {
        if unit_price.to_minor_units() < 0 {
            return Err(CartError::NegativeUnitPrice);
        }

        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        Ok(Self {
            product,
            tags,
            unit_price,
            quantity,
        })
    }

    /// Returns the product of the line item.
    pub fn product(&self) -> ProductUuid {
        self.product
    }

    /// Returns the category tags of the line item.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Returns the unit price of the line item.
    pub fn unit_price(&self) -> &Money<'a, Currency> {
        &self.unit_price
    }

    /// Returns the quantity of the line item.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Returns the line subtotal (unit price × quantity).
    #[must_use]
    pub fn subtotal(&self) -> Money<'a, Currency> {
        let minor = self
            .unit_price
            .to_minor_units()
            .saturating_mul(i64::from(self.quantity));

        Money::from_minor(minor, self.unit_price.currency())
    }
}

/// Cart
///
/// An ordered, immutable snapshot of the checkout cart, with the
/// externally-computed shipping cost attached.
#[derive(Debug)]
pub struct Cart<'a> {
    items: Vec<CartLineItem<'a>>,
    currency: &'static Currency,
    shipping: Money<'a, Currency>,
}

impl<'a> Cart<'a> {
    /// Create a cart with the given items and shipping cost.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if any item (or the shipping cost) carries a
    /// different currency than the cart.
    pub fn with_items(
        items: impl Into<Vec<CartLineItem<'a>>>,
        currency: &'static Currency,
        shipping: Money<'a, Currency>,
    ) -> Result<Self, CartError> {
        let items = items.into();

        items.iter().enumerate().try_for_each(|(i, item)| {
            let item_currency = item.unit_price().currency();

            if item_currency == currency {
                Ok(())
            } else {
                Err(CartError::CurrencyMismatch(
                    i,
                    item_currency.iso_alpha_code,
                    currency.iso_alpha_code,
                ))
            }
        })?;

        if shipping.currency() != currency {
            return Err(CartError::CurrencyMismatch(
                items.len(),
                shipping.currency().iso_alpha_code,
                currency.iso_alpha_code,
            ));
        }

        Ok(Cart {
            items,
            currency,
            shipping,
        })
    }

    /// Calculate the subtotal of the cart (before shipping and discounts).
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if money arithmetic fails.
    pub fn subtotal(&self) -> Result<Money<'a, Currency>, CartError> {
        let total = self.items.iter().try_fold(
            Money::from_minor(0, self.currency),
            |acc, item| acc.add(item.subtotal()),
        )?;

        Ok(total)
    }

    /// Get a line item by its index.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] if the index is out of bounds.
    pub fn get_item(&self, item: usize) -> Result<&CartLineItem<'a>, CartError> {
        self.items.get(item).ok_or(CartError::ItemNotFound(item))
    }

    /// Iterate over the line items in order.
    pub fn iter(&self) -> impl Iterator<Item = &CartLineItem<'a>> {
        self.items.iter()
    }

    /// Get the number of line items in the cart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the cart is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the currency of the cart.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Get the externally-computed shipping cost.
    #[must_use]
    pub fn shipping(&self) -> &Money<'a, Currency> {
        &self.shipping
    }
}
