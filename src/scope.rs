//! Applicability Scope
//!
//! Which line items a coupon or promotion may touch: an inclusion rule over
//! category tags and/or product ids (both empty means "everything"), and an
//! exclusion tag set that always wins.

use smallvec::SmallVec;

use crate::{
    cart::{Cart, CartLineItem, ProductUuid},
    tags::TagSet,
};

/// Applicability scope of a coupon or promotion.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    tags: TagSet,
    products: SmallVec<[ProductUuid; 4]>,
    excluded_tags: TagSet,
}

impl Scope {
    /// Create a scope from inclusion tags, inclusion products, and exclusion
    /// tags.
    #[must_use]
    pub fn new(
        tags: TagSet,
        products: impl IntoIterator<Item = ProductUuid>,
        excluded_tags: TagSet,
    ) -> Self {
        Self {
            tags,
            products: products.into_iter().collect(),
            excluded_tags,
        }
    }

    /// A scope that matches every line item.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A scope over category tags only.
    #[must_use]
    pub fn for_tags(tags: TagSet) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Whether the inclusion rule is "everything".
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.tags.is_empty() && self.products.is_empty()
    }

    /// Whether a line item falls inside this scope.
    pub fn matches(&self, item: &CartLineItem<'_>) -> bool {
        if self.excluded_tags.intersects(item.tags()) {
            return false;
        }

        self.is_all()
            || self.tags.intersects(item.tags())
            || self.products.contains(&item.product())
    }

    /// Indexes of the cart lines this scope matches, in cart order.
    pub fn matching_items(&self, cart: &Cart<'_>) -> SmallVec<[usize; 10]> {
        cart.iter()
            .enumerate()
            .filter(|(_, item)| self.matches(item))
            .map(|(idx, _)| idx)
            .collect()
    }
}
