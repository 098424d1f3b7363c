//! Usage Tracking
//!
//! The engine's only stateful component: per-coupon global and per-user
//! redemption counters with reservation semantics. `reserve` is an atomic
//! check-then-increment, so two concurrent checkouts against a coupon with
//! one redemption left cannot both win — the loser is rejected immediately,
//! nothing queues. Reservations expire after a TTL and are reclaimed by an
//! idempotent background sweep. Durable persistence of committed counts is an
//! external collaborator's concern.

use std::sync::{Mutex, MutexGuard};

use jiff::{SignedDuration, Timestamp};
use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

use crate::{
    coupons::{Coupon, CouponKey},
    uuids::TypedUuid,
};

/// Checkout user identity passed into every engine call. The engine itself
/// holds no session state.
#[derive(Debug, Clone)]
pub struct UserContext {
    /// The user's identifier.
    pub id: UserUuid,

    /// Loyalty tier label, opaque to the engine.
    pub tier: Option<String>,
}

impl UserContext {
    /// Context for a user with no loyalty tier.
    #[must_use]
    pub fn new(id: UserUuid) -> Self {
        Self { id, tier: None }
    }
}

/// User UUID
pub type UserUuid = TypedUuid<UserContext>;

new_key_type! {
    /// Reservation Key
    pub struct ReservationKey;
}

/// An opaque handle to a live coupon reservation, returned by
/// [`UsageTracker::reserve`] and consumed by commit/release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationToken {
    key: ReservationKey,
}

/// Snapshot of a coupon's redemption counters, for read-only validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounts {
    /// Redemptions committed across all users.
    pub committed: u32,

    /// Live (uncommitted) reservations across all users.
    pub reserved: u32,

    /// Redemptions committed by the querying user.
    pub user_committed: u32,

    /// Live reservations held by the querying user.
    pub user_reserved: u32,
}

impl UsageCounts {
    /// Committed plus reserved, globally — what a usage limit is checked
    /// against.
    #[must_use]
    pub fn global_in_flight(&self) -> u32 {
        self.committed.saturating_add(self.reserved)
    }

    /// Committed plus reserved for the querying user.
    #[must_use]
    pub fn user_in_flight(&self) -> u32 {
        self.user_committed.saturating_add(self.user_reserved)
    }
}

/// Errors raised by the usage tracker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// The coupon's global usage limit is exhausted (including live
    /// reservations).
    #[error("coupon usage limit reached")]
    UsageLimitReached,

    /// The user's per-user limit is exhausted (including live reservations).
    #[error("per-user coupon limit reached")]
    UserLimitReached,

    /// The reservation no longer exists (expired and swept, or already
    /// finalized).
    #[error("reservation is no longer live")]
    UnknownReservation,

    /// The counter store is unavailable; callers must fail closed and reject
    /// the discount rather than approximate.
    #[error("usage store unavailable")]
    Store,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    committed: u32,
    reserved: u32,
}

#[derive(Debug)]
struct Reservation {
    coupon: CouponKey,
    user: UserUuid,
    expires_at: Timestamp,
}

#[derive(Debug, Default)]
struct TrackerState {
    totals: FxHashMap<CouponKey, Counters>,
    per_user: FxHashMap<(CouponKey, UserUuid), Counters>,
    reservations: SlotMap<ReservationKey, Reservation>,
}

/// Per-coupon redemption counters with reservation semantics.
#[derive(Debug)]
pub struct UsageTracker {
    ttl: SignedDuration,
    state: Mutex<TrackerState>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageTracker {
    /// Default reservation TTL.
    pub const DEFAULT_TTL: SignedDuration = SignedDuration::from_mins(15);

    /// Create a tracker with the default 15-minute reservation TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    /// Create a tracker with a custom reservation TTL.
    #[must_use]
    pub fn with_ttl(ttl: SignedDuration) -> Self {
        Self {
            ttl,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrackerState>, UsageError> {
        self.state.lock().map_err(|_err| UsageError::Store)
    }

    /// Read-only snapshot of a coupon's counters for one user.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Store`] if the counter store is unavailable.
    pub fn counts(&self, coupon: CouponKey, user: UserUuid) -> Result<UsageCounts, UsageError> {
        let state = self.lock()?;

        let totals = state.totals.get(&coupon).copied().unwrap_or_default();
        let user_totals = state
            .per_user
            .get(&(coupon, user))
            .copied()
            .unwrap_or_default();

        Ok(UsageCounts {
            committed: totals.committed,
            reserved: totals.reserved,
            user_committed: user_totals.committed,
            user_reserved: user_totals.reserved,
        })
    }

    /// Atomically check the coupon's limits and place a reservation.
    ///
    /// The check and the increment happen under one lock acquisition: of two
    /// concurrent calls against a coupon with one redemption left, exactly
    /// one observes `committed + reserved < usage_limit` and wins.
    ///
    /// # Errors
    ///
    /// - [`UsageError::UsageLimitReached`] / [`UsageError::UserLimitReached`]
    ///   when the respective limit is exhausted.
    /// - [`UsageError::Store`] if the counter store is unavailable.
    pub fn reserve(
        &self,
        key: CouponKey,
        coupon: &Coupon<'_>,
        user: UserUuid,
        now: Timestamp,
    ) -> Result<ReservationToken, UsageError> {
        let mut state = self.lock()?;

        let totals = state.totals.get(&key).copied().unwrap_or_default();
        let user_totals = state
            .per_user
            .get(&(key, user))
            .copied()
            .unwrap_or_default();

        if let Some(limit) = coupon.usage_limit {
            if totals.committed.saturating_add(totals.reserved) >= limit {
                return Err(UsageError::UsageLimitReached);
            }
        }

        if let Some(limit) = coupon.per_user_limit {
            if user_totals.committed.saturating_add(user_totals.reserved) >= limit {
                return Err(UsageError::UserLimitReached);
            }
        }

        let expires_at = now.saturating_add(self.ttl).unwrap_or(Timestamp::MAX);

        let reservation_key = state.reservations.insert(Reservation {
            coupon: key,
            user,
            expires_at,
        });

        state.totals.entry(key).or_default().reserved =
            totals.reserved.saturating_add(1);
        state.per_user.entry((key, user)).or_default().reserved =
            user_totals.reserved.saturating_add(1);

        Ok(ReservationToken {
            key: reservation_key,
        })
    }

    /// Convert a reservation into a permanent committed redemption.
    ///
    /// # Errors
    ///
    /// - [`UsageError::UnknownReservation`] if the reservation has already
    ///   been finalized or reclaimed by the sweep.
    /// - [`UsageError::Store`] if the counter store is unavailable.
    pub fn commit(&self, token: ReservationToken) -> Result<(), UsageError> {
        let mut state = self.lock()?;

        let reservation = state
            .reservations
            .remove(token.key)
            .ok_or(UsageError::UnknownReservation)?;

        let totals = state.totals.entry(reservation.coupon).or_default();
        totals.reserved = totals.reserved.saturating_sub(1);
        totals.committed = totals.committed.saturating_add(1);

        let user_totals = state
            .per_user
            .entry((reservation.coupon, reservation.user))
            .or_default();
        user_totals.reserved = user_totals.reserved.saturating_sub(1);
        user_totals.committed = user_totals.committed.saturating_add(1);

        Ok(())
    }

    /// Drop a reservation without committing it. Releasing a token that is
    /// already released or committed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Store`] if the counter store is unavailable.
    pub fn release(&self, token: ReservationToken) -> Result<(), UsageError> {
        let mut state = self.lock()?;

        release_key(&mut state, token.key);

        Ok(())
    }

    /// Release every reservation whose expiry has passed. Idempotent; meant
    /// to be called by a background sweep. Returns how many reservations were
    /// reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Store`] if the counter store is unavailable.
    pub fn sweep_expired(&self, now: Timestamp) -> Result<usize, UsageError> {
        let mut state = self.lock()?;

        let expired: Vec<ReservationKey> = state
            .reservations
            .iter()
            .filter(|(_, reservation)| reservation.expires_at <= now)
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            release_key(&mut state, *key);
        }

        Ok(expired.len())
    }
}

fn release_key(state: &mut TrackerState, key: ReservationKey) {
    let Some(reservation) = state.reservations.remove(key) else {
        return;
    };

    if let Some(totals) = state.totals.get_mut(&reservation.coupon) {
        totals.reserved = totals.reserved.saturating_sub(1);
    }

    if let Some(user_totals) = state
        .per_user
        .get_mut(&(reservation.coupon, reservation.user))
    {
        user_totals.reserved = user_totals.reserved.saturating_sub(1);
    }
}
