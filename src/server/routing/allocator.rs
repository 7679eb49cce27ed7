//! Pool number allocation
//!
//! Hands a visitor the next number of a keyword pool and records the visit
//! as a pool session. The pool row stays locked for the whole allocation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::context::VisitContext;
use crate::models::{KeywordTrackingPoolSession, NewPoolSession, PhoneNumber};
use crate::server::store::{StoreResult, StoreTx};

#[derive(Debug, Clone)]
pub struct Allocation {
    pub phone_number: PhoneNumber,
    pub session: KeywordTrackingPoolSession,
    /// True when the visitor kept the number from an earlier visit
    pub reused: bool,
}

/// Assign a pool number to a visitor.
///
/// The caller checks the pool's swap rules first. Returns `None` when the
/// pool is missing, disabled or has no numbers.
pub async fn assign(
    tx: &mut dyn StoreTx,
    pool_id: i64,
    identity: Option<Uuid>,
    ctx: &VisitContext,
    now: DateTime<Utc>,
) -> StoreResult<Option<Allocation>> {
    let pool = match tx.lock_pool(pool_id).await? {
        Some(pool) if pool.is_enabled() => pool,
        _ => return Ok(None),
    };

    let numbers = tx.pool_numbers(pool.id).await?;
    if numbers.is_empty() {
        tracing::warn!("Pool {} has no numbers to assign", pool.id);
        return Ok(None);
    }

    let expires_at = now + pool.session_ttl();

    if let Some(guuid) = identity {
        if let Some(session) = tx.identity_session(pool.id, guuid, now).await? {
            if let Some(number) = numbers.iter().find(|n| n.id == session.phone_number_id) {
                tx.extend_pool_session(session.id, now, expires_at).await?;
                tracing::debug!("Pool {} reusing number {} for {}", pool.id, number.id, guuid);
                let session = KeywordTrackingPoolSession {
                    last_activity_at: now,
                    expires_at,
                    ..session
                };
                return Ok(Some(Allocation {
                    phone_number: number.clone(),
                    session,
                    reused: true,
                }));
            }
        }
    }

    let held: HashSet<i64> = tx
        .active_pool_sessions(pool.id, now)
        .await?
        .into_iter()
        .filter(|s| Some(s.guuid) != identity)
        .map(|s| s.phone_number_id)
        .collect();
    let last = tx.last_assigned_session(pool.id).await?.map(|s| s.phone_number_id);

    let index = match next_in_rotation(&numbers, last, &held) {
        Some(index) => index,
        None => return Ok(None),
    };
    let number = numbers[index].clone();
    if held.contains(&number.id) {
        tracing::warn!("Pool {} exhausted, sharing number {}", pool.id, number.id);
    }

    let session = tx
        .insert_pool_session(NewPoolSession {
            keyword_tracking_pool_id: pool.id,
            phone_number_id: number.id,
            guuid: identity.unwrap_or_else(Uuid::new_v4),
            device_type: Some(ctx.device_type.as_str().to_string()),
            browser_type: Some(ctx.browser_type.as_str().to_string()),
            landing_url: ctx.landing_url.clone(),
            http_referrer: ctx.http_referrer.clone(),
            attribution: ctx.attribution(),
            created_at: now,
            expires_at,
        })
        .await?;

    tracing::info!("Pool {} assigned number {} to session {}", pool.id, number.id, session.id);
    Ok(Some(Allocation {
        phone_number: number,
        session,
        reused: false,
    }))
}

/// Index of the next free number after `last` in creation order, wrapping.
/// When every number is held the next one in rotation is shared.
fn next_in_rotation(numbers: &[PhoneNumber], last: Option<i64>, held: &HashSet<i64>) -> Option<usize> {
    if numbers.is_empty() {
        return None;
    }

    let start = last
        .and_then(|id| numbers.iter().position(|n| n.id == id))
        .map(|pos| pos + 1)
        .unwrap_or(0);

    (0..numbers.len())
        .map(|offset| (start + offset) % numbers.len())
        .find(|&index| !held.contains(&numbers[index].id))
        .or(Some(start % numbers.len()))
}

/// Take a number out of its pool.
///
/// Its unclaimed sessions are ended so no later call can claim them; claimed
/// sessions run until they expire. Returns the number of ended sessions, or
/// `None` when the number was not in the pool.
pub async fn release_number(
    tx: &mut dyn StoreTx,
    pool_id: i64,
    phone_number_id: i64,
    now: DateTime<Utc>,
) -> StoreResult<Option<u64>> {
    if !tx.detach_from_pool(phone_number_id, pool_id).await? {
        return Ok(None);
    }

    let ended = tx.end_unclaimed_sessions(phone_number_id, now).await?;
    tracing::info!(
        "Released number {} from pool {}, ended {} pending sessions",
        phone_number_id,
        pool_id,
        ended
    );
    Ok(Some(ended))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    use crate::models::AttributionSnapshot;
    use crate::server::store::memory::MemoryStore;
    use crate::server::store::Store;

    const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    struct Fixture {
        store: MemoryStore,
        pool_id: i64,
        numbers: Vec<i64>,
    }

    async fn fixture(count: usize) -> Fixture {
        let store = MemoryStore::new();
        let (pool_id, numbers) = store
            .seed(|s| {
                let company = s.add_company("Acme");
                let config = s.add_config(company.id, "5559990000");
                let pool = s.add_pool(company.id, config.id, json!({}));
                let numbers = (0..count)
                    .map(|i| {
                        s.add_number(company.id, Some(config.id), Some(pool.id), &format!("555000000{}", i), i as i64)
                            .id
                    })
                    .collect();
                (pool.id, numbers)
            })
            .await;
        Fixture { store, pool_id, numbers }
    }

    async fn assign_one(f: &Fixture, identity: Option<Uuid>, now: DateTime<Utc>) -> Option<Allocation> {
        let mut tx = f.store.begin().await.unwrap();
        let ctx = VisitContext::new(UA, None, Some("https://example.com/"));
        let allocation = assign(tx.as_mut(), f.pool_id, identity, &ctx, now).await.unwrap();
        tx.commit().await.unwrap();
        allocation
    }

    #[tokio::test]
    async fn test_rotation_skips_held_numbers() {
        let f = fixture(3).await;
        let now = Utc::now();

        let a = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
        let b = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
        let c = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();

        assert_eq!(a.phone_number.id, f.numbers[0]);
        assert_eq!(b.phone_number.id, f.numbers[1]);
        assert_eq!(c.phone_number.id, f.numbers[2]);
        assert!(!a.reused);
    }

    #[tokio::test]
    async fn test_sticky_reuse_extends_session() {
        let f = fixture(3).await;
        let visitor = Uuid::new_v4();
        let now = Utc::now();

        let first = assign_one(&f, Some(visitor), now).await.unwrap();
        assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();

        let later = now + Duration::days(3);
        let again = assign_one(&f, Some(visitor), later).await.unwrap();

        assert!(again.reused);
        assert_eq!(again.phone_number.id, first.phone_number.id);
        assert_eq!(again.session.id, first.session.id);
        assert_eq!(again.session.expires_at, later + Duration::days(30));

        let state = f.store.snapshot().await;
        assert_eq!(state.session(first.session.id).unwrap().expires_at, later + Duration::days(30));
    }

    #[tokio::test]
    async fn test_expired_sessions_free_their_numbers() {
        let f = fixture(1).await;
        let now = Utc::now();

        let first = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
        let after_expiry = now + Duration::days(31);
        let second = assign_one(&f, Some(Uuid::new_v4()), after_expiry).await.unwrap();

        assert_eq!(first.phone_number.id, second.phone_number.id);
        assert_ne!(first.session.id, second.session.id);
    }

    #[tokio::test]
    async fn test_exhausted_pool_reuses_next_in_rotation() {
        let f = fixture(2).await;
        let now = Utc::now();

        assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
        assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
        let third = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
        let fourth = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();

        assert_eq!(third.phone_number.id, f.numbers[0]);
        assert_eq!(fourth.phone_number.id, f.numbers[1]);
    }

    #[tokio::test]
    async fn test_anonymous_visitor_gets_fresh_identity() {
        let f = fixture(2).await;
        let allocation = assign_one(&f, None, Utc::now()).await.unwrap();
        assert!(!allocation.session.guuid.is_nil());
        assert_eq!(allocation.session.device_type.as_deref(), Some("DESKTOP"));
    }

    #[tokio::test]
    async fn test_disabled_or_empty_pool_assigns_nothing() {
        let f = fixture(0).await;
        assert!(assign_one(&f, None, Utc::now()).await.is_none());

        let f = fixture(2).await;
        f.store
            .seed(|s| {
                for pool in s.pools.iter_mut() {
                    pool.disabled_at = Some(Utc::now());
                }
            })
            .await;
        assert!(assign_one(&f, None, Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_get_distinct_numbers() {
        let f = fixture(4).await;
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = f.store.clone();
            let pool_id = f.pool_id;
            handles.push(tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let ctx = VisitContext::new(UA, None, None);
                let allocation = assign(tx.as_mut(), pool_id, Some(Uuid::new_v4()), &ctx, now)
                    .await
                    .unwrap()
                    .unwrap();
                tx.commit().await.unwrap();
                allocation.phone_number.id
            }));
        }

        let mut assigned = HashSet::new();
        for handle in handles {
            assigned.insert(handle.await.unwrap());
        }
        assert_eq!(assigned.len(), 4);
    }

    #[tokio::test]
    async fn test_release_orphans_unclaimed_sessions_only() {
        let f = fixture(2).await;
        let number_id = f.numbers[0];
        let now = Utc::now();

        let (pending, claimed) = f
            .store
            .seed(|s| {
                let contact = s.add_contact(1, "5551112222", Uuid::new_v4());
                let pending = s.add_session(f.pool_id, number_id, Uuid::new_v4(), AttributionSnapshot::unknown(), now);
                let claimed = s.add_session(f.pool_id, number_id, contact.uuid, AttributionSnapshot::unknown(), now);
                if let Some(row) = s.sessions.iter_mut().find(|row| row.id == claimed.id) {
                    row.contact_id = Some(contact.id);
                }
                (pending.id, claimed.id)
            })
            .await;

        let mut tx = f.store.begin().await.unwrap();
        let ended = release_number(tx.as_mut(), f.pool_id, number_id, now).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(ended, Some(1));

        let state = f.store.snapshot().await;
        assert!(state.session(pending).unwrap().ended_at.is_some());
        assert!(state.session(claimed).unwrap().ended_at.is_none());
        assert!(state.phone_numbers.iter().find(|n| n.id == number_id).unwrap().keyword_tracking_pool_id.is_none());

        // The retired number is never handed out again
        for _ in 0..3 {
            let allocation = assign_one(&f, Some(Uuid::new_v4()), now).await.unwrap();
            assert_ne!(allocation.phone_number.id, number_id);
        }

        let mut tx = f.store.begin().await.unwrap();
        assert_eq!(release_number(tx.as_mut(), f.pool_id, number_id, now).await.unwrap(), None);
    }
}
