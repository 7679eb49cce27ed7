//! Number swap for a web visit
//!
//! Pools are tried first: the best-scoring matching pool allocates a number
//! and records the visit as a session. Without a matching pool the best
//! matching flat number is shown.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::allocator;
use super::context::VisitContext;
use super::rules::{self, pick_best};
use crate::models::PhoneNumber;
use crate::server::store::{StoreResult, StoreTx};

#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub phone_number: PhoneNumber,
    /// Identity the page should persist; only pool swaps hand one out
    pub guuid: Option<Uuid>,
    pub pool_id: Option<i64>,
    pub session_id: Option<i64>,
}

pub async fn swap(
    tx: &mut dyn StoreTx,
    company_id: i64,
    guuid: Option<Uuid>,
    ctx: &VisitContext,
    now: DateTime<Utc>,
) -> StoreResult<Option<SwapOutcome>> {
    let pools = tx.company_pools(company_id).await?;
    let best_pool = pools
        .iter()
        .filter_map(|pool| match rules::matches(pool.swap_rules.as_ref(), ctx) {
            (true, score) => Some((pool, score)),
            _ => None,
        })
        .max_by(|(a, a_score), (b, b_score)| {
            a_score
                .cmp(b_score)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
        .map(|(pool, _)| pool.id);

    if let Some(pool_id) = best_pool {
        if let Some(allocation) = allocator::assign(tx, pool_id, guuid, ctx, now).await? {
            return Ok(Some(SwapOutcome {
                guuid: Some(allocation.session.guuid),
                pool_id: Some(pool_id),
                session_id: Some(allocation.session.id),
                phone_number: allocation.phone_number,
            }));
        }
        tracing::warn!("Pool {} matched but had nothing to assign", pool_id);
    }

    let flat = tx.flat_numbers(company_id).await?;
    let scored: Vec<(&PhoneNumber, u32)> = flat
        .iter()
        .filter_map(|number| match rules::matches(number.swap_rules.as_ref(), ctx) {
            (true, score) => Some((number, score)),
            _ => None,
        })
        .collect();

    Ok(pick_best(scored).map(|number| SwapOutcome {
        phone_number: number.clone(),
        guuid,
        pool_id: None,
        session_id: None,
    }))
}
