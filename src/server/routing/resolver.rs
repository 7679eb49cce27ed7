//! Caller and attribution resolution
//!
//! Ties an inbound caller to a Contact and, for pool numbers, to the web
//! session that showed them the number. Session precedence for a known
//! contact on a pool number:
//!
//! 1. their newest unexpired session on the number they already claimed
//! 2. their newest unexpired unclaimed session carrying their own uuid
//! 3. any unclaimed active session on the number, whose guuid they adopt

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AttributionSnapshot, Contact, KeywordTrackingPoolSession, NewContact, PhoneNumber};
use crate::server::store::{StoreResult, StoreTx};

/// Caller fields from the provider payload
#[derive(Debug, Clone, Default)]
pub struct CallerDetails {
    pub country_code: String,
    pub number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

impl CallerDetails {
    /// Split a provider caller name ("DOE JANE" style CNAM or "Jane Doe")
    pub fn with_name(mut self, caller_name: Option<&str>) -> Self {
        if let Some(name) = caller_name.map(str::trim).filter(|n| !n.is_empty()) {
            let mut parts = name.splitn(2, char::is_whitespace);
            self.first_name = parts.next().map(str::to_string);
            self.last_name = parts.next().map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub contact: Contact,
    pub attribution: AttributionSnapshot,
    pub session: Option<KeywordTrackingPoolSession>,
    pub first_call: bool,
}

/// Resolve who is calling and where they came from.
///
/// Runs inside the inbound call's transaction: the contact insert, the
/// session claim and the call row commit or roll back together.
pub async fn resolve_call(
    tx: &mut dyn StoreTx,
    phone_number: &PhoneNumber,
    caller: &CallerDetails,
    now: DateTime<Utc>,
) -> StoreResult<Resolution> {
    let pooled = phone_number.is_pool_number();

    let existing = tx
        .contact_by_number(phone_number.company_id, &caller.country_code, &caller.number)
        .await?;

    let (mut contact, session) = match existing {
        Some(contact) => {
            let session = if pooled {
                find_session(tx, phone_number.id, &contact, now).await?
            } else {
                None
            };
            (contact, session)
        }
        None => {
            let contact = tx
                .insert_contact(NewContact {
                    company_id: phone_number.company_id,
                    uuid: Uuid::new_v4(),
                    country_code: caller.country_code.clone(),
                    number: caller.number.clone(),
                    first_name: caller.first_name.clone(),
                    last_name: caller.last_name.clone(),
                    city: caller.city.clone(),
                    state: caller.state.clone(),
                    zip: caller.zip.clone(),
                    country: caller.country.clone(),
                    created_at: now,
                })
                .await?;
            tracing::info!("Created contact {} for caller +{}{}", contact.id, caller.country_code, caller.number);

            let session = if pooled {
                tx.claim_any_unclaimed_session(phone_number.id, contact.id, now).await?
            } else {
                None
            };
            (contact, session)
        }
    };

    if let Some(session) = &session {
        if session.guuid != contact.uuid {
            tx.set_contact_uuid(contact.id, session.guuid).await?;
            contact.uuid = session.guuid;
        }
    }

    let attribution = match (&session, pooled) {
        (Some(session), _) => session.attribution.clone(),
        (None, true) => {
            tracing::warn!("No session for pool number {}, attributing as unknown", phone_number.id);
            AttributionSnapshot::unknown()
        }
        (None, false) => phone_number.attribution(),
    };

    let first_call = !tx.contact_has_calls(contact.id).await?;

    Ok(Resolution {
        contact,
        attribution,
        session,
        first_call,
    })
}

async fn find_session(
    tx: &mut dyn StoreTx,
    phone_number_id: i64,
    contact: &Contact,
    now: DateTime<Utc>,
) -> StoreResult<Option<KeywordTrackingPoolSession>> {
    if let Some(session) = tx.claimed_session(phone_number_id, contact.id, now).await? {
        return Ok(Some(session));
    }

    if let Some(own) = tx.unclaimed_session_for_guuid(phone_number_id, contact.uuid, now).await? {
        if let Some(session) = tx.claim_session(own.id, contact.id, now).await? {
            return Ok(Some(session));
        }
    }

    tx.claim_any_unclaimed_session(phone_number_id, contact.id, now).await
}
