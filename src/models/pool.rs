use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::attribution::AttributionSnapshot;

/// Numbers rotated across web visitor sessions for keyword-level attribution
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordTrackingPool {
    pub id: i64,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    #[serde(rename = "phoneNumberConfigId")]
    pub phone_number_config_id: i64,
    pub name: String,
    #[serde(rename = "swapRules")]
    pub swap_rules: Option<serde_json::Value>,
    #[serde(rename = "sessionTtlSeconds")]
    pub session_ttl_seconds: i64,
    #[serde(rename = "disabledAt")]
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl KeywordTrackingPool {
    /// Thirty days, the window a visitor keeps their number
    pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

    pub fn is_enabled(&self) -> bool {
        self.disabled_at.is_none()
    }

    pub fn session_ttl(&self) -> Duration {
        if self.session_ttl_seconds > 0 {
            Duration::seconds(self.session_ttl_seconds)
        } else {
            Duration::seconds(Self::DEFAULT_SESSION_TTL_SECONDS)
        }
    }
}

/// A visitor's claim on one pool number
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordTrackingPoolSession {
    pub id: i64,
    #[serde(rename = "keywordTrackingPoolId")]
    pub keyword_tracking_pool_id: i64,
    #[serde(rename = "phoneNumberId")]
    pub phone_number_id: i64,
    pub guuid: Uuid,
    #[serde(rename = "contactId")]
    pub contact_id: Option<i64>,
    #[serde(rename = "deviceType")]
    pub device_type: Option<String>,
    #[serde(rename = "browserType")]
    pub browser_type: Option<String>,
    #[serde(rename = "landingUrl")]
    pub landing_url: Option<String>,
    #[serde(rename = "httpReferrer")]
    pub http_referrer: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attribution: AttributionSnapshot,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastActivityAt")]
    pub last_activity_at: DateTime<Utc>,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "claimedAt")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(rename = "endedAt")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl KeywordTrackingPoolSession {
    /// Live sessions hold their number; ended sessions never come back
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_none() && self.expires_at > now
    }

    pub fn is_claimed(&self) -> bool {
        self.contact_id.is_some()
    }
}

/// Fields for a newly assigned session
#[derive(Debug, Clone)]
pub struct NewPoolSession {
    pub keyword_tracking_pool_id: i64,
    pub phone_number_id: i64,
    pub guuid: Uuid,
    pub device_type: Option<String>,
    pub browser_type: Option<String>,
    pub landing_url: Option<String>,
    pub http_referrer: Option<String>,
    pub attribution: AttributionSnapshot,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
