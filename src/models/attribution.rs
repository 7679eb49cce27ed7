use serde::{Deserialize, Serialize};

/// Traffic classification flags carried by numbers, sessions and calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Classification {
    #[serde(rename = "isOrganic")]
    pub is_organic: bool,
    #[serde(rename = "isPaid")]
    pub is_paid: bool,
    #[serde(rename = "isDirect")]
    pub is_direct: bool,
    #[serde(rename = "isReferral")]
    pub is_referral: bool,
    #[serde(rename = "isRemarketing")]
    pub is_remarketing: bool,
    #[serde(rename = "isSearch")]
    pub is_search: bool,
}

/// Marketing attribution captured once, when a call is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttributionSnapshot {
    pub source: String,
    pub medium: Option<String>,
    pub content: Option<String>,
    pub campaign: Option<String>,
    pub keyword: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub classification: Classification,
}

impl AttributionSnapshot {
    pub const UNKNOWN_SOURCE: &'static str = "Unknown";

    /// Attribution used when a pool call cannot be tied to any session
    pub fn unknown() -> Self {
        Self {
            source: Self::UNKNOWN_SOURCE.to_string(),
            medium: None,
            content: None,
            campaign: None,
            keyword: None,
            classification: Classification::default(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.source == Self::UNKNOWN_SOURCE && self.classification == Classification::default()
    }
}
