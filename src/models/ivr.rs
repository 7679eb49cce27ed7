use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::types::Json;

/// Where a live call currently sits in the voice flow
#[derive(sqlx::Type)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "ivr_stage", rename_all = "PascalCase")]
pub enum IvrStage {
    Entry,
    KeypadGate,
    Dialing,
    InProgress,
    ConversionKeypad,
}

/// Server-side progress for one provider call, keyed by its CallSid.
///
/// Everything the flow needs between callbacks lives here instead of being
/// echoed back through callback URLs by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IvrProgress {
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    #[serde(rename = "phoneNumberId")]
    pub phone_number_id: i64,
    #[serde(rename = "phoneNumberConfigId")]
    pub phone_number_config_id: i64,
    #[serde(rename = "callerCountryCode")]
    pub caller_country_code: String,
    #[serde(rename = "callerNumber")]
    pub caller_number: String,
    pub stage: IvrStage,
    #[serde(rename = "failedAttempts")]
    pub failed_attempts: i32,
    /// Greeting/whisper substitution variables captured at entry
    pub variables: Json<BTreeMap<String, String>>,
    #[serde(rename = "callId")]
    pub call_id: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl IvrProgress {
    pub fn new(
        external_id: impl Into<String>,
        company_id: i64,
        phone_number_id: i64,
        phone_number_config_id: i64,
        caller: (&str, &str),
        variables: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            company_id,
            phone_number_id,
            phone_number_config_id,
            caller_country_code: caller.0.to_string(),
            caller_number: caller.1.to_string(),
            stage: IvrStage::Entry,
            failed_attempts: 0,
            variables: Json(variables),
            call_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, stage: IvrStage, now: DateTime<Utc>) {
        self.stage = stage;
        self.updated_at = now;
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.0.get(name).filter(|v| !v.is_empty()).cloned()
    }
}
