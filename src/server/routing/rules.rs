//! Swap rule matcher
//!
//! Tenants author swap rules as JSON. They are parsed into a closed set of
//! rule kinds here; anything that does not parse never matches.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::{BrowserType, DeviceType, VisitContext};
use crate::models::PhoneNumber;

#[derive(Error, Debug)]
pub enum RuleSetError {
    #[error("No swap rules configured")]
    Missing,
    #[error("Invalid swap rules: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("Swap rules have no inclusion rules")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub targets: Targets,
    pub inclusion_rules: Vec<RuleGroup>,
    #[serde(default)]
    pub exclusion_rules: Vec<RuleGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    pub device_types: Vec<DeviceTarget>,
    pub browser_types: Vec<BrowserTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceTarget {
    All,
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrowserTarget {
    All,
    Chrome,
    Firefox,
    Safari,
    Edge,
    InternetExplorer,
    Opera,
    Other,
}

/// All rules of a group must pass for the group to pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    All,
    Direct,
    Organic,
    Paid,
    Referral,
    Search,
    Referrer {
        operator: Operator,
        #[serde(default)]
        inputs: Vec<String>,
    },
    LandingPath {
        operator: Operator,
        #[serde(default)]
        inputs: Vec<String>,
    },
    LandingParam {
        field: String,
        operator: Operator,
        #[serde(default)]
        inputs: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    Like,
    NotLike,
    Empty,
    NotEmpty,
}

impl Operator {
    /// Case-insensitive comparison of a visit value against the rule inputs
    pub fn test(&self, value: Option<&str>, inputs: &[String]) -> bool {
        let value = value.unwrap_or("").trim().to_lowercase();
        let inputs = inputs.iter().map(|i| i.trim().to_lowercase());

        match self {
            Operator::Equals => inputs.into_iter().any(|i| i == value),
            Operator::NotEquals => !inputs.into_iter().any(|i| i == value),
            Operator::Like => inputs.into_iter().any(|i| !i.is_empty() && value.contains(&i)),
            Operator::NotLike => !inputs.into_iter().any(|i| !i.is_empty() && value.contains(&i)),
            Operator::Empty => value.is_empty(),
            Operator::NotEmpty => !value.is_empty(),
        }
    }
}

impl Rule {
    pub fn passes(&self, ctx: &VisitContext) -> bool {
        let c = &ctx.classification;
        match self {
            Rule::All => true,
            Rule::Direct => c.is_direct,
            Rule::Organic => c.is_organic,
            Rule::Paid => c.is_paid,
            Rule::Referral => c.is_referral,
            Rule::Search => c.is_search,
            Rule::Referrer { operator, inputs } => operator.test(ctx.http_referrer.as_deref(), inputs),
            Rule::LandingPath { operator, inputs } => operator.test(ctx.landing_path().as_deref(), inputs),
            Rule::LandingParam { field, operator, inputs } => {
                operator.test(ctx.landing_param(field).as_deref(), inputs)
            }
        }
    }

    fn is_specific(&self) -> bool {
        !matches!(self, Rule::All)
    }
}

impl RuleGroup {
    fn passes(&self, ctx: &VisitContext) -> bool {
        !self.rules.is_empty() && self.rules.iter().all(|rule| rule.passes(ctx))
    }

    fn specificity(&self) -> u32 {
        self.rules.iter().filter(|rule| rule.is_specific()).count() as u32
    }
}

impl DeviceTarget {
    fn accepts(&self, device: DeviceType) -> bool {
        match self {
            DeviceTarget::All => true,
            DeviceTarget::Desktop => device == DeviceType::Desktop,
            DeviceTarget::Mobile => device == DeviceType::Mobile,
            DeviceTarget::Tablet => device == DeviceType::Tablet,
        }
    }
}

impl BrowserTarget {
    fn accepts(&self, browser: BrowserType) -> bool {
        match self {
            BrowserTarget::All => true,
            BrowserTarget::Chrome => browser == BrowserType::Chrome,
            BrowserTarget::Firefox => browser == BrowserType::Firefox,
            BrowserTarget::Safari => browser == BrowserType::Safari,
            BrowserTarget::Edge => browser == BrowserType::Edge,
            BrowserTarget::InternetExplorer => browser == BrowserType::InternetExplorer,
            BrowserTarget::Opera => browser == BrowserType::Opera,
            BrowserTarget::Other => browser == BrowserType::Other,
        }
    }
}

impl RuleSet {
    /// Parse stored swap rules. Rules saved as a JSON-encoded string are
    /// accepted as well as a JSON object.
    pub fn parse(value: Option<&serde_json::Value>) -> Result<Self, RuleSetError> {
        let value = match value {
            None | Some(serde_json::Value::Null) => return Err(RuleSetError::Missing),
            Some(serde_json::Value::String(encoded)) => serde_json::from_str(encoded)?,
            Some(other) => other.clone(),
        };

        let rule_set: RuleSet = serde_json::from_value(value)?;
        if rule_set.inclusion_rules.is_empty()
            || rule_set.targets.device_types.is_empty()
            || rule_set.targets.browser_types.is_empty()
        {
            return Err(RuleSetError::Empty);
        }
        Ok(rule_set)
    }

    /// Returns whether the visit matches and how specific the match was
    pub fn evaluate(&self, ctx: &VisitContext) -> (bool, u32) {
        let devices = &self.targets.device_types;
        let browsers = &self.targets.browser_types;

        if !devices.iter().any(|d| d.accepts(ctx.device_type))
            || !browsers.iter().any(|b| b.accepts(ctx.browser_type))
        {
            return (false, 0);
        }

        if self.exclusion_rules.iter().any(|group| group.passes(ctx)) {
            return (false, 0);
        }

        let best_group = self
            .inclusion_rules
            .iter()
            .filter(|group| group.passes(ctx))
            .map(RuleGroup::specificity)
            .max();

        match best_group {
            Some(group_score) => {
                let mut score = group_score;
                if !devices.contains(&DeviceTarget::All) {
                    score += 1;
                }
                if !browsers.contains(&BrowserTarget::All) {
                    score += 1;
                }
                (true, score)
            }
            None => (false, 0),
        }
    }
}

/// Evaluate stored swap rules against a visit; unparseable rules never match
pub fn matches(swap_rules: Option<&serde_json::Value>, ctx: &VisitContext) -> (bool, u32) {
    match RuleSet::parse(swap_rules) {
        Ok(rule_set) => rule_set.evaluate(ctx),
        Err(e) => {
            tracing::debug!("Swap rules skipped: {}", e);
            (false, 0)
        }
    }
}

/// Tie-break among matching flat numbers: highest score, then the newest
/// number, then the highest id.
pub fn pick_best<'a, I>(candidates: I) -> Option<&'a PhoneNumber>
where
    I: IntoIterator<Item = (&'a PhoneNumber, u32)>,
{
    candidates
        .into_iter()
        .max_by(|(a, a_score), (b, b_score)| {
            a_score
                .cmp(b_score)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
        .map(|(number, _)| number)
}
