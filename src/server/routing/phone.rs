//! E.164 splitting for dialed and caller numbers
//!
//! Numbers are stored as (country calling code, national number). Provider
//! payloads give us "+15551234567" plus an ISO country hint.

use std::str::FromStr;

use phonenumber::country;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNumber {
    pub country_code: String,
    pub number: String,
}

impl ParsedNumber {
    pub fn e164(&self) -> String {
        format!("+{}{}", self.country_code, self.number)
    }
}

/// Split a provider number into calling code and national number.
///
/// A leading `+` wins over the hint; national input without a usable hint
/// is read as North American.
pub fn parse(raw: &str, iso_country: Option<&str>) -> Option<ParsedNumber> {
    let raw = raw.trim();
    if raw.chars().filter(|c| c.is_ascii_digit()).count() < 4 {
        return None;
    }

    let hint = iso_country
        .and_then(|iso| country::Id::from_str(&iso.trim().to_ascii_uppercase()).ok())
        .unwrap_or(country::US);

    match phonenumber::parse(Some(hint), raw) {
        Ok(number) => Some(ParsedNumber {
            country_code: number.code().value().to_string(),
            number: number.national().to_string(),
        }),
        Err(e) => {
            tracing::debug!("Unparseable phone number {:?}: {:?}", raw, e);
            None
        }
    }
}
