//! `${name}` substitution for greeting and whisper messages

use std::collections::BTreeMap;

use super::resolver::CallerDetails;
use crate::models::{Company, PhoneNumber};

/// Substitution values captured when the call enters the flow
pub fn build(caller: &CallerDetails, dialed: &PhoneNumber, company: &Company) -> BTreeMap<String, String> {
    let first = caller.first_name.clone().unwrap_or_default();
    let last = caller.last_name.clone().unwrap_or_default();
    let full = format!("{} {}", first, last).trim().to_string();

    let mut vars = BTreeMap::new();
    vars.insert("caller_name".to_string(), full);
    vars.insert("caller_first_name".to_string(), first);
    vars.insert("caller_last_name".to_string(), last);
    vars.insert("caller_number".to_string(), format!("+{}{}", caller.country_code, caller.number));
    vars.insert("caller_city".to_string(), caller.city.clone().unwrap_or_default());
    vars.insert("caller_state".to_string(), caller.state.clone().unwrap_or_default());
    vars.insert("caller_zip".to_string(), caller.zip.clone().unwrap_or_default());
    vars.insert("caller_country".to_string(), caller.country.clone().unwrap_or_default());
    vars.insert("dialed_number".to_string(), dialed.e164());
    vars.insert("company_name".to_string(), company.name.clone());
    vars
}

/// Replace every known `${name}`; unknown names and stray `${` are kept
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name.trim()) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
