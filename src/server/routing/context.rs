//! Visitor context for swap rules
//!
//! Derives device/browser type from the User-Agent and the traffic
//! classification (direct, organic, paid, referral, search) from the
//! referrer and landing URL.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{AttributionSnapshot, Classification};

/// Click identifiers ad networks append to landing URLs
const PAID_CLICK_IDS: &[&str] = &["gclid", "gbraid", "wbraid", "msclkid", "fbclid", "ttclid", "li_fat_id"];

const PAID_MEDIUMS: &[&str] = &["cpc", "ppc", "paid", "paidsearch", "paid_search", "cpm", "display", "paid_social"];

/// (host fragment, display name)
const SEARCH_ENGINES: &[(&str, &str)] = &[
    ("google.", "Google"),
    ("bing.", "Bing"),
    ("yahoo.", "Yahoo"),
    ("duckduckgo.", "DuckDuckGo"),
    ("baidu.", "Baidu"),
    ("yandex.", "Yandex"),
    ("ecosia.", "Ecosia"),
    ("ask.", "Ask"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "DESKTOP",
            DeviceType::Mobile => "MOBILE",
            DeviceType::Tablet => "TABLET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrowserType {
    Chrome,
    Firefox,
    Safari,
    Edge,
    InternetExplorer,
    Opera,
    Other,
}

impl BrowserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "CHROME",
            BrowserType::Firefox => "FIREFOX",
            BrowserType::Safari => "SAFARI",
            BrowserType::Edge => "EDGE",
            BrowserType::InternetExplorer => "INTERNET_EXPLORER",
            BrowserType::Opera => "OPERA",
            BrowserType::Other => "OTHER",
        }
    }
}

/// Everything the rule matcher knows about one web visit
#[derive(Debug, Clone)]
pub struct VisitContext {
    pub device_type: DeviceType,
    pub browser_type: BrowserType,
    pub http_referrer: Option<String>,
    pub landing_url: Option<String>,
    referrer: Option<Url>,
    landing: Option<Url>,
    pub classification: Classification,
}

impl VisitContext {
    pub fn new(user_agent: &str, http_referrer: Option<&str>, landing_url: Option<&str>) -> Self {
        let http_referrer = http_referrer.map(str::trim).filter(|r| !r.is_empty());
        let landing_url = landing_url.map(str::trim).filter(|l| !l.is_empty());
        let referrer = http_referrer.and_then(|r| Url::parse(r).ok());
        let landing = landing_url.and_then(|l| Url::parse(l).ok());

        let mut context = Self {
            device_type: device_type(user_agent),
            browser_type: browser_type(user_agent),
            http_referrer: http_referrer.map(str::to_string),
            landing_url: landing_url.map(str::to_string),
            referrer,
            landing,
            classification: Classification::default(),
        };
        context.classification = context.classify();
        context
    }

    /// Value of a landing page query parameter (first occurrence)
    pub fn landing_param(&self, name: &str) -> Option<String> {
        self.landing.as_ref().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.into_owned())
        })
    }

    pub fn landing_path(&self) -> Option<String> {
        self.landing.as_ref().map(|url| url.path().to_string())
    }

    pub fn referrer_host(&self) -> Option<String> {
        self.referrer
            .as_ref()
            .and_then(|url| url.host_str())
            .map(|host| host.trim_start_matches("www.").to_ascii_lowercase())
    }

    fn search_engine(&self) -> Option<&'static str> {
        let host = self.referrer_host()?;
        SEARCH_ENGINES
            .iter()
            .find(|(fragment, _)| host.starts_with(fragment) || host.contains(&format!(".{}", fragment)))
            .map(|(_, name)| *name)
    }

    /// A referrer on the landing page's own host is internal navigation
    fn has_external_referrer(&self) -> bool {
        match (self.referrer_host(), &self.landing) {
            (None, _) => false,
            (Some(referrer), Some(landing)) => landing
                .host_str()
                .map(|host| host.trim_start_matches("www.").to_ascii_lowercase() != referrer)
                .unwrap_or(true),
            (Some(_), None) => true,
        }
    }

    fn is_paid(&self) -> bool {
        let clicked = PAID_CLICK_IDS
            .iter()
            .any(|id| self.landing_param(id).is_some_and(|v| !v.is_empty()));
        let paid_medium = self
            .landing_param("utm_medium")
            .map(|medium| PAID_MEDIUMS.contains(&medium.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        clicked || paid_medium
    }

    fn classify(&self) -> Classification {
        let is_paid = self.is_paid();
        let external = self.has_external_referrer();
        let is_search = external && self.search_engine().is_some();

        Classification {
            is_organic: is_search && !is_paid,
            is_paid,
            is_direct: !external && !is_paid,
            is_referral: external && !is_search && !is_paid,
            is_remarketing: false,
            is_search,
        }
    }

    /// Source/medium/content/campaign/keyword captured for a pool session
    pub fn attribution(&self) -> AttributionSnapshot {
        let c = self.classification;
        let source = self
            .landing_param("utm_source")
            .filter(|s| !s.is_empty())
            .or_else(|| self.search_engine().map(str::to_string))
            .or_else(|| if self.has_external_referrer() { self.referrer_host() } else { None })
            .unwrap_or_else(|| "Direct".to_string());

        let medium = self
            .landing_param("utm_medium")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                let label = if c.is_paid {
                    "Paid"
                } else if c.is_organic {
                    "Organic"
                } else if c.is_referral {
                    "Referral"
                } else {
                    "Direct"
                };
                label.to_string()
            });

        AttributionSnapshot {
            source,
            medium: Some(medium),
            content: self.landing_param("utm_content").filter(|v| !v.is_empty()),
            campaign: self.landing_param("utm_campaign").filter(|v| !v.is_empty()),
            keyword: self.landing_param("utm_term").filter(|v| !v.is_empty()),
            classification: c,
        }
    }
}

fn device_type(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile")) {
        DeviceType::Tablet
    } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("ipod") || ua.contains("windows phone") {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

fn browser_type(user_agent: &str) -> BrowserType {
    let ua = user_agent.to_ascii_lowercase();
    // Order matters: Edge and Opera also announce Chrome, Chrome announces Safari
    if ua.contains("edg/") || ua.contains("edge/") || ua.contains("edga/") || ua.contains("edgios/") {
        BrowserType::Edge
    } else if ua.contains("opr/") || ua.contains("opera") {
        BrowserType::Opera
    } else if ua.contains("msie") || ua.contains("trident/") {
        BrowserType::InternetExplorer
    } else if ua.contains("firefox/") || ua.contains("fxios/") {
        BrowserType::Firefox
    } else if ua.contains("chrome/") || ua.contains("crios/") || ua.contains("chromium/") {
        BrowserType::Chrome
    } else if ua.contains("safari/") {
        BrowserType::Safari
    } else {
        BrowserType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

    #[test]
    fn test_device_and_browser_detection() {
        let ctx = VisitContext::new(CHROME_DESKTOP, None, None);
        assert_eq!(ctx.device_type, DeviceType::Desktop);
        assert_eq!(ctx.browser_type, BrowserType::Chrome);

        let ctx = VisitContext::new(SAFARI_IPHONE, None, None);
        assert_eq!(ctx.device_type, DeviceType::Mobile);
        assert_eq!(ctx.browser_type, BrowserType::Safari);

        let ctx = VisitContext::new(EDGE_DESKTOP, None, None);
        assert_eq!(ctx.browser_type, BrowserType::Edge);
    }

    #[test]
    fn test_direct_visit() {
        let ctx = VisitContext::new(CHROME_DESKTOP, None, Some("https://example.com/pricing"));
        assert!(ctx.classification.is_direct);
        assert!(!ctx.classification.is_paid);
        assert!(!ctx.classification.is_search);

        let attribution = ctx.attribution();
        assert_eq!(attribution.source, "Direct");
        assert_eq!(attribution.medium.as_deref(), Some("Direct"));
    }

    #[test]
    fn test_internal_referrer_is_direct() {
        let ctx = VisitContext::new(
            CHROME_DESKTOP,
            Some("https://www.example.com/"),
            Some("https://example.com/contact"),
        );
        assert!(ctx.classification.is_direct);
        assert!(!ctx.classification.is_referral);
    }

    #[test]
    fn test_organic_search_visit() {
        let ctx = VisitContext::new(
            CHROME_DESKTOP,
            Some("https://www.google.com/"),
            Some("https://example.com/"),
        );
        assert!(ctx.classification.is_search);
        assert!(ctx.classification.is_organic);
        assert!(!ctx.classification.is_paid);
        assert_eq!(ctx.attribution().source, "Google");
        assert_eq!(ctx.attribution().medium.as_deref(), Some("Organic"));
    }

    #[test]
    fn test_paid_search_is_not_organic() {
        let ctx = VisitContext::new(
            CHROME_DESKTOP,
            Some("https://www.google.com/"),
            Some("https://example.com/?gclid=abc123&utm_campaign=spring&utm_term=plumber"),
        );
        assert!(ctx.classification.is_paid);
        assert!(ctx.classification.is_search);
        assert!(!ctx.classification.is_organic);
        assert!(!ctx.classification.is_direct);

        let attribution = ctx.attribution();
        assert_eq!(attribution.campaign.as_deref(), Some("spring"));
        assert_eq!(attribution.keyword.as_deref(), Some("plumber"));
    }

    #[test]
    fn test_referral_visit() {
        let ctx = VisitContext::new(
            CHROME_DESKTOP,
            Some("https://blog.partner.org/review"),
            Some("https://example.com/"),
        );
        assert!(ctx.classification.is_referral);
        assert!(!ctx.classification.is_search);
        assert_eq!(ctx.attribution().source, "blog.partner.org");
    }

    #[test]
    fn test_utm_source_wins() {
        let ctx = VisitContext::new(
            CHROME_DESKTOP,
            None,
            Some("https://example.com/?utm_source=newsletter&utm_medium=email&utm_content=footer"),
        );
        let attribution = ctx.attribution();
        assert_eq!(attribution.source, "newsletter");
        assert_eq!(attribution.medium.as_deref(), Some("email"));
        assert_eq!(attribution.content.as_deref(), Some("footer"));
    }
}
