//! TwiML voice markup
//!
//! Every webhook answers with one of these documents. The builder only knows
//! the verbs the call flow uses.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Say {
        text: String,
        voice: Option<String>,
        language: Option<String>,
    },
    Play {
        url: String,
    },
    Gather {
        num_digits: u32,
        timeout: u32,
        action: String,
        prompt: Vec<Verb>,
    },
    Redirect {
        url: String,
    },
    Dial(Dial),
    Reject,
    Hangup,
}

/// A `<Dial>` with exactly one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dial {
    answer_on_bridge: bool,
    action: Option<String>,
    record: Option<bool>,
    recording_status_callback: Option<String>,
    target: DialTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DialTarget {
    Number { number: String, url: Option<String> },
    Conference { name: String, end_conference_on_exit: bool },
}

impl Dial {
    pub fn number(number: impl Into<String>, url: Option<String>) -> Self {
        Self::with_target(DialTarget::Number {
            number: number.into(),
            url,
        })
    }

    pub fn conference(name: impl Into<String>, end_conference_on_exit: bool) -> Self {
        Self::with_target(DialTarget::Conference {
            name: name.into(),
            end_conference_on_exit,
        })
    }

    fn with_target(target: DialTarget) -> Self {
        Self {
            answer_on_bridge: false,
            action: None,
            record: None,
            recording_status_callback: None,
            target,
        }
    }

    pub fn answer_on_bridge(mut self) -> Self {
        self.answer_on_bridge = true;
        self
    }

    pub fn action(mut self, url: impl Into<String>) -> Self {
        self.action = Some(url.into());
        self
    }

    pub fn record(mut self, record: bool, recording_status_callback: Option<String>) -> Self {
        self.record = Some(record);
        self.recording_status_callback = recording_status_callback;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>, voice: Option<&str>, language: Option<&str>) -> Self {
        self.verbs.push(Verb::Say {
            text: text.into(),
            voice: voice.map(str::to_string),
            language: language.map(str::to_string),
        });
        self
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play { url: url.into() });
        self
    }

    /// Single-digit `<Gather>` that speaks the prompt while waiting
    pub fn gather_digit(
        mut self,
        timeout: u32,
        action: impl Into<String>,
        prompt: Option<(&str, Option<&str>, Option<&str>)>,
    ) -> Self {
        let prompt = prompt
            .map(|(text, voice, language)| {
                vec![Verb::Say {
                    text: text.to_string(),
                    voice: voice.map(str::to_string),
                    language: language.map(str::to_string),
                }]
            })
            .unwrap_or_default();

        self.verbs.push(Verb::Gather {
            num_digits: 1,
            timeout,
            action: action.into(),
            prompt,
        });
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect { url: url.into() });
        self
    }

    pub fn dial(mut self, dial: Dial) -> Self {
        self.verbs.push(Verb::Dial(dial));
        self
    }

    pub fn reject(mut self) -> Self {
        self.verbs.push(Verb::Reject);
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn is_reject(&self) -> bool {
        matches!(self.verbs.last(), Some(Verb::Reject))
    }

    pub fn render(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        if self.verbs.is_empty() {
            out.push_str("<Response/>");
            return out;
        }

        out.push_str("<Response>");
        for verb in &self.verbs {
            render_verb(&mut out, verb);
        }
        out.push_str("</Response>");
        out
    }
}

fn render_verb(out: &mut String, verb: &Verb) {
    match verb {
        Verb::Say { text, voice, language } => {
            out.push_str("<Say");
            attr(out, "voice", voice.as_deref());
            attr(out, "language", language.as_deref());
            out.push('>');
            out.push_str(&escape(text));
            out.push_str("</Say>");
        }
        Verb::Play { url } => {
            out.push_str("<Play>");
            out.push_str(&escape(url));
            out.push_str("</Play>");
        }
        Verb::Gather { num_digits, timeout, action, prompt } => {
            out.push_str("<Gather");
            attr(out, "numDigits", Some(&num_digits.to_string()));
            attr(out, "timeout", Some(&timeout.to_string()));
            attr(out, "action", Some(action));
            attr(out, "method", Some("POST"));
            if prompt.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for inner in prompt {
                    render_verb(out, inner);
                }
                out.push_str("</Gather>");
            }
        }
        Verb::Redirect { url } => {
            out.push_str(r#"<Redirect method="POST">"#);
            out.push_str(&escape(url));
            out.push_str("</Redirect>");
        }
        Verb::Dial(dial) => {
            out.push_str("<Dial");
            if dial.answer_on_bridge {
                attr(out, "answerOnBridge", Some("true"));
            }
            attr(out, "action", dial.action.as_deref());
            if let Some(record) = dial.record {
                attr(out, "record", Some(if record { "true" } else { "false" }));
            }
            attr(out, "recordingStatusCallback", dial.recording_status_callback.as_deref());
            out.push('>');
            match &dial.target {
                DialTarget::Number { number, url } => {
                    out.push_str("<Number");
                    attr(out, "url", url.as_deref());
                    out.push('>');
                    out.push_str(&escape(number));
                    out.push_str("</Number>");
                }
                DialTarget::Conference { name, end_conference_on_exit } => {
                    out.push_str("<Conference");
                    if *end_conference_on_exit {
                        attr(out, "endConferenceOnExit", Some("true"));
                    }
                    out.push('>');
                    out.push_str(&escape(name));
                    out.push_str("</Conference>");
                }
            }
            out.push_str("</Dial>");
        }
        Verb::Reject => out.push_str("<Reject/>"),
        Verb::Hangup => out.push_str("<Hangup/>"),
    }
}

fn attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
}

pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl IntoResponse for VoiceResponse {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.render()).into_response()
    }
}
