//! Sender request parameters.
//!
//! Fields arrive from several places at once: the `token` header, the query
//! string, the URL path and a body that may be plain text, JSON or a url
//! encoded form. Values seen first win, except `text`, where a non-empty
//! body value replaces anything earlier.

use std::str::FromStr;

use pushnode_shared::envelope::{Action, TimelineItem, TimelineValue};
use pushnode_shared::protocol::InterruptionLevel;
use pushnode_shared::{Content, Message, Token};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::ContentLimits;
use crate::error::RelayError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineParams {
    pub code: String,
    pub timestamp_ms: Option<i64>,
    pub items: Vec<TimelineItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendParams {
    pub token: Option<String>,
    pub text: String,
    pub title: String,
    pub copy_text: String,
    pub auto_copy: bool,
    pub link: String,
    pub sound: String,
    pub priority: i32,
    pub interruption_level: Option<InterruptionLevel>,
    pub actions: Vec<String>,
    pub timeline: Option<TimelineParams>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonTimeline {
    code: String,
    timestamp: Value,
    items: Map<String, Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonParams {
    token: String,
    text: String,
    title: String,
    copy: String,
    autocopy: Value,
    link: String,
    sound: Value,
    priority: i32,
    #[serde(rename = "interruption-level")]
    interruption_level: String,
    actions: Vec<String>,
    timeline: Option<JsonTimeline>,
}

impl SendParams {
    pub fn set_token(&mut self, token: &str) {
        if self.token.is_none() && !token.is_empty() {
            self.token = Some(token.to_string());
        }
    }

    /// Fields from a query string.
    pub fn merge_query(&mut self, query: &str) {
        self.merge_pairs(query.as_bytes(), false);
    }

    /// Fields from a request body, dispatched on its media type.
    pub fn merge_body(&mut self, content_type: Option<&str>, body: &[u8]) -> Result<(), RelayError> {
        if body.is_empty() {
            return Ok(());
        }
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match media_type.as_str() {
            "text/plain" => {
                self.text = String::from_utf8_lossy(body).into_owned();
                Ok(())
            }
            "application/json" => self.merge_json(body),
            "application/x-www-form-urlencoded" | "" => {
                self.merge_pairs(body, true);
                Ok(())
            }
            other => Err(RelayError::BadRequest(format!(
                "unsupported content type {other}"
            ))),
        }
    }

    fn merge_pairs(&mut self, input: &[u8], from_body: bool) {
        let mut items = Vec::new();
        for (key, value) in form_urlencoded::parse(input) {
            let value = value.into_owned();
            match key.as_ref() {
                "token" => self.set_token(&value),
                "text" if from_body && !value.is_empty() => self.text = value,
                "text" => fill(&mut self.text, value),
                "title" => fill(&mut self.title, value),
                "copy" => fill(&mut self.copy_text, value),
                "autocopy" => self.auto_copy |= parse_flag(&value),
                "link" => fill(&mut self.link, value),
                "sound" => fill(&mut self.sound, value),
                "priority" => {
                    if self.priority <= 0 {
                        self.priority = value.trim().parse().unwrap_or(0);
                    }
                }
                "interruption-level" => {
                    if self.interruption_level.is_none() {
                        self.interruption_level = InterruptionLevel::from_str(value.trim()).ok();
                    }
                }
                "action" => self.actions.push(value),
                "timeline-code" => {
                    let timeline = self.timeline.get_or_insert_with(Default::default);
                    fill(&mut timeline.code, value);
                }
                "timeline-timestamp" => {
                    let timeline = self.timeline.get_or_insert_with(Default::default);
                    if timeline.timestamp_ms.is_none() {
                        timeline.timestamp_ms = parse_timestamp_str(&value);
                    }
                }
                key => {
                    if let Some(name) = key
                        .strip_prefix("timeline-items[")
                        .and_then(|rest| rest.strip_suffix(']'))
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                    {
                        items.push(TimelineItem {
                            name: name.to_string(),
                            value: parse_number_str(&value),
                        });
                    }
                }
            }
        }
        if !items.is_empty() {
            let timeline = self.timeline.get_or_insert_with(Default::default);
            if timeline.items.is_empty() {
                timeline.items = items;
            }
        }
    }

    fn merge_json(&mut self, body: &[u8]) -> Result<(), RelayError> {
        let params: JsonParams = serde_json::from_slice(body)
            .map_err(|_| RelayError::BadRequest("invalid json".into()))?;

        self.set_token(&params.token);
        if !params.text.is_empty() {
            self.text = params.text;
        }
        fill(&mut self.title, params.title);
        fill(&mut self.copy_text, params.copy);
        fill(&mut self.link, params.link);
        self.auto_copy |= json_flag(&params.autocopy);
        if self.sound.is_empty() {
            self.sound = json_string(&params.sound);
        }
        if self.priority <= 0 {
            self.priority = params.priority;
        }
        if self.interruption_level.is_none() {
            self.interruption_level = InterruptionLevel::from_str(&params.interruption_level).ok();
        }
        if self.actions.is_empty() {
            self.actions = params.actions;
        }
        if let Some(timeline) = params.timeline.filter(|t| !t.code.is_empty()) {
            let current = self.timeline.get_or_insert_with(Default::default);
            if current.code.is_empty() {
                *current = TimelineParams {
                    code: timeline.code,
                    timestamp_ms: parse_timestamp_json(&timeline.timestamp),
                    items: timeline
                        .items
                        .iter()
                        .map(|(name, value)| TimelineItem {
                            name: name.clone(),
                            value: parse_number_json(value),
                        })
                        .collect(),
                };
            }
        }
        Ok(())
    }

    /// Pick the content variant. Precedence: link, timeline, actions, text.
    pub fn content(&self, limits: &ContentLimits) -> Result<Content, RelayError> {
        if self.text.len() > limits.text
            || self.title.len() > limits.title
            || self.copy_text.len() > limits.copy_text
            || self.actions.iter().any(|a| a.len() > limits.action)
        {
            return Err(RelayError::TooLargeContent);
        }

        if !self.link.is_empty() {
            return Ok(Content::Link {
                url: self.link.clone(),
            });
        }

        if let Some(timeline) = self.timeline.as_ref().filter(|t| !t.code.is_empty()) {
            return Ok(Content::Timeline {
                code: timeline.code.clone(),
                timestamp_ms: timeline
                    .timestamp_ms
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
                items: timeline.items.clone(),
            });
        }

        let actions: Vec<Action> = self.actions.iter().filter_map(|a| Action::parse(a)).collect();
        if !actions.is_empty() {
            return Ok(Content::Action {
                text: self.text.clone(),
                title: self.title.clone(),
                actions,
            });
        }

        if !self.text.is_empty() {
            return Ok(Content::Text {
                text: self.text.clone(),
                title: self.title.clone(),
                copy_text: self.copy_text.clone(),
                auto_copy: self.auto_copy,
            });
        }

        Err(RelayError::NoContent)
    }

    pub fn to_message(&self, token: &Token, limits: &ContentLimits) -> Result<Message, RelayError> {
        let content = self.content(limits)?;
        let mut message = Message::new(token)
            .with_content(&content)
            .with_sound(&self.sound)
            .with_priority(self.priority);
        if let Some(level) = self.interruption_level {
            message = message.with_interruption_level(level);
        }
        Ok(message)
    }
}

fn fill(field: &mut String, value: String) {
    if field.is_empty() && !value.is_empty() {
        *field = value;
    }
}

// Any non-empty value turns the flag on, "0" included.
fn parse_flag(value: &str) -> bool {
    !value.is_empty()
}

fn json_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => parse_flag(s),
        _ => false,
    }
}

// `"sound": 1` and `"sound": "bell"` are both accepted.
fn json_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    }
}

fn parse_number_str(value: &str) -> TimelineValue {
    let value = value.trim();
    if value.contains('.') {
        if let Ok(v) = value.parse::<f64>() {
            return TimelineValue::Double(v);
        }
    } else if let Ok(v) = value.parse::<i64>() {
        return TimelineValue::Integer(v);
    }
    TimelineValue::Integer(0)
}

fn parse_number_json(value: &Value) -> TimelineValue {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => TimelineValue::Integer(v),
            None => TimelineValue::Double(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => parse_number_str(s),
        _ => TimelineValue::Integer(0),
    }
}

/// Milliseconds since the epoch, or an RFC 3339 date.
fn parse_timestamp_str(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(date) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(date.timestamp_millis());
    }
    value.parse::<u64>().ok().and_then(|ms| i64::try_from(ms).ok())
}

fn parse_timestamp_json(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}
