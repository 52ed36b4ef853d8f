//! Message content and envelope encryption.
//!
//! Two AEAD policies share the user's secret but never a nonce scheme:
//!
//! * [`Message::encrypt_data`] seals the whole serialised envelope for a
//!   direct push. The nonce is `01 01 00 08 ‖ be64(timestamp_ns)`, unique
//!   per process through [`crate::clock::NonceClock`].
//! * [`Message::encrypt_content`] seals only the content for forwarding and
//!   draws a random 96-bit nonce, leaving routing fields readable upstream.
//!
//! Both use AES-256-GCM keyed with `secret[0:32]` and `secret[32:64]` as
//! associated data.

use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use prost::Message as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::{AEAD_NONCE_SIZE, DATA_NONCE_PREFIX, MAX_ACTION_ITEMS};
use crate::error::EnvelopeError;
use crate::protocol::{
    time_item, ActType, ActionItem, Envelope, InterruptionLevel, MsgContent, MsgType, Sound,
    Thumbnail, TimeContent, TimeItem, CONTENT_FLAG_AUTO_COPY,
};
use crate::token::Token;
use crate::types::UserSecret;

/// A single `name|url` action button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub url: String,
}

impl Action {
    /// Parse the `name|url` form used by senders. Both halves are required.
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, url) = raw.split_once('|')?;
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineValue {
    Integer(i64),
    Double(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineItem {
    pub name: String,
    pub value: TimelineValue,
}

/// Message body variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text {
        text: String,
        title: String,
        copy_text: String,
        auto_copy: bool,
    },
    Link {
        url: String,
    },
    Image {
        path: String,
        size: u64,
        thumbnail: Option<Thumbnail>,
    },
    Audio {
        path: String,
        size: u64,
        duration_ms: u64,
    },
    File {
        path: String,
        filename: String,
        title: String,
        text: String,
        size: u64,
    },
    Action {
        text: String,
        title: String,
        actions: Vec<Action>,
    },
    Timeline {
        code: String,
        timestamp_ms: i64,
        items: Vec<TimelineItem>,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            title: String::new(),
            copy_text: String::new(),
            auto_copy: false,
        }
    }

    /// Build wire content. Actions past the fourth are dropped.
    pub fn to_proto(&self) -> MsgContent {
        match self {
            Self::Text {
                text,
                title,
                copy_text,
                auto_copy,
            } => MsgContent {
                msg_type: MsgType::Text as i32,
                flags: if *auto_copy { CONTENT_FLAG_AUTO_COPY } else { 0 },
                text: text.clone(),
                title: title.clone(),
                copytext: copy_text.clone(),
                ..Default::default()
            },
            Self::Link { url } => MsgContent {
                msg_type: MsgType::Link as i32,
                link: url.clone(),
                ..Default::default()
            },
            Self::Image {
                path,
                size,
                thumbnail,
            } => MsgContent {
                msg_type: MsgType::Image as i32,
                file: path.clone(),
                size: *size,
                thumbnail: thumbnail.clone(),
                ..Default::default()
            },
            Self::Audio {
                path,
                size,
                duration_ms,
            } => MsgContent {
                msg_type: MsgType::Audio as i32,
                file: path.clone(),
                size: *size,
                duration: *duration_ms,
                ..Default::default()
            },
            Self::File {
                path,
                filename,
                title,
                text,
                size,
            } => MsgContent {
                msg_type: MsgType::File as i32,
                file: path.clone(),
                filename: filename.clone(),
                title: title.clone(),
                text: text.clone(),
                size: *size,
                ..Default::default()
            },
            Self::Action {
                text,
                title,
                actions,
            } => MsgContent {
                msg_type: MsgType::Action as i32,
                text: text.clone(),
                title: title.clone(),
                actions: actions
                    .iter()
                    .take(MAX_ACTION_ITEMS)
                    .map(|a| ActionItem {
                        act_type: ActType::Url as i32,
                        name: a.name.clone(),
                        link: a.url.clone(),
                    })
                    .collect(),
                ..Default::default()
            },
            Self::Timeline {
                code,
                timestamp_ms,
                items,
            } => MsgContent {
                msg_type: MsgType::Timeline as i32,
                timecontent: Some(TimeContent {
                    code: code.clone(),
                    timestamp: *timestamp_ms,
                    items: items
                        .iter()
                        .map(|item| TimeItem {
                            name: item.name.clone(),
                            value: Some(match item.value {
                                TimelineValue::Integer(v) => time_item::Value::Integer(v),
                                TimelineValue::Double(v) => time_item::Value::Double(v),
                            }),
                        })
                        .collect(),
                }),
                ..Default::default()
            },
        }
    }

    pub fn from_proto(content: MsgContent) -> Self {
        match content.msg_type() {
            MsgType::Text => Self::Text {
                auto_copy: content.flags & CONTENT_FLAG_AUTO_COPY != 0,
                text: content.text,
                title: content.title,
                copy_text: content.copytext,
            },
            MsgType::Link => Self::Link { url: content.link },
            MsgType::Image => Self::Image {
                path: content.file,
                size: content.size,
                thumbnail: content.thumbnail,
            },
            MsgType::Audio => Self::Audio {
                path: content.file,
                size: content.size,
                duration_ms: content.duration,
            },
            MsgType::File => Self::File {
                path: content.file,
                filename: content.filename,
                title: content.title,
                text: content.text,
                size: content.size,
            },
            MsgType::Action => Self::Action {
                text: content.text,
                title: content.title,
                actions: content
                    .actions
                    .into_iter()
                    .map(|a| Action {
                        name: a.name,
                        url: a.link,
                    })
                    .collect(),
            },
            MsgType::Timeline => {
                let tc = content.timecontent.unwrap_or_default();
                Self::Timeline {
                    code: tc.code,
                    timestamp_ms: tc.timestamp,
                    items: tc
                        .items
                        .into_iter()
                        .filter_map(|item| {
                            let value = match item.value? {
                                time_item::Value::Integer(v) => TimelineValue::Integer(v),
                                time_item::Value::Double(v) => TimelineValue::Double(v),
                            };
                            Some(TimelineItem {
                                name: item.name,
                                value,
                            })
                        })
                        .collect(),
                }
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let proto =
            MsgContent::decode(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Ok(Self::from_proto(proto))
    }
}

impl FromStr for InterruptionLevel {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "passive" => Ok(Self::Passive),
            "time-sensitive" => Ok(Self::TimeSensitive),
            other => Err(EnvelopeError::Malformed(format!(
                "unknown interruption level {other:?}"
            ))),
        }
    }
}

/// A message on its way to a user's devices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    envelope: Envelope,
}

impl Message {
    /// Start an envelope addressed through `token`.
    pub fn new(token: &Token) -> Self {
        Self {
            envelope: Envelope {
                from: token.node_id_bytes(),
                channel: token.channel().to_vec(),
                ..Default::default()
            },
        }
    }

    pub fn with_content(mut self, content: &Content) -> Self {
        self.envelope.content = content.encode();
        self.envelope.ciphertext.clear();
        self
    }

    pub fn with_sound(mut self, name: &str) -> Self {
        if !name.is_empty() {
            self.envelope.sound = Some(Sound {
                name: name.to_string(),
            });
        }
        self
    }

    /// Priorities outside `1..i32::MAX` leave the field unset.
    pub fn with_priority(mut self, priority: i32) -> Self {
        if priority > 0 && priority < i32::MAX {
            self.envelope.priority = priority;
        }
        self
    }

    pub fn with_interruption_level(mut self, level: InterruptionLevel) -> Self {
        self.envelope.interruption_level = level as i32;
        self
    }

    pub fn priority(&self) -> i32 {
        self.envelope.priority
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn has_content(&self) -> bool {
        !self.envelope.content.is_empty() || !self.envelope.ciphertext.is_empty()
    }

    /// Plaintext content, if the envelope still carries it.
    pub fn content(&self) -> Result<Option<Content>, EnvelopeError> {
        if self.envelope.content.is_empty() {
            return Ok(None);
        }
        Content::decode(&self.envelope.content).map(Some)
    }

    /// Drop the fields copied from the token.
    pub fn disable_token(&mut self) {
        self.envelope.from.clear();
        self.envelope.channel.clear();
    }

    pub fn encode(&self) -> Vec<u8> {
        self.envelope.encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope =
            Envelope::decode(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Ok(Self { envelope })
    }

    /// Seal the whole envelope with a timestamp nonce. Returns
    /// `nonce(12) ‖ ciphertext ‖ tag`.
    pub fn encrypt_data(
        &self,
        secret: &UserSecret,
        timestamp_ns: u64,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce[..4].copy_from_slice(&DATA_NONCE_PREFIX);
        nonce[4..].copy_from_slice(&timestamp_ns.to_be_bytes());

        let sealed = seal(secret, &nonce, &self.encode())?;
        let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Replace the plaintext content with `nonce ‖ AES-256-GCM(content)`
    /// under a random nonce. A message without content is left as is.
    pub fn encrypt_content(&mut self, secret: &UserSecret) -> Result<(), EnvelopeError> {
        if self.envelope.content.is_empty() {
            return Ok(());
        }
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| EnvelopeError::EncryptionFailed)?;

        let sealed = seal(secret, &nonce, &self.envelope.content)?;
        let mut ciphertext = Vec::with_capacity(AEAD_NONCE_SIZE + sealed.len());
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&sealed);

        self.envelope.ciphertext = ciphertext;
        self.envelope.content.clear();
        Ok(())
    }

    /// Device-side inverse of [`Message::encrypt_content`].
    pub fn decrypt_content(&self, secret: &UserSecret) -> Result<Content, EnvelopeError> {
        let data = &self.envelope.ciphertext;
        if data.len() < AEAD_NONCE_SIZE {
            return Err(EnvelopeError::DecryptionFailed);
        }
        let (nonce, sealed) = data.split_at(AEAD_NONCE_SIZE);
        Content::decode(&open(secret, nonce, sealed)?)
    }
}

/// Device-side inverse of [`Message::encrypt_data`].
pub fn decrypt_data(secret: &UserSecret, data: &[u8]) -> Result<Message, EnvelopeError> {
    if data.len() < AEAD_NONCE_SIZE {
        return Err(EnvelopeError::DecryptionFailed);
    }
    let (nonce, sealed) = data.split_at(AEAD_NONCE_SIZE);
    Message::decode(&open(secret, nonce, sealed)?)
}

fn cipher(secret: &UserSecret) -> Result<Aes256Gcm, EnvelopeError> {
    Aes256Gcm::new_from_slice(secret.key()).map_err(|_| EnvelopeError::EncryptionFailed)
}

fn seal(secret: &UserSecret, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    cipher(secret)?
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: secret.aad(),
            },
        )
        .map_err(|_| EnvelopeError::EncryptionFailed)
}

fn open(secret: &UserSecret, nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    cipher(secret)?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: secret.aad(),
            },
        )
        .map_err(|_| EnvelopeError::DecryptionFailed)
}
