//! Protobuf wire types.
//!
//! Field numbers are part of the wire contract with issuers, devices and
//! upstream relays. Never renumber.

/// Signed body of a token (segment 0).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TokenPayload {
    /// Expiry, unix seconds.
    #[prost(uint64, tag = "1")]
    pub expires: u64,
    #[prost(string, tag = "2")]
    pub user_id: String,
    /// Carried by some issuers, not interpreted here.
    #[prost(string, tag = "3")]
    pub device_id: String,
    /// Opaque channel selector chosen by the issuer.
    #[prost(bytes = "vec", tag = "4")]
    pub channel: Vec<u8>,
    /// base32 node identifier the token is bound to.
    #[prost(string, tag = "5")]
    pub node_id: String,
    /// sha1 of the only request path this token may authorise.
    #[prost(bytes = "vec", tag = "6")]
    pub data_hash: Vec<u8>,
}

/// The message envelope pushed to devices or forwarded upstream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(bytes = "vec", tag = "1")]
    pub from: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub channel: Vec<u8>,
    /// Serialised [`MsgContent`], empty once encrypted.
    #[prost(bytes = "vec", tag = "3")]
    pub content: Vec<u8>,
    /// `nonce(12) ‖ AES-256-GCM(content)`.
    #[prost(bytes = "vec", tag = "4")]
    pub ciphertext: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub sound: Option<Sound>,
    #[prost(int32, tag = "6")]
    pub priority: i32,
    #[prost(enumeration = "InterruptionLevel", tag = "7")]
    pub interruption_level: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sound {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InterruptionLevel {
    Active = 0,
    Passive = 1,
    TimeSensitive = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MsgType {
    Text = 0,
    Image = 1,
    Audio = 2,
    File = 3,
    Link = 4,
    Action = 5,
    Timeline = 6,
}

/// Content flag: copy `copytext` (or `text`) to the clipboard on arrival.
pub const CONTENT_FLAG_AUTO_COPY: u64 = 0x01;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgContent {
    #[prost(enumeration = "MsgType", tag = "1")]
    pub msg_type: i32,
    #[prost(uint64, tag = "2")]
    pub flags: u64,
    #[prost(string, tag = "3")]
    pub text: String,
    #[prost(string, tag = "4")]
    pub title: String,
    #[prost(string, tag = "5")]
    pub link: String,
    #[prost(string, tag = "6")]
    pub file: String,
    #[prost(string, tag = "7")]
    pub filename: String,
    #[prost(uint64, tag = "8")]
    pub size: u64,
    #[prost(message, optional, tag = "9")]
    pub thumbnail: Option<Thumbnail>,
    #[prost(string, tag = "10")]
    pub copytext: String,
    #[prost(message, repeated, tag = "11")]
    pub actions: Vec<ActionItem>,
    #[prost(message, optional, tag = "12")]
    pub timecontent: Option<TimeContent>,
    /// Audio duration in milliseconds.
    #[prost(uint64, tag = "13")]
    pub duration: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Thumbnail {
    #[prost(int32, tag = "1")]
    pub width: i32,
    #[prost(int32, tag = "2")]
    pub height: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub preview: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ActType {
    Url = 0,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActionItem {
    #[prost(enumeration = "ActType", tag = "1")]
    pub act_type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub link: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeContent {
    #[prost(string, tag = "1")]
    pub code: String,
    /// Event time, unix milliseconds.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(message, repeated, tag = "3")]
    pub items: Vec<TimeItem>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeItem {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "time_item::Value", tags = "2, 3")]
    pub value: Option<time_item::Value>,
}

pub mod time_item {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(int64, tag = "2")]
        Integer(i64),
        #[prost(double, tag = "3")]
        Double(f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::decode_b64url;
    use prost::Message;

    // Segment 0 of a token produced by an existing issuer.
    const ISSUED_PAYLOAD: &str = "EiJBQk9PNlRTSVhLU0VWSUpLWExEUVNVWFFSWFVBT1hHR1lZIgRjaGFuKgVNRlJHRzIUx5tXg-Vym58og7aZw05IkoDvse8";

    #[test]
    fn test_decode_issued_token_payload() {
        let bytes = decode_b64url(ISSUED_PAYLOAD).unwrap();
        let payload = TokenPayload::decode(bytes.as_slice()).unwrap();
        assert_eq!(payload.user_id, "ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY");
        assert_eq!(payload.channel, b"chan");
        assert_eq!(payload.node_id, "MFRGG");
        assert_eq!(payload.data_hash.len(), 20);
        assert_eq!(payload.expires, 0);
    }

    #[test]
    fn test_decode_expires_field() {
        let bytes = decode_b64url("CNjo6ua-WhIiQUJPTzZUU0lYS1NFVklKS1hMRFFTVVhRUlhVQU9YR0dZWQ").unwrap();
        let payload = TokenPayload::decode(bytes.as_slice()).unwrap();
        assert_eq!(payload.expires, 3_109_235_111_000);
        assert_eq!(payload.user_id, "ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY");
    }

    #[test]
    fn test_envelope_field_layout() {
        let envelope = Envelope {
            from: vec![0xAA],
            priority: 10,
            interruption_level: InterruptionLevel::TimeSensitive as i32,
            ..Default::default()
        };
        // tag 1 bytes, tag 6 varint, tag 7 varint
        assert_eq!(envelope.encode_to_vec(), vec![0x0A, 0x01, 0xAA, 0x30, 0x0A, 0x38, 0x02]);
    }

    #[test]
    fn test_unknown_enum_value_falls_back() {
        let content = MsgContent {
            msg_type: 99,
            ..Default::default()
        };
        assert_eq!(content.msg_type(), MsgType::Text);
    }
}
