//! XML documents carried in frame bodies.
//!
//! Message types are plain enums with `TryFrom`; unknown values are errors, not panics.

use std::fmt;
use std::str::FromStr;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{UssdError, ValidationError};

/// Root tag of the logon request.
pub const AUTH_REQUEST: &str = "AUTHRequest";
/// Root tag of the keepalive.
pub const ENQ_REQUEST: &str = "ENQRequest";
/// Root tag of an inbound dialog event.
pub const USSD_REQUEST: &str = "USSDRequest";
/// Root tag of an outbound dialog reply.
pub const USSD_RESPONSE: &str = "USSDResponse";

// ── MsgType ──────────────────────────────────────────────────────

/// Values of the `msgtype` element.
///
/// Inbound events carry `MenuRequest` or `MobileText`; replies carry
/// `Continue` or `Terminate`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Subscriber dialled a star code and expects a menu.
    MenuRequest = 1,
    /// Reply that expects further input.
    Continue = 2,
    /// Reply that expects no input.
    Notify = 3,
    /// Mobile-originated free text inside a running dialog.
    MobileText = 4,
    /// Reply that closes the dialog.
    Terminate = 6,
}

impl TryFrom<u8> for MsgType {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MsgType::MenuRequest),
            2 => Ok(MsgType::Continue),
            3 => Ok(MsgType::Notify),
            4 => Ok(MsgType::MobileText),
            6 => Ok(MsgType::Terminate),
            other => Err(ValidationError::UnsupportedMsgType(other)),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MsgType {
    /// Returns `true` for the types a continuing dialog event may carry.
    pub fn is_inbound(&self) -> bool {
        matches!(self, MsgType::MenuRequest | MsgType::MobileText)
    }
}

// ── LogonRequest ─────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "AUTHRequest")]
pub struct LogonRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "userName")]
    pub username: String,
    #[serde(rename = "passWord")]
    pub password: String,
    #[serde(rename = "applicationId")]
    pub application_id: String,
}

impl LogonRequest {
    pub fn to_xml(&self) -> Result<String, UssdError> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

impl fmt::Debug for LogonRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogonRequest")
            .field("request_id", &self.request_id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("application_id", &self.application_id)
            .finish()
    }
}

// ── EnquireLink ──────────────────────────────────────────────────

/// Empty keepalive document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnquireLink;

impl EnquireLink {
    pub fn to_xml(&self) -> Result<String, UssdError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .create_element(ENQ_REQUEST)
            .write_empty()
            .map_err(|e| UssdError::Encoding(e.to_string()))?;
        String::from_utf8(writer.into_inner()).map_err(|e| UssdError::Encoding(e.to_string()))
    }
}

// ── UssdRequest ──────────────────────────────────────────────────

/// One inbound dialog event.
///
/// Missing elements take their zero value, as the gateway omits fields
/// it has nothing to say about.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "USSDRequest", default)]
pub struct UssdRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub msisdn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(rename = "starCode")]
    pub star_code: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(deserialize_with = "lenient_number")]
    pub phase: u32,
    #[serde(deserialize_with = "lenient_number")]
    pub dcs: u32,
    #[serde(rename = "msgtype", deserialize_with = "lenient_number")]
    pub msg_type: u8,
    #[serde(rename = "userdata", skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(rename = "EndofSession", deserialize_with = "lenient_number")]
    pub end_of_session: u8,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl UssdRequest {
    pub fn from_xml(document: &str) -> Result<Self, UssdError> {
        Ok(quick_xml::de::from_str(document)?)
    }

    pub fn to_xml(&self) -> Result<String, UssdError> {
        Ok(quick_xml::se::to_string(self)?)
    }

    /// The gateway-reported error, if one is present and non-blank.
    pub fn error(&self) -> Option<&str> {
        self.error_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// `true` once the subscriber session has ended upstream.
    pub fn is_end_of_session(&self) -> bool {
        self.end_of_session == 1
    }

    /// Subscriber input, if present and non-empty.
    pub fn input(&self) -> Option<&str> {
        self.user_data.as_deref().filter(|data| !data.is_empty())
    }

    /// Check that a continuing event can be sent to the menu service.
    pub fn validate(&self) -> Result<MsgType, ValidationError> {
        let msg_type = MsgType::try_from(self.msg_type)?;
        if !msg_type.is_inbound() {
            return Err(ValidationError::UnsupportedMsgType(self.msg_type));
        }
        if self.input().is_none() {
            return Err(ValidationError::MissingUserData);
        }
        Ok(msg_type)
    }

    /// Service code in dialled form, e.g. `*123#`.
    pub fn shortcode(&self) -> String {
        format!("*{}#", self.star_code)
    }
}

// ── UssdResponse ─────────────────────────────────────────────────

/// One outbound dialog reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "USSDResponse", default)]
pub struct UssdResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub msisdn: String,
    #[serde(rename = "starCode")]
    pub star_code: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub phase: u32,
    pub dcs: u32,
    #[serde(rename = "msgtype")]
    pub msg_type: u8,
    #[serde(rename = "userdata")]
    pub user_data: String,
    #[serde(rename = "EndofSession")]
    pub end_of_session: u8,
}

impl UssdResponse {
    /// Reply to `request` with `text`, keeping the dialog open when
    /// `keep_open` is set.
    pub fn reply_to(request: &UssdRequest, text: impl Into<String>, keep_open: bool) -> Self {
        let (msg_type, end_of_session) = if keep_open {
            (MsgType::Continue, 0)
        } else {
            (MsgType::Terminate, 1)
        };
        Self {
            request_id: request.request_id.clone(),
            msisdn: request.msisdn.clone(),
            star_code: request.star_code.clone(),
            client_id: request.client_id.clone(),
            phase: request.phase,
            dcs: request.dcs,
            msg_type: msg_type as u8,
            user_data: text.into(),
            end_of_session,
        }
    }

    pub fn from_xml(document: &str) -> Result<Self, UssdError> {
        Ok(quick_xml::de::from_str(document)?)
    }

    /// Serialize the reply. Markup in `userdata` is escaped, but numeric
    /// character references such as `&#xA;` go out as written so menu
    /// text can carry line breaks.
    pub fn to_xml(&self) -> Result<String, UssdError> {
        let mut writer = Writer::new(Vec::new());
        let fields = [
            ("requestId", BytesText::new(&self.request_id)),
            ("msisdn", BytesText::new(&self.msisdn)),
            ("starCode", BytesText::new(&self.star_code)),
            ("clientId", BytesText::new(&self.client_id)),
            ("phase", BytesText::from_escaped(self.phase.to_string())),
            ("dcs", BytesText::from_escaped(self.dcs.to_string())),
            ("msgtype", BytesText::from_escaped(self.msg_type.to_string())),
            ("userdata", BytesText::from_escaped(escape_keeping_char_refs(&self.user_data))),
            ("EndofSession", BytesText::from_escaped(self.end_of_session.to_string())),
        ];

        write_event(&mut writer, Event::Start(BytesStart::new(USSD_RESPONSE)))?;
        for (name, text) in fields {
            write_event(&mut writer, Event::Start(BytesStart::new(name)))?;
            write_event(&mut writer, Event::Text(text))?;
            write_event(&mut writer, Event::End(BytesEnd::new(name)))?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new(USSD_RESPONSE)))?;
        String::from_utf8(writer.into_inner()).map_err(|e| UssdError::Encoding(e.to_string()))
    }

    pub fn is_end_of_session(&self) -> bool {
        self.end_of_session == 1
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), UssdError> {
    writer
        .write_event(event)
        .map_err(|e| UssdError::Encoding(e.to_string()))
}

/// Escape `<`, `>` and `&` in `text`, except an `&` that opens a
/// numeric character reference.
fn escape_keeping_char_refs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(['&', '<', '>']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let consumed = match tail.as_bytes()[0] {
            b'<' => {
                out.push_str("&lt;");
                1
            }
            b'>' => {
                out.push_str("&gt;");
                1
            }
            _ => match char_ref_len(tail) {
                Some(len) => {
                    out.push_str(&tail[..len]);
                    len
                }
                None => {
                    out.push_str("&amp;");
                    1
                }
            },
        };
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

/// Length of the `&#NN;` or `&#xHH;` reference at the start of `s`.
fn char_ref_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix("&#")?;
    let (digits, hex) = match body.strip_prefix(['x', 'X']) {
        Some(rest) => (rest, true),
        None => (body, false),
    };
    let end = digits.find(';')?;
    let number = &digits[..end];
    let valid = !number.is_empty()
        && number.bytes().all(|b| {
            if hex {
                b.is_ascii_hexdigit()
            } else {
                b.is_ascii_digit()
            }
        });
    valid.then_some(s.len() - digits.len() + end + 1)
}

/// Numeric element that reads an empty or blank body as zero.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: fmt::Display,
{
    let text = String::deserialize(deserializer)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(T::default());
    }
    text.parse().map_err(serde::de::Error::custom)
}

// ── InboundMessage ───────────────────────────────────────────────

/// Classification of a received frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// A dialog event that needs an answer (or a deliberate drop).
    Dialog(UssdRequest),
    /// Anything else: logon and keepalive acknowledgements, unknown types.
    Other(String),
}

impl InboundMessage {
    pub fn parse(document: &str) -> Result<Self, UssdError> {
        let tag = root_tag(document)?;
        if tag == USSD_REQUEST {
            Ok(InboundMessage::Dialog(UssdRequest::from_xml(document)?))
        } else {
            Ok(InboundMessage::Other(tag))
        }
    }
}

/// Name of the first element in `document`.
pub fn root_tag(document: &str) -> Result<String, UssdError> {
    let mut reader = Reader::from_str(document);
    loop {
        match reader
            .read_event()
            .map_err(|e| UssdError::Xml(e.to_string()))?
        {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Eof => return Err(UssdError::Xml("document has no root element".into())),
            _ => continue,
        }
    }
}
