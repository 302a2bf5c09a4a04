use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::LazyLock;

// <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD [MSG]
static RFC5424: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^<(\d{1,3})>1 (\S+) (\S+) (\S+) (\S+) (\S+) (-|(?:\[(?:[^\]\\]|\\.)*\])+)(?: (.*))?$",
    )
});

// <PRI>Mmm dd hh:mm:ss HOSTNAME TAG[PID]: MSG
static RFC3164: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^<(\d{1,3})>([A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}) (\S+) ([^:\[\s]+)(?:\[([^\]]*)\])?: ?(.*)$",
    )
});

const MAX_PRIORITY: u8 = 191;
const NIL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyslogFormat {
    Rfc5424,
    Rfc3164,
    Unparsed,
}

/// One received syslog message in the shape it is shipped: a flat JSON
/// object whose keys depend on the wire format it arrived in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyslogMessage {
    #[serde(skip)]
    pub format: SyslogFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub client: String,
}

impl SyslogMessage {
    fn empty(format: SyslogFormat, peer: SocketAddr) -> Self {
        Self {
            format,
            priority: None,
            facility: None,
            severity: None,
            version: None,
            timestamp: None,
            hostname: None,
            app_name: None,
            tag: None,
            proc_id: None,
            msg_id: None,
            structured_data: None,
            message: None,
            content: None,
            client: peer.to_string(),
        }
    }

    fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self.facility = Some(priority / 8);
        self.severity = Some(priority % 8);
        self
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parses one datagram. Anything that is neither RFC 5424 nor RFC 3164 is
/// kept verbatim as `content`.
pub fn parse_syslog(datagram: &str, peer: SocketAddr) -> SyslogMessage {
    let datagram = datagram.trim_end_matches(['\n', '\r', '\0']);

    parse_rfc5424(datagram, peer)
        .or_else(|| parse_rfc3164(datagram, peer))
        .unwrap_or_else(|| {
            let mut raw = SyslogMessage::empty(SyslogFormat::Unparsed, peer);
            raw.content = Some(datagram.to_string());
            raw
        })
}

fn parse_priority(text: &str) -> Option<u8> {
    text.parse::<u8>().ok().filter(|p| *p <= MAX_PRIORITY)
}

fn non_nil(text: &str) -> Option<String> {
    (text != NIL).then(|| text.to_string())
}

fn parse_rfc5424(datagram: &str, peer: SocketAddr) -> Option<SyslogMessage> {
    let caps = RFC5424.as_ref().ok()?.captures(datagram)?;
    let priority = parse_priority(&caps[1])?;

    let mut msg = SyslogMessage::empty(SyslogFormat::Rfc5424, peer).with_priority(priority);
    msg.version = Some(1);
    msg.timestamp = match &caps[2] {
        NIL => None,
        raw => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc).to_rfc3339())
                .unwrap_or_else(|_| raw.to_string()),
        ),
    };
    msg.hostname = non_nil(&caps[3]);
    msg.app_name = non_nil(&caps[4]);
    msg.proc_id = non_nil(&caps[5]);
    msg.msg_id = non_nil(&caps[6]);
    msg.structured_data = non_nil(&caps[7]);
    msg.message = Some(
        caps.get(8)
            .map(|m| m.as_str().trim_start_matches('\u{feff}').to_string())
            .unwrap_or_default(),
    );
    Some(msg)
}

fn parse_rfc3164(datagram: &str, peer: SocketAddr) -> Option<SyslogMessage> {
    let caps = RFC3164.as_ref().ok()?.captures(datagram)?;
    let priority = parse_priority(&caps[1])?;

    let mut msg = SyslogMessage::empty(SyslogFormat::Rfc3164, peer).with_priority(priority);
    msg.timestamp = Some(bsd_timestamp(&caps[2]));
    msg.hostname = Some(caps[3].to_string());
    msg.tag = Some(caps[4].to_string());
    msg.proc_id = caps.get(5).map(|m| m.as_str().to_string());
    msg.content = Some(caps[6].to_string());
    Some(msg)
}

/// BSD timestamps carry no year; the current one is assumed.
fn bsd_timestamp(raw: &str) -> String {
    let with_year = format!("{} {}", Utc::now().year(), raw.replace("  ", " "));
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
        .map(|ts| ts.and_utc().to_rfc3339())
        .unwrap_or_else(|_| raw.to_string())
}
