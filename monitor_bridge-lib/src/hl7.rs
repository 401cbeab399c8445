//! Frame payload -> typed [`Message`].
//!
//! A payload is a run of CR-terminated segments. The leading `MSH` segment
//! picks the message shape; each later segment is handed to that shape's
//! segment reader by its 3-letter tag. Segment failures are logged and the
//! segment skipped, so a message is returned as far as it could be built.

use std::net::Ipv4Addr;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};

use crate::error::DecodeError;
use crate::message::{ConnectIndication, Message, VitalField, VitalSign, Wave};
use crate::wave;

const HEADER_TAG: &[u8] = b"MSH";
const SEGMENT_END: u8 = b'\r';
const FIELD_SEP: char = '|';
const COMPONENT_SEP: char = '^';
const SUBCOMPONENT_SEP: char = '&';

const DEFAULT_VITAL_CONTROL_ID: u32 = 204;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MessageKind {
    Connect,
    Wave,
    Vital,
}

/// A (trigger event, message code) pair recognised in the `MSH` segment.
struct MessageCode {
    event: &'static str,
    control_id: u32,
    kind: MessageKind,
}

/// Header codes that select a non-default message shape; any other `MSH`
/// yields a vital-sign report.
const MESSAGE_CODES: [MessageCode; 2] = [
    MessageCode { event: "ADT^A01", control_id: 101, kind: MessageKind::Connect },
    MessageCode { event: "ORU^R01", control_id: 157, kind: MessageKind::Wave },
];

impl MessageCode {
    fn matches(&self, header: &str) -> bool {
        header.contains(&format!("|{}|{}|", self.event, self.control_id))
    }
}

fn classify(header: &str) -> (MessageKind, u32) {
    MESSAGE_CODES
        .iter()
        .find(|code| code.matches(header))
        .map(|code| (code.kind, code.control_id))
        .unwrap_or_else(|| {
            let control_id = header
                .split(FIELD_SEP)
                .nth(9)
                .and_then(|f| f.parse().ok())
                .unwrap_or(DEFAULT_VITAL_CONTROL_ID);
            (MessageKind::Vital, control_id)
        })
}

/// Split a payload into segments. A trailing run without a CR is treated as
/// a final segment.
fn segments(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    let trimmed = payload.strip_suffix(&[SEGMENT_END]).unwrap_or(payload);
    trimmed
        .split(|&b| b == SEGMENT_END)
        .filter(|seg| !seg.is_empty())
}

/// Decode one frame payload. Returns `None` when the first segment is not an
/// `MSH` header.
pub fn decode(payload: &[u8]) -> Option<Message> {
    let mut segs = segments(payload);
    let header = segs.next()?;
    if !header.starts_with(HEADER_TAG) {
        debug!("frame does not start with an MSH segment, dropping");
        return None;
    }

    let header = String::from_utf8_lossy(header);
    let mut message = match classify(&header) {
        (MessageKind::Connect, control_id) => {
            Message::Connect(ConnectIndication { control_id, ..Default::default() })
        }
        (MessageKind::Wave, control_id) => {
            Message::Wave(Wave { control_id, ..Default::default() })
        }
        (MessageKind::Vital, control_id) => {
            Message::Vital(VitalSign { control_id, ..Default::default() })
        }
    };

    for segment in segs {
        let result = match &mut message {
            Message::Connect(m) => read_connect_segment(m, segment),
            Message::Vital(m) => read_vital_segment(m, segment),
            Message::Wave(m) => read_wave_segment(m, segment),
        };
        if let Err(e) = result {
            warn!("skipping {} segment: {}", tag_of(segment), e);
        }
    }
    Some(message)
}

fn tag_of(segment: &[u8]) -> String {
    String::from_utf8_lossy(&segment[..segment.len().min(3)]).into_owned()
}

fn field(fields: &[&str], index: usize) -> Option<String> {
    fields.get(index).map(|f| (*f).to_owned())
}

fn read_connect_segment(msg: &mut ConnectIndication, segment: &[u8]) -> Result<(), DecodeError> {
    let text = String::from_utf8_lossy(segment);
    let fields: Vec<&str> = text.split(FIELD_SEP).collect();

    match fields[0] {
        "EVN" => {
            if let Some(date) = fields.get(2).filter(|d| !d.is_empty()) {
                let parsed = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|source| {
                    DecodeError::Date { segment: "EVN", value: (*date).to_owned(), source }
                })?;
                msg.admitted_date = Some(parsed);
            }
        }
        "PID" => {
            msg.patient_id = field(&fields, 4);
            msg.patient_name = field(&fields, 6);
        }
        "PV1" => {
            msg.patient_class = field(&fields, 2);
            if let Some(location) = fields.get(3).filter(|l| !l.is_empty()) {
                read_location(msg, location)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// `PV1` location: `^`-separated components whose third is an `&` list
/// `_&_&<ip as u32>&<port>&_&<admitted>`.
fn read_location(msg: &mut ConnectIndication, location: &str) -> Result<(), DecodeError> {
    let Some(component) = location.split(COMPONENT_SEP).nth(2) else {
        return Ok(());
    };
    let subcomps: Vec<&str> = component.split(SUBCOMPONENT_SEP).collect();
    if subcomps.len() != 6 {
        return Ok(());
    }

    let raw_ip = parse_int::<i64>("PV1", subcomps[2])?;
    // The device sends the address as a signed 32-bit value.
    let ip = Ipv4Addr::from(raw_ip as u32);
    msg.ip = Some(ip.to_string());
    msg.port = parse_int("PV1", subcomps[3])?;
    msg.admitted = subcomps[5] == "1";
    Ok(())
}

fn parse_int<T>(segment: &'static str, value: &str) -> Result<T, DecodeError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    value.trim().parse().map_err(|source| DecodeError::Integer {
        segment,
        value: value.to_owned(),
        source,
    })
}

fn read_vital_segment(msg: &mut VitalSign, segment: &[u8]) -> Result<(), DecodeError> {
    if !segment.starts_with(b"OBX") {
        return Ok(());
    }
    let text = String::from_utf8_lossy(segment);
    let fields: Vec<&str> = text.split(FIELD_SEP).collect();

    if let Some(value) = fields.get(5).filter(|v| !v.is_empty())
        && let Some(target) = fields
            .get(3)
            .and_then(|id| id.split_once(COMPONENT_SEP))
            .and_then(|(code, _)| code.parse().ok())
            .and_then(VitalField::from_code)
    {
        msg.set(target, (*value).to_owned());
    }

    match fields.get(14).filter(|t| !t.is_empty()) {
        Some(stamp) => msg.timestamp = parse_local_millis(stamp)?,
        None => msg.timestamp = Utc::now().timestamp() * 1000,
    }
    Ok(())
}

/// Parse a `YYYYMMDDHHMMSS` stamp in the gateway's local time zone into
/// epoch milliseconds.
pub fn parse_local_millis(stamp: &str) -> Result<i64, DecodeError> {
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S").map_err(|source| {
        DecodeError::Date { segment: "OBX", value: stamp.to_owned(), source }
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| DecodeError::LocalTime(stamp.to_owned()))
}

fn read_wave_segment(msg: &mut Wave, segment: &[u8]) -> Result<(), DecodeError> {
    let Some(payload) = segment.strip_prefix(b"ZMW|") else {
        return Ok(());
    };
    if payload.len() < 8 {
        return Ok(());
    }
    msg.timestamp = Utc::now().timestamp_millis();

    let decoded = wave::decode(payload)?;
    msg.check_sum = decoded.header.check_sum;
    msg.wave_id = decoded.header.wave_id;
    msg.data_size = decoded.header.data_size;
    msg.sample_rate = decoded.header.sample_rate;
    if decoded.samples.is_empty() {
        debug!("wave {} decoded no samples", decoded.header.wave_id);
    } else {
        msg.values.insert(decoded.header.wave_id, decoded.samples);
    }
    Ok(())
}
