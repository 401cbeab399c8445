//! Flat JSON payloads handed to the publish sink.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::message::{VitalSign, Wave, is_valid_value};
use crate::wave::{resample, wave_name};

#[derive(Debug, Serialize)]
struct VitalPayload<'a> {
    #[serde(rename = "HEART_BEAT", skip_serializing_if = "Option::is_none")]
    heart_beat: Option<&'a str>,
    #[serde(rename = "NBP_SYS", skip_serializing_if = "Option::is_none")]
    nbp_sys: Option<&'a str>,
    #[serde(rename = "NBP_DIA", skip_serializing_if = "Option::is_none")]
    nbp_dia: Option<&'a str>,
    #[serde(rename = "NBP_MEAN", skip_serializing_if = "Option::is_none")]
    nbp_mean: Option<&'a str>,
    #[serde(rename = "RESP_RATE", skip_serializing_if = "Option::is_none")]
    resp_rate: Option<&'a str>,
    #[serde(rename = "SPO2", skip_serializing_if = "Option::is_none")]
    spo2: Option<&'a str>,
    #[serde(rename = "TEMP", skip_serializing_if = "Option::is_none")]
    temp: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

impl VitalPayload<'_> {
    fn has_readings(&self) -> bool {
        [
            self.heart_beat,
            self.nbp_sys,
            self.nbp_dia,
            self.nbp_mean,
            self.resp_rate,
            self.spo2,
            self.temp,
        ]
        .iter()
        .any(Option::is_some)
    }
}

#[derive(Debug, Serialize)]
struct WavePayload<'a> {
    #[serde(flatten)]
    channels: BTreeMap<&'a str, Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

fn valid(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|&v| is_valid_value(Some(v)))
}

fn stamp(timestamp: i64) -> Option<i64> {
    (timestamp > 0).then_some(timestamp)
}

/// Render a vital sign; `None` when no published attribute holds a valid
/// reading.
pub fn render_vital(vs: &VitalSign) -> Option<String> {
    let payload = VitalPayload {
        heart_beat: valid(&vs.hr),
        nbp_sys: valid(&vs.sys),
        nbp_dia: valid(&vs.dia),
        nbp_mean: valid(&vs.mean),
        resp_rate: valid(&vs.rr),
        spo2: valid(&vs.spo2),
        temp: valid(&vs.temp),
        timestamp: stamp(vs.timestamp),
    };
    if !payload.has_readings() {
        return None;
    }
    serde_json::to_string(&payload).ok()
}

/// Render a wave as channel name -> 128 resampled points; `None` when no
/// channel has a published name.
pub fn render_wave(wave: &Wave) -> Option<String> {
    let mut channels = BTreeMap::new();
    for (id, samples) in &wave.values {
        match wave_name(*id) {
            Some(name) if !samples.is_empty() => {
                channels.insert(name, resample(samples));
            }
            Some(_) => {}
            None => debug!("no published name for wave {}", id),
        }
    }
    if channels.is_empty() {
        return None;
    }
    serde_json::to_string(&WavePayload { channels, timestamp: stamp(wave.timestamp) }).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).expect("valid json")
    }

    #[test]
    fn heart_rate_and_timestamp_only() {
        let vs = VitalSign {
            timestamp: 1_704_110_400_000,
            hr: Some("72".into()),
            pvc: Some("3".into()),
            co2: Some("35".into()),
            spo2: Some("-100".into()),
            ..Default::default()
        };
        let payload = render_vital(&vs).expect("payload");
        assert_eq!(parse(&payload), json!({"HEART_BEAT": "72", "timestamp": 1_704_110_400_000i64}));
    }

    #[test]
    fn all_published_keys() {
        let vs = VitalSign {
            hr: Some("60".into()),
            sys: Some("120".into()),
            dia: Some("80".into()),
            mean: Some("93".into()),
            rr: Some("16".into()),
            spo2: Some("97".into()),
            temp: Some("36.6".into()),
            ..Default::default()
        };
        let value = parse(&render_vital(&vs).expect("payload"));
        assert_eq!(
            value,
            json!({
                "HEART_BEAT": "60", "NBP_SYS": "120", "NBP_DIA": "80", "NBP_MEAN": "93",
                "RESP_RATE": "16", "SPO2": "97", "TEMP": "36.6"
            })
        );
    }

    #[test]
    fn timestamp_alone_renders_nothing() {
        let vs = VitalSign { timestamp: 1_000, ..Default::default() };
        assert!(render_vital(&vs).is_none());
    }

    #[test]
    fn wave_channels_are_resampled_and_named() {
        let mut wave = Wave { timestamp: 42, ..Default::default() };
        wave.values.insert(1152, (0..256).collect());
        wave.values.insert(1999, vec![1, 2, 3]);

        let value = parse(&render_wave(&wave).expect("payload"));
        let pleth = value["PLETH"].as_array().expect("array");
        assert_eq!(pleth.len(), 128);
        assert_eq!(pleth[1], json!(2));
        assert_eq!(value["timestamp"], json!(42));
        assert_eq!(value.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn wave_with_only_unmapped_channels_renders_nothing() {
        let mut wave = Wave::default();
        wave.values.insert(1200, vec![1, 2, 3]);
        assert!(render_wave(&wave).is_none());
    }
}
