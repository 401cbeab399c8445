use std::collections::HashMap;

use chrono::NaiveDate;

/// Prefix the monitor uses for "no valid reading".
pub const INVALID_SENTINEL: &str = "-100";

/// `ADT^A01` admission message type.
pub const ADMISSION_TYPE: &str = "ADT^A01";
/// `ORU^R01` observation report type, shared by vital signs and waves.
pub const REPORT_TYPE: &str = "ORU^R01";

/// True when `value` is present, non-empty and not the invalid sentinel.
pub fn is_valid_value(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && !v.starts_with(INVALID_SENTINEL))
}

/// A decoded frame: one of the three shapes the monitor emits.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Connect(ConnectIndication),
    Vital(VitalSign),
    Wave(Wave),
}

impl Message {
    /// Protocol message type string (`ADT^A01` or `ORU^R01`).
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Connect(_) => ADMISSION_TYPE,
            Message::Vital(_) | Message::Wave(_) => REPORT_TYPE,
        }
    }

    pub fn control_id(&self) -> u32 {
        match self {
            Message::Connect(m) => m.control_id,
            Message::Vital(m) => m.control_id,
            Message::Wave(m) => m.control_id,
        }
    }

    /// Epoch milliseconds; 0 when unknown.
    pub fn timestamp(&self) -> i64 {
        match self {
            Message::Connect(m) => m.timestamp,
            Message::Vital(m) => m.timestamp,
            Message::Wave(m) => m.timestamp,
        }
    }
}

/// Admission broadcast announcing the monitor's data address.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectIndication {
    pub control_id: u32,
    pub timestamp: i64,
    pub admitted_date: Option<NaiveDate>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_class: Option<String>,
    pub ip: Option<String>,
    pub port: u16,
    pub admitted: bool,
}

/// Observation attributes carried by `OBX` segments, keyed by their code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VitalField {
    HeartRate,
    Pvc,
    RespRate,
    Temperature,
    Spo2,
    Co2,
    Systolic,
    Diastolic,
    Mean,
}

impl VitalField {
    pub const ALL: [VitalField; 9] = [
        VitalField::HeartRate,
        VitalField::Pvc,
        VitalField::RespRate,
        VitalField::Temperature,
        VitalField::Spo2,
        VitalField::Co2,
        VitalField::Systolic,
        VitalField::Diastolic,
        VitalField::Mean,
    ];

    /// Look up the attribute for an observation code.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            101 => VitalField::HeartRate,
            102 => VitalField::Pvc,
            151 => VitalField::RespRate,
            200 => VitalField::Temperature,
            160 => VitalField::Spo2,
            220 => VitalField::Co2,
            170 => VitalField::Systolic,
            171 => VitalField::Diastolic,
            172 => VitalField::Mean,
            _ => return None,
        })
    }
}

/// Periodic (`204`) or NIBP (`503`) vital-sign report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VitalSign {
    pub control_id: u32,
    pub timestamp: i64,
    pub hr: Option<String>,
    pub pvc: Option<String>,
    pub rr: Option<String>,
    pub temp: Option<String>,
    pub spo2: Option<String>,
    pub co2: Option<String>,
    pub sys: Option<String>,
    pub dia: Option<String>,
    pub mean: Option<String>,
}

impl VitalSign {
    pub fn get(&self, field: VitalField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: VitalField, value: String) {
        *self.slot_mut(field) = Some(value);
    }

    fn slot(&self, field: VitalField) -> &Option<String> {
        match field {
            VitalField::HeartRate => &self.hr,
            VitalField::Pvc => &self.pvc,
            VitalField::RespRate => &self.rr,
            VitalField::Temperature => &self.temp,
            VitalField::Spo2 => &self.spo2,
            VitalField::Co2 => &self.co2,
            VitalField::Systolic => &self.sys,
            VitalField::Diastolic => &self.dia,
            VitalField::Mean => &self.mean,
        }
    }

    fn slot_mut(&mut self, field: VitalField) -> &mut Option<String> {
        match field {
            VitalField::HeartRate => &mut self.hr,
            VitalField::Pvc => &mut self.pvc,
            VitalField::RespRate => &mut self.rr,
            VitalField::Temperature => &mut self.temp,
            VitalField::Spo2 => &mut self.spo2,
            VitalField::Co2 => &mut self.co2,
            VitalField::Systolic => &mut self.sys,
            VitalField::Diastolic => &mut self.dia,
            VitalField::Mean => &mut self.mean,
        }
    }

    /// No valid attribute and no usable timestamp.
    pub fn is_empty(&self) -> bool {
        self.timestamp <= 0 && !VitalField::ALL.iter().any(|&f| is_valid_value(self.get(f)))
    }

    /// Overwrite attributes with those of `other` that carry a valid reading.
    pub fn merge_from(&mut self, other: &VitalSign) {
        for field in VitalField::ALL {
            if let Some(v) = other.get(field)
                && is_valid_value(Some(v))
            {
                self.set(field, v.to_owned());
            }
        }
    }
}

/// Waveform report: raw samples per wave channel id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wave {
    pub control_id: u32,
    pub timestamp: i64,
    pub check_sum: i32,
    pub wave_id: i32,
    pub data_size: u8,
    pub sample_rate: i32,
    pub values: HashMap<i32, Vec<i32>>,
}

impl Wave {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
