//! Telemetry Line Decoding
//!
//! Turns one tab-separated ASCII record into a typed sample and appends it to
//! a channel store in lock-step.

use crate::error::MalformedRecord;
use crate::layout::{FieldRole, FrameLayout};
use ring_buffer::{ChannelStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How derived power treats negative `I·V` products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    /// `max(0, I·V/1000)`, sensor noise near zero load never yields negative power
    #[default]
    Clamped,
    /// `I·V/1000` as computed, as some single-turbine firmware hosts did
    Raw,
}

/// Compute power [mW] from current [mA] and voltage [mV]
pub fn power_mw(current_ma: f64, voltage_mv: f64, mode: PowerMode) -> f64 {
    let power = current_ma * voltage_mv / 1e3;
    match mode {
        PowerMode::Clamped => power.max(0.0),
        PowerMode::Raw => power,
    }
}

/// Readings of one turbine within a sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TurbineReading {
    /// Current [mA]
    pub current_ma: f64,
    /// Bus voltage [mV]
    pub voltage_mv: f64,
    /// Shunt voltage [mV], only on layouts that carry it
    pub shunt_voltage_mv: Option<f64>,
    /// Accumulated energy [J]
    pub energy_j: f64,
    /// Derived power [mW]
    pub power_mw: f64,
}

/// One decoded record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecodedSample {
    /// Device time [s]
    pub timestamp_s: f64,
    /// Per-turbine readings, turbine 1 first
    pub turbines: Vec<TurbineReading>,
}

impl DecodedSample {
    /// Flatten into store row order (see [`FrameLayout::channel_names`])
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(1 + self.turbines.len() * 5);
        row.push(self.timestamp_s);
        for t in &self.turbines {
            row.push(t.current_ma);
            row.push(t.voltage_mv);
            if let Some(shunt) = t.shunt_voltage_mv {
                row.push(shunt);
            }
            row.push(t.energy_j);
            row.push(t.power_mw);
        }
        row
    }
}

/// Errors from [`LineDecoder::decode_into`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The line itself was rejected
    #[error(transparent)]
    Malformed(#[from] MalformedRecord),

    /// The target store was not built for this layout
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stateless decoder for one fixed frame layout
#[derive(Debug, Clone)]
pub struct LineDecoder {
    layout: FrameLayout,
    power_mode: PowerMode,
}

impl LineDecoder {
    /// Create a decoder with clamped power
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            power_mode: PowerMode::default(),
        }
    }

    /// Select the power computation
    pub fn with_power_mode(mut self, power_mode: PowerMode) -> Self {
        self.power_mode = power_mode;
        self
    }

    /// Get the frame layout
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Get the power computation
    pub fn power_mode(&self) -> PowerMode {
        self.power_mode
    }

    /// Create an empty store whose channels match this layout
    pub fn new_store(&self, capacity: usize) -> Result<ChannelStore, StoreError> {
        ChannelStore::new(self.layout.channel_names(), capacity)
    }

    /// Decode a line without touching any store
    ///
    /// Field count is checked before any field is parsed. The microsecond
    /// field is not range-checked; out-of-range remainders are kept as sent.
    pub fn decode(&self, line: &str) -> Result<DecodedSample, MalformedRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split('\t').collect();

        let expected = self.layout.field_count();
        if fields.len() != expected {
            return Err(MalformedRecord::FieldCountMismatch {
                expected,
                actual: fields.len(),
            });
        }

        let mut time_ms = 0i64;
        let mut time_us = 0i64;
        let mut turbines = vec![TurbineReading::default(); self.layout.turbines()];

        for (index, (role, raw)) in self.layout.roles().iter().zip(&fields).enumerate() {
            let raw = raw.trim();
            let bad_field = || MalformedRecord::NumericParseError {
                index,
                value: raw.to_string(),
            };

            if role.is_integer() {
                let value: i64 = raw.parse().map_err(|_| bad_field())?;
                match role {
                    FieldRole::TimeMillis => time_ms = value,
                    _ => time_us = value,
                }
                continue;
            }

            let value: f64 = raw.parse().map_err(|_| bad_field())?;
            match *role {
                FieldRole::Current(k) => turbines[k - 1].current_ma = value,
                FieldRole::Voltage(k) => turbines[k - 1].voltage_mv = value,
                FieldRole::ShuntVoltage(k) => turbines[k - 1].shunt_voltage_mv = Some(value),
                FieldRole::Energy(k) => turbines[k - 1].energy_j = value,
                FieldRole::TimeMillis | FieldRole::TimeMicros => {}
            }
        }

        for t in &mut turbines {
            t.power_mw = power_mw(t.current_ma, t.voltage_mv, self.power_mode);
        }

        Ok(DecodedSample {
            timestamp_s: time_ms as f64 / 1e3 + time_us as f64 / 1e6,
            turbines,
        })
    }

    /// Decode a line and append it to every channel of `store`
    ///
    /// Nothing is appended when the line is rejected.
    pub fn decode_into(
        &self,
        line: &str,
        store: &mut ChannelStore,
    ) -> Result<DecodedSample, DecodeError> {
        let sample = self.decode(line)?;
        store.append_row(&sample.to_row())?;
        Ok(sample)
    }
}
