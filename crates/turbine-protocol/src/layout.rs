//! Telemetry Frame Layouts

use serde::{Deserialize, Serialize};

/// Known device firmwares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceVariant {
    /// Wind farm board, six turbines as (I, V, E) triples
    WindFarm,
    /// Three turbines as (I, V, E) triples
    TripleTurbine,
    /// One turbine with an extra shunt-voltage field
    #[default]
    SingleTurbine,
}

impl DeviceVariant {
    /// Get the frame layout broadcast by this firmware
    pub fn layout(&self) -> FrameLayout {
        match self {
            DeviceVariant::WindFarm => FrameLayout::triples(6),
            DeviceVariant::TripleTurbine => FrameLayout::triples(3),
            DeviceVariant::SingleTurbine => FrameLayout::single_with_shunt(),
        }
    }

    /// Identity string the firmware reports
    pub fn identity(&self) -> &'static str {
        match self {
            DeviceVariant::WindFarm => "Wind Farm",
            DeviceVariant::TripleTurbine | DeviceVariant::SingleTurbine => "Wind Turbine",
        }
    }
}

/// Meaning of one tab-separated field; turbine indices are 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    /// Device clock, integer milliseconds
    TimeMillis,
    /// Sub-millisecond remainder, integer microseconds
    TimeMicros,
    /// Current [mA]
    Current(usize),
    /// Bus voltage [mV]
    Voltage(usize),
    /// Shunt voltage [mV]
    ShuntVoltage(usize),
    /// Accumulated energy [J]
    Energy(usize),
}

impl FieldRole {
    /// Whether the field must parse as an integer
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldRole::TimeMillis | FieldRole::TimeMicros)
    }
}

/// Fixed field layout of one telemetry record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    roles: Vec<FieldRole>,
    turbines: usize,
    shunt: bool,
}

impl FrameLayout {
    /// `[time_ms, time_us, (I, V, E) × turbines]`
    ///
    /// # Panics
    /// Panics if `turbines` is zero.
    pub fn triples(turbines: usize) -> Self {
        assert!(turbines > 0, "A frame layout needs at least one turbine");
        let mut roles = vec![FieldRole::TimeMillis, FieldRole::TimeMicros];
        for k in 1..=turbines {
            roles.extend([FieldRole::Current(k), FieldRole::Voltage(k), FieldRole::Energy(k)]);
        }
        Self {
            roles,
            turbines,
            shunt: false,
        }
    }

    /// `[time_ms, time_us, I, V, V_shunt, E]`
    pub fn single_with_shunt() -> Self {
        Self {
            roles: vec![
                FieldRole::TimeMillis,
                FieldRole::TimeMicros,
                FieldRole::Current(1),
                FieldRole::Voltage(1),
                FieldRole::ShuntVoltage(1),
                FieldRole::Energy(1),
            ],
            turbines: 1,
            shunt: true,
        }
    }

    /// Field roles in wire order
    pub fn roles(&self) -> &[FieldRole] {
        &self.roles
    }

    /// Number of tab-separated fields per record
    pub fn field_count(&self) -> usize {
        self.roles.len()
    }

    /// Number of turbines per record
    pub fn turbines(&self) -> usize {
        self.turbines
    }

    /// Whether records carry a shunt-voltage field
    pub fn has_shunt(&self) -> bool {
        self.shunt
    }

    /// Store channel names: `time`, then per turbine `I_k V_k [V_shunt_k] E_k P_k`
    pub fn channel_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.channel_count());
        names.push("time".to_string());
        for k in 1..=self.turbines {
            names.push(format!("I_{k}"));
            names.push(format!("V_{k}"));
            if self.shunt {
                names.push(format!("V_shunt_{k}"));
            }
            names.push(format!("E_{k}"));
            names.push(format!("P_{k}"));
        }
        names
    }

    /// Number of store channels, including time and derived power
    pub fn channel_count(&self) -> usize {
        let per_turbine = if self.shunt { 5 } else { 4 };
        1 + self.turbines * per_turbine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_field_counts() {
        assert_eq!(DeviceVariant::WindFarm.layout().field_count(), 20);
        assert_eq!(DeviceVariant::TripleTurbine.layout().field_count(), 11);
        assert_eq!(DeviceVariant::SingleTurbine.layout().field_count(), 6);
    }

    #[test]
    fn test_triple_roles() {
        let layout = FrameLayout::triples(2);
        assert_eq!(
            layout.roles(),
            &[
                FieldRole::TimeMillis,
                FieldRole::TimeMicros,
                FieldRole::Current(1),
                FieldRole::Voltage(1),
                FieldRole::Energy(1),
                FieldRole::Current(2),
                FieldRole::Voltage(2),
                FieldRole::Energy(2),
            ]
        );
    }

    #[test]
    fn test_channel_names() {
        let single = FrameLayout::single_with_shunt();
        assert_eq!(
            single.channel_names(),
            vec!["time", "I_1", "V_1", "V_shunt_1", "E_1", "P_1"]
        );
        assert_eq!(single.channel_count(), 6);

        let farm = DeviceVariant::WindFarm.layout();
        assert_eq!(farm.channel_names().len(), farm.channel_count());
        assert_eq!(farm.channel_count(), 25);
    }
}
