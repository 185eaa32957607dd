use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// Physical units as exponents of
/// `[mass length time temperature moles current luminous-intensity]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionSet(pub [f64; 7]);

impl DimensionSet {
    pub const MASS: usize = 0;
    pub const LENGTH: usize = 1;
    pub const TIME: usize = 2;
    pub const TEMPERATURE: usize = 3;

    pub const fn new(
        mass: f64,
        length: f64,
        time: f64,
        temperature: f64,
        moles: f64,
        current: f64,
        luminous_intensity: f64,
    ) -> Self {
        DimensionSet([
            mass,
            length,
            time,
            temperature,
            moles,
            current,
            luminous_intensity,
        ])
    }

    pub const fn dimensionless() -> Self {
        DimensionSet([0.0; 7])
    }

    pub const fn volume() -> Self {
        Self::new(0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub const fn pressure() -> Self {
        Self::new(1.0, -1.0, -2.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub const fn kinematic_pressure() -> Self {
        Self::new(0.0, 2.0, -2.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub const fn temperature() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0)
    }

    pub const fn velocity() -> Self {
        Self::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn dimensionless_check(&self) -> bool {
        self.0.iter().all(|e| e.abs() < 1e-10)
    }
}

impl Mul for DimensionSet {
    type Output = DimensionSet;

    fn mul(self, rhs: DimensionSet) -> DimensionSet {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o += r;
        }
        DimensionSet(out)
    }
}

impl Div for DimensionSet {
    type Output = DimensionSet;

    fn div(self, rhs: DimensionSet) -> DimensionSet {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o -= r;
        }
        DimensionSet(out)
    }
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| format!("{}", e)).collect();
        write!(f, "[{}]", parts.join(" "))
    }
}
