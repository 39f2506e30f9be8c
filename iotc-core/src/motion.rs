//! Schnittstelle für Bewegungssensoren (Beschleunigungssensor)
//!
//! Nur der Datenvertrag; ein Treiber ist nicht Teil der Demo.

/// Lage des Boards
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OrientationState {
    /// Ausgangszustand
    #[default]
    NotKnown,
    Normal,
    UpsideDown,
    OnSide,
}

/// Beschleunigung in m/s²
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccelerationData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionData {
    pub orientation: OrientationState,
    pub acceleration: AccelerationData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionError {
    NotInitialized,
    BusError,
}

/// Trait für Beschleunigungssensoren
pub trait Accelerometer {
    fn init(&mut self) -> Result<(), MotionError>;

    fn read(&mut self) -> Result<MotionData, MotionError>;
}
