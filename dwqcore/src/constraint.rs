use serde::{Deserialize, Serialize};

/// The network condition a piece of work requires before it may run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum NetworkRequirement {
    #[default]
    NotRequired,
    /// Any usable connection.
    Connected,
    /// An unmetered connection.
    Unmetered,
    /// A connection that is not roaming.
    NotRoaming,
    /// A metered connection.
    Metered,
}

/// The observed network state, ordered from least to most capable so
/// requirement checks reduce to simple comparisons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum NetworkState {
    #[default]
    Offline,
    /// Connected, metered, roaming.
    Roaming,
    /// Connected, metered, not roaming.
    Metered,
    /// Connected, unmetered.
    Unmetered,
}

/// The set of device conditions required before dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Constraints {
    pub network: NetworkRequirement,
    pub requires_charging: bool,
    pub requires_battery_not_low: bool,
    pub requires_storage_not_low: bool,
    pub requires_device_idle: bool,
}

/// A snapshot of the device signals the monitor tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signals {
    pub network: NetworkState,
    pub charging: bool,
    pub battery_low: bool,
    pub storage_low: bool,
    pub device_idle: bool,
}

mod impls;
