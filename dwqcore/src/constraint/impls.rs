use crate::constraint::{Constraints, NetworkRequirement, NetworkState, Signals};

impl NetworkRequirement {
    pub fn satisfied_by(&self, state: NetworkState) -> bool {
        match self {
            Self::NotRequired => true,
            Self::Connected => state >= NetworkState::Roaming,
            Self::Unmetered => state == NetworkState::Unmetered,
            Self::NotRoaming => state >= NetworkState::Metered,
            Self::Metered => matches!(state, NetworkState::Roaming | NetworkState::Metered),
        }
    }
}

impl Constraints {
    /// A constraint set is satisfied iff every required signal's
    /// current value is in the allowed subset.
    pub fn satisfied(&self, signals: &Signals) -> bool {
        self.network.satisfied_by(signals.network)
            && (!self.requires_charging || signals.charging)
            && (!self.requires_battery_not_low || !signals.battery_low)
            && (!self.requires_storage_not_low || !signals.storage_low)
            && (!self.requires_device_idle || signals.device_idle)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_constraints_always_satisfied() {
        let constraints = Constraints::default();
        assert!(constraints.is_empty());
        assert!(constraints.satisfied(&Signals::default()));
        assert!(constraints.satisfied(&Signals {
            network: NetworkState::Unmetered,
            battery_low: true,
            storage_low: true,
            .. Default::default()
        }));
    }

    #[test]
    fn network_requirements() {
        let offline = NetworkState::Offline;
        let roaming = NetworkState::Roaming;
        let metered = NetworkState::Metered;
        let unmetered = NetworkState::Unmetered;

        assert!(NetworkRequirement::NotRequired.satisfied_by(offline));

        assert!(!NetworkRequirement::Connected.satisfied_by(offline));
        assert!(NetworkRequirement::Connected.satisfied_by(roaming));
        assert!(NetworkRequirement::Connected.satisfied_by(unmetered));

        assert!(!NetworkRequirement::Unmetered.satisfied_by(metered));
        assert!(NetworkRequirement::Unmetered.satisfied_by(unmetered));

        assert!(!NetworkRequirement::NotRoaming.satisfied_by(roaming));
        assert!(NetworkRequirement::NotRoaming.satisfied_by(metered));
        assert!(NetworkRequirement::NotRoaming.satisfied_by(unmetered));

        assert!(NetworkRequirement::Metered.satisfied_by(roaming));
        assert!(NetworkRequirement::Metered.satisfied_by(metered));
        assert!(!NetworkRequirement::Metered.satisfied_by(unmetered));
        assert!(!NetworkRequirement::Metered.satisfied_by(offline));
    }

    #[test]
    fn charging_and_battery() {
        let constraints = Constraints {
            requires_charging: true,
            requires_battery_not_low: true,
            .. Default::default()
        };
        assert!(!constraints.satisfied(&Signals::default()));
        assert!(constraints.satisfied(&Signals {
            charging: true,
            .. Default::default()
        }));
        assert!(!constraints.satisfied(&Signals {
            charging: true,
            battery_low: true,
            .. Default::default()
        }));
    }

    #[test]
    fn idle_and_storage() {
        let constraints = Constraints {
            requires_storage_not_low: true,
            requires_device_idle: true,
            .. Default::default()
        };
        assert!(!constraints.satisfied(&Signals::default()));
        assert!(constraints.satisfied(&Signals {
            device_idle: true,
            .. Default::default()
        }));
        assert!(!constraints.satisfied(&Signals {
            device_idle: true,
            storage_low: true,
            .. Default::default()
        }));
    }
}
