//! Composite z-score to tiered alert level.
//!
//! Level 0: normal        (composite_z < gentle)
//! Level 1: gentle check  (gentle <= composite_z < serious)
//! Level 2: serious       (serious <= composite_z < emergency)
//! Level 3: emergency     (composite_z >= emergency)

use crate::config::AlertsConfig;

/// Map a composite risk score onto an alert tier.
pub fn alert_level(composite_z: f64, alerts: &AlertsConfig) -> i64 {
    if composite_z >= alerts.z_threshold_emergency {
        3
    } else if composite_z >= alerts.z_threshold_serious {
        2
    } else if composite_z >= alerts.z_threshold_gentle {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_inclusive_on_the_left() {
        let alerts = AlertsConfig::default();
        assert_eq!(alert_level(0.0, &alerts), 0);
        assert_eq!(alert_level(1.99, &alerts), 0);
        assert_eq!(alert_level(2.0, &alerts), 1);
        assert_eq!(alert_level(2.99, &alerts), 1);
        assert_eq!(alert_level(3.0, &alerts), 2);
        assert_eq!(alert_level(3.99, &alerts), 2);
        assert_eq!(alert_level(4.0, &alerts), 3);
        assert_eq!(alert_level(12.0, &alerts), 3);
    }

    #[test]
    fn level_is_monotone_in_composite_z() {
        let alerts = AlertsConfig::default();
        let mut previous = 0;
        for step in 0..100 {
            let z = f64::from(step) * 0.1;
            let level = alert_level(z, &alerts);
            assert!(level >= previous, "level dropped at z = {z}");
            previous = level;
        }
    }
}
