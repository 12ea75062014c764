//! Severity classification of a vitals snapshot.
//!
//! Each vital falls into at most one band: critical, warning, or neither. The
//! tier is a priority-ordered decision over the band counts, not a score:
//! any critical crossing wins, then two or more warnings, then exactly one.

use crate::models::{SeverityTier, VitalsSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Normal,
    Warning,
    Critical,
}

fn heart_rate_band(hr: i32) -> Band {
    if !(40..=150).contains(&hr) {
        Band::Critical
    } else if !(50..=120).contains(&hr) {
        Band::Warning
    } else {
        Band::Normal
    }
}

fn spo2_band(spo2: i32) -> Band {
    if spo2 < 88 {
        Band::Critical
    } else if spo2 < 92 {
        Band::Warning
    } else {
        Band::Normal
    }
}

fn systolic_band(systolic: i32) -> Band {
    if !(80..=180).contains(&systolic) {
        Band::Critical
    } else if !(90..=140).contains(&systolic) {
        Band::Warning
    } else {
        Band::Normal
    }
}

fn temperature_band(temperature: f64) -> Band {
    if temperature > 39.0 || temperature < 35.0 {
        Band::Critical
    } else if temperature > 38.0 {
        Band::Warning
    } else {
        Band::Normal
    }
}

fn respiratory_band(resp: i32) -> Band {
    if !(8..=30).contains(&resp) {
        Band::Critical
    } else if !(10..=24).contains(&resp) {
        Band::Warning
    } else {
        Band::Normal
    }
}

/// Pure function of the snapshot; the timestamp is ignored.
pub fn classify(vitals: &VitalsSample) -> SeverityTier {
    let bands = [
        heart_rate_band(vitals.heart_rate),
        spo2_band(vitals.spo2),
        systolic_band(vitals.blood_pressure.systolic),
        temperature_band(vitals.temperature),
        respiratory_band(vitals.respiratory_rate),
    ];

    let critical = bands.iter().filter(|b| **b == Band::Critical).count();
    let warning = bands.iter().filter(|b| **b == Band::Warning).count();

    if critical > 0 {
        SeverityTier::Critical
    } else if warning >= 2 {
        SeverityTier::Warning
    } else if warning == 1 {
        SeverityTier::Info
    } else {
        SeverityTier::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BloodPressure;
    use chrono::Utc;
    use test_case::test_case;

    fn sample(hr: i32, spo2: i32, sys: i32, temp: f64, resp: i32) -> VitalsSample {
        VitalsSample {
            heart_rate: hr,
            spo2,
            blood_pressure: BloodPressure { systolic: sys, diastolic: sys - 40 },
            temperature: temp,
            respiratory_rate: resp,
            timestamp: Utc::now(),
        }
    }

    #[test_case(75, 98, 118, 36.8, 15 => SeverityTier::Normal ; "all normal")]
    #[test_case(125, 98, 118, 36.8, 15 => SeverityTier::Info ; "one warning is info")]
    #[test_case(125, 90, 118, 36.8, 15 => SeverityTier::Warning ; "two warnings")]
    #[test_case(125, 90, 150, 38.5, 26 => SeverityTier::Warning ; "many warnings stay warning")]
    #[test_case(155, 98, 118, 36.8, 15 => SeverityTier::Critical ; "tachycardia critical")]
    #[test_case(75, 98, 118, 34.5, 15 => SeverityTier::Critical ; "hypothermia critical")]
    #[test_case(75, 98, 75, 36.8, 15 => SeverityTier::Critical ; "hypotension critical")]
    #[test_case(75, 87, 118, 36.8, 15 => SeverityTier::Critical ; "hypoxia critical")]
    #[test_case(75, 98, 118, 36.8, 7 => SeverityTier::Critical ; "bradypnea critical")]
    fn classification_table(hr: i32, spo2: i32, sys: i32, temp: f64, resp: i32) -> SeverityTier {
        classify(&sample(hr, spo2, sys, temp, resp))
    }

    #[test]
    fn boundaries_are_exclusive() {
        // Exactly on a boundary does not cross it.
        assert_eq!(classify(&sample(150, 92, 180, 39.0, 30)), SeverityTier::Warning);
        assert_eq!(classify(&sample(120, 92, 140, 38.0, 24)), SeverityTier::Normal);
    }

    #[test]
    fn same_snapshot_same_tier() {
        let snapshot = sample(118, 91, 145, 38.2, 22);
        let first = classify(&snapshot);
        for _ in 0..10 {
            assert_eq!(classify(&snapshot), first);
        }
    }

    #[test]
    fn low_temperature_warning_band_does_not_exist() {
        // 35.2 is above the critical floor and there is no low warning band.
        assert_eq!(classify(&sample(75, 98, 118, 35.2, 15)), SeverityTier::Normal);
    }
}
