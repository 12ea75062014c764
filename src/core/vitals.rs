//! Synthetic vitals generator.
//!
//! Every patient gets a [`SimulationState`] drawn once from its condition class.
//! Each sample perturbs the baselines with independent Gaussian noise
//! (standard deviation = variance / 2) plus a shared slow sinusoid, then clamps
//! every vital into its physiological interval.
//!
//! Patients are held as `Arc<PatientProfile>` snapshots. A regeneration builds a
//! complete new snapshot and swaps it in, so concurrent readers never observe a
//! half-updated record.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, instrument};

use crate::core::severity::classify;
use crate::models::patient::{RosterEntry, DEFAULT_ROSTER, DIAGNOSES, PHYSICIANS};
use crate::models::{
    BloodPressure, ConditionClass, PatientProfile, SimulationState, Trend, VitalParameters,
    VitalsSample,
};

pub const HEART_RATE_RANGE: (i32, i32) = (30, 180);
pub const SPO2_RANGE: (i32, i32) = (70, 100);
pub const SYSTOLIC_RANGE: (i32, i32) = (70, 220);
pub const DIASTOLIC_RANGE: (i32, i32) = (40, 130);
pub const TEMPERATURE_RANGE: (f64, f64) = (34.0, 42.0);
pub const RESPIRATORY_RANGE: (i32, i32) = (6, 40);

/// Diastolic is pushed this far under systolic when it would otherwise meet or exceed it.
const PULSE_PRESSURE_FLOOR: i32 = 20;

/// Period divisor of the shared sinusoid, in seconds.
const SWAY_PERIOD: f64 = 60.0;
const SWAY_SCALE: f64 = 0.3;

// Per-vital amplitude of the shared sinusoid.
const HR_SWAY: f64 = 5.0;
const SPO2_SWAY: f64 = 1.0;
const SYSTOLIC_SWAY: f64 = 4.0;
const DIASTOLIC_SWAY: f64 = 2.0;
const TEMPERATURE_SWAY: f64 = 0.1;
const RESPIRATORY_SWAY: f64 = 1.0;

pub struct VitalsSimulator {
    order: Vec<String>,
    patients: DashMap<String, Arc<PatientProfile>>,
    rng: Mutex<StdRng>,
}

impl VitalsSimulator {
    /// Simulator over the fixed ten-bed ICU roster.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_roster(DEFAULT_ROSTER, seed)
    }

    pub fn with_roster(roster: &[RosterEntry], seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let now = Utc::now();
        let admission_base = now - Duration::days(10);
        let patients = DashMap::with_capacity(roster.len());
        let mut order = Vec::with_capacity(roster.len());

        for entry in roster {
            let state = initial_state(entry.condition, &mut rng);
            let vitals = synthesize(&state, now, &mut rng);
            let severity = classify(&vitals);

            let profile = PatientProfile {
                id: entry.id.to_string(),
                name: entry.name.to_string(),
                bed_number: entry.bed.to_string(),
                age: entry.age,
                gender: entry.gender.to_string(),
                admission_date: admission_base + Duration::days(rng.gen_range(0..=10)),
                diagnosis: Some(pick(&mut rng, DIAGNOSES).to_string()),
                attending_physician: Some(pick(&mut rng, PHYSICIANS).to_string()),
                condition: entry.condition,
                state,
                vitals,
                severity,
            };

            order.push(profile.id.clone());
            patients.insert(profile.id.clone(), Arc::new(profile));
        }

        info!(patients = order.len(), "initialized patient roster");

        Self {
            order,
            patients,
            rng: Mutex::new(rng),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Replace the patient's current sample with a fresh one. `None` for unknown ids.
    #[instrument(level = "debug", skip(self))]
    pub fn regenerate(&self, patient_id: &str) -> Option<Arc<PatientProfile>> {
        let current = self.get_patient(patient_id)?;
        let vitals = self.with_rng(|rng| synthesize(&current.state, Utc::now(), rng));
        let severity = classify(&vitals);

        let updated = Arc::new(current.with_sample(vitals, severity));
        self.patients
            .insert(patient_id.to_string(), Arc::clone(&updated));
        debug!(severity = %severity, "regenerated vitals");
        Some(updated)
    }

    /// One evaluation cycle over the whole roster, in roster order.
    pub fn regenerate_all(&self) -> Vec<Arc<PatientProfile>> {
        self.order
            .iter()
            .filter_map(|id| self.regenerate(id))
            .collect()
    }

    pub fn get_patient(&self, patient_id: &str) -> Option<Arc<PatientProfile>> {
        self.patients
            .get(patient_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn all_patients(&self) -> Vec<Arc<PatientProfile>> {
        self.order
            .iter()
            .filter_map(|id| self.get_patient(id))
            .collect()
    }

    pub fn patient_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Synthesized history for the last `hours`, oldest first.
    pub fn history(&self, patient_id: &str, hours: u32) -> Option<Vec<VitalsSample>> {
        self.history_minutes(patient_id, hours.saturating_mul(60))
    }

    /// One sample per minute over the window, oldest first.
    ///
    /// Nothing is stored: every call replays the noise model from scratch, so two
    /// calls over the same window return different series.
    pub fn history_minutes(&self, patient_id: &str, minutes: u32) -> Option<Vec<VitalsSample>> {
        let patient = self.get_patient(patient_id)?;
        let now = Utc::now();

        let mut series = self.with_rng(|rng| {
            (0..minutes)
                .map(|i| {
                    let at = now - Duration::minutes(i64::from(i));
                    synthesize(&patient.state, at, rng)
                })
                .collect::<Vec<_>>()
        });
        series.reverse();
        Some(series)
    }
}

fn pick<T: Copy>(rng: &mut StdRng, options: &[T]) -> T {
    options[rng.gen_range(0..options.len())]
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Baselines for a condition class. Critical patients sit near the extremes.
pub fn initial_state(condition: ConditionClass, rng: &mut StdRng) -> SimulationState {
    match condition {
        ConditionClass::Critical => SimulationState {
            heart_rate: VitalParameters::new(pick(rng, &[45.0, 55.0, 115.0, 130.0]), 15.0),
            spo2: VitalParameters::new(f64::from(rng.gen_range(84..=90)), 4.0),
            systolic: VitalParameters::new(pick(rng, &[85.0, 175.0, 190.0]), 15.0),
            diastolic: VitalParameters::new(pick(rng, &[55.0, 100.0, 110.0]), 10.0),
            temperature: VitalParameters::new(pick(rng, &[35.5, 38.5, 39.5]), 0.5),
            respiratory_rate: VitalParameters::new(pick(rng, &[8.0, 10.0, 28.0, 32.0]), 4.0),
            trend: pick(rng, &[Trend::Declining, Trend::Unstable]),
        },
        ConditionClass::Moderate => SimulationState {
            heart_rate: VitalParameters::new(f64::from(rng.gen_range(85..=105)), 10.0),
            spo2: VitalParameters::new(f64::from(rng.gen_range(91..=94)), 3.0),
            systolic: VitalParameters::new(f64::from(rng.gen_range(135..=155)), 10.0),
            diastolic: VitalParameters::new(f64::from(rng.gen_range(85..=95)), 8.0),
            temperature: VitalParameters::new(round1(rng.gen_range(37.3..=38.2)), 0.3),
            respiratory_rate: VitalParameters::new(f64::from(rng.gen_range(20..=25)), 3.0),
            trend: Trend::Fluctuating,
        },
        ConditionClass::Stable => SimulationState {
            heart_rate: VitalParameters::new(f64::from(rng.gen_range(65..=85)), 8.0),
            spo2: VitalParameters::new(f64::from(rng.gen_range(96..=99)), 2.0),
            systolic: VitalParameters::new(f64::from(rng.gen_range(110..=130)), 8.0),
            diastolic: VitalParameters::new(f64::from(rng.gen_range(65..=80)), 5.0),
            temperature: VitalParameters::new(round1(rng.gen_range(36.4..=37.0)), 0.2),
            respiratory_rate: VitalParameters::new(f64::from(rng.gen_range(14..=18)), 2.0),
            trend: Trend::Stable,
        },
    }
}

fn noise(rng: &mut StdRng, variance: f64) -> f64 {
    Normal::new(0.0, variance / 2.0)
        .map(|normal| normal.sample(rng))
        .unwrap_or(0.0)
}

fn perturb(params: VitalParameters, sway: f64, rng: &mut StdRng) -> f64 {
    params.base + noise(rng, params.variance) + sway
}

fn clamp_int(value: f64, (lo, hi): (i32, i32)) -> i32 {
    // Truncate toward zero, then bound.
    (value as i32).clamp(lo, hi)
}

/// Draw one sample for `state` at instant `at`.
pub fn synthesize(state: &SimulationState, at: DateTime<Utc>, rng: &mut StdRng) -> VitalsSample {
    let seconds = at.timestamp_millis() as f64 / 1000.0;
    let time_factor = (seconds / SWAY_PERIOD).sin() * SWAY_SCALE;

    let heart_rate = clamp_int(perturb(state.heart_rate, time_factor * HR_SWAY, rng), HEART_RATE_RANGE);
    let spo2 = clamp_int(perturb(state.spo2, time_factor * SPO2_SWAY, rng), SPO2_RANGE);
    let systolic = clamp_int(perturb(state.systolic, time_factor * SYSTOLIC_SWAY, rng), SYSTOLIC_RANGE);
    let mut diastolic = clamp_int(perturb(state.diastolic, time_factor * DIASTOLIC_SWAY, rng), DIASTOLIC_RANGE);

    if diastolic >= systolic {
        diastolic = systolic - PULSE_PRESSURE_FLOOR;
    }

    let temperature = round1(perturb(state.temperature, time_factor * TEMPERATURE_SWAY, rng))
        .clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
    let respiratory_rate = clamp_int(
        perturb(state.respiratory_rate, time_factor * RESPIRATORY_SWAY, rng),
        RESPIRATORY_RANGE,
    );

    VitalsSample {
        heart_rate,
        spo2,
        blood_pressure: BloodPressure { systolic, diastolic },
        temperature,
        respiratory_rate,
        timestamp: at,
    }
}
