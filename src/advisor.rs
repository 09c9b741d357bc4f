//! Recommendation engine
//!
//! Ranks crops for a soil sample and derives the fertilizer top-up for the
//! crop the user settles on. The classifier and the fertilizer table are
//! borrowed read-only; all mutable state lives in [`Session`].

use thiserror::Error;

use crate::classifier::{Classifier, ModelError};
use crate::models::{CropProbability, NutrientAmounts, Prescription, SoilSample};
use crate::table::FertilizerTable;

/// Number of crops offered after each recommendation
pub const SHORTLIST_SIZE: usize = 3;

/// Soil test has no nitrogen measurement, so the full dose is always due
pub const NITROGEN_CURRENT_LEVEL: f64 = 0.0;
/// Available phosphate (mg/kg) per kg/10a of P₂O₅ already in the soil
pub const PHOSPHATE_DIVISOR: f64 = 7.0;
/// Exchangeable potassium (cmol+/kg) per kg/10a of K₂O already in the soil
pub const POTASH_DIVISOR: f64 = 0.03;

#[derive(Debug, Error, PartialEq)]
pub enum AdvisorError {
    #[error("prediction failed: {0}")]
    Inference(#[from] ModelError),

    #[error("no standard prescription for crop '{0}'")]
    UnknownCrop(String),
}

/// Where a session stands. Submitting picks a default crop straight away,
/// so a shortlist never exists without a selection; the prescription is
/// derived from `CropSelected` on every render rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NoShortlist,
    CropSelected,
}

/// Per-user interaction state
#[derive(Debug, Clone, Default)]
pub struct Session {
    shortlist: Vec<String>,
    selected: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shortlist(&self) -> &[String] {
        &self.shortlist
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn stage(&self) -> Stage {
        if self.selected.is_some() {
            Stage::CropSelected
        } else {
            Stage::NoShortlist
        }
    }
}

pub struct Advisor<'a> {
    classifier: &'a dyn Classifier,
    table: &'a FertilizerTable,
}

impl<'a> Advisor<'a> {
    pub fn new(classifier: &'a dyn Classifier, table: &'a FertilizerTable) -> Self {
        Self { classifier, table }
    }

    /// Class probabilities for a sample, in the model's class order
    pub fn rank(&self, sample: &SoilSample) -> Result<Vec<CropProbability>, AdvisorError> {
        let classes = self.classifier.classes();
        let probs = self.classifier.predict_proba(sample)?;

        if probs.len() != classes.len() {
            return Err(ModelError::Shape(format!(
                "{} probabilities for {} classes",
                probs.len(),
                classes.len()
            ))
            .into());
        }
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::NonFinite("probability").into());
        }

        Ok(classes
            .iter()
            .zip(probs)
            .map(|(crop, probability)| CropProbability {
                crop: crop.clone(),
                probability,
            })
            .collect())
    }

    /// Rank crops for `sample` and replace the session's shortlist.
    ///
    /// On failure the session keeps whatever shortlist and selection it
    /// had before.
    pub fn recommend_crops<'s>(
        &self,
        session: &'s mut Session,
        sample: &SoilSample,
    ) -> Result<&'s [String], AdvisorError> {
        let mut ranked = self.rank(sample)?;

        // stable: equal probabilities keep the model's class order
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        ranked.truncate(SHORTLIST_SIZE);

        tracing::debug!(
            top = ?ranked.iter().map(|c| (c.crop.as_str(), c.probability)).collect::<Vec<_>>(),
            "ranked crops"
        );

        let mut shortlist: Vec<String> = ranked.into_iter().map(|c| c.crop).collect();
        shortlist.sort();

        session.selected = shortlist.first().cloned();
        session.shortlist = shortlist;

        tracing::info!(shortlist = ?session.shortlist, "recommended crops");
        Ok(&session.shortlist)
    }

    /// Make `crop` the session's selection. Returns false, leaving the
    /// session untouched, if it is not on the current shortlist.
    pub fn select_crop(&self, session: &mut Session, crop: &str) -> bool {
        if !session.shortlist.iter().any(|c| c == crop) {
            tracing::warn!(crop, shortlist = ?session.shortlist, "selection not on shortlist");
            return false;
        }
        session.selected = Some(crop.to_string());
        true
    }

    /// Standard prescription for `crop` and the top-up given the soil's
    /// available phosphate and potassium
    pub fn compute_prescription(
        &self,
        crop: &str,
        available_phosphate: f64,
        potassium: f64,
    ) -> Result<Prescription, AdvisorError> {
        let standard = *self
            .table
            .get(crop)
            .ok_or_else(|| AdvisorError::UnknownCrop(crop.to_string()))?;

        let current = current_levels(available_phosphate, potassium);
        let top_up = NutrientAmounts {
            nitrogen: (standard.nitrogen - current.nitrogen).max(0.0),
            phosphate: (standard.phosphate - current.phosphate).max(0.0),
            potash: (standard.potash - current.potash).max(0.0),
        };

        Ok(Prescription {
            crop: crop.to_string(),
            standard,
            current,
            top_up,
        })
    }
}

/// Estimated nutrient already supplied by the soil, in whole kg/10a
pub fn current_levels(available_phosphate: f64, potassium: f64) -> NutrientAmounts {
    NutrientAmounts {
        nitrogen: NITROGEN_CURRENT_LEVEL,
        phosphate: (available_phosphate / PHOSPHATE_DIVISOR).floor(),
        potash: (potassium / POTASH_DIVISOR).floor(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Drainage;
    use approx::assert_relative_eq;

    /// Returns fixed probabilities regardless of the sample
    struct FixedClassifier {
        classes: Vec<String>,
        probs: Vec<f64>,
    }

    impl FixedClassifier {
        fn new(pairs: &[(&str, f64)]) -> Self {
            Self {
                classes: pairs.iter().map(|(c, _)| c.to_string()).collect(),
                probs: pairs.iter().map(|(_, p)| *p).collect(),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn predict_proba(&self, _sample: &SoilSample) -> Result<Vec<f64>, ModelError> {
            Ok(self.probs.clone())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    struct BrokenClassifier {
        classes: Vec<String>,
    }

    impl Classifier for BrokenClassifier {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn predict_proba(&self, _sample: &SoilSample) -> Result<Vec<f64>, ModelError> {
            Err(ModelError::Shape("expected 9 columns, got 8".to_string()))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn scenario_sample() -> SoilSample {
        SoilSample {
            ph: 6.5,
            organic_matter: 20.0,
            cation_exchange_capacity: 0.5,
            calcium: 6.0,
            magnesium: 2.0,
            available_phosphate: 50.0,
            electrical_conductivity: 0.8,
            potassium: 0.3,
            drainage: Drainage::Moderate,
        }
    }

    fn potato_table() -> FertilizerTable {
        FertilizerTable::from_rows([(
            "Potato".to_string(),
            NutrientAmounts {
                nitrogen: 10.0,
                phosphate: 5.0,
                potash: 4.0,
            },
        )])
    }

    #[test]
    fn shortlist_is_top_three_sorted_alphabetically() {
        let model = FixedClassifier::new(&[
            ("Garlic", 0.0),
            ("Rice", 0.5),
            ("Onion", 0.0),
            ("Potato", 0.3),
            ("Soybean", 0.2),
        ]);
        let table = FertilizerTable::default();
        let advisor = Advisor::new(&model, &table);
        let mut session = Session::new();

        let shortlist = advisor
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap()
            .to_vec();

        assert_eq!(shortlist, ["Potato", "Rice", "Soybean"]);
        assert_eq!(session.selected(), Some("Potato"));
        assert_eq!(session.stage(), Stage::CropSelected);
    }

    #[test]
    fn submitting_moves_straight_to_crop_selected() {
        let model = FixedClassifier::new(&[("Rice", 0.6), ("Potato", 0.4)]);
        let table = FertilizerTable::default();
        let advisor = Advisor::new(&model, &table);
        let mut session = Session::new();
        assert_eq!(session.stage(), Stage::NoShortlist);

        advisor.recommend_crops(&mut session, &scenario_sample()).unwrap();
        assert_eq!(session.stage(), Stage::CropSelected);

        // reselecting stays in the same stage
        assert!(advisor.select_crop(&mut session, "Rice"));
        assert_eq!(session.stage(), Stage::CropSelected);
        assert_eq!(session.selected(), Some("Rice"));
    }

    #[test]
    fn fewer_classes_than_shortlist_size() {
        let model = FixedClassifier::new(&[("Soybean", 0.7), ("Maize", 0.3)]);
        let table = FertilizerTable::default();
        let advisor = Advisor::new(&model, &table);
        let mut session = Session::new();

        let shortlist = advisor
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap();
        assert_eq!(shortlist, ["Maize", "Soybean"]);
    }

    #[test]
    fn ties_keep_model_class_order() {
        let model = FixedClassifier::new(&[
            ("Wheat", 0.25),
            ("Barley", 0.25),
            ("Oat", 0.25),
            ("Alfalfa", 0.25),
        ]);
        let table = FertilizerTable::default();
        let advisor = Advisor::new(&model, &table);
        let mut session = Session::new();

        let shortlist = advisor
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap();
        // Alfalfa is last in class order, so it loses the tie
        assert_eq!(shortlist, ["Barley", "Oat", "Wheat"]);
        assert_eq!(session.selected(), Some("Barley"));
    }

    #[test]
    fn resubmitting_resets_selection() {
        let first = FixedClassifier::new(&[("Rice", 0.5), ("Potato", 0.3), ("Soybean", 0.2)]);
        let second = FixedClassifier::new(&[("Garlic", 0.6), ("Onion", 0.3), ("Rice", 0.1)]);
        let table = FertilizerTable::default();
        let mut session = Session::new();

        let advisor = Advisor::new(&first, &table);
        advisor
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap();
        assert!(advisor.select_crop(&mut session, "Soybean"));

        let advisor = Advisor::new(&second, &table);
        advisor
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap();
        assert_eq!(session.selected(), Some("Garlic"));
    }

    #[test]
    fn select_crop_outside_shortlist_is_refused() {
        let model = FixedClassifier::new(&[("Rice", 0.5), ("Potato", 0.3), ("Soybean", 0.2)]);
        let table = FertilizerTable::default();
        let advisor = Advisor::new(&model, &table);
        let mut session = Session::new();

        assert!(!advisor.select_crop(&mut session, "Rice"));
        assert_eq!(session.stage(), Stage::NoShortlist);

        advisor
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap();
        assert!(!advisor.select_crop(&mut session, "Barley"));
        assert_eq!(session.selected(), Some("Potato"));

        assert!(advisor.select_crop(&mut session, "Rice"));
        assert_eq!(session.selected(), Some("Rice"));
    }

    #[test]
    fn inference_failure_keeps_previous_shortlist() {
        let good = FixedClassifier::new(&[("Rice", 0.5), ("Potato", 0.3), ("Soybean", 0.2)]);
        let broken = BrokenClassifier {
            classes: good.classes.clone(),
        };
        let table = FertilizerTable::default();
        let mut session = Session::new();

        Advisor::new(&good, &table)
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap();
        Advisor::new(&good, &table).select_crop(&mut session, "Soybean");

        let err = Advisor::new(&broken, &table)
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Inference(ModelError::Shape(_))));
        assert_eq!(session.shortlist(), ["Potato", "Rice", "Soybean"]);
        assert_eq!(session.selected(), Some("Soybean"));
    }

    #[test]
    fn probability_count_mismatch_is_inference_error() {
        let mut model = FixedClassifier::new(&[("Rice", 0.5), ("Potato", 0.5)]);
        model.probs.pop();
        let table = FertilizerTable::default();
        let mut session = Session::new();

        let err = Advisor::new(&model, &table)
            .recommend_crops(&mut session, &scenario_sample())
            .unwrap_err();
        assert!(matches!(err, AdvisorError::Inference(_)));
        assert_eq!(session.stage(), Stage::NoShortlist);
    }

    #[test]
    fn potato_top_up() {
        let model = FixedClassifier::new(&[]);
        let table = potato_table();
        let advisor = Advisor::new(&model, &table);

        let rx = advisor.compute_prescription("Potato", 50.0, 0.3).unwrap();

        assert_eq!(rx.current.nitrogen, 0.0);
        assert_eq!(rx.current.phosphate, 7.0);
        assert_eq!(rx.current.potash, 10.0);
        assert_eq!(
            rx.top_up,
            NutrientAmounts {
                nitrogen: 10.0,
                phosphate: 0.0,
                potash: 0.0
            }
        );
        assert_eq!(rx.standard.nitrogen, 10.0);
    }

    #[test]
    fn low_soil_levels_leave_partial_top_up() {
        let model = FixedClassifier::new(&[]);
        let table = potato_table();
        let advisor = Advisor::new(&model, &table);

        // 20/7 floors to 2, 0.05/0.03 floors to 1
        let rx = advisor.compute_prescription("Potato", 20.0, 0.05).unwrap();
        assert_relative_eq!(rx.top_up.phosphate, 3.0);
        assert_relative_eq!(rx.top_up.potash, 3.0);
    }

    #[test]
    fn top_up_is_never_negative() {
        let model = FixedClassifier::new(&[]);
        let table = potato_table();
        let advisor = Advisor::new(&model, &table);

        for p in [0.0, 1.0, 6.9, 7.0, 35.0, 500.0, 10_000.0] {
            for k in [0.0, 0.01, 0.03, 0.12, 0.3, 5.0] {
                let rx = advisor.compute_prescription("Potato", p, k).unwrap();
                assert!(rx.top_up.nitrogen >= 0.0);
                assert!(rx.top_up.phosphate >= 0.0);
                assert!(rx.top_up.potash >= 0.0);
            }
        }
    }

    #[test]
    fn prescription_is_idempotent() {
        let model = FixedClassifier::new(&[]);
        let table = potato_table();
        let advisor = Advisor::new(&model, &table);

        let first = advisor.compute_prescription("Potato", 42.0, 0.2);
        let second = advisor.compute_prescription("Potato", 42.0, 0.2);
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_crop_is_reported() {
        let model = FixedClassifier::new(&[]);
        let table = potato_table();
        let advisor = Advisor::new(&model, &table);

        assert_eq!(
            advisor.compute_prescription("Barley", 50.0, 0.3),
            Err(AdvisorError::UnknownCrop("Barley".to_string()))
        );
    }
}
