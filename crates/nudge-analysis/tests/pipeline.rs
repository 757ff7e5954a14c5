//! End-to-end properties of the analysis pipeline on simulated data.

use std::collections::BTreeSet;

use nudge_analysis::{
    cohort::CohortAnalysis,
    config::AnalysisConfig,
    emmeans::RiskLabel,
    equivalence::{Sesoi, tost},
    pipeline,
    prediction::{CrossCheckError, cross_check},
};
use nudge_data::{
    AnalysisSubset, CohortKind, FactorLevel as _, RiskCategory, TreatmentArm,
    simulate::{SimulationParams, derive_post_stake, simulate_seeded},
};
use nudge_model::LinearEstimate;

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
}

/// Post-stake derivation against fixed fixtures.
#[test]
fn derivation_matches_fixtures() {
    let fixtures = [
        (TreatmentArm::NoFeedback, RiskCategory::HighRisk, 100.0, 120.0, 100.0),
        (TreatmentArm::NoFeedback, RiskCategory::NoRisk, 37.5, 80.0, 37.5),
        (TreatmentArm::Feedback, RiskCategory::NoRisk, 100.0, 120.0, 99.0),
        (TreatmentArm::Feedback, RiskCategory::LowRisk, 100.0, 120.0, 114.0),
        (TreatmentArm::Feedback, RiskCategory::ModerateRisk, 100.0, 120.0, 108.0),
        (TreatmentArm::Feedback, RiskCategory::HighRisk, 100.0, 120.0, 102.0),
    ];
    for (treatment, risk, pre, drawn, expected) in fixtures {
        let post = derive_post_stake(treatment, risk, pre, drawn);
        assert!(
            close(post, expected, 1e-12),
            "{treatment} / {risk}: expected {expected}, got {post}"
        );
    }
}

/// The two cohorts are disjoint and together cover the dataset.
#[test]
fn cohorts_partition_dataset() {
    for seed in [1, 123, 2024] {
        let dataset = simulate_seeded(seed, SimulationParams::default()).unwrap();
        let (at_risk, no_risk) = AnalysisSubset::split_all(&dataset).unwrap();
        let a = at_risk.observations().iter().map(|o| o.id).collect::<BTreeSet<_>>();
        let b = no_risk.observations().iter().map(|o| o.id).collect::<BTreeSet<_>>();
        assert!(a.is_disjoint(&b));
        assert_eq!(a.len() + b.len(), dataset.len());
    }
}

/// Marginal means and full-grid prediction aggregates agree for both cohorts.
#[test]
fn marginal_means_agree_with_prediction_grid() {
    let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
    for kind in CohortKind::ALL {
        let mut analysis = CohortAnalysis::new(AnalysisSubset::split(&dataset, kind).unwrap());
        analysis.fit().unwrap();
        let means = analysis.marginal_means(0.95).unwrap();
        let predictions = analysis.verify_predictions(0.95, 1e-6).unwrap();
        for mean in &means {
            let aggregate = predictions
                .aggregates
                .iter()
                .find(|a| a.treatment == mean.treatment && a.risk == mean.risk)
                .unwrap();
            assert!(close(mean.estimate, aggregate.estimate, 1e-6), "{mean:?} vs {aggregate:?}");
        }
    }
}

/// The no-risk table carries `All` rows for both arms and the cross-check
/// compares them against the prediction grid.
#[test]
fn no_risk_aggregate_rows_are_cross_checked() {
    let config = AnalysisConfig::default();
    let dataset = pipeline::simulate_dataset(&config).unwrap();
    let report = pipeline::run(&config, &dataset).unwrap();

    let cohort = report.cohort(CohortKind::NoRisk).unwrap();
    for treatment in TreatmentArm::ALL {
        let all = report
            .marginal_mean(CohortKind::NoRisk, *treatment, RiskLabel::All)
            .unwrap();
        let cell = report
            .marginal_mean(
                CohortKind::NoRisk,
                *treatment,
                RiskLabel::Category(RiskCategory::NoRisk),
            )
            .unwrap();
        assert!(close(all.estimate, cell.estimate, 1e-9));
    }

    let mut analysis =
        CohortAnalysis::new(AnalysisSubset::split(&dataset, CohortKind::NoRisk).unwrap());
    analysis.fit().unwrap();
    let predictions = analysis.verify_predictions(0.95, 1e-6).unwrap();
    assert!(predictions.aggregates.iter().any(|a| a.risk == RiskLabel::All));

    let mut shifted = cohort.marginal_means.clone();
    let row = shifted
        .iter_mut()
        .find(|m| m.treatment == TreatmentArm::Feedback && m.risk == RiskLabel::All)
        .unwrap();
    row.estimate += 1.0;
    let err = cross_check(&shifted, &predictions.aggregates, 1e-6).unwrap_err();
    assert!(matches!(
        err,
        CrossCheckError::Mismatch {
            treatment: TreatmentArm::Feedback,
            risk: RiskLabel::All,
            ..
        }
    ));
}

/// Widening the equivalence bounds never turns a pass into a fail.
#[test]
fn widening_sesoi_is_monotonic() {
    let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
    let mut analysis =
        CohortAnalysis::new(AnalysisSubset::split(&dataset, CohortKind::NoRisk).unwrap());
    analysis.fit().unwrap();

    let mut passed = false;
    for step in 1..=40 {
        let bound = 0.25 * f64::from(step);
        let result = analysis.equivalence(Sesoi::symmetric(bound), 0.10).unwrap();
        assert!(!passed || result.equivalent, "bound {bound} lost equivalence");
        passed = result.equivalent;
    }
    assert!(passed);

    // asymmetric widening of a noisy estimate
    let estimate = LinearEstimate {
        estimate: 2.0,
        std_error: 1.5,
        df: 40.0,
    };
    let mut passed = false;
    for step in 1..=30 {
        let widen = 0.5 * f64::from(step);
        let sesoi = Sesoi {
            lower: -1.0 - widen,
            upper: 1.0 + 2.0 * widen,
        };
        let result = tost("effect", &estimate, sesoi, 0.05).unwrap();
        assert!(!passed || result.equivalent);
        passed = result.equivalent;
    }
}

/// Re-levelling the risk factor changes raw coefficients but not the marginal means.
#[test]
fn releveling_preserves_marginal_means() {
    let dataset = simulate_seeded(123, SimulationParams::default()).unwrap();
    let subset = AnalysisSubset::split(&dataset, CohortKind::AtRisk).unwrap();
    let releveled = subset.with_risk_reference(RiskCategory::HighRisk).unwrap();

    let mut original = CohortAnalysis::new(subset);
    original.fit().unwrap();
    let mut other = CohortAnalysis::new(releveled);
    other.fit().unwrap();

    let a = original.marginal_means(0.95).unwrap();
    let b = other.marginal_means(0.95).unwrap();
    assert_eq!(a.len(), b.len());
    for mean in &a {
        let matching = b
            .iter()
            .find(|m| m.treatment == mean.treatment && m.risk == mean.risk)
            .unwrap();
        assert!(close(mean.estimate, matching.estimate, 1e-6), "{mean:?} vs {matching:?}");
        assert!(close(mean.std_error, matching.std_error, 1e-4), "{mean:?} vs {matching:?}");
    }

    // the treatment coefficient is the arm difference at the reference risk level
    let treatment_effect = |analysis: &CohortAnalysis| {
        let table = analysis.coefficients(0.95).unwrap();
        assert_eq!(table[1].term, "treatmentFeedback");
        table[1].estimate
    };
    assert!((treatment_effect(&original) - treatment_effect(&other)).abs() > 1e-3);
}

/// Seed 123, N = 300: feedback lowers the aggregate at-risk stake.
#[test]
fn feedback_lowers_aggregate_at_risk_stake() {
    let config = AnalysisConfig::default();
    assert_eq!((config.seed, config.simulation.sample_size), (123, 300));
    let dataset = pipeline::simulate_dataset(&config).unwrap();
    let report = pipeline::run(&config, &dataset).unwrap();

    let mean = |treatment| {
        report
            .marginal_mean(CohortKind::AtRisk, treatment, RiskLabel::All)
            .unwrap()
            .estimate
    };
    assert!(mean(TreatmentArm::Feedback) < mean(TreatmentArm::NoFeedback));

    let all = report
        .cohort(CohortKind::AtRisk)
        .unwrap()
        .contrasts
        .pairwise(RiskLabel::All)
        .unwrap();
    assert!(all.estimate < 0.0);
    assert!(report.equivalence.equivalent);
}
