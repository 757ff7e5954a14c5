//! SVG figure of the estimated marginal means
//!
//! Two panels share one y axis: the at-risk cohort (the `All` aggregate
//! followed by each risk category) and the no-risk cohort with its
//! equivalence band. Points are marginal means with confidence-interval
//! whiskers, coloured by treatment arm.

use std::fmt::Write as _;

use anyhow::Context;
use nudge_analysis::{
    emmeans::{MarginalMean, RiskLabel},
    equivalence::Sesoi,
};
use nudge_data::{RiskCategory, TreatmentArm};

const WIDTH: f64 = 900.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 60.0;
const PANEL_GAP: f64 = 12.0;
const DODGE: f64 = 12.0;
const Y_TICKS: usize = 5;

const AT_RISK_SLOTS: [RiskLabel; 4] = [
    RiskLabel::All,
    RiskLabel::Category(RiskCategory::LowRisk),
    RiskLabel::Category(RiskCategory::ModerateRisk),
    RiskLabel::Category(RiskCategory::HighRisk),
];

fn arm_colour(arm: TreatmentArm) -> &'static str {
    match arm {
        TreatmentArm::NoFeedback => "#1f77b4",
        TreatmentArm::Feedback => "#d62728",
    }
}

fn arm_offset(arm: TreatmentArm) -> f64 {
    match arm {
        TreatmentArm::NoFeedback => -DODGE,
        TreatmentArm::Feedback => DODGE,
    }
}

/// Horizontal extent of a panel in pixels.
#[derive(Debug, Clone, Copy)]
struct Panel {
    left: f64,
    width: f64,
    slots: usize,
}

impl Panel {
    fn slot_centre(self, index: usize) -> f64 {
        let slot_width = self.width / self.slots as f64;
        self.left + slot_width * (index as f64 + 0.5)
    }

    fn right(self) -> f64 {
        self.left + self.width
    }
}

/// Linear map from stake values to pixel rows.
#[derive(Debug, Clone, Copy)]
struct YScale {
    min: f64,
    max: f64,
}

impl YScale {
    fn spanning(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            return None;
        }
        let pad = ((max - min) * 0.08).max(1.0);
        Some(Self {
            min: min - pad,
            max: max + pad,
        })
    }

    fn to_px(self, value: f64) -> f64 {
        let plot_height = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        MARGIN_TOP + (self.max - value) / (self.max - self.min) * plot_height
    }

    fn ticks(self) -> impl Iterator<Item = f64> {
        let step = (self.max - self.min) / Y_TICKS as f64;
        (0..=Y_TICKS).map(move |i| self.min + step * i as f64)
    }
}

/// Renders the two-panel estimate figure.
///
/// `no_risk` must contain the `No Feedback` mean, which anchors the
/// equivalence band at `estimate + sesoi.lower ..= estimate + sesoi.upper`.
pub(crate) fn render_estimates(
    at_risk: &[MarginalMean],
    no_risk: &[MarginalMean],
    sesoi: Sesoi,
) -> anyhow::Result<String> {
    let anchor = no_risk
        .iter()
        .find(|m| m.treatment == TreatmentArm::NoFeedback)
        .context("No-risk marginal means lack a No Feedback estimate")?
        .estimate;
    let band = (anchor + sesoi.lower, anchor + sesoi.upper);

    let scale = YScale::spanning(
        at_risk
            .iter()
            .chain(no_risk)
            .flat_map(|m| [m.ci_lower, m.ci_upper])
            .chain([band.0, band.1]),
    )
    .context("No finite estimates to plot")?;

    let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT - PANEL_GAP;
    let slot_width = plot_width / (AT_RISK_SLOTS.len() + 1) as f64;
    let main = Panel {
        left: MARGIN_LEFT,
        width: slot_width * AT_RISK_SLOTS.len() as f64,
        slots: AT_RISK_SLOTS.len(),
    };
    let side = Panel {
        left: main.right() + PANEL_GAP,
        width: slot_width,
        slots: 1,
    };

    let mut svg = String::new();
    write_figure(&mut svg, at_risk, no_risk, band, scale, main, side)
        .context("Failed to format SVG")?;
    Ok(svg)
}

fn write_figure(
    svg: &mut String,
    at_risk: &[MarginalMean],
    no_risk: &[MarginalMean],
    band: (f64, f64),
    scale: YScale,
    main: Panel,
    side: Panel,
) -> std::fmt::Result {
    let top = MARGIN_TOP;
    let bottom = HEIGHT - MARGIN_BOTTOM;

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;

    // shading behind the aggregate slot, then its divider
    let all_right = main.left + main.width / main.slots as f64;
    writeln!(
        svg,
        r##"<rect class="aggregate" x="{:.1}" y="{top:.1}" width="{:.1}" height="{:.1}" fill="#eeeeee"/>"##,
        main.left,
        all_right - main.left,
        bottom - top
    )?;
    writeln!(
        svg,
        r##"<line class="divider" x1="{all_right:.1}" y1="{top:.1}" x2="{all_right:.1}" y2="{bottom:.1}" stroke="#555555" stroke-width="1.5"/>"##
    )?;

    // equivalence band on the no-risk panel
    let (band_top, band_bottom) = (scale.to_px(band.1), scale.to_px(band.0));
    writeln!(
        svg,
        r##"<rect class="equivalence-band" x="{:.1}" y="{band_top:.1}" width="{:.1}" height="{:.1}" fill="#bbbbbb" fill-opacity="0.35"/>"##,
        side.left,
        side.width,
        band_bottom - band_top
    )?;
    for (value, name) in [(band.0, "lower"), (band.1, "upper")] {
        let y = scale.to_px(value);
        writeln!(
            svg,
            r##"<line class="sesoi-{name}" x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#333333" stroke-dasharray="6 4"/>"##,
            side.left,
            side.right()
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end" font-size="10">SESOI {name} ({value:.2})</text>"#,
            side.right() - 4.0,
            y - 4.0
        )?;
    }

    // panel frames and shared y axis
    for panel in [main, side] {
        writeln!(
            svg,
            r#"<rect x="{:.1}" y="{top:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="black"/>"#,
            panel.left,
            panel.width,
            bottom - top
        )?;
    }
    for tick in scale.ticks() {
        let y = scale.to_px(tick);
        writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="black"/>"#,
            MARGIN_LEFT - 5.0,
            MARGIN_LEFT
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{tick:.1}</text>"#,
            MARGIN_LEFT - 8.0,
            y + 4.0
        )?;
    }
    writeln!(
        svg,
        r#"<text transform="translate(20 {:.1}) rotate(-90)" text-anchor="middle">Post-intervention stake</text>"#,
        (top + bottom) / 2.0
    )?;

    // category labels
    for (index, slot) in AT_RISK_SLOTS.iter().enumerate() {
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{slot}</text>"#,
            main.slot_centre(index),
            bottom + 20.0
        )?;
    }
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
        side.slot_centre(0),
        bottom + 20.0,
        RiskCategory::NoRisk
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">At-risk cohort</text>"#,
        main.left + main.width / 2.0,
        bottom + 42.0
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">No-risk cohort</text>"#,
        side.slot_centre(0),
        bottom + 42.0
    )?;

    // estimates
    for mean in at_risk {
        if let Some(index) = AT_RISK_SLOTS.iter().position(|s| *s == mean.risk) {
            write_point(svg, mean, main.slot_centre(index), scale)?;
        }
    }
    // the single-category `All` rows repeat the cells
    for mean in no_risk.iter().filter(|m| m.risk != RiskLabel::All) {
        write_point(svg, mean, side.slot_centre(0), scale)?;
    }

    // legend
    let mut x = MARGIN_LEFT;
    for arm in [TreatmentArm::NoFeedback, TreatmentArm::Feedback] {
        writeln!(
            svg,
            r#"<circle cx="{:.1}" cy="{:.1}" r="5" fill="{}"/>"#,
            x + 5.0,
            MARGIN_TOP - 25.0,
            arm_colour(arm)
        )?;
        writeln!(
            svg,
            r#"<text class="legend" x="{:.1}" y="{:.1}">{arm}</text>"#,
            x + 15.0,
            MARGIN_TOP - 21.0
        )?;
        x += 130.0;
    }

    writeln!(svg, "</svg>")
}

fn write_point(
    svg: &mut String,
    mean: &MarginalMean,
    centre: f64,
    scale: YScale,
) -> std::fmt::Result {
    let x = centre + arm_offset(mean.treatment);
    let colour = arm_colour(mean.treatment);
    let (y, y_low, y_high) = (
        scale.to_px(mean.estimate),
        scale.to_px(mean.ci_lower),
        scale.to_px(mean.ci_upper),
    );
    writeln!(
        svg,
        r#"<line x1="{x:.1}" y1="{y_high:.1}" x2="{x:.1}" y2="{y_low:.1}" stroke="{colour}" stroke-width="2"/>"#
    )?;
    writeln!(
        svg,
        r#"<circle class="estimate" cx="{x:.1}" cy="{y:.1}" r="5" fill="{colour}"><title>{} / {}: {:.2}</title></circle>"#,
        mean.treatment, mean.risk, mean.estimate
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean(treatment: TreatmentArm, risk: RiskLabel, estimate: f64) -> MarginalMean {
        MarginalMean {
            treatment,
            risk,
            estimate,
            std_error: 2.0,
            df: 50.0,
            ci_lower: estimate - 4.0,
            ci_upper: estimate + 4.0,
        }
    }

    fn at_risk_means() -> Vec<MarginalMean> {
        AT_RISK_SLOTS
            .iter()
            .flat_map(|&risk| {
                [
                    mean(TreatmentArm::NoFeedback, risk, 100.0),
                    mean(TreatmentArm::Feedback, risk, 90.0),
                ]
            })
            .collect()
    }

    fn no_risk_means() -> Vec<MarginalMean> {
        let risk = RiskLabel::Category(RiskCategory::NoRisk);
        vec![
            mean(TreatmentArm::NoFeedback, risk, 100.0),
            mean(TreatmentArm::Feedback, risk, 99.0),
            mean(TreatmentArm::NoFeedback, RiskLabel::All, 100.0),
            mean(TreatmentArm::Feedback, RiskLabel::All, 99.0),
        ]
    }

    #[test]
    fn test_render_contains_both_panels_and_legend() {
        let svg =
            render_estimates(&at_risk_means(), &no_risk_means(), Sesoi::symmetric(5.0)).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        for label in ["All", "Low risk", "Moderate risk", "High risk", "No risk"] {
            assert!(svg.contains(&format!(">{label}</text>")), "missing {label}");
        }
        assert!(svg.contains(">No Feedback</text>"));
        assert!(svg.contains(">Feedback</text>"));
        assert_eq!(svg.matches(r#"class="estimate""#).count(), 10);
        assert_eq!(svg.matches(r#"class="aggregate""#).count(), 1);
        assert_eq!(svg.matches(r#"class="divider""#).count(), 1);
    }

    #[test]
    fn test_band_is_anchored_on_no_feedback_estimate() {
        let svg =
            render_estimates(&at_risk_means(), &no_risk_means(), Sesoi::symmetric(5.0)).unwrap();
        assert!(svg.contains(r#"class="equivalence-band""#));
        assert!(svg.contains("SESOI lower (95.00)"));
        assert!(svg.contains("SESOI upper (105.00)"));
        assert_eq!(svg.matches(r#"stroke-dasharray="6 4""#).count(), 2);
    }

    #[test]
    fn test_missing_anchor_is_an_error() {
        let no_risk = vec![mean(
            TreatmentArm::Feedback,
            RiskLabel::Category(RiskCategory::NoRisk),
            99.0,
        )];
        assert!(render_estimates(&at_risk_means(), &no_risk, Sesoi::symmetric(5.0)).is_err());
    }

    #[test]
    fn test_y_scale_is_inverted_and_padded() {
        let scale = YScale::spanning([80.0, 120.0]).unwrap();
        assert!(scale.min < 80.0 && scale.max > 120.0);
        assert!(scale.to_px(120.0) < scale.to_px(80.0));
        assert!(YScale::spanning([f64::NAN]).is_none());
    }
}
