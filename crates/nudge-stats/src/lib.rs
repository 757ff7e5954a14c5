//! Statistical building blocks for the stake-feedback analysis.
//!
//! This crate provides the numeric toolbox the model and analysis crates build on:
//!
//! - **Descriptive statistics**: mean, median, variance, skewness, kurtosis
//! - **Percentiles**: compute and store percentile values for datasets
//! - **Distributions**: Student t, normal, F and chi-squared tail probabilities and quantiles
//! - **Normality tests**: Jarque-Bera test and the Pearson P statistic
//! - **Linear algebra**: Cholesky-based solves, inverses and determinants for small
//!   symmetric positive-definite matrices
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`percentiles`]: Percentile computation and storage
//! - [`distribution`]: Tail probabilities and quantiles of reference distributions
//! - [`normality`]: Goodness-of-fit statistics against the normal distribution
//! - [`linalg`]: Dense SPD linear algebra on [`ndarray`] matrices
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use nudge_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! assert_eq!(stats.skewness, 0.0);
//! ```
//!
//! ## Computing percentiles
//!
//! ```
//! use nudge_stats::percentiles::Percentiles;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let percentiles = Percentiles::new(&values, &[25.0, 50.0, 75.0]);
//! assert_eq!(percentiles.get(50.0), Some(3.0));
//! ```
//!
//! ## Two-sided p-value of a t statistic
//!
//! ```
//! use nudge_stats::distribution;
//!
//! let p = distribution::t_two_sided_p(0.0, 10.0);
//! assert!((p - 1.0).abs() < 1e-12);
//! ```
//!
//! ## Solving a symmetric positive-definite system
//!
//! ```
//! use ndarray::array;
//! use nudge_stats::linalg;
//!
//! let a = array![[4.0, 2.0], [2.0, 3.0]];
//! let x = linalg::spd_solve(&a, &array![2.0, 1.0]).unwrap();
//! assert!((x[0] - 0.5).abs() < 1e-12);
//! assert!(x[1].abs() < 1e-12);
//! ```

pub mod descriptive;
pub mod distribution;
pub mod linalg;
pub mod normality;
pub mod percentiles;
