// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # guard-discovery
//!
//! Mines guard expressions for the decision points of a process model from
//! the data observed in an event log.
//!
//! ## Architecture
//!
//! - **Attributes** (`attribute`, `class`): typed schema, instances, branch identities
//! - **Expressions** (`expr`): the boolean guard language, parser and evaluator
//! - **Trees** (`learn`, `tree`): a C4.5 learner and the adapter that turns its
//!   rendered tree into leaf descriptors with simplified path conditions
//! - **Engines** (`estimate`): basic, one-vs-rest, local and pairwise overlap refinement
//! - **Driver** (`discovery`): log replay and parallel mining of all decision points
//!
//! ## Library usage
//!
//! ```no_run
//! use guard_discovery::config::{DiscoveryConfig, StrategyKind};
//! use guard_discovery::discovery::{DecisionPoint, ProjectedLog, RuleDiscovery};
//!
//! let log: ProjectedLog = serde_json::from_str("{\"traces\": []}").unwrap();
//! let config = DiscoveryConfig {
//!     strategy: StrategyKind::Pairwise,
//!     ..DiscoveryConfig::default()
//! };
//! let discovery = RuleDiscovery::new(config).unwrap();
//! let points = vec![DecisionPoint::new("check", ["approve", "reject", "escalate"])];
//! let report = discovery.discover(&log, &points);
//! for (point, result) in &report.results {
//!     for (branch, guard) in &result.guards {
//!         println!("{point} -> {branch}: {guard}");
//!     }
//! }
//! ```

pub mod attribute;
pub mod class;
pub mod config;
pub mod discovery;
pub mod error;
pub mod estimate;
pub mod expr;
pub mod learn;
pub mod tree;
