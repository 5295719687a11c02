//! Decision point discovery over a projected event log.
//!
//! A [`RuleDiscovery`] replays every trace of a [`ProjectedLog`], collects one
//! training instance per observed branch choice, and runs the configured guard
//! engine for every decision point on a shared worker pool. A failing decision
//! point is reported in [`DiscoveryReport::failures`] without affecting the
//! others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attribute::{AttributeSchema, Instance, Value};
use crate::class::ClassId;
use crate::config::{DiscoveryConfig, StrategyKind};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::estimate::{
    BasicEstimator, DecisionProblem, DiscriminatingEstimator, GuardEstimator, GuardMap,
    LocalRefinementConfig, LocalRefinementEstimator, PairwiseEstimator,
};
use crate::expr::Bindings;
use crate::learn::{C45Learner, TreeLearner};

// ---------------------------------------------------------------------------
// Input model
// ---------------------------------------------------------------------------

/// One event: the activity it records and the attribute writes it performs.
/// A `None` value unsets the attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedEvent {
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<Value>>,
}

impl ProjectedEvent {
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: Some(activity.into()),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), Some(value.into()));
        self
    }
}

/// A case: its own attributes, known from the start, and its events in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedTrace {
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub events: Vec<ProjectedEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedLog {
    /// Values every case starts with.
    #[serde(default)]
    pub initial_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub traces: Vec<ProjectedTrace>,
}

/// A branching location and the activities that start its outgoing branches.
///
/// Branches are unique; repeats are dropped keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPoint {
    pub id: String,
    #[serde(deserialize_with = "unique_branches")]
    branches: Vec<ClassId>,
}

impl DecisionPoint {
    pub fn new<C: Into<ClassId>>(
        id: impl Into<String>,
        branches: impl IntoIterator<Item = C>,
    ) -> Self {
        Self {
            id: id.into(),
            branches: dedup_branches(branches.into_iter().map(Into::into)),
        }
    }

    pub fn branches(&self) -> &[ClassId] {
        &self.branches
    }
}

fn dedup_branches(branches: impl IntoIterator<Item = ClassId>) -> Vec<ClassId> {
    let mut seen = HashSet::new();
    branches
        .into_iter()
        .filter(|branch| seen.insert(branch.clone()))
        .collect()
}

fn unique_branches<'de, D>(deserializer: D) -> Result<Vec<ClassId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Vec::<ClassId>::deserialize(deserializer).map(dedup_branches)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DecisionPointResult {
    pub decision_point: String,
    pub strategy: StrategyKind,
    pub guards: GuardMap<ClassId>,
    pub quality: Option<f64>,
    /// Printable description of the trained tree.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    pub num_instances: usize,
}

impl DecisionPointResult {
    /// The first branch, in class order, whose guard holds.
    ///
    /// Guards may overlap; no tie-break by quality is made.
    pub fn classify<B: Bindings + ?Sized>(&self, bindings: &B) -> Option<&ClassId> {
        self.guards
            .iter()
            .find(|(_, estimation)| estimation.expression.is_true(bindings))
            .map(|(class, _)| class)
    }
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub results: BTreeMap<String, DecisionPointResult>,
    pub failures: BTreeMap<String, DiscoveryError>,
}

impl DiscoveryReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Schema inference
// ---------------------------------------------------------------------------

/// Primed name of an attribute: its value right after the deciding event.
pub fn primed(name: &str) -> String {
    format!("{name}'")
}

/// Infer the attribute schema of a log. The first observed type of every
/// attribute wins; with `mine_prime_guards` every event attribute is also
/// registered under its primed name.
pub fn infer_schema(log: &ProjectedLog, config: &DiscoveryConfig) -> AttributeSchema {
    let mut schema = AttributeSchema::new();
    for (name, value) in &log.initial_values {
        schema.observe(name, value);
    }
    for trace in &log.traces {
        for (name, value) in &trace.attributes {
            schema.observe(name, value);
        }
        for event in &trace.events {
            for (name, value) in &event.attributes {
                let Some(value) = value else { continue };
                schema.observe(name, value);
                if config.mine_prime_guards {
                    schema.observe(&primed(name), value);
                }
            }
        }
    }
    schema
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct RuleDiscovery {
    config: DiscoveryConfig,
    learner: Arc<dyn TreeLearner>,
    pool: Arc<ThreadPool>,
}

impl RuleDiscovery {
    /// Validate `config` and build a worker pool of `config.threads` threads.
    pub fn new(config: DiscoveryConfig) -> DiscoveryResult<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads.unwrap_or(0))
            .thread_name(|i| format!("guard-worker-{i}"))
            .build()
            .map_err(|e| DiscoveryError::Pool {
                message: e.to_string(),
            })?;
        Ok(Self::with_pool(config, Arc::new(pool)))
    }

    /// Run on a caller-owned pool.
    pub fn with_pool(config: DiscoveryConfig, pool: Arc<ThreadPool>) -> Self {
        Self {
            config,
            learner: Arc::new(C45Learner),
            pool,
        }
    }

    pub fn with_learner(mut self, learner: Arc<dyn TreeLearner>) -> Self {
        self.learner = learner;
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn estimator(&self) -> Box<dyn GuardEstimator> {
        let learner = Arc::clone(&self.learner);
        let policy = self.config.no_leaf_policy;
        match self.config.strategy {
            StrategyKind::Basic => Box::new(BasicEstimator::new(learner, policy)),
            StrategyKind::Discriminating => Box::new(DiscriminatingEstimator::new(learner, policy)),
            StrategyKind::Local => Box::new(LocalRefinementEstimator::new(
                learner,
                LocalRefinementConfig {
                    reduce_min_leafs: self.config.reduce_min_leafs,
                    merge_wrong_instance_ratio: self.config.merge_wrong_instance_ratio,
                    always_merge_existing_leafs: self.config.always_merge_existing_leafs,
                    no_leaf_policy: policy,
                },
            )),
            StrategyKind::Pairwise => Box::new(
                PairwiseEstimator::new(learner, policy, self.config.mix_estimations)
                    .with_pool(Arc::clone(&self.pool)),
            ),
        }
    }

    /// Replay `log` and collect the training instances of `point`.
    ///
    /// Every trace starts from the log's initial values overlaid with the
    /// trace attributes. An event whose activity is a branch of `point` yields
    /// an instance from the values written so far (plus, with
    /// `mine_prime_guards`, the event's own writes under primed names); the
    /// event's writes are applied afterwards. Identical observations collapse
    /// into one weighted instance when `use_weights` is on.
    pub fn collect_instances(&self, log: &ProjectedLog, point: &DecisionPoint) -> Vec<Instance> {
        let mut instances: Vec<Instance> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for trace in &log.traces {
            let mut current = log.initial_values.clone();
            current.extend(trace.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
            let mut previous: Option<&str> = None;

            for event in &trace.events {
                let activity = event.activity.as_deref();
                let branch = activity.and_then(|a| point.branches.iter().find(|b| b.as_str() == a));
                let follows = !self.config.mine_directly_following_classes
                    || previous == Some(point.id.as_str());

                if let (Some(branch), true) = (branch, follows) {
                    let mut values = current.clone();
                    if self.config.mine_prime_guards {
                        for (name, value) in &event.attributes {
                            if let Some(value) = value {
                                values.insert(primed(name), value.clone());
                            }
                        }
                    }
                    let instance = Instance {
                        values,
                        target: branch.clone(),
                        weight: 1.0,
                    };
                    push_instance(&mut instances, &mut seen, instance, self.config.use_weights);
                }

                for (name, value) in &event.attributes {
                    match value {
                        Some(value) => {
                            current.insert(name.clone(), value.clone());
                        }
                        None => {
                            current.remove(name);
                        }
                    }
                }
                if activity.is_some() {
                    previous = activity;
                }
            }
        }
        instances
    }

    /// Mine the guards of one decision point.
    pub fn discover_point(
        &self,
        log: &ProjectedLog,
        schema: &AttributeSchema,
        point: &DecisionPoint,
    ) -> DiscoveryResult<DecisionPointResult> {
        let instances = self.collect_instances(log, point);
        let problem = DecisionProblem {
            decision_point: &point.id,
            schema,
            classes: &point.branches,
            instances: &instances,
            params: self.config.tree_params(&instances),
        };
        let estimator = self.estimator();
        info!(
            decision_point = %point.id,
            strategy = estimator.name(),
            instances = instances.len(),
            branches = point.branches.len(),
            "mining decision point"
        );

        let estimation = estimator
            .estimate(&problem)
            .map_err(|e| e.at_decision_point(&point.id))?;
        debug!(decision_point = %point.id, quality = ?estimation.quality, "decision point mined");

        Ok(DecisionPointResult {
            decision_point: point.id.clone(),
            strategy: self.config.strategy,
            guards: estimation.guards,
            quality: estimation.quality,
            summary: estimation.summary,
            num_instances: instances.len(),
        })
    }

    /// Mine every decision point in parallel on the shared pool.
    pub fn discover(&self, log: &ProjectedLog, points: &[DecisionPoint]) -> DiscoveryReport {
        let schema = infer_schema(log, &self.config);
        let outcomes: Vec<_> = self.pool.install(|| {
            points
                .par_iter()
                .map(|point| (point.id.clone(), self.discover_point(log, &schema, point)))
                .collect()
        });

        let mut report = DiscoveryReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    report.results.insert(id, result);
                }
                Err(e) => {
                    warn!(decision_point = %id, error = %e, "decision point failed");
                    report.failures.insert(id, e);
                }
            }
        }
        info!(
            mined = report.results.len(),
            failed = report.failures.len(),
            "rule discovery finished"
        );
        report
    }
}

fn push_instance(
    instances: &mut Vec<Instance>,
    seen: &mut HashMap<String, usize>,
    instance: Instance,
    aggregate: bool,
) {
    if !aggregate {
        instances.push(instance);
        return;
    }
    // Serialized form doubles as the identity of an observation; maps are ordered.
    let key = match serde_json::to_string(&(&instance.values, &instance.target)) {
        Ok(key) => key,
        Err(_) => {
            instances.push(instance);
            return;
        }
    };
    match seen.get(&key) {
        Some(&index) => instances[index].weight += 1.0,
        None => {
            seen.insert(key, instances.len());
            instances.push(instance);
        }
    }
}
