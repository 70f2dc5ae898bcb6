//! A/B experiment assignment: deterministic per (agent, experiment) bucket,
//! independent of the router (only applied if routing did not already remap).

use sha2::{Digest, Sha256};

use agix_config::ExperimentConfig;

pub struct ExperimentAssigner<'a> {
    experiments: &'a [ExperimentConfig],
}

pub struct Assignment {
    pub experiment_name: String,
    pub model: String,
}

impl<'a> ExperimentAssigner<'a> {
    pub fn new(experiments: &'a [ExperimentConfig]) -> Self {
        Self { experiments }
    }

    /// Returns the first enabled experiment's assigned model for `agent`,
    /// if any experiment is configured and enabled. Experiments are checked
    /// in declaration order; the first match wins.
    pub fn assign(&self, agent: &str) -> Option<Assignment> {
        for experiment in self.experiments {
            if !experiment.enabled {
                continue;
            }
            let bucket = stable_bucket(agent, &experiment.name);
            let model = if (bucket as f32) < experiment.traffic_pct {
                experiment.variant_model.clone()
            } else {
                experiment.control_model.clone()
            };
            return Some(Assignment { experiment_name: experiment.name.clone(), model });
        }
        None
    }
}

/// Stable bucket in `[0, 100)` for (agent, experiment), independent of
/// process restarts or the standard library's randomized hasher.
fn stable_bucket(agent: &str, experiment: &str) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(agent.as_bytes());
    hasher.update(b"\0");
    hasher.update(experiment.as_bytes());
    let digest = hasher.finalize();
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    n % 100
}
