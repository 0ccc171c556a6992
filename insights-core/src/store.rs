use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::environment::Environment;
use crate::result::{AggregatedAnalysisResult, EnvironmentAnalysisResult};

#[derive(Default)]
struct StoreState {
    next_generation: u64,
    run_generation: u64,
    environment_generations: HashMap<Environment, u64>,
    results: HashMap<Environment, EnvironmentAnalysisResult>,
    last_run: Option<Arc<AggregatedAnalysisResult>>,
}

impl StoreState {
    fn next(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn owns(&self, environment: Environment, generation: u64) -> bool {
        self.environment_generations.get(&environment) == Some(&generation)
    }
}

/// Latest analysis outcome per environment, kept in memory only.
///
/// Each environment is owned by the generation that last claimed it. A full
/// run claims all four plus the aggregate; a single-environment run claims
/// only its own environment. Writes from a generation that no longer owns the
/// target are dropped.
#[derive(Default)]
pub struct ResultStore {
    state: RwLock<StoreState>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset shared result state and return the new run's generation.
    pub fn begin_run(&self) -> u64 {
        let mut state = self.write();
        let generation = state.next();
        state.run_generation = generation;
        for environment in Environment::ALL {
            state.environment_generations.insert(environment, generation);
        }
        state.results.clear();
        state.last_run = None;
        debug!("Result store reset for run generation {}", generation);
        generation
    }

    /// Claim one environment for a single-environment run. Other environments
    /// and the aggregate stay with whichever run owns them.
    pub fn begin_single(&self, environment: Environment) -> u64 {
        let mut state = self.write();
        let generation = state.next();
        state.environment_generations.insert(environment, generation);
        state.results.remove(&environment);
        debug!("{} claimed by single run generation {}", environment, generation);
        generation
    }

    /// Whether `generation` may still write a result for `environment`.
    pub fn is_current(&self, environment: Environment, generation: u64) -> bool {
        self.read().owns(environment, generation)
    }

    /// Returns `false` if the write came from a superseded run and was dropped.
    pub fn record(&self, generation: u64, result: EnvironmentAnalysisResult) -> bool {
        let mut state = self.write();
        let environment = result.environment();
        if !state.owns(environment, generation) {
            debug!(
                "Discarding stale {} result from run generation {}",
                environment, generation
            );
            return false;
        }
        state.results.insert(environment, result);
        true
    }

    /// Returns `false` if the run was superseded and the aggregate was dropped.
    pub fn publish(&self, generation: u64, aggregated: Arc<AggregatedAnalysisResult>) -> bool {
        let mut state = self.write();
        if state.run_generation != generation {
            debug!("Discarding stale aggregated result from run generation {}", generation);
            return false;
        }
        state.last_run = Some(aggregated);
        true
    }

    pub fn get(&self, environment: Environment) -> Option<EnvironmentAnalysisResult> {
        self.read().results.get(&environment).cloned()
    }

    pub fn last_run(&self) -> Option<Arc<AggregatedAnalysisResult>> {
        self.read().last_run.clone()
    }

    /// Results currently held, in display order.
    pub fn all(&self) -> Vec<EnvironmentAnalysisResult> {
        let state = self.read();
        Environment::ALL
            .iter()
            .filter_map(|env| state.results.get(env).cloned())
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
