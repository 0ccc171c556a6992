use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::{EnvironmentContext, EnvironmentContextResolver};
use crate::environment::Environment;
use crate::error::{InsightsError, Result};
use crate::export;
use crate::port::{AnalysisObserver, EnvironmentPhase, InsightsPort, NoopObserver, RunPhase};
use crate::prompt::PromptComposer;
use crate::query::QueryBuilder;
use crate::result::{AggregatedAnalysisResult, AnalysisSuccess, EnvironmentAnalysisResult};
use crate::sampler::LogSampler;
use crate::scheduler::Scheduler;
use crate::service::LogService;
use crate::session::SessionCapture;
use crate::store::ResultStore;
use crate::time_filter::{self, TimeFilter};

pub const NO_LOGS_MESSAGE: &str = "No logs found for this session";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Drives a multi-environment analysis run and owns all state shared between
/// runs: the auth token, the captured session, the active time filter, the
/// environment context cache and the latest results.
pub struct AnalysisOrchestrator {
    config: Config,
    service: Arc<dyn LogService>,
    resolver: EnvironmentContextResolver,
    sampler: LogSampler,
    composer: PromptComposer,
    scheduler: Scheduler,
    token: Mutex<Option<String>>,
    session: Mutex<Option<SessionCapture>>,
    time_filter: Mutex<Option<TimeFilter>>,
    store: ResultStore,
    observer: Arc<dyn AnalysisObserver>,
}

impl AnalysisOrchestrator {
    pub fn new(config: Config, service: Arc<dyn LogService>) -> Self {
        Self {
            resolver: EnvironmentContextResolver::new(config.environments.clone()),
            sampler: LogSampler::new(config.sampling.clone()),
            composer: PromptComposer::new(config.sampling.message_preview_chars),
            scheduler: Scheduler::from_config(&config.analysis),
            token: Mutex::new(config.service.api_token.clone()),
            session: Mutex::new(None),
            time_filter: Mutex::new(config.analysis.time_filter),
            store: ResultStore::new(),
            observer: Arc::new(NoopObserver),
            service,
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AnalysisObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_token(&self, token: Option<String>) {
        *lock(&self.token) = token;
    }

    pub fn set_session(&self, session: Option<SessionCapture>) {
        *lock(&self.session) = session;
    }

    pub fn set_time_filter(&self, filter: Option<TimeFilter>) {
        debug!("Active time filter: {:?}", filter);
        *lock(&self.time_filter) = filter;
    }

    pub fn time_filter(&self) -> Option<TimeFilter> {
        *lock(&self.time_filter)
    }

    pub fn clear_context_cache(&self) {
        self.resolver.clear();
    }

    /// Latest resolved environment context.
    pub fn subscribe_context(&self) -> watch::Receiver<Option<Arc<EnvironmentContext>>> {
        self.resolver.subscribe()
    }

    pub fn results(&self) -> Vec<EnvironmentAnalysisResult> {
        self.store.all()
    }

    fn current_token(&self) -> Result<String> {
        match lock(&self.token).as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(InsightsError::NoToken),
        }
    }

    fn resolve_context(&self) -> Result<Arc<EnvironmentContext>> {
        let session = lock(&self.session).clone();
        self.resolver
            .resolve(session.as_ref(), Utc::now())
            .ok_or(InsightsError::NoSession)
    }

    /// Analyze every environment. Only a missing token or session aborts the
    /// run; anything else is recorded against the environment it happened in.
    pub async fn run_all(&self) -> Result<Arc<AggregatedAnalysisResult>> {
        let run_id = Uuid::new_v4();
        info!("Starting analysis run {}", run_id);
        self.observer.on_run_phase(run_id, RunPhase::ResolvingContext);

        let prepared = self.current_token().and_then(|token| Ok((token, self.resolve_context()?)));
        let (token, context) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Analysis run {} aborted: {}", run_id, e);
                self.observer.on_run_phase(run_id, RunPhase::Failed);
                return Err(e);
            }
        };

        let generation = self.store.begin_run();
        let filter = self.time_filter();
        self.observer.on_run_phase(run_id, RunPhase::PerEnvironment);

        let jobs = Environment::ALL
            .into_iter()
            .map(|environment| self.run_environment(generation, &context, environment, &token, filter))
            .collect::<Vec<_>>();
        let outcomes = self.scheduler.run(jobs).await;

        // An environment taken over by a single-environment rerun reports the
        // rerun's result, if it has finished.
        let results = Environment::ALL
            .into_iter()
            .zip(outcomes)
            .filter_map(|(environment, outcome)| outcome.or_else(|| self.store.get(environment)))
            .collect::<Vec<_>>();

        let aggregated = Arc::new(AggregatedAnalysisResult::from_results(
            run_id,
            results,
            filter.unwrap_or(TimeFilter::DEFAULT),
            Utc::now(),
        ));

        if self.store.publish(generation, aggregated.clone()) {
            info!(
                "Analysis run {} complete: {} environments, {} failed",
                run_id,
                aggregated.results.len(),
                aggregated.failure_count()
            );
            self.observer.on_run_phase(run_id, RunPhase::Completed);
            self.observer.on_run_complete(&aggregated);
        } else {
            warn!("Analysis run {} was superseded, result not published", run_id);
        }
        Ok(aggregated)
    }

    /// Re-run a single environment without touching the others' results.
    pub async fn run_one(&self, environment: Environment) -> Result<EnvironmentAnalysisResult> {
        info!("Starting single-environment analysis for {}", environment);
        let token = self.current_token()?;
        let context = self.resolve_context()?;
        let generation = self.store.begin_single(environment);
        let filter = self.time_filter();
        self.run_environment(generation, &context, environment, &token, filter)
            .await
            .ok_or(InsightsError::Superseded(environment))
    }

    /// `None` once a newer run has claimed `environment`; no further service
    /// calls or observer events are made for this generation after that.
    async fn run_environment(
        &self,
        generation: u64,
        context: &EnvironmentContext,
        environment: Environment,
        token: &str,
        filter: Option<TimeFilter>,
    ) -> Option<EnvironmentAnalysisResult> {
        let result = match self
            .environment_pipeline(generation, context, environment, token, filter)
            .await
        {
            Ok(result) => result,
            Err(InsightsError::Superseded(_)) => {
                debug!("{} analysis for generation {} superseded, stopping", environment, generation);
                return None;
            }
            Err(e) => {
                warn!("Analysis failed for {}: {}", environment, e);
                EnvironmentAnalysisResult::failure(environment, &e)
            }
        };

        if !self.store.record(generation, result.clone()) {
            return None;
        }
        let phase = match &result {
            EnvironmentAnalysisResult::Failure { .. } => EnvironmentPhase::Failed,
            EnvironmentAnalysisResult::Empty { .. } => EnvironmentPhase::Empty,
            EnvironmentAnalysisResult::Success(_) => EnvironmentPhase::Done,
        };
        self.observer.on_environment_phase(environment, phase);
        self.observer.on_result(&result);
        Some(result)
    }

    fn ensure_current(&self, generation: u64, environment: Environment) -> Result<()> {
        if self.store.is_current(environment, generation) {
            Ok(())
        } else {
            Err(InsightsError::Superseded(environment))
        }
    }

    fn enter_phase(&self, generation: u64, environment: Environment, phase: EnvironmentPhase) -> Result<()> {
        self.ensure_current(generation, environment)?;
        self.observer.on_environment_phase(environment, phase);
        Ok(())
    }

    async fn environment_pipeline(
        &self,
        generation: u64,
        context: &EnvironmentContext,
        environment: Environment,
        token: &str,
        filter: Option<TimeFilter>,
    ) -> Result<EnvironmentAnalysisResult> {
        self.enter_phase(generation, environment, EnvironmentPhase::Pending)?;
        self.enter_phase(generation, environment, EnvironmentPhase::Querying)?;
        let query = match QueryBuilder::build(context, environment, filter, Utc::now()) {
            Some(query) => query,
            None => {
                let reason = InsightsError::NoQuery(environment);
                debug!("{}", reason);
                return Ok(EnvironmentAnalysisResult::empty(environment, reason.to_string()));
            }
        };

        let logs = self.service.search(token, &query).await?;
        self.ensure_current(generation, environment)?;
        if logs.is_empty() {
            info!("No logs found for {}", environment);
            return Ok(EnvironmentAnalysisResult::empty(environment, NO_LOGS_MESSAGE));
        }

        self.enter_phase(generation, environment, EnvironmentPhase::Sampling)?;
        let selected = self.sampler.select(&logs);

        self.enter_phase(generation, environment, EnvironmentPhase::Prompting)?;
        let summary = self.composer.summarize(environment, logs.len(), &selected);
        let prompt = PromptComposer::compose_prompt(environment, &summary);
        self.ensure_current(generation, environment)?;
        self.observer.on_prompt(environment, &prompt);

        self.enter_phase(generation, environment, EnvironmentPhase::Summarizing)?;
        let (analysis, analysis_degraded) = match self.service.summarize(token, &prompt).await {
            Ok(analysis) => (analysis, false),
            Err(e) => {
                warn!("Summarization failed for {}: {}", environment, e);
                (format!("AI analysis unavailable: {}", e), true)
            }
        };

        info!(
            "{}: {} logs analyzed, {} selected for review",
            environment,
            logs.len(),
            selected.len()
        );
        Ok(EnvironmentAnalysisResult::Success(Box::new(AnalysisSuccess {
            environment,
            log_count: logs.len(),
            selected_count: selected.len(),
            query,
            analysis,
            analysis_degraded,
            raw_logs: logs,
            selected_logs: selected,
            prompt,
            completed_at: Utc::now(),
        })))
    }

    fn last_run_or_err(&self) -> Result<Arc<AggregatedAnalysisResult>> {
        self.store
            .last_run()
            .ok_or_else(|| InsightsError::ExportError("No completed analysis to export".to_string()))
    }
}

#[async_trait]
impl InsightsPort for AnalysisOrchestrator {
    async fn analyze_all(&self) -> Result<Arc<AggregatedAnalysisResult>> {
        self.run_all().await
    }

    async fn analyze_environment(&self, environment: Environment) -> Result<EnvironmentAnalysisResult> {
        self.run_one(environment).await
    }

    fn apply_time_filter(&self, text: &str) -> Option<TimeFilter> {
        let parsed = time_filter::parse(text);
        match parsed {
            Some(filter) => self.set_time_filter(Some(filter)),
            None => warn!("Could not parse time filter from '{}'", text),
        }
        parsed
    }

    fn latest_result(&self, environment: Environment) -> Option<EnvironmentAnalysisResult> {
        self.store.get(environment)
    }

    fn latest_run(&self) -> Option<Arc<AggregatedAnalysisResult>> {
        self.store.last_run()
    }

    /// Exports the latest result for `environment`, which may come from a
    /// full run or a single-environment run.
    async fn export_environment(&self, environment: Environment, dir: &Path) -> Result<PathBuf> {
        let result = self
            .store
            .get(environment)
            .ok_or_else(|| InsightsError::ExportError(format!("No analysis of {} to export", environment)))?;
        let timestamp = result.as_success().map(|s| s.completed_at).unwrap_or_else(Utc::now);
        let snapshot = AggregatedAnalysisResult::from_results(
            Uuid::new_v4(),
            vec![result],
            self.time_filter().unwrap_or(TimeFilter::DEFAULT),
            timestamp,
        );
        export::export_environment(&snapshot, environment, dir).await
    }

    async fn export_combined(&self, dir: &Path) -> Result<PathBuf> {
        let run = self.last_run_or_err()?;
        export::export_combined(&run, dir).await
    }

    async fn export_all(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let run = self.last_run_or_err()?;
        export::export_all_to_dir(&run, dir, self.config.analysis.export_stagger()).await
    }
}
