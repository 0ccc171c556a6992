// Session Insights - cross-environment log analysis for captured sessions
//
// Resolves where a session's logs live, searches each environment, samples a
// representative subset and asks the summarization service for an analysis.
// Shared by the CLI binary and any other front end through `InsightsPort`.

pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod export;
pub mod flatten;
pub mod orchestrator;
pub mod port;
pub mod prompt;
pub mod query;
pub mod record;
pub mod result;
pub mod sampler;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod store;
pub mod time_filter;

pub use config::{AnalysisConfig, Config, EnvironmentConfig, SamplingConfig, ServiceConfig};
pub use context::{EnvironmentContext, EnvironmentContextResolver};
pub use environment::{CorrelationKey, Environment};
pub use error::{Guidance, InsightsError, Result};
pub use export::{export_all_to_dir, export_combined, export_environment, render_export};
pub use flatten::{extract_field, flatten, FlatRecord};
pub use orchestrator::AnalysisOrchestrator;
pub use port::{AnalysisObserver, EnvironmentPhase, InsightsPort, NoopObserver, RunPhase};
pub use prompt::PromptComposer;
pub use query::QueryBuilder;
pub use record::{FieldCandidates, LogField, LogRecord, RecordView};
pub use result::{AggregatedAnalysisResult, AnalysisSuccess, EnvironmentAnalysisResult, EnvironmentLog};
pub use sampler::{LogSampler, LogSource, SelectedLog};
pub use scheduler::{Scheduler, SchedulerKind};
pub use service::{HttpLogService, LogService};
pub use session::{CapturedRequest, SessionCapture};
pub use store::ResultStore;
pub use time_filter::{TimeFilter, TimeUnit};
