//! Application state: catalog, persistence, the tutoring engines, and the completion client.
//!
//! This module owns:
//!   - the tutor config (from TOML or defaults)
//!   - the content catalog and the persistence store
//!   - mastery estimator, practice selector, session manager, analytics
//!   - the text-completion client (OpenAI when configured, offline tutor otherwise)

use std::sync::Arc;

use tracing::{info, instrument};

use crate::analytics::AnalyticsAggregator;
use crate::assistant::{OfflineTutor, OpenAI, TextCompletion};
use crate::catalog::{ContentCatalog, InMemoryCatalog};
use crate::config::{load_tutor_config_from_env, TutorConfig};
use crate::mastery::MasteryEstimator;
use crate::selector::PracticeSelector;
use crate::session::SessionManager;
use crate::store::{InMemoryStore, Persistence};

#[derive(Clone)]
pub struct AppState {
    pub config: TutorConfig,
    pub catalog: Arc<dyn ContentCatalog>,
    pub store: Arc<dyn Persistence>,
    pub estimator: Arc<MasteryEstimator>,
    pub selector: Arc<PracticeSelector>,
    pub sessions: Arc<SessionManager>,
    pub analytics: Arc<AnalyticsAggregator>,
    pub assistant: Arc<dyn TextCompletion>,
}

impl AppState {
    /// Build state from env: load config, build the catalog, init the completion client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_tutor_config_from_env().unwrap_or_default();

        let catalog = InMemoryCatalog::from_config(&config);
        info!(target: "dsa_tutor", scope = %config.engine.default_scope, problems = catalog.problem_count(), "Startup catalog inventory");

        let assistant: Arc<dyn TextCompletion> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "dsa_tutor", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
                Arc::new(oa)
            }
            None => {
                info!(target: "dsa_tutor", "OpenAI disabled (no OPENAI_API_KEY). Using offline tutor.");
                Arc::new(OfflineTutor)
            }
        };

        Self::with_parts(config, Arc::new(catalog), Arc::new(InMemoryStore::new()), assistant)
    }

    /// Wire the engines around the given collaborators.
    pub fn with_parts(
        config: TutorConfig,
        catalog: Arc<dyn ContentCatalog>,
        store: Arc<dyn Persistence>,
        assistant: Arc<dyn TextCompletion>,
    ) -> Self {
        let retry = config.persistence.retry_policy();
        let estimator = Arc::new(MasteryEstimator::new(catalog.clone(), store.clone(), retry));
        let selector = Arc::new(PracticeSelector::new(
            catalog.clone(),
            store.clone(),
            estimator.clone(),
            config.engine.anti_repeat_window,
        ));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            selector.clone(),
            assistant.clone(),
            config.session.clone(),
            config.prompts.tutor_system.clone(),
            retry,
        ));
        let analytics = Arc::new(AnalyticsAggregator::new(catalog.clone(), store.clone()));

        Self { config, catalog, store, estimator, selector, sessions, analytics, assistant }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
