pub mod ai;
pub mod auth;
pub mod config;
pub mod core;
pub mod db;
pub mod domain;
pub mod logging;
pub mod queue;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod workers;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::ai::{CompletionClient, HttpCompletionClient};
use crate::config::Config;
use crate::core::{EventBus, EventPublisher, RedisEventBridge};
use crate::db::{
    DatabaseProxy, MasteryRepository, MemoryStore, NotificationRepository, TrainerRepository,
    VocabRepository,
};
use crate::queue::{JobQueue, QueueSettings, RedisBackend};
use crate::services::app_config::{ConfigResolver, StaticConfigResolver};
use crate::services::evaluator::AnswerEvaluator;
use crate::services::exam_generator::ExamGenerator;
use crate::services::mastery::MasteryTracker;
use crate::services::notification::ReminderDispatcher;
use crate::services::vocab::VocabService;
use crate::services::vocab_trainer::{TrainerService, TrainerServiceDeps};
use crate::state::AppState;
use crate::workers::{WorkerContext, WorkerManager};

/// Repositories and config lookup, backed by Postgres or by memory.
#[derive(Clone)]
pub struct Storage {
    pub trainers: Arc<dyn TrainerRepository>,
    pub mastery: Arc<dyn MasteryRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub vocabs: Arc<dyn VocabRepository>,
    pub config: Arc<dyn ConfigResolver>,
    pub db_proxy: Option<Arc<DatabaseProxy>>,
}

impl Storage {
    pub fn postgres(proxy: Arc<DatabaseProxy>) -> Self {
        Self {
            trainers: proxy.clone(),
            mastery: proxy.clone(),
            notifications: proxy.clone(),
            vocabs: proxy.clone(),
            config: proxy.clone(),
            db_proxy: Some(proxy),
        }
    }

    pub fn memory(store: Arc<MemoryStore>, config: Arc<dyn ConfigResolver>) -> Self {
        Self {
            trainers: store.clone(),
            mastery: store.clone(),
            notifications: store.clone(),
            vocabs: store,
            config,
            db_proxy: None,
        }
    }
}

/// A wired application: HTTP state plus the queue workers.
pub struct Runtime {
    pub state: AppState,
    pub workers: Arc<WorkerManager>,
    pub bridge: Option<Arc<RedisEventBridge>>,
}

/// Wires services, state and workers from already-built infrastructure.
pub fn assemble(
    config: &Config,
    storage: Storage,
    client: Arc<dyn CompletionClient>,
    queue: Arc<JobQueue>,
    events: EventPublisher,
) -> Runtime {
    let mastery = Arc::new(MasteryTracker::new(Arc::clone(&storage.mastery)));
    let dispatcher = Arc::new(ReminderDispatcher::new(
        Arc::clone(&storage.trainers),
        Arc::clone(&storage.notifications),
        Arc::clone(&queue),
        events.clone(),
        config.trainer.clone(),
    ));
    let generator = Arc::new(ExamGenerator::new(
        Arc::clone(&client),
        Arc::clone(&storage.config),
        config.retry,
        config.trainer.clone(),
    ));
    let evaluator = Arc::new(AnswerEvaluator::new(Arc::clone(&client), config.retry));
    let trainers = Arc::new(TrainerService::new(TrainerServiceDeps {
        trainers: Arc::clone(&storage.trainers),
        vocabs: Arc::clone(&storage.vocabs),
        generator,
        evaluator,
        mastery: Arc::clone(&mastery),
        dispatcher: Arc::clone(&dispatcher),
        queue: Arc::clone(&queue),
        settings: config.trainer.clone(),
    }));
    let vocabs = Arc::new(VocabService::new(
        Arc::clone(&storage.vocabs),
        Arc::clone(&client),
        Arc::clone(&queue),
        config.retry,
    ));

    let workers = Arc::new(WorkerManager::new(
        Arc::new(WorkerContext {
            trainers: Arc::clone(&trainers),
            vocabs: Arc::clone(&vocabs),
            dispatcher: Arc::clone(&dispatcher),
            queue: Arc::clone(&queue),
            events: events.clone(),
        }),
        config.worker.clone(),
    ));

    let state = AppState::new(
        storage.db_proxy.clone(),
        trainers,
        vocabs,
        mastery,
        dispatcher,
        queue,
        events,
    );

    Runtime {
        state,
        workers,
        bridge: None,
    }
}

/// Builds the runtime from `config`: Postgres when `DATABASE_URL` is set and
/// reachable, memory otherwise; Redis queue and event bridge when
/// `REDIS_URL` is set.
pub async fn bootstrap(config: &Config) -> Runtime {
    let storage = match config.database_url.as_deref() {
        Some(url) => match DatabaseProxy::connect(db::config::DbConfig::with_url(url)).await {
            Ok(proxy) => {
                info!("Postgres storage connected");
                Storage::postgres(proxy)
            }
            Err(err) => {
                warn!(error = %err, "database proxy not initialized, using in-memory storage");
                memory_storage()
            }
        },
        None => {
            info!("DATABASE_URL not set, using in-memory storage");
            memory_storage()
        }
    };

    let bus = Arc::new(EventBus::new());
    let (queue, bridge) = match config.redis_url.as_deref() {
        Some(url) => {
            let backend = Arc::new(RedisBackend::new(url));
            let bridge = Arc::new(RedisEventBridge::new(Arc::clone(&bus), url.to_string()));
            (JobQueue::new(backend, QueueSettings::from_env()), Some(bridge))
        }
        None => (
            JobQueue::new(Arc::new(queue::MemoryBackend::new()), QueueSettings::from_env()),
            None,
        ),
    };
    let events = EventPublisher::new(Arc::clone(&bus), bridge.clone());

    let client: Arc<dyn CompletionClient> = Arc::new(HttpCompletionClient::from_env(Arc::clone(&storage.config)));
    let mut runtime = assemble(config, storage, client, Arc::new(queue), events);
    runtime.bridge = bridge;
    runtime
}

fn memory_storage() -> Storage {
    Storage::memory(Arc::new(MemoryStore::new()), Arc::new(StaticConfigResolver::new()))
}

pub fn build_router(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn create_app() -> axum::Router {
    let config = Config::from_env();
    let runtime = bootstrap(&config).await;
    build_router(runtime.state)
}
