use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::core::EventPublisher;
use crate::db::DatabaseProxy;
use crate::queue::JobQueue;
use crate::services::mastery::MasteryTracker;
use crate::services::notification::ReminderDispatcher;
use crate::services::vocab::VocabService;
use crate::services::vocab_trainer::TrainerService;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db_proxy: Option<Arc<DatabaseProxy>>,
    trainers: Arc<TrainerService>,
    vocabs: Arc<VocabService>,
    mastery: Arc<MasteryTracker>,
    notifications: Arc<ReminderDispatcher>,
    queue: Arc<JobQueue>,
    events: EventPublisher,
}

impl AppState {
    pub fn new(
        db_proxy: Option<Arc<DatabaseProxy>>,
        trainers: Arc<TrainerService>,
        vocabs: Arc<VocabService>,
        mastery: Arc<MasteryTracker>,
        notifications: Arc<ReminderDispatcher>,
        queue: Arc<JobQueue>,
        events: EventPublisher,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db_proxy,
            trainers,
            vocabs,
            mastery,
            notifications,
            queue,
            events,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn trainers(&self) -> Arc<TrainerService> {
        Arc::clone(&self.trainers)
    }

    pub fn vocabs(&self) -> Arc<VocabService> {
        Arc::clone(&self.vocabs)
    }

    pub fn mastery(&self) -> Arc<MasteryTracker> {
        Arc::clone(&self.mastery)
    }

    pub fn notifications(&self) -> Arc<ReminderDispatcher> {
        Arc::clone(&self.notifications)
    }

    pub fn queue(&self) -> Arc<JobQueue> {
        Arc::clone(&self.queue)
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }
}
