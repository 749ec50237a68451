use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{is_valid_cron, SchedulerConfig};
use crate::price_check::{PassReport, PriceChecker};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Option<Uuid>,
    pub cron_expression: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub skipped_count: u64,
    pub last_error: Option<String>,
    pub last_report: Option<PassReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub status: JobStatus,
    pub running: bool,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub skipped_runs: u64,
    pub uptime_seconds: u64,
}

/// Drives the price-check pass on a cron schedule. At most one pass runs at
/// a time; a tick that fires while a pass is in flight is skipped.
pub struct PriceCheckScheduler {
    scheduler: JobScheduler,
    checker: Arc<PriceChecker>,
    job: Arc<RwLock<JobInfo>>,
    running: Arc<AtomicBool>,
    config: SchedulerConfig,
    start_time: DateTime<Utc>,
}

impl PriceCheckScheduler {
    pub async fn new(checker: Arc<PriceChecker>, config: SchedulerConfig) -> Result<Self> {
        if !is_valid_cron(&config.check_interval) {
            return Err(anyhow::anyhow!(
                "Invalid check interval: {}",
                config.check_interval
            ));
        }

        let scheduler = JobScheduler::new().await?;
        let job = JobInfo {
            id: None,
            cron_expression: config.check_interval.clone(),
            status: JobStatus::Idle,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            success_count: 0,
            error_count: 0,
            skipped_count: 0,
            last_error: None,
            last_report: None,
        };

        Ok(Self {
            scheduler,
            checker,
            job: Arc::new(RwLock::new(job)),
            running: Arc::new(AtomicBool::new(false)),
            config,
            start_time: Utc::now(),
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let checker = Arc::clone(&self.checker);
        let job_info = Arc::clone(&self.job);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();

        let job = Job::new_async(self.config.check_interval.as_str(), move |_uuid, _l| {
            let checker = Arc::clone(&checker);
            let job_info = Arc::clone(&job_info);
            let running = Arc::clone(&running);
            let config = config.clone();

            Box::pin(async move {
                if let Err(e) = Self::execute_pass(checker, job_info, running, &config).await {
                    tracing::warn!("Scheduled price check not run: {}", e);
                }
            })
        })?;

        let id = self.scheduler.add(job).await?;
        {
            let mut job_info = self.job.write().await;
            job_info.id = Some(id);
            job_info.status = JobStatus::Active;
        }

        self.scheduler.start().await?;
        tracing::info!(
            "Price check scheduler started with interval: {}",
            self.config.check_interval
        );
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        self.job.write().await.status = JobStatus::Idle;
        tracing::info!("Price check scheduler shutdown");
        Ok(())
    }

    /// Runs a pass immediately, outside of the schedule.
    pub async fn run_now(&self) -> Result<PassReport> {
        tracing::info!("Running immediate price check");
        Self::execute_pass(
            Arc::clone(&self.checker),
            Arc::clone(&self.job),
            Arc::clone(&self.running),
            &self.config,
        )
        .await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn job_info(&self) -> JobInfo {
        self.job.read().await.clone()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let job = self.job.read().await;
        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            status: job.status.clone(),
            running: self.is_running(),
            completed_runs: job.success_count,
            failed_runs: job.error_count,
            skipped_runs: job.skipped_count,
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    async fn execute_pass(
        checker: Arc<PriceChecker>,
        job_info: Arc<RwLock<JobInfo>>,
        running: Arc<AtomicBool>,
        config: &SchedulerConfig,
    ) -> Result<PassReport> {
        if running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            job_info.write().await.skipped_count += 1;
            metrics::counter!("price_check_skipped_total").increment(1);
            return Err(anyhow::anyhow!("A price check pass is already running"));
        }

        tracing::debug!("Starting price check pass");
        let result = checker.run_with_deadline(config.pass_deadline()).await;
        running.store(false, Ordering::SeqCst);

        let mut job = job_info.write().await;
        job.last_run = Some(Utc::now());
        job.run_count += 1;

        match result {
            Ok(report) => {
                tracing::info!(
                    "Completed price check: {} items, {} changes detected in {}ms",
                    report.items_scanned,
                    report.changes_detected(),
                    report.total_time_ms
                );
                job.success_count += 1;
                job.last_error = None;
                job.last_report = Some(report.clone());
                if job.status == JobStatus::Error {
                    job.status = JobStatus::Active;
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Price check pass failed: {}", e);
                job.error_count += 1;
                job.last_error = Some(e.to_string());
                job.status = JobStatus::Error;
                Err(e.into())
            }
        }
    }
}
