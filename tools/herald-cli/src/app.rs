//! Wiring shared by the subcommands and the interactive menu.

use agent_pool::AgentPool;
use anyhow::Context;
use delivery_campaign::{fetch_recipients, Campaign, CampaignRunner, OutcomeSink};
use herald_core::{
    Credential, GroupId, HeraldConfig, Message, OutcomeEvent, PartitionPolicy, SessionConnector,
    TargetId,
};
use run_report::{ReportAggregator, RunReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::recipients::RecipientStore;

/// Per-run campaign options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Fetch recipients from this group first instead of using the stored list.
    pub group: Option<GroupId>,
    pub policy: Option<PartitionPolicy>,
    pub parallel: Option<bool>,
}

pub struct App {
    config: HeraldConfig,
    pool: Arc<AgentPool>,
    runner: CampaignRunner,
    recipients: RecipientStore,
    report_path: PathBuf,
}

impl App {
    pub fn new(
        config: HeraldConfig,
        connector: Arc<dyn SessionConnector>,
        recipients: RecipientStore,
        report_path: PathBuf,
    ) -> Self {
        let pool = Arc::new(AgentPool::new(connector, &config));
        let runner = CampaignRunner::new(Arc::clone(&pool), &config.campaign);
        Self {
            config,
            pool,
            runner,
            recipients,
            report_path,
        }
    }

    pub fn pool(&self) -> &Arc<AgentPool> {
        &self.pool
    }

    pub fn recipients(&self) -> &RecipientStore {
        &self.recipients
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Start every agent and the health monitor.
    pub async fn start(&self, credentials: Vec<Credential>) -> anyhow::Result<usize> {
        let ready = self
            .pool
            .start_all(credentials)
            .await
            .context("no agent could be started")?;
        self.pool.spawn_health_monitor();
        Ok(ready)
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Fetch `group`'s roster and merge it into the stored recipients.
    /// Returns the fetched recipients.
    pub async fn fetch(&self, group: GroupId) -> anyhow::Result<Vec<TargetId>> {
        let fetched = fetch_recipients(&self.pool, group, None)
            .await
            .with_context(|| format!("failed to fetch members of group {group}"))?;
        self.recipients.save(&fetched)?;
        Ok(fetched)
    }

    /// Run one campaign and write its report. Returns the report.
    pub async fn send(
        &self,
        message: Message,
        options: SendOptions,
        cancel: CancellationToken,
    ) -> anyhow::Result<RunReport> {
        let targets = match options.group {
            Some(group) => self.fetch(group).await?,
            None => self.recipients.load()?,
        };

        let mut settings = self.config.campaign.clone();
        if let Some(policy) = options.policy {
            settings.policy = policy;
        }
        if let Some(parallel) = options.parallel {
            settings.parallel = parallel;
        }
        let campaign = Campaign::from_settings(targets, message, &settings);

        let mut aggregator = ReportAggregator::new();
        if let Some(group) = options.group {
            aggregator = aggregator.with_group(group);
        }
        let (sink, mut events) = OutcomeSink::channel();
        let collector = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let OutcomeEvent::Failed { target, reason, .. } = &event {
                    info!(%target, %reason, "recipient failed");
                }
                aggregator.observe(&event);
            }
            aggregator
        });

        let outcome = self.runner.run_until(campaign, sink, cancel).await?;
        let aggregator = collector.await.context("report collector stopped")?;

        let report = aggregator.finish(&self.pool.snapshots());
        report
            .write_json(&self.report_path)
            .with_context(|| format!("failed to write report to {}", self.report_path.display()))?;
        info!(state = %outcome.state, sent = outcome.sent, failed = outcome.failed, "campaign finished");
        Ok(report)
    }
}
