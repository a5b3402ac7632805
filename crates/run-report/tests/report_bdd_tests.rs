//! BDD Tests for run reports

use cucumber::{given, then, when, World};
use herald_core::{
    AgentId, CampaignState, DeliveryError, OutcomeEvent, PartitionPolicy, TargetId,
};
use run_report::*;
use tempfile::TempDir;

#[derive(Debug, World)]
#[world(init = Self::new)]
struct ReportWorld {
    aggregator: Option<ReportAggregator>,
    sent: u64,
    failed: u64,
    report: Option<RunReport>,
    dir: TempDir,
    written: Option<serde_json::Value>,
}

impl ReportWorld {
    fn new() -> Self {
        Self {
            aggregator: Some(ReportAggregator::new()),
            sent: 0,
            failed: 0,
            report: None,
            dir: tempfile::tempdir().unwrap(),
            written: None,
        }
    }

    fn observe(&mut self, event: OutcomeEvent) {
        self.aggregator
            .as_mut()
            .expect("campaign should still be running")
            .observe(&event);
    }

    fn record(&self, agent: usize) -> &AgentRecord {
        self.report
            .as_ref()
            .expect("campaign should have finished")
            .agents
            .iter()
            .find(|record| record.agent_id == AgentId(agent))
            .expect("agent should be in the report")
    }
}

#[given(expr = "a campaign over {int} recipients with agents {int} and {int}")]
async fn given_campaign(world: &mut ReportWorld, total: usize, first: usize, second: usize) {
    world.observe(OutcomeEvent::Started {
        campaign_id: uuid::Uuid::new_v4(),
        total_targets: total,
        policy: PartitionPolicy::Dynamic,
        agents: vec![AgentId(first), AgentId(second)],
        assigned: Vec::new(),
    });
}

#[when(expr = "agent {int} delivers to recipient {int}")]
async fn when_delivered(world: &mut ReportWorld, agent: usize, target: u64) {
    world.sent += 1;
    world.observe(OutcomeEvent::Delivered {
        agent: AgentId(agent),
        target: TargetId(target),
    });
}

#[when(expr = "agent {int} fails recipient {int} as forbidden")]
async fn when_failed(world: &mut ReportWorld, agent: usize, target: u64) {
    world.failed += 1;
    world.observe(OutcomeEvent::Failed {
        agent: Some(AgentId(agent)),
        target: TargetId(target),
        reason: DeliveryError::Forbidden,
    });
}

#[when(expr = "agent {int} fails recipients {int} to {int} as forbidden")]
async fn when_failed_range(world: &mut ReportWorld, agent: usize, first: u64, last: u64) {
    for target in first..=last {
        when_failed(world, agent, target).await;
    }
}

#[when("the campaign finishes")]
async fn when_finished(world: &mut ReportWorld) {
    world.observe(OutcomeEvent::Finished {
        campaign_id: uuid::Uuid::nil(),
        state: CampaignState::Completed,
        sent: world.sent,
        failed: world.failed,
    });
    let aggregator = world.aggregator.take().unwrap();
    world.report = Some(aggregator.finish(&[]));
}

#[when("the report is written to disk")]
async fn when_written(world: &mut ReportWorld) {
    let path = world.dir.path().join("report.json");
    world.report.as_ref().unwrap().write_json(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    world.written = Some(serde_json::from_str(&contents).unwrap());
}

#[then(expr = "the report should count {int} sent and {int} failed")]
async fn then_totals(world: &mut ReportWorld, sent: u64, failed: u64) {
    let report = world.report.as_ref().unwrap();
    assert_eq!((report.sent, report.failed), (sent, failed));
}

#[then(expr = "agent {int} should have {int} sent")]
async fn then_agent_sent(world: &mut ReportWorld, agent: usize, sent: u64) {
    assert_eq!(world.record(agent).sent, sent);
}

#[then(expr = "agent {int} should have {int} error(s)")]
async fn then_agent_errors(world: &mut ReportWorld, agent: usize, errors: usize) {
    assert_eq!(world.record(agent).errors.len(), errors);
}

#[then(regex = r#"^the written report should have state "([^"]*)"$"#)]
async fn then_written_state(world: &mut ReportWorld, state: String) {
    let written = world.written.as_ref().unwrap();
    assert_eq!(written["state"]["state"], state.as_str());
    assert_eq!(written["agents"][1]["sent"], 1);
}

#[tokio::main]
async fn main() {
    ReportWorld::run("tests/features").await;
}
