//! BDD Tests for the Herald CLI building blocks

use cucumber::{given, then, when, World};
use herald_cli::*;
use herald_core::{Credential, HeraldConfig, Message, TargetId};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, World)]
#[world(init = Self::new)]
struct CliWorld {
    dir: TempDir,
    loaded: Option<anyhow::Result<Vec<Credential>>>,
    report: Option<serde_json::Value>,
}

impl CliWorld {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            loaded: None,
            report: None,
        }
    }

    fn store(&self) -> RecipientStore {
        RecipientStore::new(self.dir.path().join("recipients.txt"))
    }
}

fn ids(list: &str) -> Vec<TargetId> {
    list.split(',').map(|id| id.parse().unwrap()).collect()
}

#[given(regex = r#"^a credentials file containing "([^"]*)"$"#)]
async fn given_credentials_file(world: &mut CliWorld, contents: String) {
    let contents = contents.replace("\\n", "\n");
    std::fs::write(world.dir.path().join("credentials.txt"), contents).unwrap();
}

#[when("I load the credentials")]
async fn when_load_credentials(world: &mut CliWorld) {
    world.loaded = Some(load_credentials(&world.dir.path().join("credentials.txt")));
}

#[then(expr = "{int} credentials should be loaded")]
async fn then_credentials_loaded(world: &mut CliWorld, count: usize) {
    let loaded = world.loaded.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(loaded.len(), count);
}

#[then("loading should fail")]
async fn then_loading_fails(world: &mut CliWorld) {
    assert!(world.loaded.as_ref().unwrap().is_err());
}

#[given(regex = r#"^stored recipients "([^"]*)"$"#)]
async fn given_stored(world: &mut CliWorld, list: String) {
    world.store().save(&ids(&list)).unwrap();
}

#[when(regex = r#"^I save recipients "([^"]*)"$"#)]
async fn when_save(world: &mut CliWorld, list: String) {
    world.store().save(&ids(&list)).unwrap();
}

#[then(regex = r#"^the recipient file should read "([^"]*)"$"#)]
async fn then_file_reads(world: &mut CliWorld, list: String) {
    let contents = std::fs::read_to_string(world.store().path()).unwrap();
    assert_eq!(contents, format!("{}\n", list.replace(',', "\n")));
}

#[when(regex = r#"^I send "([^"]*)" with credentials "([^"]*)"$"#)]
async fn when_send(world: &mut CliWorld, message: String, secrets: String) {
    let mut config = HeraldConfig::default();
    config.timings.start_stagger_ms = 1;
    config.timings.shutdown_grace_ms = 1;
    config.campaign.pacing_min_ms = 1;
    config.campaign.pacing_max_ms = 2;
    let report_path = world.dir.path().join("report.json");

    let app = App::new(
        config,
        Arc::new(LoopbackConnector::new().with_latency(Duration::from_millis(1))),
        world.store(),
        report_path.clone(),
    );
    app.start(parse_credentials(&secrets)).await.unwrap();
    app.send(
        Message::new(message),
        SendOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    app.shutdown().await;

    let written = std::fs::read_to_string(report_path).unwrap();
    world.report = Some(serde_json::from_str(&written).unwrap());
}

#[then(expr = "the report should show {int} sent")]
async fn then_report_sent(world: &mut CliWorld, sent: u64) {
    assert_eq!(world.report.as_ref().unwrap()["sent"], sent);
}

#[tokio::main]
async fn main() {
    CliWorld::run("tests/features").await;
}
