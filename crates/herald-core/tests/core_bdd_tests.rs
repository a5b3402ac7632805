//! BDD Tests for Herald Core

use cucumber::{given, then, when, World};
use herald_core::*;

#[derive(Debug, World)]
#[world(init = Self::new)]
struct CoreWorld {
    last_error: Option<HeraldError>,
    recipient: Option<TargetId>,
    credential: Option<Credential>,
    policy: Option<PartitionPolicy>,
}

impl CoreWorld {
    fn new() -> Self {
        Self {
            last_error: None,
            recipient: None,
            credential: None,
            policy: None,
        }
    }
}

#[when(regex = r#"^I parse the recipient "([^"]*)"$"#)]
async fn when_parse_recipient(world: &mut CoreWorld, input: String) {
    match input.parse::<TargetId>() {
        Ok(id) => world.recipient = Some(id),
        Err(e) => world.last_error = Some(e),
    }
}

#[then("the recipient should be accepted")]
async fn then_recipient_accepted(world: &mut CoreWorld) {
    assert!(world.last_error.is_none());
    assert!(world.recipient.is_some());
}

#[then("I should get an invalid identifier error")]
async fn then_invalid_identifier(world: &mut CoreWorld) {
    assert!(world.recipient.is_none());
    let error = world.last_error.as_ref().unwrap();
    assert!(matches!(error, HeraldError::InvalidIdentifier { .. }));
    assert!(error.to_string().contains("not a decimal id"));
}

#[given(regex = r#"^a credential "([^"]*)"$"#)]
async fn given_credential(world: &mut CoreWorld, secret: String) {
    world.credential = Some(Credential::new(secret));
}

#[then(regex = r#"^its preview should be "([^"]*)"$"#)]
async fn then_preview_is(world: &mut CoreWorld, expected: String) {
    let credential = world.credential.as_ref().unwrap();
    assert_eq!(credential.preview(), expected);
    assert!(!format!("{credential:?}").contains("secretvalue"));
}

#[when(regex = r#"^I parse the policy "([^"]*)"$"#)]
async fn when_parse_policy(world: &mut CoreWorld, input: String) {
    world.policy = input.parse().ok();
}

#[then("the policy should be static")]
async fn then_policy_static(world: &mut CoreWorld) {
    assert_eq!(world.policy, Some(PartitionPolicy::Static));
}

#[tokio::main]
async fn main() {
    CoreWorld::run("tests/features").await;
}
