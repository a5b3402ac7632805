//! Recipient list from a group roster.

use agent_pool::AgentPool;
use herald_core::{dedup_preserving_order, AgentId, GroupId, HeraldError, Result, TargetId};
use tracing::{info, instrument};

/// Fetch the members of `group` as campaign recipients.
///
/// The roster is read through `via` if given, otherwise through the first
/// healthy agent. Automated members are dropped. A failed fetch is
/// returned as is; other agents are not tried.
#[instrument(skip(pool))]
pub async fn fetch_recipients(
    pool: &AgentPool,
    group: GroupId,
    via: Option<AgentId>,
) -> Result<Vec<TargetId>> {
    let agent = match via {
        Some(agent_id) => pool
            .agent(agent_id)
            .ok_or(HeraldError::AgentNotFound { agent_id })?,
        None => pool
            .healthy_agents()
            .into_iter()
            .next()
            .ok_or(HeraldError::NoHealthyAgents)?,
    };

    let members = agent.fetch_roster(group).await?;
    let total = members.len();
    let recipients = dedup_preserving_order(
        members
            .into_iter()
            .filter(|member| !member.automated)
            .map(|member| member.id),
    );

    info!(
        agent_id = %agent.id(),
        members = total,
        recipients = recipients.len(),
        "recipients fetched"
    );
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_pool::testing::ScriptedConnector;
    use herald_core::{Capabilities, Credential, HeraldConfig, Member};
    use std::sync::Arc;

    fn member(id: u64, automated: bool) -> Member {
        Member {
            id: TargetId(id),
            automated,
        }
    }

    async fn pool(connector: &ScriptedConnector, secrets: &[&str]) -> AgentPool {
        let mut config = HeraldConfig::default();
        config.timings.start_stagger_ms = 1;
        let pool = AgentPool::new(Arc::new(connector.clone()), &config);
        pool.start_all(secrets.iter().map(|s| Credential::new(*s)).collect())
            .await
            .unwrap();
        pool
    }

    #[tokio::test(start_paused = true)]
    async fn test_automated_members_and_duplicates_dropped() {
        let connector = ScriptedConnector::new();
        connector.set_roster(
            GroupId(9),
            vec![member(3, false), member(4, true), member(5, false), member(3, false)],
        );
        let pool = pool(&connector, &["a"]).await;

        let recipients = fetch_recipients(&pool, GroupId(9), None).await.unwrap();

        assert_eq!(recipients, vec![TargetId(3), TargetId(5)]);
        assert_eq!(pool.agent(AgentId(0)).unwrap().membership(GroupId(9)), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_retried_elsewhere() {
        let connector = ScriptedConnector::new();
        connector.set_roster(GroupId(9), vec![member(3, false)]);
        connector.fail_roster("a");
        let pool = pool(&connector, &["a", "b"]).await;

        let error = fetch_recipients(&pool, GroupId(9), None).await.unwrap_err();
        assert!(matches!(
            error,
            HeraldError::RosterFetch { agent_id: AgentId(0), .. }
        ));

        let recipients = fetch_recipients(&pool, GroupId(9), Some(AgentId(1)))
            .await
            .unwrap();
        assert_eq!(recipients, vec![TargetId(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_agent_and_missing_capability() {
        let connector = ScriptedConnector::new().with_capabilities(Capabilities {
            account_id: 7,
            display_name: "bot".to_string(),
            can_list_members: false,
            can_open_direct: true,
        });
        connector.set_roster(GroupId(9), vec![member(3, false)]);
        let pool = pool(&connector, &["a"]).await;

        assert!(matches!(
            fetch_recipients(&pool, GroupId(9), Some(AgentId(4))).await,
            Err(HeraldError::AgentNotFound { .. })
        ));
        assert!(matches!(
            fetch_recipients(&pool, GroupId(9), None).await,
            Err(HeraldError::RosterFetch { .. })
        ));
    }
}
