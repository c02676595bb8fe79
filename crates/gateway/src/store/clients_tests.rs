// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use drover_protocol::sign;

use super::*;
use crate::store::Store;

fn store() -> Store {
    #[allow(clippy::expect_used)]
    Store::open_in_memory().expect("open in-memory store")
}

#[tokio::test]
async fn token_is_stored_hashed_and_looked_up_by_hash() -> anyhow::Result<()> {
    let store = store();
    let created = store.create_client("builder-1").await?;
    let (row, token) = created.ok_or_else(|| anyhow::anyhow!("create failed"))?;

    assert_ne!(row.token_hash, token);
    assert_eq!(row.token_hash, sign::token_sha256_hex(&token));

    let found = store.get_client_by_token_hash(&sign::token_sha256_hex(&token)).await?;
    assert_eq!(found.map(|c| c.id), Some(row.id));
    Ok(())
}

#[tokio::test]
async fn duplicate_display_name_is_rejected() -> anyhow::Result<()> {
    let store = store();
    assert!(store.create_client("worker").await?.is_some());
    assert!(store.create_client("worker").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn rotation_invalidates_the_old_token() -> anyhow::Result<()> {
    let store = store();
    let (row, old_token) = store
        .create_client("rotating")
        .await?
        .ok_or_else(|| anyhow::anyhow!("create failed"))?;

    let new_token = store
        .rotate_client_token(&row.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("rotate failed"))?;
    assert_ne!(new_token, old_token);

    assert!(store
        .get_client_by_token_hash(&sign::token_sha256_hex(&old_token))
        .await?
        .is_none());
    assert!(store
        .get_client_by_token_hash(&sign::token_sha256_hex(&new_token))
        .await?
        .is_some());

    assert!(store.rotate_client_token("unknown").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn registration_updates_identity_and_last_seen() -> anyhow::Result<()> {
    let store = store();
    let (row, _) = store
        .create_client("reg")
        .await?
        .ok_or_else(|| anyhow::anyhow!("create failed"))?;

    store
        .register_client(&row.id, ClientRegistration {
            agent_id: Some("host-ab12cd34".to_owned()),
            version: Some("0.4.2".to_owned()),
            capabilities: Some(vec!["claude".to_owned(), "rev".to_owned()]),
        })
        .await?;

    let clients = store.list_clients().await?;
    let reloaded = clients
        .iter()
        .find(|c| c.id == row.id)
        .ok_or_else(|| anyhow::anyhow!("client missing"))?;
    assert_eq!(reloaded.agent_id.as_deref(), Some("host-ab12cd34"));
    assert_eq!(reloaded.capabilities, vec!["claude", "rev"]);
    assert!(reloaded.last_seen_at.is_some());

    // Heartbeat with empty patch keeps identity fields.
    store.register_client(&row.id, ClientRegistration::default()).await?;
    let clients = store.list_clients().await?;
    let again = clients
        .iter()
        .find(|c| c.id == row.id)
        .ok_or_else(|| anyhow::anyhow!("client missing"))?;
    assert_eq!(again.agent_id.as_deref(), Some("host-ab12cd34"));
    Ok(())
}

#[test]
fn derived_status_thresholds() {
    let row = ClientRow {
        id: "c".into(),
        display_name: "c".into(),
        agent_id: None,
        token_hash: String::new(),
        last_seen_at: None,
        version: None,
        capabilities: vec![],
        created_at: 0,
    };
    let now = 1_000_000;
    assert_eq!(row.status(now), "offline");

    let fresh = ClientRow { last_seen_at: Some(now - 5_000), ..row.clone() };
    assert_eq!(fresh.status(now), "online");

    let stale = ClientRow { last_seen_at: Some(now - 60_000), ..row.clone() };
    assert_eq!(stale.status(now), "degraded");

    let gone = ClientRow { last_seen_at: Some(now - 600_000), ..row };
    assert_eq!(gone.status(now), "offline");
}
