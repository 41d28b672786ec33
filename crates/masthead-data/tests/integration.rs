//! Postgres-backed store checks. Skipped when no database can be provisioned.

use anyhow::Result;
use masthead_data::{
    AssetStore, ConnectivityProbe, DataError, DbOptions, ExtensionStore, GroupStore, PURGE_ALL,
    PgProbe, PgStore, ROOT_ASSET, SessionStore, run_migrations,
};
use masthead_test_support::postgres::start_postgres;
use serde_json::json;
use sqlx::PgPool;

async fn connect() -> Result<Option<(masthead_test_support::postgres::TestDatabase, PgStore)>> {
    let db = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping postgres store checks: {err}");
            return Ok(None);
        }
    };
    let pool = PgPool::connect(db.connection_string()).await?;
    run_migrations(&pool).await?;
    Ok(Some((db, PgStore::new(pool))))
}

#[tokio::test]
async fn asset_tree_round_trip() -> Result<()> {
    let Some((_db, store)) = connect().await? else {
        return Ok(());
    };

    let root = store
        .fetch_by_name(ROOT_ASSET)
        .await?
        .expect("root asset seeded by migrations");
    assert!(root.parent_id.is_none());

    let rules = json!({"core.admin": {"8": true}});
    store.save_rules("com_pages", &rules).await?;

    let chain = store.fetch_chain("com_pages").await?;
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].name, ROOT_ASSET);
    assert_eq!(chain[1].name, "com_pages");
    assert_eq!(chain[1].parent_id, Some(root.id));
    assert_eq!(chain[1].rules, rules);

    // Saving again replaces the document in place.
    let updated = json!({"core.admin": {"8": false}});
    store.save_rules("com_pages", &updated).await?;
    let fetched = store
        .fetch_by_name("com_pages")
        .await?
        .expect("asset persists");
    assert_eq!(fetched.rules, updated);

    assert!(store.fetch_chain("com_absent").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn extension_params_round_trip() -> Result<()> {
    let Some((_db, store)) = connect().await? else {
        return Ok(());
    };

    assert_eq!(store.fetch_params("com_filters").await?, None);

    let params = json!({"filters": {"1": {"mode": "blacklist"}}});
    store.save_params("com_filters", &params).await?;
    assert_eq!(store.fetch_params("com_filters").await?, Some(params));

    let replaced = json!({"filters": {}});
    store.save_params("com_filters", &replaced).await?;
    assert_eq!(store.fetch_params("com_filters").await?, Some(replaced));
    Ok(())
}

#[tokio::test]
async fn session_purge_honours_age_and_sentinel() -> Result<()> {
    let Some((_db, store)) = connect().await? else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO sessions (session_id, user_id, last_activity)
         VALUES ('fresh', 1, now()), ('stale', 2, now() - interval '2 hours')",
    )
    .execute(store.pool())
    .await?;

    let removed = store.purge(3600).await?;
    assert_eq!(removed, 1);

    let removed = store.purge(PURGE_ALL).await?;
    assert_eq!(removed, 1);
    Ok(())
}

#[tokio::test]
async fn connectivity_probe_fetches_the_server_version() -> Result<()> {
    let Some((db, _store)) = connect().await? else {
        return Ok(());
    };

    let parsed = url::Url::parse(db.connection_string())?;
    let options = DbOptions {
        host: parsed.host_str().unwrap_or("127.0.0.1").to_string(),
        port: parsed.port().unwrap_or(5432),
        database: parsed.path().trim_start_matches('/').to_string(),
        username: parsed.username().to_string(),
        password: parsed.password().unwrap_or_default().to_string(),
    };
    PgProbe.probe(&options).await?;

    let bad = DbOptions {
        database: "masthead_db_absent".to_string(),
        ..options
    };
    assert!(matches!(
        PgProbe.probe(&bad).await,
        Err(DataError::ConnectFailed { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn group_membership_lookup() -> Result<()> {
    let Some((_db, store)) = connect().await? else {
        return Ok(());
    };

    sqlx::query("INSERT INTO user_group_map (user_id, group_id) VALUES (42, 8), (42, 2), (7, 2)")
        .execute(store.pool())
        .await?;

    assert_eq!(store.groups_for_user(42).await?, vec![2, 8]);
    assert_eq!(store.groups_for_user(99).await?, Vec::<i64>::new());
    Ok(())
}
