//! End-to-end coverage against an in-memory SQLite database reached through
//! `sqlx::Any`, exercising the client/runner/pool/transaction path together
//! rather than mocking any of it (spec §8 scenario 6, §4.4-§4.6).

use sqlkit::{ClientConfig, Value};

async fn connect() -> sqlkit::Client {
    let mut config = ClientConfig::new("sqlite", "sqlite::memory:");
    // A bare `sqlite::memory:` DSN opens an independent, throwaway database
    // per physical connection; pinning the pool to exactly one connection is
    // what makes the table created below visible to every later acquire.
    config.pool.min = 1;
    config.pool.max = 1;
    let client = sqlkit::Client::connect(config).await.unwrap();
    client
        .schema_raw(
            "create table users (id integer primary key autoincrement, name text not null, role text)",
        )
        .run()
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn insert_then_select_round_trips_a_row() {
    let client = connect().await;

    let affected = client
        .insert("users", vec![vec![("name".to_string(), Value::Text("Alice".to_string()))]])
        .affected()
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let rows = client.table("users").rows().await.unwrap();
    assert_eq!(rows.len(), 1);
    let (_, name) = rows[0].iter().find(|(c, _)| c == "name").unwrap();
    assert_eq!(*name, Value::Text("Alice".to_string()));
}

#[tokio::test]
async fn pluck_projects_a_single_column() {
    let client = connect().await;
    client
        .insert(
            "users",
            vec![
                vec![("name".to_string(), Value::Text("Alice".to_string()))],
                vec![("name".to_string(), Value::Text("Bob".to_string()))],
            ],
        )
        .run()
        .await
        .unwrap();

    let names = client.table("users").pluck("name").await.unwrap();
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn first_returns_none_on_an_empty_table() {
    let client = connect().await;
    let row = client.table("users").first().await.unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn transaction_rolls_back_on_scope_error_leaving_no_rows() {
    let client = connect().await;

    let result: Result<Option<()>, sqlkit::Error> = client
        .transaction(|mut tx| {
            Box::pin(async move {
                tx.insert("users", vec![vec![("name".to_string(), Value::Text("Carl".to_string()))]])
                    .run()
                    .await?;
                Err(sqlkit::Error::Transaction("force rollback".to_string()))
            })
        })
        .await;

    assert!(result.is_err());
    let rows = client.table("users").rows().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn transaction_commits_on_scope_success() {
    let client = connect().await;

    client
        .transaction(|mut tx| {
            Box::pin(async move {
                tx.insert("users", vec![vec![("name".to_string(), Value::Text("Dana".to_string()))]])
                    .run()
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    let rows = client.table("users").rows().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn savepoint_rollback_reverts_only_nested_work() {
    let client = connect().await;

    client
        .transaction(|mut tx| {
            Box::pin(async move {
                tx.insert("users", vec![vec![("name".to_string(), Value::Text("Eve".to_string()))]])
                    .run()
                    .await?;
                let sp = tx.savepoint().await?;
                tx.insert("users", vec![vec![("name".to_string(), Value::Text("Frank".to_string()))]])
                    .run()
                    .await?;
                tx.rollback_to_savepoint(&sp).await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    let rows = client.table("users").rows().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn begin_yields_a_manually_driven_handle_that_commits() {
    let client = connect().await;

    let mut tx = client.begin().await.unwrap();
    tx.insert("users", vec![vec![("name".to_string(), Value::Text("Grace".to_string()))]])
        .run()
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let rows = client.table("users").rows().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn begin_yields_a_manually_driven_handle_that_rolls_back() {
    let client = connect().await;

    let mut tx = client.begin().await.unwrap();
    tx.insert("users", vec![vec![("name".to_string(), Value::Text("Heidi".to_string()))]])
        .run()
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let rows = client.table("users").rows().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn timeout_does_not_interfere_with_a_query_that_finishes_in_time() {
    let client = connect().await;
    client
        .insert("users", vec![vec![("name".to_string(), Value::Text("Ivy".to_string()))]])
        .timeout(5_000)
        .run()
        .await
        .unwrap();

    let rows = client.table("users").timeout(5_000).rows().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn pool_stats_return_to_baseline_after_chain_resolves() {
    let client = connect().await;
    let baseline = client.pool_stats().in_use;

    client.table("users").rows().await.unwrap();

    assert_eq!(client.pool_stats().in_use, baseline);
}
