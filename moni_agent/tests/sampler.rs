//! Sampler ticks against a scripted host and a real on-disk store.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::FakeHost;
use moni_agent::host::HostStats;
use moni_agent::sampler::{spawn_sampler, SampleError, Sampler};
use moni_agent::store::{Store, RETENTION_CAP};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

const T0: i64 = 1_700_000_000;

async fn setup() -> (tempfile::TempDir, Arc<FakeHost>, Arc<Store>, Sampler) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        Store::open(dir.path().join("metrics.db"))
            .await
            .expect("open store"),
    );
    let host = Arc::new(FakeHost::new());
    let sampler = Sampler::new(
        Arc::clone(&host) as Arc<dyn HostStats>,
        Arc::clone(&store),
        "/",
    );
    (dir, host, store, sampler)
}

fn stamps(points: &[moni_agent::types::DataPoint]) -> Vec<i64> {
    points.iter().map(|p| p.timestamp).collect()
}

#[tokio::test]
async fn five_ticks_give_five_ascending_points() {
    let (_dir, _host, store, sampler) = setup().await;
    for i in 0..5 {
        let point = sampler.sample_at(T0 + i).await.expect("tick");
        assert_eq!(point.timestamp, T0 + i);
        assert_eq!(point.cpu_percent, 12.5);
        assert_eq!(point.mem_percent, 25.0);
        assert_eq!(point.disk_percent, 40.0);
        assert_eq!(point.load_avg.load5, 0.75);
    }
    assert_eq!(store.len().await.unwrap(), 5);

    let last_three = store.recent(3).await.unwrap();
    assert_eq!(stamps(&last_three), vec![T0 + 2, T0 + 3, T0 + 4]);
}

#[tokio::test]
async fn failed_reading_skips_the_tick() {
    let (_dir, host, store, sampler) = setup().await;
    for i in 0..5 {
        host.set_fail_cpu(i == 2);
        let outcome = sampler.sample_at(T0 + i).await;
        if i == 2 {
            assert!(matches!(
                outcome,
                Err(SampleError::Skipped { reading: "cpu", .. })
            ));
        } else {
            outcome.expect("tick");
        }
    }
    assert_eq!(store.len().await.unwrap(), 4);
    let all = store.recent(10).await.unwrap();
    assert_eq!(stamps(&all), vec![T0, T0 + 1, T0 + 3, T0 + 4]);
}

#[tokio::test]
async fn disk_failure_also_skips() {
    let (_dir, host, store, sampler) = setup().await;
    host.fail_disk.store(true, Ordering::SeqCst);
    let err = sampler.sample_at(T0).await.unwrap_err();
    assert!(matches!(err, SampleError::Skipped { reading: "disk", .. }), "{err}");
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn hundred_fifty_ticks_keep_the_last_hundred() {
    let (_dir, _host, store, sampler) = setup().await;
    for i in 0..150 {
        sampler.sample_at(T0 + i).await.expect("tick");
    }
    let kept = store.recent(1_000).await.unwrap();
    assert_eq!(kept.len(), RETENTION_CAP);
    assert_eq!(kept[0].timestamp, T0 + 50);
    assert_eq!(kept.last().map(|p| p.timestamp), Some(T0 + 149));
}

async fn wait_for_points(store: &Store, at_least: usize, timeout: Duration) -> usize {
    let start = Instant::now();
    loop {
        let n = store.len().await.unwrap();
        if n >= at_least || start.elapsed() >= timeout {
            return n;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn background_loop_records_and_survives_failures() {
    let (_dir, host, store, sampler) = setup().await;
    host.set_fail_cpu(true);
    let task = spawn_sampler(Arc::new(sampler), Duration::from_millis(20));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.len().await.unwrap(), 0, "failed ticks must not write");

    host.set_fail_cpu(false);
    let n = wait_for_points(&store, 1, Duration::from_secs(3)).await;
    assert!(n >= 1, "loop stopped after failed ticks");

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
}

// Side connection to the same file, used to break and repair the table
// underneath a live store.
async fn side_pool(store: &Store) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(store.path()))
        .await
        .expect("side connection")
}

const RECREATE_TABLE: &str =
    "CREATE TABLE Metrics (key BLOB PRIMARY KEY NOT NULL, value BLOB NOT NULL) WITHOUT ROWID";

#[tokio::test]
async fn failed_write_is_reported_and_next_tick_records() {
    let (_dir, _host, store, sampler) = setup().await;
    sampler.sample_at(T0).await.expect("tick");

    let side = side_pool(&store).await;
    sqlx::query("DROP TABLE Metrics").execute(&side).await.unwrap();

    let err = sampler.sample_at(T0 + 1).await.unwrap_err();
    assert!(matches!(err, SampleError::Storage(_)), "{err}");

    sqlx::query(RECREATE_TABLE).execute(&side).await.unwrap();
    side.close().await;

    sampler.sample_at(T0 + 2).await.expect("tick after repair");
    let points = store.recent(10).await.unwrap();
    assert_eq!(stamps(&points), vec![T0 + 2]);
}

#[tokio::test]
async fn background_loop_survives_write_failures() {
    let (_dir, _host, store, sampler) = setup().await;
    let side = side_pool(&store).await;
    sqlx::query("DROP TABLE Metrics").execute(&side).await.unwrap();

    let task = spawn_sampler(Arc::new(sampler), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!task.is_finished(), "loop exited on a write failure");

    sqlx::query(RECREATE_TABLE).execute(&side).await.unwrap();
    side.close().await;
    let n = wait_for_points(&store, 1, Duration::from_secs(3)).await;
    assert!(n >= 1, "loop stopped after failed writes");

    task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_only_see_committed_bounded_history() {
    let (_dir, _host, store, sampler) = setup().await;
    let sampler = Arc::new(sampler);

    let writer = {
        let sampler = Arc::clone(&sampler);
        tokio::spawn(async move {
            for i in 0..300 {
                sampler.sample_at(T0 + i).await.expect("tick");
            }
        })
    };

    loop {
        let done = writer.is_finished();
        let points = store.recent(1_000).await.expect("concurrent read");
        assert!(points.len() <= RETENTION_CAP, "saw {} rows", points.len());
        assert!(
            points.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            "out of order: {:?}",
            stamps(&points)
        );
        if done {
            break;
        }
    }
    writer.await.unwrap();

    let points = store.recent(1_000).await.unwrap();
    assert_eq!(points.len(), RETENTION_CAP);
    assert_eq!(points[0].timestamp, T0 + 200);
}
