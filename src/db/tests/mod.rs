use crate::db::Database;
use crate::error::{DatabaseError, Error};
use crate::types::{JobId, JobStatus, NewJob};

async fn test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("in-memory database should open")
}

fn sample_job(name: &str) -> NewJob {
    NewJob {
        filename: name.to_string(),
        url: format!("https://example.com/{}", name),
    }
}

#[tokio::test]
async fn test_insert_creates_pending_job_with_zero_progress() {
    let db = test_db().await;

    let id = db.insert_job(&sample_job("a.bin")).await.unwrap();
    let job = db.get_job(id).await.unwrap().expect("job should exist");

    assert_eq!(job.filename, "a.bin");
    assert_eq!(job.url, "https://example.com/a.bin");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert!(job.content_length.is_none());
}

#[tokio::test]
async fn test_get_missing_job_returns_none() {
    let db = test_db().await;
    let job = db.get_job(JobId(12345)).await.unwrap();
    assert!(job.is_none());
}

#[tokio::test]
async fn test_update_status_and_progress_roundtrip() {
    let db = test_db().await;
    let id = db.insert_job(&sample_job("a.bin")).await.unwrap();

    db.update_job_status(id, JobStatus::Downloading, 35)
        .await
        .unwrap();

    let job = db.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Downloading);
    assert_eq!(job.progress, 35);
}

#[tokio::test]
async fn test_update_missing_job_is_not_found() {
    let db = test_db().await;

    let result = db.update_job_status(JobId(999), JobStatus::Failed, 0).await;
    match result {
        Err(Error::Database(DatabaseError::NotFound(msg))) => {
            assert!(msg.contains("999"), "error should name the id: {}", msg);
        }
        other => panic!("expected NotFound error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_set_content_length_persists() {
    let db = test_db().await;
    let id = db.insert_job(&sample_job("a.bin")).await.unwrap();

    db.set_job_content_length(id, 1000).await.unwrap();

    let job = db.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.content_length, Some(1000));
}

#[tokio::test]
async fn test_list_returns_jobs_in_insertion_order() {
    let db = test_db().await;
    let a = db.insert_job(&sample_job("a.bin")).await.unwrap();
    let b = db.insert_job(&sample_job("b.bin")).await.unwrap();
    let c = db.insert_job(&sample_job("c.bin")).await.unwrap();

    let jobs = db.list_jobs().await.unwrap();
    let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![a, b, c]);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    // Opening the same file twice must not fail on re-running migrations.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");

    let db1 = Database::new(&path).await.unwrap();
    let id = db1.insert_job(&sample_job("a.bin")).await.unwrap();
    drop(db1);

    let db2 = Database::new(&path).await.unwrap();
    let job = db2.get_job(id).await.unwrap();
    assert!(job.is_some(), "records must survive a reopen");
}
