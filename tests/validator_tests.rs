//! End-to-end validator scenarios over the in-memory storage.

use std::sync::Arc;
use std::time::Duration;

use token_guard::credential::NewCredential;
use token_guard::error::ValidationError;
use token_guard::stats::StatsAggregator;
use token_guard::storage::MemoryStorage;
use token_guard::token::Key;
use token_guard::validator::Validator;

fn validator_over(storage: Arc<MemoryStorage>, capacity: usize) -> Validator {
    Validator::new(
        storage,
        Arc::new(StatsAggregator::new()),
        capacity,
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let storage = Arc::new(MemoryStorage::new());
    let key = Key::generate().unwrap();
    storage
        .create(
            &key,
            NewCredential {
                user: "admin".into(),
                host: "*.example.com".into(),
                path: "/**".into(),
                ..NewCredential::default()
            },
        )
        .unwrap();
    let validator = validator_over(storage, 16);
    let token = key.to_string();

    let identity = validator
        .validate("a.example.com", "/x", &token)
        .await
        .unwrap();
    assert_eq!(identity.user, "admin");

    assert!(matches!(
        validator.validate("example.com", "/x", &token).await,
        Err(ValidationError::AccessDenied)
    ));

    // Same public id, wrong payload: structurally valid, denied.
    let mut forged = data_encoding::BASE32_NOPAD.decode(token.as_bytes()).unwrap();
    for byte in forged.iter_mut().skip(8) {
        *byte = byte.wrapping_add(1);
    }
    let forged_token = data_encoding::BASE32_NOPAD.encode(&forged);
    assert!(matches!(
        validator
            .validate("a.example.com", "/x", &forged_token)
            .await,
        Err(ValidationError::AccessDenied)
    ));

    assert!(matches!(
        validator.validate("a.example.com", "/x", "tooshort").await,
        Err(ValidationError::MalformedToken(_))
    ));
}

#[tokio::test]
async fn test_path_restricted_credential() {
    let storage = Arc::new(MemoryStorage::new());
    let broad = Key::generate().unwrap();
    let narrow = Key::generate().unwrap();
    storage
        .create(
            &broad,
            NewCredential {
                user: "admin".into(),
                path: "/**".into(),
                ..NewCredential::default()
            },
        )
        .unwrap();
    storage
        .create(
            &narrow,
            NewCredential {
                user: "user".into(),
                path: "/hello".into(),
                ..NewCredential::default()
            },
        )
        .unwrap();
    let validator = validator_over(storage, 16);

    assert!(validator
        .validate("any.host", "/something", &broad.to_string())
        .await
        .is_ok());
    assert!(validator
        .validate("any.host", "/hello", &narrow.to_string())
        .await
        .is_ok());
    assert!(validator
        .validate("any.host", "/something", &narrow.to_string())
        .await
        .is_err());
}

#[tokio::test]
async fn test_invalidate_bypasses_fresh_cache() {
    let storage = Arc::new(MemoryStorage::new());
    let key = Key::generate().unwrap();
    storage
        .create(&key, NewCredential::default())
        .unwrap();
    let validator = validator_over(storage.clone(), 16);
    let token = key.to_string();

    validator.validate("h", "/", &token).await.unwrap();
    validator.validate("h", "/", &token).await.unwrap();
    assert_eq!(storage.find_calls(), 1);

    validator.invalidate(key.id());
    validator.validate("h", "/", &token).await.unwrap();
    assert_eq!(storage.find_calls(), 2);
}

#[tokio::test]
async fn test_lru_eviction_causes_refetch() {
    let storage = Arc::new(MemoryStorage::new());
    let first = Key::generate().unwrap();
    let second = Key::generate().unwrap();
    for key in [&first, &second] {
        storage.create(key, NewCredential::default()).unwrap();
    }
    let validator = validator_over(storage.clone(), 1);

    validator.validate("h", "/", &first.to_string()).await.unwrap();
    validator
        .validate("h", "/", &second.to_string())
        .await
        .unwrap();
    assert_eq!(storage.find_calls(), 2);

    // First was evicted by capacity, so it reads through again.
    validator.validate("h", "/", &first.to_string()).await.unwrap();
    assert_eq!(storage.find_calls(), 3);
}

#[tokio::test]
async fn test_storage_outage_fails_closed_and_recovers() {
    let storage = Arc::new(MemoryStorage::new());
    let key = Key::generate().unwrap();
    storage.create(&key, NewCredential::default()).unwrap();
    let validator = validator_over(storage.clone(), 16);
    let token = key.to_string();

    storage.set_fail_reads(true);
    assert!(matches!(
        validator.validate("h", "/", &token).await,
        Err(ValidationError::StorageUnavailable(_))
    ));

    // The failure did not poison the cache with a negative entry.
    storage.set_fail_reads(false);
    assert!(validator.validate("h", "/", &token).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_flush_as_one_batch() {
    let storage = Arc::new(MemoryStorage::new());
    let key = Key::generate().unwrap();
    let cred = storage.create(&key, NewCredential::default()).unwrap();

    let stats = Arc::new(StatsAggregator::new());
    let validator = Arc::new(Validator::new(
        storage.clone(),
        stats.clone(),
        16,
        Duration::from_secs(60),
    ));
    let token = key.to_string();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let validator = validator.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                validator.validate("h", "/", &token).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let before_flush = chrono::Utc::now();
    stats.flush(storage.as_ref()).await.unwrap();
    assert_eq!(storage.update_calls(), 1);

    let record = storage.get(key.id()).unwrap();
    assert_eq!(record.id, cred.id);
    assert_eq!(record.requests, 200);
    let last_access = record.last_access_at.unwrap();
    assert!(last_access <= before_flush);
}

#[tokio::test]
async fn test_failed_flush_keeps_hits_for_next_cycle() {
    let storage = Arc::new(MemoryStorage::new());
    let key = Key::generate().unwrap();
    storage.create(&key, NewCredential::default()).unwrap();

    let stats = Arc::new(StatsAggregator::new());
    let validator = Validator::new(
        storage.clone(),
        stats.clone(),
        16,
        Duration::from_secs(60),
    );
    let token = key.to_string();

    for _ in 0..3 {
        validator.validate("h", "/", &token).await.unwrap();
    }

    storage.set_fail_writes(true);
    assert!(stats.flush(storage.as_ref()).await.is_err());
    assert_eq!(storage.get(key.id()).unwrap().requests, 0);

    storage.set_fail_writes(false);
    stats.flush(storage.as_ref()).await.unwrap();
    assert_eq!(storage.get(key.id()).unwrap().requests, 3);
    assert_eq!(storage.update_calls(), 2);
}
