//! Metadata store tests run against SQLite and, when Docker is available, PostgreSQL.

mod common;

use common::*;
use packyard_metadata::models::{PackageVersionRow, PublishKeyRow};
use packyard_metadata::{MetadataError, MetadataStore};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

fn key_row(version: &packyard_core::PackageVersionKey, key_hash: &str) -> PublishKeyRow {
    PublishKeyRow {
        key_hash: key_hash.to_string(),
        package_type: version.package_type.clone(),
        package_scope: version.package_scope.clone(),
        package_name: version.package_name.clone(),
        version_number: version.version_number.clone(),
        declared_hash: sha256_hash(key_hash.as_bytes()),
        used_at: None,
        created_at: now(),
    }
}

#[tokio::test]
async fn test_register_version_is_unique() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let version = unique_version("1.0.0");
        let row = PackageVersionRow::unpublished(&version, now());
        store.create_package_version(&row).await.unwrap();

        let err = store.create_package_version(&row).await.unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)), "{err:?}");

        let fetched = store.get_package_version(&version).await.unwrap().unwrap();
        assert!(!fetched.published);
        assert_eq!(fetched.created_at, now());

        let package = store
            .get_package("node", "gulp", &version.package_name)
            .await
            .unwrap()
            .unwrap();
        assert!(package.last_published_version.is_none());
    })
    .await;
}

#[tokio::test]
async fn test_second_version_reuses_package() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let first = unique_version("1.0.0");
        let mut second = first.clone();
        second.version_number = "1.1.0".to_string();

        store
            .create_package_version(&PackageVersionRow::unpublished(&first, now()))
            .await
            .unwrap();
        store
            .create_package_version(&PackageVersionRow::unpublished(&second, now()))
            .await
            .unwrap();

        assert!(store.get_package_version(&second).await.unwrap().is_some());
    })
    .await;
}

#[tokio::test]
async fn test_publish_key_is_spent_once() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let version = unique_version("1.0.0");
        store
            .create_package_version(&PackageVersionRow::unpublished(&version, now()))
            .await
            .unwrap();

        let hash = format!("{}-key", version.package_name);
        store.create_publish_key(&key_row(&version, &hash)).await.unwrap();

        let used_at = now() + Duration::minutes(5);
        assert!(store.mark_publish_key_used(&hash, used_at).await.unwrap());
        assert!(!store.mark_publish_key_used(&hash, now()).await.unwrap());

        let row = store.get_publish_key(&hash).await.unwrap().unwrap();
        assert_eq!(row.used_at, Some(used_at));
        assert_eq!(row.version_key(), version);

        assert!(!store.mark_publish_key_used("missing", now()).await.unwrap());
        assert!(store.get_publish_key("missing").await.unwrap().is_none());
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_key_spend_has_one_winner() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let version = unique_version("1.0.0");
        store
            .create_package_version(&PackageVersionRow::unpublished(&version, now()))
            .await
            .unwrap();
        let hash = format!("{}-race", version.package_name);
        store.create_publish_key(&key_row(&version, &hash)).await.unwrap();

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let hash = hash.clone();
            tokio::spawn(async move { store.mark_publish_key_used(&hash, now()).await })
        });
        let mut winners = 0;
        for attempt in futures::future::join_all(attempts).await {
            if attempt.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    })
    .await;
}

#[tokio::test]
async fn test_commit_publish_is_at_most_once() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let version = unique_version("2.0.0");
        store
            .create_package_version(&PackageVersionRow::unpublished(&version, now()))
            .await
            .unwrap();

        let published_at = now() + Duration::hours(1);
        assert!(
            store
                .commit_published_version(&version, "aa", "https://cdn/a.tgz", published_at)
                .await
                .unwrap()
        );
        assert!(
            !store
                .commit_published_version(&version, "bb", "https://cdn/b.tgz", now())
                .await
                .unwrap()
        );

        let row = store.get_package_version(&version).await.unwrap().unwrap();
        assert!(row.published);
        assert_eq!(row.package_hash.as_deref(), Some("aa"));
        assert_eq!(row.package_url.as_deref(), Some("https://cdn/a.tgz"));
        assert_eq!(row.published_at, Some(published_at));

        let package = store
            .get_package("node", "gulp", &version.package_name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(package.last_published_version.as_deref(), Some("2.0.0"));
        assert_eq!(package.updated_at, published_at);
    })
    .await;
}

#[tokio::test]
async fn test_commit_unknown_version_is_rejected() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let version = unique_version("0.0.1");
        assert!(
            !store
                .commit_published_version(&version, "aa", "u", now())
                .await
                .unwrap()
        );
        assert!(
            store
                .get_package("node", "gulp", &version.package_name)
                .await
                .unwrap()
                .is_none()
        );
    })
    .await;
}

#[tokio::test]
async fn test_health_check() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        store.health_check().await.unwrap();
    })
    .await;
}
