//! Tests against a real redis server.
//!
//! Run with `cargo test -p tc-redis --features integration-tests` (needs docker).
#![cfg(feature = "integration-tests")]

use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tc_redis::{RedisConfig, RedisResultStorage, RedisStorage};
use tc_storage::{RequestParameters, ResultStorage, ServerParameters, Storage};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

async fn redis() -> (ContainerAsync<Redis>, RedisConfig) {
    let container = Redis::default()
        .with_tag("7-alpine")
        .start()
        .await
        .expect("Failed to start Redis container");
    let host = container.get_host().await.unwrap().to_string();
    let port = container.get_host_port_ipv4(6379).await.unwrap();

    let config = RedisConfig {
        redis_storage_server_host: host.clone(),
        redis_storage_server_port: port,
        redis_result_storage_server_host: host,
        redis_result_storage_server_port: port,
        redis_result_storage_ignore_errors: false,
        redis_storage_ignore_errors: false,
        ..Default::default()
    };
    (container, config)
}

#[tokio::test]
async fn test_storage_round_trip() {
    let (_container, config) = redis().await;
    let config = RedisConfig {
        stores_crypto_key_for_each_image: true,
        ..config
    };
    let storage = RedisStorage::builder(&config)
        .server(ServerParameters::new().security_key("ACME-SEC"))
        .dedicated()
        .build()
        .unwrap();

    let path = "/images/image_2.jpg";
    assert!(!storage.exists(path).await.unwrap());

    storage.put(path, Bytes::from_static(b"image")).await.unwrap();
    storage.put_crypto(path).await.unwrap();
    storage
        .put_detector_data(path, &json!({"faces": 2}))
        .await
        .unwrap();

    assert!(storage.exists(path).await.unwrap());
    assert_eq!(
        storage.get(path).await.unwrap(),
        Some(Bytes::from_static(b"image"))
    );
    assert_eq!(
        storage.get_crypto(path).await.unwrap(),
        Some("ACME-SEC".to_owned())
    );
    assert_eq!(
        storage.get_detector_data(path).await.unwrap(),
        Some(json!({"faces": 2}))
    );

    storage.remove(path).await.unwrap();
    storage.remove(path).await.unwrap();
    assert!(!storage.exists(path).await.unwrap());
}

#[tokio::test]
async fn test_result_storage_expiry() {
    let (_container, config) = redis().await;
    let config = RedisConfig {
        result_storage_expiration_seconds: 2,
        ..config
    };
    let storage = RedisResultStorage::builder(&config, RequestParameters::new("/unsafe/img.png"))
        .dedicated()
        .build()
        .unwrap();

    assert_eq!(
        storage.put(Bytes::from_static(b"result")).await.unwrap(),
        Some("result:/unsafe/img.png".to_owned())
    );
    assert_eq!(
        storage.get().await.unwrap(),
        Some(Bytes::from_static(b"result"))
    );
    let updated = storage.last_updated().await.unwrap();
    assert!((chrono::Utc::now() - updated).num_seconds() <= 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(storage.get().await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_server_is_swallowed_by_default() {
    let config = RedisConfig {
        redis_storage_server_host: "127.0.0.1".to_owned(),
        redis_storage_server_port: 1,
        ..Default::default()
    };
    let storage = RedisStorage::builder(&config).dedicated().build().unwrap();

    assert!(!storage.exists("/x.jpg").await.unwrap());
    assert_eq!(storage.get("/x.jpg").await.unwrap(), None);
}
