//! Backend behavior through the public `StorageService` API, with vendor
//! calls served from memory.

use cloudstore::StorageConfig;
use cloudstore::error::StorageError;
use cloudstore::storage::{
    GcsBackend, MemoryClient, ObjectReader, S3Backend, StorageFactory, StorageService,
};
use futures::AsyncReadExt;
use std::sync::Arc;

fn s3_config() -> StorageConfig {
    StorageConfig {
        platform: "minio".to_string(),
        bucket: "b1".to_string(),
        region: "us-east-1".to_string(),
        public_path: "public".to_string(),
        endpoint: "local:9000".to_string(),
        access_id: "k".to_string(),
        secret_key: "s".to_string(),
        ..Default::default()
    }
}

fn gcs_config() -> StorageConfig {
    StorageConfig {
        platform: "gcs".to_string(),
        bucket: "docs".to_string(),
        region: "us".to_string(),
        public_path: "public".to_string(),
        endpoint: "https://storage.googleapis.com".to_string(),
        service_account: "{}".to_string(),
        project_id: "proj".to_string(),
        ..Default::default()
    }
}

fn reader(data: &'static [u8]) -> ObjectReader {
    Box::pin(futures::io::Cursor::new(data))
}

async fn s3_backend() -> (S3Backend, Arc<MemoryClient>) {
    let client = Arc::new(MemoryClient::new());
    let backend = S3Backend::new(&s3_config(), "b1").with_client(client.clone());
    backend.initialize().await.unwrap();
    (backend, client)
}

async fn gcs_backend() -> (GcsBackend, Arc<MemoryClient>) {
    let client = Arc::new(MemoryClient::new());
    let backend = GcsBackend::new(&gcs_config(), "docs").with_client(client.clone());
    backend.initialize().await.unwrap();
    (backend, client)
}

fn is_timestamp(value: &str) -> bool {
    value.len() == 20 && value.bytes().all(|b| b.is_ascii_digit())
}

#[tokio::test]
async fn test_s3_save_object_scenario() {
    let (backend, client) = s3_backend().await;

    let info = backend
        .save_object(reader(b"hi"), "notes/x.txt", "text/plain")
        .await
        .unwrap();

    assert!(client.bucket_exists_now().await);
    assert_eq!(client.bucket_creations().await, 1);
    let policy = client.bucket_policy().await.unwrap();
    assert!(policy.contains("arn:aws:s3:::b1/public/*"));

    let (dir, file) = info.name.split_once('/').unwrap();
    assert_eq!(dir, "notes");
    let (stamp, rest) = file.split_once('_').unwrap();
    assert!(is_timestamp(stamp), "unexpected name {}", info.name);
    assert_eq!(rest, "x.txt");

    assert_eq!(info.size, 2);
    assert_eq!(info.content_type.as_deref(), Some("text/plain"));
    assert_eq!(info.self_link, format!("b1/{}", info.name));
    assert_eq!(info.media_link, format!("/storage/b1/{}", info.name));
}

#[tokio::test]
async fn test_public_objects_live_under_public_path() {
    let (s3, _) = s3_backend().await;
    let (gcs, _) = gcs_backend().await;

    for backend in [&s3 as &dyn StorageService, &gcs] {
        let info = backend
            .save_public_object(reader(b"abc"), "a/b.txt", "text/plain")
            .await
            .unwrap();
        let mut segments = info.name.split('/');
        assert_eq!(segments.next(), Some("public"));
        assert_eq!(segments.next(), Some("a"));
        assert!(info.file_name().ends_with("_b.txt"));
        assert_eq!(info.size, 3);
    }
}

#[tokio::test]
async fn test_gcs_links_wrap_download_url() {
    let (backend, client) = gcs_backend().await;

    let info = backend
        .save_object(reader(b"x"), "report.pdf", "application/pdf")
        .await
        .unwrap();

    assert_eq!(client.bucket_creations().await, 1);
    assert!(client.bucket_policy().await.is_none());
    assert!(info.self_link.starts_with(
        "https://storage.googleapis.com/download/storage/v1/b/docs/o/"
    ));
    assert!(info.self_link.ends_with("_report.pdf?alt=media"));
    assert_eq!(info.media_link, format!("/storage/{}", info.self_link));
}

#[tokio::test]
async fn test_get_object_streams_content() {
    let (backend, _) = s3_backend().await;
    let saved = backend
        .save_object(reader(b"hello world"), "greet/hello.txt", "text/plain")
        .await
        .unwrap();

    let mut object = backend.get_object(&saved.name).await.unwrap();
    let mut content = String::new();
    object.reader.read_to_string(&mut content).await.unwrap();

    assert_eq!(content, "hello world");
    assert_eq!(object.info.name, saved.name);
    assert_eq!(object.info.size, 11);

    let err = backend.get_object("greet/missing.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_copy_preserves_size() {
    let (backend, client) = s3_backend().await;
    let saved = backend
        .save_object(reader(b"12345"), "src/data.bin", "")
        .await
        .unwrap();

    let copied = backend.copy_object(&saved.name, "dst/data.bin").await.unwrap();

    assert_eq!(copied.name, "dst/data.bin");
    assert_eq!(copied.size, saved.size);
    assert_eq!(
        client.content("dst/data.bin").await,
        client.content(&saved.name).await
    );
    assert!(backend.copy_object("nope", "x").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_object_info() {
    let (backend, _) = gcs_backend().await;
    let saved = backend
        .save_object(reader(b"abcd"), "info.txt", "text/plain")
        .await
        .unwrap();

    let info = backend.object_info(&saved.name).await.unwrap();
    assert_eq!(info.size, 4);
    assert_eq!(info.etag, saved.etag);
    assert!(backend.object_info("nothing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_missing_object_per_backend() {
    let (s3, _) = s3_backend().await;
    s3.delete_object("missing.txt").await.unwrap();

    let (gcs, _) = gcs_backend().await;
    let err = gcs.delete_object("missing.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_path_removes_public_and_private() {
    let (backend, client) = s3_backend().await;
    backend
        .save_object(reader(b"abc"), "docs/a.txt", "text/plain")
        .await
        .unwrap();
    backend
        .save_public_object(reader(b"12345"), "docs/b.txt", "text/plain")
        .await
        .unwrap();
    client.insert("docs/deep/c.txt", "1").await;
    client.insert("other/keep.txt", "zz").await;

    let freed = backend.delete_path("docs").await.unwrap();

    assert_eq!(freed, 9);
    assert!(backend.list_objects("docs", true).await.unwrap().is_empty());
    assert!(backend.list_objects("public/docs", true).await.unwrap().is_empty());
    assert_eq!(client.keys().await, vec!["other/keep.txt".to_string()]);
}

#[tokio::test]
async fn test_folder_size_matches_listing() {
    let (backend, client) = s3_backend().await;
    for (key, data) in [
        ("data/a.csv", "1234"),
        ("data/b.csv", "12"),
        ("data/2024/c.csv", "123456"),
        ("datalake.txt", "1"),
    ] {
        client.insert(key, data).await;
    }

    for recursive in [true, false] {
        let mut expected = 0;
        for key in backend.list_objects("data/", recursive).await.unwrap() {
            if !key.ends_with('/') {
                expected += backend.object_info(&key).await.unwrap().size;
            }
        }
        assert_eq!(
            backend.folder_size("data/", recursive).await.unwrap(),
            expected
        );
    }
    assert_eq!(backend.folder_size("data/", true).await.unwrap(), 12);
    assert_eq!(backend.folder_size("data/", false).await.unwrap(), 6);
}

#[tokio::test]
async fn test_list_objects_honors_recursive_flag() {
    let (backend, client) = gcs_backend().await;
    for key in ["a/1.txt", "a/b/2.txt", "a/b/c/3.txt"] {
        client.insert(key, "x").await;
    }

    assert_eq!(
        backend.list_objects("a/", true).await.unwrap(),
        vec!["a/1.txt", "a/b/2.txt", "a/b/c/3.txt"]
    );
    assert_eq!(
        backend.list_objects("a/", false).await.unwrap(),
        vec!["a/1.txt", "a/b/"]
    );
}

#[tokio::test]
async fn test_copy_path_rewrites_prefix() {
    let (backend, client) = s3_backend().await;
    client.insert("src/a.txt", "12").await;
    client.insert("src/sub/b.txt", "345").await;

    assert_eq!(backend.copy_path("src/", "flat/", false).await.unwrap(), 2);
    assert_eq!(backend.copy_path("src/", "dst/", true).await.unwrap(), 5);

    let keys = client.keys().await;
    for key in ["dst/a.txt", "dst/sub/b.txt", "flat/a.txt", "src/a.txt", "src/sub/b.txt"] {
        assert!(keys.contains(&key.to_string()), "missing {}", key);
    }
    assert!(!keys.contains(&"flat/sub/b.txt".to_string()));
}

#[tokio::test]
async fn test_rename_folder_moves_objects() {
    let (backend, client) = gcs_backend().await;
    client.insert("old/a.txt", "1").await;
    client.insert("old/x/b.txt", "22").await;

    backend.rename_folder("old/", "new/").await.unwrap();

    assert_eq!(
        client.keys().await,
        vec!["new/a.txt".to_string(), "new/x/b.txt".to_string()]
    );
    assert_eq!(client.content("new/x/b.txt").await.unwrap(), "22");
}

#[tokio::test]
async fn test_rename_folder_partial_failure_keeps_copies() {
    let (backend, client) = s3_backend().await;
    client.insert("old/a.txt", "1").await;
    client.insert("old/b.txt", "22").await;
    client.fail_deletes_for("old/b.txt").await;

    let err = backend.rename_folder("old/", "new/").await.unwrap_err();
    assert!(matches!(err, StorageError::Transport { .. }));

    let keys = client.keys().await;
    assert!(keys.contains(&"new/a.txt".to_string()));
    assert!(keys.contains(&"new/b.txt".to_string()));
    assert!(keys.contains(&"old/b.txt".to_string()));
}

#[tokio::test]
async fn test_delete_bucket_empties_first() {
    let (backend, client) = s3_backend().await;
    backend
        .save_object(reader(b"a"), "one.txt", "text/plain")
        .await
        .unwrap();
    backend
        .save_public_object(reader(b"b"), "two.txt", "text/plain")
        .await
        .unwrap();

    backend.delete_bucket().await.unwrap();

    assert!(!client.bucket_exists_now().await);
    assert!(client.keys().await.is_empty());
}

#[tokio::test]
async fn test_shared_url() {
    let (backend, client) = s3_backend().await;
    client.insert("share/me.txt", "x").await;

    let url = backend.shared_url("share/me.txt").await.unwrap();
    assert!(url.starts_with("memory:///share%2Fme.txt"));
    assert!(url.ends_with("expires=86400"));
    assert!(backend.shared_url("share/none.txt").await.is_err());
}

#[tokio::test]
async fn test_initialize_twice_creates_once() {
    let client = Arc::new(MemoryClient::new());
    let backend = S3Backend::new(&s3_config(), "b1").with_client(client.clone());

    let (first, second) = futures::join!(backend.initialize(), backend.initialize());
    first.unwrap();
    second.unwrap();
    backend.initialize().await.unwrap();

    assert_eq!(client.bucket_creations().await, 1);
}

#[tokio::test]
async fn test_use_before_initialize_is_config_error() {
    let backend = GcsBackend::new(&gcs_config(), "docs").with_client(Arc::new(MemoryClient::new()));

    let err = backend
        .save_object(reader(b"x"), "a.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Config(_)));
    assert_eq!(backend.bucket_name(), "docs");
    assert_eq!(backend.public_path(), "public");
}

#[tokio::test]
async fn test_factory_bucket_suffix() {
    let config = StorageConfig {
        bucket: "docs".to_string(),
        ..s3_config()
    };
    let client = Arc::new(MemoryClient::new());
    let factory = StorageFactory::from_config(config)
        .unwrap()
        .with_client(client.clone());

    let storage = factory.new_client("tenant42").await.unwrap();

    assert_eq!(storage.bucket_name(), "docs-tenant42");
    assert_eq!(storage.region(), "us-east-1");
    assert_eq!(storage.endpoint(), "local:9000");
    assert_eq!(client.bucket_creations().await, 1);
}

#[test]
fn test_factory_rejects_incomplete_config() {
    let config = StorageConfig {
        endpoint: String::new(),
        ..gcs_config()
    };
    let err = StorageFactory::from_config(config).unwrap_err();
    assert!(err.to_string().contains("endpoint"));
}
