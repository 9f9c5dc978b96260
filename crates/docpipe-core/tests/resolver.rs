#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use docpipe_core::declare::{DependencyCoordinate, Repository, RepositoryResolver, Resolver};
use docpipe_core::Error;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JAR_PATH: &str = "/org/example/tool/1.2.3/tool-1.2.3.jar";

fn coordinate() -> DependencyCoordinate {
    DependencyCoordinate::new("org.example", "tool", "1.2.3")
}

#[tokio::test]
async fn downloads_once_then_serves_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JAR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let repositories = vec![Repository::parse(&server.uri()).unwrap()];
    let resolver = RepositoryResolver::new(repositories, cache.path()).unwrap();

    let first = resolver.resolve(&[coordinate()]).await.unwrap();
    let second = resolver.resolve(&[coordinate()]).await.unwrap();

    assert_eq!(first, second);
    let jar = &first.entries[0].path;
    assert!(jar.starts_with(cache.path()));
    assert_eq!(std::fs::read(jar).unwrap(), b"jar bytes");
}

#[tokio::test]
async fn missing_artifact_falls_through_to_next_repository() {
    let empty = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&empty)
        .await;
    let full = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JAR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"from second".to_vec()))
        .mount(&full)
        .await;

    let cache = TempDir::new().unwrap();
    let repositories = vec![
        Repository::parse(&empty.uri()).unwrap(),
        Repository::parse(&full.uri()).unwrap(),
    ];
    let resolver = RepositoryResolver::new(repositories, cache.path()).unwrap();

    let classpath = resolver.resolve(&[coordinate()]).await.unwrap();
    assert_eq!(std::fs::read(&classpath.entries[0].path).unwrap(), b"from second");
}

#[tokio::test]
async fn unresolvable_coordinate_names_every_repository() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let repositories = vec![
        Repository::Local(local.path().to_path_buf()),
        Repository::parse(&server.uri()).unwrap(),
    ];
    let resolver = RepositoryResolver::new(repositories, cache.path()).unwrap();

    let err = resolver.resolve(&[coordinate()]).await.unwrap_err();
    match err {
        Error::Resolution { coordinate, reason } => {
            assert_eq!(coordinate, "org.example:tool:1.2.3");
            assert_eq!(reason.matches("not found").count(), 2, "{reason}");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn server_error_is_reported_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let repositories = vec![Repository::parse(&server.uri()).unwrap()];
    let resolver = RepositoryResolver::new(repositories, cache.path()).unwrap();

    let err = resolver.resolve(&[coordinate()]).await.unwrap_err();
    assert!(err.to_string().contains("500"), "{err}");
    assert!(std::fs::read_dir(cache.path()).unwrap().next().is_none());
}
