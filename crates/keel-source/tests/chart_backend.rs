//! Chart repository backend tests against a mock HTTP server

use flate2::Compression;
use flate2::write::GzEncoder;
use keel_core::{AppSourceType, BackendKind, RepositoryConfig};
use keel_source::chart::index::compute_digest;
use keel_source::{ChartRepoClient, SourceClient, SourceError, detect_apps};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// gzipped tarball laid out like a packaged chart
fn chart_archive(name: &str, version: &str) -> Vec<u8> {
    let files = [
        (
            format!("{}/Chart.yaml", name),
            format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
        ),
        (format!("{}/values.yaml", name), "replicaCount: 1\n".to_string()),
        (
            format!("{}/values-production.yaml", name),
            "replicaCount: 3\n".to_string(),
        ),
    ];

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn index_yaml(digest: &str) -> String {
    format!(
        r#"apiVersion: v1
entries:
  wordpress:
    - name: wordpress
      version: 5.7.1
      urls: [charts/wordpress-5.7.1.tgz]
      digest: {digest}
    - name: wordpress
      version: 5.6.0
      urls: [charts/wordpress-5.6.0.tgz]
  mysql:
    - name: mysql
      version: 1.0.0
      urls: [charts/mysql-1.0.0.tgz]
      digest: sha256:0000000000000000000000000000000000000000000000000000000000000000
"#
    )
}

async fn chart_server() -> MockServer {
    let server = MockServer::start().await;
    let archive = chart_archive("wordpress", "5.7.1");
    let digest = compute_digest(&archive);

    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(&digest)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/charts/wordpress-5.7.1.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/charts/mysql-1.0.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(chart_archive("mysql", "1.0.0")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/charts/wordpress-5.6.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"corrupted".to_vec()))
        .mount(&server)
        .await;

    server
}

fn client(server: &MockServer, work: &TempDir) -> ChartRepoClient {
    let config = RepositoryConfig::new(server.uri(), BackendKind::ChartRepository);
    ChartRepoClient::new(config, work.path()).unwrap()
}

mod resolve {
    use super::*;

    #[tokio::test]
    async fn test_latest_and_exact_versions() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        client.test().await.unwrap();
        assert_eq!(client.resolve_revision("wordpress", "").await.unwrap(), "5.7.1");
        assert_eq!(
            client.resolve_revision("wordpress", "5.6.0").await.unwrap(),
            "5.6.0"
        );
        assert!(matches!(
            client.resolve_revision("wordpress", "5.6").await,
            Err(SourceError::UnresolvableRevision { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_chart() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        let err = client.resolve_revision("wordpress1", "").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown chart \"wordpress1\"");
    }

    #[tokio::test]
    async fn test_repository_root_uses_index_digest() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        let revision = client.resolve_revision("", "").await.unwrap();
        assert_eq!(revision.len(), 64);
        assert_eq!(client.checkout("", &revision).await.unwrap(), revision);
    }

    #[tokio::test]
    async fn test_missing_index() {
        let server = MockServer::start().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        let err = client.test().await.unwrap_err();
        assert!(matches!(err, SourceError::IndexNotFound { .. }));
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_basic_auth_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header("Authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("entries: {}\n"))
            .mount(&server)
            .await;

        let work = TempDir::new().unwrap();
        let mut config = RepositoryConfig::new(server.uri(), BackendKind::ChartRepository);
        config.credentials.username = Some("user".to_string());
        config.credentials.password = Some("pass".to_string());
        let client = ChartRepoClient::new(config, work.path()).unwrap();
        client.test().await.unwrap();
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn test_unresolved_revision_is_distinct_from_unknown_chart() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        let err = client.checkout("wordpress", "").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid resolved revision \"\", must be resolved"
        );

        let err = client.checkout("wordpress1", "5.7.1").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown chart \"wordpress1\"");
    }

    #[tokio::test]
    async fn test_extracts_archive() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        assert_eq!(client.checkout("wordpress", "5.7.1").await.unwrap(), "5.7.1");
        assert!(work.path().join("wordpress/Chart.yaml").exists());

        // Second checkout reuses the extracted tree
        assert_eq!(client.checkout("wordpress", "5.7.1").await.unwrap(), "5.7.1");

        let values = client.list_files("wordpress/*values*.yaml").await.unwrap();
        assert_eq!(
            values,
            vec!["wordpress/values-production.yaml", "wordpress/values.yaml"]
        );
    }

    #[tokio::test]
    async fn test_digest_mismatch() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        assert!(matches!(
            client.checkout("mysql", "1.0.0").await,
            Err(SourceError::IntegrityCheckFailed { .. })
        ));
        assert!(!work.path().join("mysql").exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        // No digest listed for 5.6.0, so the bad body fails at extraction
        assert!(client.checkout("wordpress", "5.6.0").await.is_err());
        assert!(!work.path().join("wordpress/Chart.yaml").exists());
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn test_index_charts_are_listed() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        let files = client.list_files("*Chart.yaml").await.unwrap();
        assert_eq!(files, vec!["mysql/Chart.yaml", "wordpress/Chart.yaml"]);
        assert!(client.list_files("*app.yaml").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_root_listing_ignores_extracted_files() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        client.checkout("wordpress", "5.7.1").await.unwrap();
        let subchart = work.path().join("wordpress/charts/mariadb");
        std::fs::create_dir_all(&subchart).unwrap();
        std::fs::write(subchart.join("Chart.yaml"), "name: mariadb\n").unwrap();

        let files = client.list_files("*Chart.yaml").await.unwrap();
        assert_eq!(files, vec!["mysql/Chart.yaml", "wordpress/Chart.yaml"]);

        let files = client.list_files("wordpress/*Chart.yaml").await.unwrap();
        assert_eq!(
            files,
            vec!["wordpress/Chart.yaml", "wordpress/charts/mariadb/Chart.yaml"]
        );
    }

    #[tokio::test]
    async fn test_detect_charts() {
        let server = chart_server().await;
        let work = TempDir::new().unwrap();
        let client = client(&server, &work);

        let detected = detect_apps(&client, "", "").await.unwrap();
        let apps = detected.apps();
        assert_eq!(apps.len(), 2);
        assert!(apps.iter().all(|a| a.app_type == AppSourceType::PackagedChart));
        assert_eq!(apps[1].path, "wordpress");

        let detected = detect_apps(&client, "", "wordpress").await.unwrap();
        assert_eq!(detected.revision, "5.7.1");
        assert_eq!(
            detected.best_match("wordpress"),
            Some(("wordpress/Chart.yaml", AppSourceType::PackagedChart))
        );
    }
}
