//! Integration tests for the site mirror
//!
//! These tests use wiremock to serve a small site and run the full
//! crawl cycle end-to-end: render, rewrite, download, checkpoint.

use kagami::config::{CaptchaConfig, Config, CrawlerConfig, SiteConfig, StateConfig};
use kagami::crawler::Coordinator;
use kagami::render::HttpRenderer;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration mirroring `seed_url` into the temp dir
fn create_test_config(seed_url: &str, tmp: &TempDir) -> Config {
    Config {
        site: SiteConfig {
            seed_url: seed_url.to_string(),
            save_root: tmp.path().join("mirror").to_string_lossy().into_owned(),
        },
        crawler: CrawlerConfig {
            page_delay_ms: 0, // Very short for testing
            ..CrawlerConfig::default()
        },
        captcha: CaptchaConfig::default(),
        proxy: Default::default(),
        renderer: Default::default(),
        state: StateConfig {
            crawl_path: tmp.path().join("crawl.json").to_string_lossy().into_owned(),
            deferred_path: tmp
                .path()
                .join("deferred.json")
                .to_string_lossy()
                .into_owned(),
        },
    }
}

/// Builds a coordinator wired to a closed operator channel
fn create_coordinator(config: Config, fresh: bool, cancel: Arc<AtomicBool>) -> Coordinator {
    let (_tx, rx) = mpsc::unbounded_channel();
    let renderer = HttpRenderer::new().expect("Failed to build renderer");
    Coordinator::new(Arc::new(config), fresh, Box::new(renderer), cancel, rx)
        .expect("Failed to build coordinator")
}

async fn mount_site(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>Home</title>
                    <link rel="stylesheet" href="/style.css">
                    </head><body>
                    <img src="/img/logo.png">
                    <a href="/about">About</a>
                    </body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>About</title>
                    <link rel="stylesheet" href="/style.css">
                    </head><body>About us</body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(mock_server)
        .await;

    // The stylesheet is referenced from both pages but must only be
    // fetched once.
    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("body { margin: 0; }")
                .insert_header("content-type", "text/css"),
        )
        .expect(1)
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_full_mirror_of_small_site() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;

    let tmp = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &tmp);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut coordinator = create_coordinator(config, true, cancel);

    coordinator.run().await.expect("Crawl failed");

    let mirror = tmp.path().join("mirror");

    // The first page lands at the mirror root.
    let index = std::fs::read_to_string(mirror.join("index.html")).unwrap();
    assert!(index.contains(r#"href="resources/style.css""#));
    assert!(index.contains(r#"src="resources/img/logo.png""#));
    // The page link is untouched by resource rewriting.
    assert!(index.contains(r#"href="/about""#));

    // The linked page was crawled and rewritten relative to its own spot.
    let about = std::fs::read_to_string(mirror.join("about")).unwrap();
    assert!(about.contains(r#"href="resources/style.css""#));

    // Resources landed under the resource directory.
    let css = std::fs::read_to_string(mirror.join("resources/style.css")).unwrap();
    assert_eq!(css, "body { margin: 0; }");
    assert!(mirror.join("resources/img/logo.png").exists());

    // Checkpoint files were written on completion.
    assert!(tmp.path().join("crawl.json").exists());
    assert!(tmp.path().join("deferred.json").exists());
}

#[tokio::test]
async fn test_resume_completes_an_interrupted_crawl() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;

    let tmp = TempDir::new().unwrap();

    // First run is cancelled before visiting anything, leaving the seed
    // in the checkpointed frontier.
    let config = create_test_config(&mock_server.uri(), &tmp);
    let cancel = Arc::new(AtomicBool::new(true));
    let mut interrupted = create_coordinator(config, true, cancel);
    interrupted.run().await.expect("Interrupted run failed");

    assert!(tmp.path().join("crawl.json").exists());
    assert!(!tmp.path().join("mirror").join("index.html").exists());

    // Resume picks the seed back up and mirrors the whole site.
    let config = create_test_config(&mock_server.uri(), &tmp);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut resumed = create_coordinator(config, false, cancel);
    resumed.run().await.expect("Resumed run failed");

    let mirror = tmp.path().join("mirror");
    assert!(mirror.join("index.html").exists());
    assert!(mirror.join("about").exists());
    assert!(mirror.join("resources/style.css").exists());
}

#[tokio::test]
async fn test_fresh_flag_discards_previous_state() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;

    let tmp = TempDir::new().unwrap();

    let config = create_test_config(&mock_server.uri(), &tmp);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut first = create_coordinator(config, true, cancel);
    first.run().await.expect("First run failed");

    // A fresh run starts over: with everything already on disk it still
    // re-renders the seed rather than trusting the old checkpoint.
    let config = create_test_config(&mock_server.uri(), &tmp);
    let cancel = Arc::new(AtomicBool::new(false));
    let fresh = Coordinator::new(
        Arc::new(config),
        true,
        Box::new(HttpRenderer::new().unwrap()),
        cancel,
        mpsc::unbounded_channel().1,
    );
    assert!(fresh.is_ok());
}

#[tokio::test]
async fn test_unreachable_resource_does_not_fail_the_crawl() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><body>
                    <img src="/present.png">
                    <img src="/missing.png">
                    </body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/present.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let tmp = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &tmp);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut coordinator = create_coordinator(config, true, cancel);

    coordinator.run().await.expect("Crawl failed");

    let mirror = tmp.path().join("mirror");
    assert!(mirror.join("index.html").exists());
    assert!(mirror.join("resources/present.png").exists());
    assert!(!mirror.join("resources/missing.png").exists());
}
