//! Integration tests: full mirror run against a local archive server.
//!
//! Covers the end-to-end pipeline (listing → manifest → download → rewrite),
//! resumability (a second run must issue zero snapshot fetches), atomic
//! publishes (no `.part` leftovers), and per-item failure tolerance.

mod common;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use wbm_core::config::{MirrorOptions, WbmConfig};
use wbm_core::scheduler::run_mirror;

use common::archive_server::{start, ArchiveFixture, StartedServer};

const INDEX_HTML: &str = r#"<!doctype html>
<html><head>
<link rel="stylesheet" href="/style.css">
<link rel="canonical" href="https://mirror.test/">
</head>
<body><img src="/img/logo.png"><a href="/about">About</a></body></html>
"#;

const STYLE_CSS: &str = "@import \"fonts.css\";\nbody { background: url(/img/bg.png); }\n";

const ABOUT_HTML: &str = r#"<html><body><a href="/">Home</a></body></html>"#;

fn site_fixture() -> ArchiveFixture {
    let mut resources = HashMap::new();
    resources.insert("/", ("text/html", INDEX_HTML));
    resources.insert("/style.css", ("text/css", STYLE_CSS));
    resources.insert("/about", ("text/html", ABOUT_HTML));
    resources.insert("/img/logo.png", ("image/png", "png-logo-bytes"));
    resources.insert("/img/bg.png", ("image/png", "png-bg-bytes"));
    resources.insert("/fonts.css", ("text/css", "body { font-family: serif; }\n"));
    ArchiveFixture {
        captures: vec![
            ("20240103000000", "https://mirror.test/style.css"),
            ("20240101000000", "https://mirror.test/"),
            ("20230601000000", "https://mirror.test/about"),
        ],
        resources,
    }
}

fn config_for(server: &StartedServer) -> WbmConfig {
    WbmConfig {
        archive_endpoint: server.endpoint.clone(),
        cdx_endpoint: format!("{}/cdx/search/xd", server.endpoint),
        default_concurrency: 1,
    }
}

fn options_for(root: PathBuf) -> MirrorOptions {
    MirrorOptions {
        base_url: "mirror.test".to_string(),
        directory: Some(root),
        concurrency: 1,
        rewrite_links: true,
        remove_canonical: true,
        ..MirrorOptions::default()
    }
}

fn assert_no_partials(dir: &Path) {
    for entry in fs::read_dir(dir).unwrap().flatten() {
        let path = entry.path();
        if path.is_dir() {
            assert_no_partials(&path);
        } else {
            assert!(
                !path.to_string_lossy().ends_with(".part"),
                "leftover partial file: {}",
                path.display()
            );
        }
    }
}

#[tokio::test]
async fn mirror_run_downloads_rewrites_and_resumes() {
    let server = start(site_fixture());
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("mirror");
    let options = options_for(root.clone());
    let cfg = config_for(&server);

    let stats = run_mirror(&options, &cfg, None).await.expect("run_mirror");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.downloaded, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.processed(), 3);

    // Manifest entries and discovered assets all landed at their mapped paths.
    for file in [
        "index.html",
        "style.css",
        "about/index.html",
        "img/logo.png",
        "img/bg.png",
        "fonts.css",
    ] {
        assert!(root.join(file).exists(), "missing {}", file);
    }
    assert_no_partials(&root);

    // The page was rewritten: relative references, canonical stripped.
    let index = fs::read_to_string(root.join("index.html")).unwrap();
    assert!(index.contains(r#"href="style.css""#), "index: {index}");
    assert!(index.contains(r#"src="img/logo.png""#));
    assert!(index.contains(r#"href="about/index.html""#));
    assert!(!index.contains("canonical"));

    // The stylesheet was rewritten only where the relative path differs.
    let style = fs::read_to_string(root.join("style.css")).unwrap();
    assert!(style.contains("url(img/bg.png)"), "style: {style}");
    assert!(style.contains("@import \"fonts.css\";"));

    // Nav reference in a nested page points back up.
    let about = fs::read_to_string(root.join("about/index.html")).unwrap();
    assert!(about.contains(r#"href="../index.html""#), "about: {about}");

    // 3 manifest items + 3 discovered assets.
    let first_run_hits = server.snapshot_hits.load(Ordering::SeqCst);
    assert_eq!(first_run_hits, 6);

    // Second run: everything exists, zero snapshot fetches.
    let stats = run_mirror(&options, &cfg, None).await.expect("rerun");
    assert_eq!(stats.skipped_existing, 3);
    assert_eq!(stats.downloaded, 0);
    assert_eq!(server.snapshot_hits.load(Ordering::SeqCst), first_run_hits);
}

#[tokio::test]
async fn missing_resource_fails_item_but_not_the_batch() {
    let mut resources = HashMap::new();
    resources.insert("/about", ("text/html", ABOUT_HTML));
    let server = start(ArchiveFixture {
        captures: vec![
            ("20240101000000", "https://mirror.test/gone.pdf"),
            ("20230601000000", "https://mirror.test/about"),
        ],
        resources,
    });
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("mirror");
    let options = options_for(root.clone());
    let cfg = config_for(&server);

    let stats = run_mirror(&options, &cfg, None).await.expect("run_mirror");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.failed, 1);
    assert!(root.join("about/index.html").exists());
    assert!(!root.join("gone.pdf").exists());
    assert_no_partials(&root);
}

#[tokio::test]
async fn invalid_base_url_aborts_before_listing() {
    let tmp = tempfile::tempdir().unwrap();
    let options = MirrorOptions {
        base_url: "ftp://example.com".to_string(),
        directory: Some(tmp.path().join("mirror")),
        ..MirrorOptions::default()
    };
    let cfg = WbmConfig::default();

    let err = run_mirror(&options, &cfg, None).await.unwrap_err();
    assert!(matches!(err, wbm_core::error::MirrorError::InvalidUrl(_)));
    assert!(!tmp.path().join("mirror").exists());
}
