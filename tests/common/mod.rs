//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::path::Path;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conda_firewall::config::{ChannelConfig, Config};
use conda_firewall::server::AppState;

/// A package record as upstream publishes it, including fields the crate
/// does not model
pub fn record(subdir: &str, name: &str, version: &str, build: &str, depends: &[&str]) -> Value {
    json!({
        "subdir": subdir,
        "name": name,
        "version": version,
        "build": build,
        "build_number": 0,
        "sha256": format!("{:0>64}", name.len()),
        "md5": format!("{:0>32}", name.len()),
        "size": 1024,
        "depends": depends,
        "license": "BSD-3-Clause",
        "timestamp": 1700000000000u64,
    })
}

/// Upstream `linux-64` catalog
///
/// `app` depends on `lib`, which depends on `libc` from `noarch`. `broken`
/// is filed under a filename that does not match its record.
pub fn linux_repodata() -> Value {
    json!({
        "repodata_version": 1,
        "info": { "subdir": "linux-64" },
        "packages": {
            "app-1.0-0.tar.bz2": record("linux-64", "app", "1.0", "0", &["lib >=2"]),
        },
        "packages.conda": {
            "app-1.1-0.conda": record("linux-64", "app", "1.1", "0", &["lib >=2", "python 3.11.*"]),
            "lib-2.0-h1.conda": record("linux-64", "lib", "2.0", "h1", &["libc"]),
            "unrelated-0.1-0.conda": record("linux-64", "unrelated", "0.1", "0", &[]),
            "broken-1.0-0.conda": record("linux-64", "broken", "1.0", "1", &[]),
        },
        "removed": ["old-0.1-0.conda"],
    })
}

/// Upstream `noarch` catalog
pub fn noarch_repodata() -> Value {
    json!({
        "repodata_version": 1,
        "info": { "subdir": "noarch" },
        "packages": {},
        "packages.conda": {
            "libc-1.0-0.conda": record("noarch", "libc", "1.0", "0", &[]),
            "docs-1.0-0.conda": record("noarch", "docs", "1.0", "0", &[]),
        },
    })
}

/// Serve `body` as `/{channel}/{subdir}/repodata.json`, expecting `times` hits
pub async fn mount_repodata(
    server: &MockServer,
    channel: &str,
    subdir: &str,
    body: &Value,
    times: u64,
) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/{}/repodata.json", channel, subdir)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

/// Configuration rooted in `root` with one `conda-forge` channel
///
/// The channel allowlist contains only `app` and dependencies are followed.
pub fn create_test_config(upstream: &str, root: &Path) -> Config {
    let allowlist = root.join("conda-forge.txt");
    std::fs::write(&allowlist, "# applications\napp\n").expect("Failed to write allowlist");

    let mut config = Config {
        raw_dir: root.join("original"),
        filtered_dir: root.join("filtered"),
        ..Default::default()
    };
    config.upstream.host = upstream.to_string();
    config.upstream.proxy_timeout_secs = 5;
    config.channels.insert(
        "conda-forge".to_string(),
        ChannelConfig {
            subdirs: vec!["linux-64".to_string(), "noarch".to_string()],
            allowlist_file: Some(allowlist),
            recurse_dependencies: true,
        },
    );
    config
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = conda_firewall::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    // Give the server a moment to start (100ms is sufficient for slow CI systems)
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
