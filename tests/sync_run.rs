use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use packsync_lib::core::downloader::Transport;
use packsync_lib::core::index::IndexStore;
use packsync_lib::core::verify::Fingerprint;
use packsync_lib::{ArtifactOutcome, SyncEngine, SyncError, SyncResult, SyncSettings};

const CATALOG_URL: &str = "https://api.test/modpacks";
const REGISTRY: &str = "https://registry.test";
const SODIUM_06: &str = "https://registry.test/maven/modrinth/sodium/0.6/sodium-0.6.jar";
const CORE_JAR: &str = "https://maven.test/releases/gg/norisk/nrc-core/1.0.0/nrc-core-1.0.0.jar";
const LOGO_PATH: &str = "nrc-cosmetics/assets/nrc/logo.png";

/// Serves canned bodies by URL, logs every request and tracks overlap.
#[derive(Default)]
struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl FakeTransport {
    fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &str) -> SyncResult<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::DownloadFailed {
                url: url.to_string(),
                status: 404,
            })
    }
}

fn md5(bytes: &[u8]) -> String {
    Fingerprint::of_bytes(bytes).to_string()
}

fn core_jar() -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in [
        ("fabric.mod.json", b"{}".as_slice()),
        ("assets/nrc/logo.png", b"stock logo".as_slice()),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn jar_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).ok()?;
    let mut body = Vec::new();
    entry.read_to_end(&mut body).unwrap();
    Some(body)
}

/// `norisk-prod` inherits `base`; both declare sodium, the child's version wins.
fn catalog(sodium_version: &str) -> String {
    format!(
        r#"{{
            "packs": {{
                "base": {{
                    "displayName": "Base",
                    "mods": [
                        {{"id": "sodium",
                          "source": {{"type": "modrinth", "projectId": "AANobbMI", "projectSlug": "sodium"}},
                          "compatibility": {{"1.21": {{"fabric": {{"identifier": "0.5"}}}}}}}},
                        {{"id": "nrc-core",
                          "source": {{"type": "maven", "repositoryRef": "norisk", "groupId": "gg.norisk", "artifactId": "nrc-core"}},
                          "compatibility": {{"1.21": {{"fabric": {{"identifier": "1.0.0"}}}}}}}}
                    ],
                    "assets": ["nrc-cosmetics"],
                    "loaderPolicy": {{"default": {{"loader": "fabric", "version": "0.16.0"}}}}
                }},
                "norisk-prod": {{
                    "displayName": "NoRisk",
                    "inheritsFrom": ["base"],
                    "mods": [
                        {{"id": "sodium",
                          "source": {{"type": "modrinth", "projectId": "AANobbMI", "projectSlug": "sodium"}},
                          "compatibility": {{"1.21": {{"fabric": {{"identifier": "{sodium_version}"}}}}}}}}
                    ]
                }}
            }},
            "repositories": {{"norisk": "https://maven.test/releases"}}
        }}"#
    )
}

fn asset_metadata(files: &[(&str, &[u8])]) -> String {
    let objects: Vec<String> = files
        .iter()
        .map(|(path, body)| {
            format!(
                r#""{path}": {{"hash": "{}", "size": {}}}"#,
                md5(body),
                body.len()
            )
        })
        .collect();
    format!(r#"{{"objects": {{{}}}}}"#, objects.join(", "))
}

fn settings() -> SyncSettings {
    SyncSettings {
        game_version: Some("1.21".into()),
        loader_version: Some("0.16.0".into()),
        catalog_url: CATALOG_URL.into(),
        asset_metadata_url: "https://assets.test/meta/{pack}".into(),
        asset_download_url: "https://assets.test/{pack}/{path}".into(),
        registry_maven_url: REGISTRY.into(),
        ..SyncSettings::default()
    }
}

/// Catalog, one asset pack with a logo and an ignored pack.mcmeta, and
/// payloads for sodium 0.6 (slug candidate only) and the core jar.
fn standard_transport() -> Arc<FakeTransport> {
    let transport = Arc::new(FakeTransport::default());
    transport.serve(CATALOG_URL, catalog("0.6"));
    transport.serve(
        "https://assets.test/meta/nrc-cosmetics",
        asset_metadata(&[
            (LOGO_PATH, b"custom logo"),
            ("nrc-cosmetics/pack.mcmeta", b"{}"),
        ]),
    );
    transport.serve(
        &format!("https://assets.test/nrc-cosmetics/{LOGO_PATH}"),
        b"custom logo".to_vec(),
    );
    transport.serve(SODIUM_06, b"sodium 0.6".to_vec());
    transport.serve(CORE_JAR, core_jar());
    transport
}

#[tokio::test]
async fn first_run_installs_and_second_run_only_verifies() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    let engine = SyncEngine::new(settings(), root, transport.clone());

    let report = engine.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.downloaded_count(), 3);
    let mod_ids: Vec<_> = report.mods.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(mod_ids, vec!["sodium", "nrc-core"]);
    assert_eq!(report.mods[0].version, "0.6");
    assert!(report.assets.iter().all(|a| a.id != "nrc-cosmetics/pack.mcmeta"));

    // slug candidate picked up after the id candidate 404'd
    assert_eq!(
        std::fs::read(root.join("mods/sodium-0.6.jar")).unwrap(),
        b"sodium 0.6"
    );
    let jar = root.join("mods/nrc-core-1.0.0.jar");
    assert_eq!(
        jar_entry(&jar, "assets/nrc/logo.png").unwrap(),
        b"custom logo"
    );
    assert_eq!(report.patched, Some(Fingerprint::of_file(&jar).await.unwrap()));

    let records = IndexStore::new(root.join(".nrc-index.json"))
        .load()
        .await
        .unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["sodium", "nrc-core"]);
    assert_eq!(records[1].fingerprint, Fingerprint::of_file(&jar).await.unwrap());

    transport.clear_requests();
    let again = engine.run().await.unwrap();
    assert_eq!(again.downloaded_count(), 0);
    assert_eq!(again.verified_count(), 3);
    assert_eq!(
        transport.requests(),
        vec![
            CATALOG_URL.to_string(),
            "https://assets.test/meta/nrc-cosmetics".to_string()
        ]
    );
    assert_eq!(
        jar_entry(&jar, "assets/nrc/logo.png").unwrap(),
        b"custom logo"
    );
}

#[tokio::test]
async fn failed_update_keeps_old_file_and_drops_record() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    // 0.7 is announced but never served
    transport.serve(CATALOG_URL, catalog("0.7"));
    let report = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, "sodium");
    assert_eq!(
        std::fs::read(root.join("mods/sodium-0.6.jar")).unwrap(),
        b"sodium 0.6"
    );
    assert!(!root.join("mods/sodium-0.7.jar").exists());

    let records = IndexStore::new(root.join(".nrc-index.json"))
        .load()
        .await
        .unwrap();
    assert!(records.iter().all(|r| r.id != "sodium"));
    assert!(records.iter().any(|r| r.id == "nrc-core"));
}

#[tokio::test]
async fn failed_update_can_retain_previous_record() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    let mut retaining = settings();
    retaining.retain_failed_records = true;

    SyncEngine::new(retaining.clone(), root, transport.clone())
        .run()
        .await
        .unwrap();
    transport.serve(CATALOG_URL, catalog("0.7"));
    SyncEngine::new(retaining, root, transport.clone())
        .run()
        .await
        .unwrap();

    let records = IndexStore::new(root.join(".nrc-index.json"))
        .load()
        .await
        .unwrap();
    let sodium = records.iter().find(|r| r.id == "sodium").unwrap();
    assert_eq!(sodium.version, "0.6");
    assert_eq!(sodium.fingerprint, Fingerprint::of_bytes(b"sodium 0.6"));
}

#[tokio::test]
async fn version_bump_retires_previous_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    transport.serve(CATALOG_URL, catalog("0.7"));
    transport.serve(
        "https://registry.test/maven/modrinth/AANobbMI/0.7/AANobbMI-0.7.jar",
        b"sodium 0.7".to_vec(),
    );
    let report = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_clean());
    assert!(!root.join("mods/sodium-0.6.jar").exists());
    assert_eq!(
        std::fs::read(root.join("mods/sodium-0.7.jar")).unwrap(),
        b"sodium 0.7"
    );
}

#[tokio::test]
async fn incompatible_game_version_fails_before_any_transfer() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    let mut wrong = settings();
    wrong.game_version = Some("1.8.9".into());

    let err = SyncEngine::new(wrong, root, transport.clone())
        .run()
        .await
        .unwrap_err();

    match err {
        SyncError::PackIncompatible { available, .. } => {
            assert_eq!(available, vec!["1.21".to_string()])
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.requests(), vec![CATALOG_URL.to_string()]);
    assert!(!root.join("mods").exists());
    assert!(!root.join(".nrc-index.json").exists());
}

#[tokio::test]
async fn loader_mismatch_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let transport = standard_transport();
    let mut quilt = settings();
    quilt.loader = "quilt".parse().unwrap();

    let err = SyncEngine::new(quilt, temp.path(), transport)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::LoaderMismatch { .. }));
}

#[tokio::test]
async fn missing_asset_metadata_aborts_run() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = Arc::new(FakeTransport::default());
    transport.serve(CATALOG_URL, catalog("0.6"));
    transport.serve(SODIUM_06, b"sodium 0.6".to_vec());

    let err = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MetadataFetchFailed { .. }));
    assert!(transport.requests().iter().all(|u| u != SODIUM_06));
    assert!(!root.join(".nrc-index.json").exists());
}

#[tokio::test]
async fn concurrency_cap_holds_across_mods_and_assets() {
    let temp = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport {
        delay: Duration::from_millis(10),
        ..FakeTransport::default()
    });
    transport.serve(CATALOG_URL, catalog("0.6"));
    transport.serve(SODIUM_06, b"sodium 0.6".to_vec());
    transport.serve(CORE_JAR, core_jar());

    let files: Vec<(String, Vec<u8>)> = (0..12)
        .map(|i| (format!("nrc-cosmetics/extra/{i}.png"), format!("png {i}").into_bytes()))
        .collect();
    let listed: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(p, b)| (p.as_str(), b.as_slice()))
        .collect();
    transport.serve("https://assets.test/meta/nrc-cosmetics", asset_metadata(&listed));
    for (path, body) in &files {
        transport.serve(&format!("https://assets.test/nrc-cosmetics/{path}"), body.clone());
    }

    let mut capped = settings();
    capped.max_concurrent_downloads = 3;
    let report = SyncEngine::new(capped, temp.path(), transport.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.assets.len(), 12);
    assert!(transport.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn local_override_replaces_asset_and_feeds_the_patch() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let override_file = root.join("nrc_asset_overrides/mine").join(LOGO_PATH);
    std::fs::create_dir_all(override_file.parent().unwrap()).unwrap();
    std::fs::write(&override_file, b"my logo").unwrap();

    let transport = standard_transport();
    let report = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    assert!(report.assets.is_empty());
    assert!(transport
        .requests()
        .iter()
        .all(|u| !u.ends_with("logo.png")));
    assert_eq!(
        std::fs::read(root.join("NoRiskClient/assets").join(LOGO_PATH)).unwrap(),
        b"my logo"
    );
    assert_eq!(
        jar_entry(&root.join("mods/nrc-core-1.0.0.jar"), "assets/nrc/logo.png").unwrap(),
        b"my logo"
    );
}

#[tokio::test]
async fn corrupt_manifest_means_everything_is_fetched_again() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    std::fs::write(root.join(".nrc-index.json"), b"not json").unwrap();
    let report = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    let mods_downloaded = report
        .mods
        .iter()
        .filter(|m| m.outcome == ArtifactOutcome::Downloaded)
        .count();
    assert_eq!(mods_downloaded, 2);
    let records = IndexStore::new(root.join(".nrc-index.json"))
        .load()
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn corrupted_local_files_are_fetched_again() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let transport = standard_transport();
    SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    let sodium = root.join("mods/sodium-0.6.jar");
    let logo = root.join("NoRiskClient/assets").join(LOGO_PATH);
    std::fs::write(&sodium, b"truncated").unwrap();
    std::fs::write(&logo, b"bit rot").unwrap();

    let report = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(report.verified_count(), 1);
    assert_eq!(std::fs::read(&sodium).unwrap(), b"sodium 0.6");
    assert_eq!(std::fs::read(&logo).unwrap(), b"custom logo");

    let records = IndexStore::new(root.join(".nrc-index.json"))
        .load()
        .await
        .unwrap();
    let record = records.iter().find(|r| r.id == "sodium").unwrap();
    assert_eq!(record.fingerprint, Fingerprint::of_bytes(b"sodium 0.6"));
}

#[tokio::test]
async fn patch_failure_aborts_without_touching_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let manifest = root.join(".nrc-index.json");
    let previous = format!(
        r#"[{{"id": "old-mod", "hash": "{}", "version": "1"}}]"#,
        md5(b"old")
    );
    std::fs::write(&manifest, &previous).unwrap();

    let transport = standard_transport();
    transport.serve(CORE_JAR, b"this is not a zip".to_vec());

    let err = SyncEngine::new(settings(), root, transport.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::ArchivePatchFailed { .. }));
    assert!(!err.is_preflight());
    assert_eq!(
        std::fs::read(root.join("mods/nrc-core-1.0.0.jar")).unwrap(),
        b"this is not a zip"
    );
    assert_eq!(std::fs::read_to_string(&manifest).unwrap(), previous);
    let leftovers = std::fs::read_dir(root.join("mods"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .count();
    assert_eq!(leftovers, 0);
}
