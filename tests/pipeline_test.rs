//! End-to-end pipeline tests: fetch through a real HTTP strategy into a
//! real cache directory, then reconcile install state and drive the
//! decision engine against scripted collaborators.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use stockpile::artifact::{Artifact, ChecksumSpec, Origin};
use stockpile::checksum::{Checksum, ChecksumMismatchError};
use stockpile::download::ArtifactDownload;
use stockpile::installer::{Decision, InstallOptions, Installer, OptionValue, PackageRunner};
use stockpile::quarantine::{NoopQuarantine, QuarantineIntent};
use stockpile::state::{InstallState, StateEnumerator};

// sha256 of the ASCII string "artifact payload"
const PAYLOAD_SHA256: &str = "a11a4045c89f727fadb9aeddb0f29637ce5b505846afebd82ae2c01b6733a6b5";

fn artifact_for(server: &mockito::ServerGuard, sha256: ChecksumSpec, origin: Origin) -> Artifact {
    let mut artifact = Artifact::new("tool");
    artifact.url = Some(format!("{}/tool-1.0.tar.gz", server.url()));
    artifact.sha256 = sha256;
    artifact.origin = origin;
    artifact
}

fn download_for(artifact: Artifact, cache: &Path) -> ArtifactDownload {
    ArtifactDownload::new(
        Arc::new(artifact),
        cache,
        Arc::new(NoopQuarantine),
        QuarantineIntent::Unset,
    )
    .unwrap()
}

#[test_log::test(tokio::test)]
async fn fetch_verify_and_cache_round_trip() {
    let mut server = mockito::Server::new_async().await;
    // expect(1): the second fetch must be served from the cache
    let mock = server
        .mock("GET", "/tool-1.0.tar.gz")
        .with_status(200)
        .with_body("artifact payload")
        .expect(1)
        .create_async()
        .await;

    let cache = tempfile::tempdir().unwrap();
    let artifact = artifact_for(
        &server,
        ChecksumSpec::Sha256(Checksum::new(PAYLOAD_SHA256)),
        Origin::ThirdParty,
    );
    let download = download_for(artifact, cache.path());

    assert!(!download.downloaded());
    let path = download
        .fetch(true, Some(Duration::from_secs(10)), true)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "artifact payload");
    assert!(download.downloaded());

    // cached_download is stable and the cache satisfies a re-fetch
    assert_eq!(download.cached_download().unwrap(), path);
    let again = download.fetch(true, None, true).await.unwrap();
    assert_eq!(again, path);
    mock.assert_async().await;

    // clearing the cache forces the next fetch to hit the network again
    download.clear_cache().unwrap();
    assert!(!download.downloaded());
}

#[test_log::test(tokio::test)]
async fn checksum_mismatch_is_fatal_and_preserves_the_file() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/tool-1.0.tar.gz")
        .with_status(200)
        .with_body("tampered payload")
        .create_async()
        .await;

    let cache = tempfile::tempdir().unwrap();
    let artifact = artifact_for(
        &server,
        ChecksumSpec::Sha256(Checksum::new(PAYLOAD_SHA256)),
        Origin::ThirdParty,
    );
    let download = download_for(artifact, cache.path());

    let err = download.fetch(true, None, true).await.unwrap_err();
    assert!(err.downcast_ref::<ChecksumMismatchError>().is_some());

    // the bad file stays on disk for inspection
    let cached = download.cached_download().unwrap();
    assert!(cached.exists());
    assert_eq!(std::fs::read_to_string(cached).unwrap(), "tampered payload");
}

#[tokio::test]
async fn unset_checksum_does_not_block_the_fetch() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/tool-1.0.tar.gz")
        .with_status(200)
        .with_body("artifact payload")
        .create_async()
        .await;

    let cache = tempfile::tempdir().unwrap();
    let artifact = artifact_for(&server, ChecksumSpec::Unset, Origin::ThirdParty);
    let download = download_for(artifact, cache.path());

    // warned about, but never fatal
    assert!(download.fetch(true, None, true).await.is_ok());
}

#[tokio::test]
async fn official_no_check_artifact_skips_verification() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/tool-1.0.tar.gz")
        .with_status(200)
        .with_body("artifact payload")
        .create_async()
        .await;

    let cache = tempfile::tempdir().unwrap();
    let artifact = artifact_for(&server, ChecksumSpec::NoCheck, Origin::Official);
    let download = download_for(artifact, cache.path());

    assert!(download.fetch(true, None, true).await.is_ok());
}

#[tokio::test]
async fn probe_reports_remote_metadata() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("HEAD", "/tool-1.0.tar.gz")
        .with_status(200)
        .with_header("last-modified", "Tue, 05 May 2026 10:00:00 GMT")
        .with_body("x".repeat(16))
        .create_async()
        .await;

    let cache = tempfile::tempdir().unwrap();
    let artifact = artifact_for(&server, ChecksumSpec::Unset, Origin::ThirdParty);
    let download = download_for(artifact, cache.path());

    let info = download.probe(Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(info.size, 16);
    assert!(info.last_modified.is_some());
}

// --- scripted collaborators for the reconciliation tests ---

/// Enumerator with fixed sets, counting how often it is consulted.
struct ScriptedEnumerator {
    installed: HashSet<String>,
    outdated: HashSet<String>,
    enumerations: Mutex<usize>,
}

impl ScriptedEnumerator {
    fn new(installed: &[&str], outdated: &[&str]) -> Self {
        Self {
            installed: installed.iter().map(|s| s.to_string()).collect(),
            outdated: outdated.iter().map(|s| s.to_string()).collect(),
            enumerations: Mutex::new(0),
        }
    }

    fn enumerations(&self) -> usize {
        *self.enumerations.lock().unwrap()
    }
}

#[async_trait]
impl StateEnumerator for ScriptedEnumerator {
    async fn list_installed(&self) -> Result<HashSet<String>> {
        *self.enumerations.lock().unwrap() += 1;
        Ok(self.installed.clone())
    }

    async fn list_outdated(&self) -> Result<HashSet<String>> {
        Ok(self.outdated.clone())
    }

    async fn is_outdated_greedy(&self, _name: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Runner that records every invocation and always succeeds.
#[derive(Default)]
struct RecordingRunner {
    invocations: Mutex<Vec<(String, String, Vec<String>)>>,
}

impl RecordingRunner {
    fn invocations(&self) -> Vec<(String, String, Vec<String>)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageRunner for RecordingRunner {
    async fn run(&self, subcommand: &str, target: &str, flags: &[String]) -> bool {
        self.invocations.lock().unwrap().push((
            subcommand.to_string(),
            target.to_string(),
            flags.to_vec(),
        ));
        true
    }

    async fn run_postinstall(&self, command: &str) -> bool {
        self.invocations.lock().unwrap().push((
            "postinstall".to_string(),
            command.to_string(),
            Vec::new(),
        ));
        true
    }
}

#[tokio::test]
async fn reconciliation_drives_each_decision_once() {
    let enumerator = Arc::new(ScriptedEnumerator::new(&["present", "stale"], &["stale"]));
    let state = Arc::new(InstallState::new(enumerator.clone()));
    let runner = Arc::new(RecordingRunner::default());
    let installer = Installer::new(Arc::clone(&state), runner.clone());

    let options = InstallOptions::default();

    // missing -> fresh install, present -> skip, stale -> upgrade
    assert_eq!(
        installer.decide("missing", &options).await.unwrap(),
        Decision::FreshInstall
    );
    assert_eq!(
        installer.decide("present", &options).await.unwrap(),
        Decision::Skip
    );
    assert_eq!(
        installer.decide("stale", &options).await.unwrap(),
        Decision::Upgrade
    );

    // the whole run cost exactly one enumeration
    assert_eq!(enumerator.enumerations(), 1);

    assert!(installer.install("missing", &options).await.unwrap());
    assert!(installer.install("stale", &options).await.unwrap());

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].0, "install");
    assert_eq!(invocations[0].1, "missing");
    assert!(invocations[0].2.contains(&"--adopt".to_string()));
    assert_eq!(invocations[1].0, "upgrade");
    assert_eq!(invocations[1].1, "stale");

    // the fresh install was recorded without another enumeration
    assert!(state.is_installed("missing").await.unwrap());
    assert_eq!(enumerator.enumerations(), 1);

    // reset forces one (and only one) re-enumeration
    state.reset();
    state.installed_names().await.unwrap();
    state.is_installed("present").await.unwrap();
    assert_eq!(enumerator.enumerations(), 2);
}

#[tokio::test]
async fn install_builds_flags_from_options() {
    let enumerator = Arc::new(ScriptedEnumerator::new(&[], &[]));
    let state = Arc::new(InstallState::new(enumerator));
    let runner = Arc::new(RecordingRunner::default());
    let installer = Installer::new(state, runner.clone());

    let options = InstallOptions {
        force: true,
        postinstall: Some("post --setup".to_string()),
        args: BTreeMap::from([
            ("quiet".to_string(), OptionValue::Bool(true)),
            ("headless".to_string(), OptionValue::Bool(false)),
            ("appdir".to_string(), OptionValue::Value("/opt".to_string())),
        ]),
        ..Default::default()
    };

    assert!(installer.install("tool", &options).await.unwrap());

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2);

    let flags = &invocations[0].2;
    assert!(flags.contains(&"--quiet".to_string()));
    assert!(flags.contains(&"--appdir=/opt".to_string()));
    assert!(flags.contains(&"--force".to_string()));
    assert!(!flags.contains(&"--adopt".to_string()));
    assert!(!flags.iter().any(|flag| flag.contains("headless")));

    // the post-install hook ran because the artifact is now installed
    assert_eq!(invocations[1].0, "postinstall");
    assert_eq!(invocations[1].1, "post --setup");
}
