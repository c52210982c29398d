mod common;

use std::fs;

use common::*;
use rtvm_common::error::RtvmError;
use rtvm_common::pipeline::{InstallStage, PipelineEvent};
use rtvm_common::platform::Platform;
use rtvm_core::StateStore;

#[test]
fn installs_linux_amd64_release_end_to_end() {
    let h = single_release("go2.1.0");

    let outcome = h.manager.install("2.1.0").unwrap();

    assert_eq!(outcome.version, "go2.1.0");
    assert!(outcome.verified);
    assert_eq!(outcome.path, h.config.version_dir("go2.1.0"));
    assert!(outcome.path.join("src/fmt/print.go").is_file());
    assert!(outcome
        .path
        .join(h.config.layout.entrypoint_relative_path())
        .is_file());
    assert!(fs::read_to_string(outcome.path.join("VERSION"))
        .unwrap()
        .starts_with("go2.1.0"));
    assert!(!outcome.path.join("go").exists(), "prefix must be stripped");

    assert_eq!(
        h.fetch_calls(),
        vec![format!("{PRIMARY}/dl/go2.1.0.linux-amd64.tar.gz")]
    );
    assert_eq!(h.download_dir_entries(), 0, "archive is deleted afterwards");

    let state = StateStore::new(&h.config).load().unwrap();
    let record = state.record("go2.1.0").unwrap();
    assert_eq!(record.install_path, outcome.path);
    assert!(!record.is_active);
    assert!(state.current_version.is_empty());

    let stages: Vec<InstallStage> = h
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::StageStarted { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            InstallStage::Resolving,
            InstallStage::Downloading,
            InstallStage::Verifying,
            InstallStage::Extracting,
            InstallStage::Validating,
        ]
    );
}

#[test]
fn latest_installs_first_stable_in_catalog_order() {
    let newer = go_tarball("go1.22rc1");
    let stable = go_tarball("go1.21.5");
    let older = go_tarball("go1.20.12");
    let releases = vec![
        release(
            "go1.22rc1",
            false,
            vec![artifact("go1.22rc1.linux-amd64.tar.gz", "linux", "amd64", &newer)],
        ),
        release(
            "go1.21.5",
            true,
            vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &stable)],
        ),
        release(
            "go1.20.12",
            true,
            vec![artifact("go1.20.12.linux-amd64.tar.gz", "linux", "amd64", &older)],
        ),
    ];
    let h = Harness::new(
        releases,
        vec![
            ("go1.22rc1.linux-amd64.tar.gz", newer),
            ("go1.21.5.linux-amd64.tar.gz", stable),
            ("go1.20.12.linux-amd64.tar.gz", older),
        ],
    );

    let outcome = h.manager.install("latest").unwrap();
    assert_eq!(outcome.version, "go1.21.5");

    let err = h.manager.install("latest").unwrap_err();
    assert!(matches!(err, RtvmError::AlreadyInstalled(v) if v == "go1.21.5"));
}

#[test]
fn installing_twice_fails_without_touching_anything() {
    let h = single_release("go1.21.5");
    h.manager.install("go1.21.5").unwrap();
    let state_before = fs::read_to_string(h.config.state_file()).unwrap();
    let marker = h.config.version_dir("go1.21.5").join("VERSION");
    let marker_before = fs::metadata(&marker).unwrap().modified().unwrap();
    let catalog_fetches = *h.catalog.fetches.borrow();

    let err = h.manager.install("1.21.5").unwrap_err();

    assert!(matches!(err, RtvmError::AlreadyInstalled(_)));
    assert_eq!(fs::read_to_string(h.config.state_file()).unwrap(), state_before);
    assert_eq!(fs::metadata(&marker).unwrap().modified().unwrap(), marker_before);
    assert_eq!(h.fetch_calls().len(), 1);
    assert_eq!(*h.catalog.fetches.borrow(), catalog_fetches);
}

#[test]
fn unknown_version_downloads_and_writes_nothing() {
    let h = single_release("go1.21.5");

    let err = h.manager.install("go9.9.9").unwrap_err();

    assert!(matches!(err, RtvmError::UnknownVersion(v) if v == "go9.9.9"));
    assert!(h.fetch_calls().is_empty());
    assert_eq!(h.install_dir_entries(), 0);
    assert!(!h.config.state_file().exists());
    let failed = h.drain_events().into_iter().any(|event| {
        matches!(
            event,
            PipelineEvent::InstallFailed {
                stage: InstallStage::Resolving,
                ..
            }
        )
    });
    assert!(failed);
}

#[test]
fn no_artifact_for_platform_is_reported_while_resolving() {
    let bytes = go_tarball("go1.21.5");
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::with_platform(
        releases,
        vec![("go1.21.5.linux-amd64.tar.gz", bytes)],
        Platform::new("linux", "riscv64"),
    );

    let err = h.manager.install("go1.21.5").unwrap_err();
    assert!(matches!(err, RtvmError::NoSuitableArtifact(..)));
    assert!(h.fetch_calls().is_empty());
}

#[test]
fn unsupported_archive_format_fails_before_download() {
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.pkg", "linux", "amd64", b"xar!")],
    )];
    let h = Harness::new(releases, vec![("go1.21.5.linux-amd64.pkg", b"xar!".to_vec())]);

    let err = h.manager.install("go1.21.5").unwrap_err();
    assert!(matches!(err, RtvmError::Format(_)));
    assert!(h.fetch_calls().is_empty());
}

#[test]
fn digest_mismatch_rolls_back() {
    let good = go_tarball("go1.21.5");
    let mut corrupted = good.clone();
    let middle = corrupted.len() / 2;
    corrupted[middle] ^= 0xff;
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &good)],
    )];
    let h = Harness::new(releases, vec![("go1.21.5.linux-amd64.tar.gz", corrupted)]);

    let err = h.manager.install("go1.21.5").unwrap_err();

    assert!(matches!(err, RtvmError::DigestMismatch(_)));
    assert!(!h.config.version_dir("go1.21.5").exists());
    assert_eq!(h.download_dir_entries(), 0);
    assert!(!StateStore::new(&h.config).load().unwrap().is_installed("go1.21.5"));
}

#[test]
fn missing_digest_installs_unverified_and_says_so() {
    let bytes = go_tarball("go1.21.5");
    let mut descriptor = artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes);
    descriptor.digest.clear();
    let h = Harness::new(
        vec![release("go1.21.5", true, vec![descriptor])],
        vec![("go1.21.5.linux-amd64.tar.gz", bytes)],
    );

    let outcome = h.manager.install("go1.21.5").unwrap();

    assert!(!outcome.verified);
    let skipped = h
        .drain_events()
        .into_iter()
        .any(|event| matches!(event, PipelineEvent::VerificationSkipped { .. }));
    assert!(skipped);
}

#[test]
fn marker_mismatch_fails_validation_and_removes_directory() {
    let bytes = go_tarball("go1.21.4");
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::new(releases, vec![("go1.21.5.linux-amd64.tar.gz", bytes)]);

    let err = h.manager.install("go1.21.5").unwrap_err();

    assert!(matches!(err, RtvmError::Validation(_)));
    assert!(!h.config.version_dir("go1.21.5").exists());
    assert!(!StateStore::new(&h.config).load().unwrap().is_installed("go1.21.5"));
    let failed_stage = h.drain_events().into_iter().find_map(|event| match event {
        PipelineEvent::InstallFailed { stage, .. } => Some(stage),
        _ => None,
    });
    assert_eq!(failed_stage, Some(InstallStage::Validating));
}

fn failed_stage(h: &Harness) -> Option<InstallStage> {
    h.drain_events().into_iter().find_map(|event| match event {
        PipelineEvent::InstallFailed { stage, .. } => Some(stage),
        _ => None,
    })
}

#[test]
fn missing_entrypoint_fails_validation_and_removes_directory() {
    let bytes = go_tarball_without_entrypoint("go1.21.5");
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::new(releases, vec![("go1.21.5.linux-amd64.tar.gz", bytes)]);

    let err = h.manager.install("go1.21.5").unwrap_err();

    assert!(matches!(err, RtvmError::Validation(ref msg) if msg.contains("Entry point")));
    assert!(!h.config.version_dir("go1.21.5").exists());
    assert!(!StateStore::new(&h.config).load().unwrap().is_installed("go1.21.5"));
    assert_eq!(failed_stage(&h), Some(InstallStage::Validating));
}

#[test]
fn corrupt_tar_inside_valid_gzip_fails_extraction_and_rolls_back() {
    // Passes the digest and content sniff; the tar headers are garbage.
    let bytes = gzip(&[0xab; 4096]);
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::new(releases, vec![("go1.21.5.linux-amd64.tar.gz", bytes)]);

    let err = h.manager.install("go1.21.5").unwrap_err();

    assert!(matches!(err, RtvmError::Format(_)), "unexpected error {err:?}");
    assert!(!h.config.version_dir("go1.21.5").exists());
    assert_eq!(h.download_dir_entries(), 0);
    assert!(!StateStore::new(&h.config).load().unwrap().is_installed("go1.21.5"));
    assert_eq!(failed_stage(&h), Some(InstallStage::Extracting));
}

#[test]
fn mirror_is_tried_after_primary_attempts_are_exhausted() {
    let bytes = go_tarball("go1.21.5");
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::build(
        releases,
        vec![("go1.21.5.linux-amd64.tar.gz", bytes)],
        linux_amd64(),
        vec![PRIMARY.to_string()],
    );

    h.manager.install("go1.21.5").unwrap();

    let primary_url = format!("{PRIMARY}/dl/go1.21.5.linux-amd64.tar.gz");
    let mirror_url = format!("{MIRROR}/dl/go1.21.5.linux-amd64.tar.gz");
    assert_eq!(
        h.fetch_calls(),
        vec![primary_url.clone(), primary_url.clone(), primary_url, mirror_url]
    );
}

#[test]
fn every_base_failing_surfaces_the_network_error() {
    let bytes = go_tarball("go1.21.5");
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::build(
        releases,
        vec![("go1.21.5.linux-amd64.tar.gz", bytes)],
        linux_amd64(),
        vec![PRIMARY.to_string(), MIRROR.to_string()],
    );

    let err = h.manager.install("go1.21.5").unwrap_err();

    assert!(matches!(err, RtvmError::Network(url, _) if url.starts_with(MIRROR)));
    assert_eq!(h.fetch_calls().len(), 6);
    assert_eq!(h.install_dir_entries(), 0);
}

#[test]
fn leftover_directory_without_record_is_replaced() {
    let h = single_release("go1.21.5");
    let leftover = h.config.version_dir("go1.21.5");
    fs::create_dir_all(leftover.join("pkg")).unwrap();
    fs::write(leftover.join("pkg/half-written.a"), b"junk").unwrap();

    h.manager.install("go1.21.5").unwrap();

    assert!(!leftover.join("pkg/half-written.a").exists());
    assert!(leftover.join("VERSION").is_file());
}

#[test]
fn zip_artifacts_install_for_windows_platform() {
    let bytes = go_zip("go1.21.5");
    let releases = vec![release(
        "go1.21.5",
        true,
        vec![
            artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", b"unused"),
            artifact("go1.21.5.windows-amd64.zip", "windows", "amd64", &bytes),
        ],
    )];
    let h = Harness::with_platform(
        releases,
        vec![("go1.21.5.windows-amd64.zip", bytes)],
        Platform::new("windows", "amd64"),
    );

    let outcome = h.manager.install("go1.21.5").unwrap();
    assert_eq!(
        h.fetch_calls(),
        vec![format!("{PRIMARY}/dl/go1.21.5.windows-amd64.zip")]
    );
    assert!(outcome.path.join("VERSION").is_file());
}

#[test]
fn html_error_page_served_as_archive_is_rejected() {
    let page = b"<!DOCTYPE html><html><body>Not Found</body></html>".to_vec();
    let mut descriptor = artifact("go1.21.5.linux-amd64.tar.gz", "linux", "amd64", &page);
    descriptor.digest.clear();
    let h = Harness::new(
        vec![release("go1.21.5", true, vec![descriptor])],
        vec![("go1.21.5.linux-amd64.tar.gz", page)],
    );

    let err = h.manager.install("go1.21.5").unwrap_err();
    assert!(matches!(err, RtvmError::Format(_)));
    assert!(!h.config.version_dir("go1.21.5").exists());
}

#[test]
fn tgz_artifact_is_recorded_inactive_at_its_version_dir() {
    let bytes = go_tarball("go2.1.0");
    let releases = vec![release(
        "go2.1.0",
        true,
        vec![artifact("pkg-2.1.0-linux-amd64.tgz", "linux", "amd64", &bytes)],
    )];
    let h = Harness::new(releases, vec![("pkg-2.1.0-linux-amd64.tgz", bytes)]);

    h.manager.install("go2.1.0").unwrap();

    assert_eq!(
        h.fetch_calls(),
        vec![format!("{PRIMARY}/dl/pkg-2.1.0-linux-amd64.tgz")]
    );
    let record = StateStore::new(&h.config)
        .load()
        .unwrap()
        .record("go2.1.0")
        .cloned()
        .unwrap();
    assert_eq!(record.install_path, h.config.version_dir("go2.1.0"));
    assert!(!record.is_active);
}
