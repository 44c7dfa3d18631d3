//! Unit tests for the janitor module.

use super::*;
use crate::hypervisor::{DEFAULT_LXC_BIN, LxdHypervisor};
use crate::remote::Remote;
use crate::test_support::{ScriptedRunner, json_images};
use rstest::{fixture, rstest};

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn hypervisor(runner: &ScriptedRunner) -> LxdHypervisor<ScriptedRunner> {
    LxdHypervisor::new(Remote::local(), DEFAULT_LXC_BIN, runner.clone())
}

#[rstest]
#[tokio::test]
async fn prune_deletes_every_image(runner: ScriptedRunner) {
    // list (pre)
    runner.push_stdout(json_images(&[
        ("aaa", &["web-1.0"], 1024),
        ("bbb", &[], 2048),
    ]));
    // delete aaa, bbb
    runner.push_success();
    runner.push_success();
    // list (post)
    runner.push_stdout(json_images(&[]));

    let summary = prune_images(&hypervisor(&runner))
        .await
        .expect("prune should succeed");

    assert_eq!(
        summary.deleted,
        vec![Fingerprint::new("aaa"), Fingerprint::new("bbb")]
    );
    assert_eq!(
        runner.command_strings(),
        vec![
            "lxc image list local: --format json",
            "lxc image delete local:aaa",
            "lxc image delete local:bbb",
            "lxc image list local: --format json",
        ]
    );
}

#[rstest]
#[tokio::test]
async fn prune_of_empty_store_only_lists(runner: ScriptedRunner) {
    runner.push_stdout(json_images(&[]));
    runner.push_stdout(json_images(&[]));

    let summary = prune_images(&hypervisor(&runner))
        .await
        .expect("prune should succeed");

    assert!(summary.deleted.is_empty());
    assert_eq!(runner.invocations().len(), 2);
}

#[rstest]
#[tokio::test]
async fn prune_stops_at_first_failed_deletion(runner: ScriptedRunner) {
    runner.push_stdout(json_images(&[("aaa", &[], 1), ("bbb", &[], 1)]));
    runner.push_failure(1);

    let err = prune_images(&hypervisor(&runner))
        .await
        .expect_err("deletion failure should propagate");

    assert!(
        err.to_string().starts_with("failed to delete image aaa"),
        "unexpected error: {err}"
    );
    assert_eq!(runner.invocations().len(), 2);
}

#[rstest]
#[tokio::test]
async fn prune_reports_images_that_survive(runner: ScriptedRunner) {
    runner.push_stdout(json_images(&[("aaa", &[], 1)]));
    runner.push_success();
    runner.push_stdout(json_images(&[("aaa", &[], 1)]));

    let err = prune_images(&hypervisor(&runner))
        .await
        .expect_err("surviving image should fail the prune");

    assert!(
        matches!(&err, JanitorError::NotClean { message } if message == "aaa"),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn prune_surfaces_listing_failure(runner: ScriptedRunner) {
    runner.push_failure(1);

    let err = prune_images(&hypervisor(&runner))
        .await
        .expect_err("listing failure should propagate");

    assert!(matches!(err, JanitorError::List(_)), "unexpected error: {err}");
}
