//! BDD scenarios for the deploy workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{DeployContext, deploy_context};

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Deploy a local image with a published port"
)]
fn scenario_deploy_local_image(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Report the status of the last run command"
)]
fn scenario_report_last_status(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Refuse a missing local image before touching the hypervisor"
)]
fn scenario_missing_local_image(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Delete the imported image when launching fails"
)]
fn scenario_launch_failure(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Delete the unit but keep the image when starting fails"
)]
fn scenario_start_failure(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Roll back the unit and image on interrupt"
)]
fn scenario_interrupt_rolls_back(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Roll back a unit whose launch was interrupted"
)]
fn scenario_interrupted_launch(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Reuse a GitHub image that was already built"
)]
fn scenario_github_cached(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Build a GitHub image that is missing locally"
)]
fn scenario_github_build(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Push copy sources according to their kind"
)]
fn scenario_copy_dispatch(deploy_context: DeployContext) {
    let _ = deploy_context;
}
