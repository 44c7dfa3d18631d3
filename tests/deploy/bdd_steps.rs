//! BDD step definitions for the deploy workflow.

use bravetools::UnitDescription;
use bravetools::bravefile::{CopyDirective, PortMapping, RunDirective};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{DeployContext, DeployResult, github_unit, remote_description};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a local image \"{stem}\" in the store")]
fn local_image(deploy_context: DeployContext, stem: String) -> DeployContext {
    deploy_context.touch_image(stem.trim());
    deploy_context
}

#[given("a unit \"{name}\" deploying image \"{image}\"")]
fn unit_from_image(mut deploy_context: DeployContext, name: String, image: String) -> DeployContext {
    deploy_context.description = UnitDescription::for_image(image.trim(), name.trim());
    deploy_context
}

#[given("a unit \"{name}\" deploying GitHub base \"{repository}\"")]
fn unit_from_github(
    mut deploy_context: DeployContext,
    name: String,
    repository: String,
) -> DeployContext {
    deploy_context.description = github_unit(name.trim(), repository.trim());
    deploy_context
}

#[given("the GitHub Bravefile describes \"{name}\" version \"{version}\"")]
fn github_bravefile(deploy_context: DeployContext, name: String, version: String) -> DeployContext {
    deploy_context
        .fetcher
        .serve(remote_description(name.trim(), version.trim()));
    deploy_context
}

#[given("the unit publishes host port \"{host}\" to unit port \"{container}\"")]
fn publishes_port(mut deploy_context: DeployContext, host: u16, container: u16) -> DeployContext {
    deploy_context
        .description
        .service
        .ports
        .push(PortMapping { host, container });
    deploy_context
}

#[given("the unit runs \"{command}\" exiting with \"{status}\"")]
fn runs_command(mut deploy_context: DeployContext, command: String, status: i32) -> DeployContext {
    deploy_context.description.run.push(RunDirective {
        command: String::from("sh"),
        args: vec![String::from("-c")],
        content: Some(command),
    });
    deploy_context.hypervisor.push_exec_status(status);
    deploy_context
}

#[given("the working directory holds a directory \"{name}\"")]
fn working_directory(deploy_context: DeployContext, name: String) -> DeployContext {
    let path = deploy_context.working_dir.join(name.trim());
    std::fs::create_dir_all(&path).unwrap_or_else(|err| panic!("create {path}: {err}"));
    deploy_context
}

#[given("the working directory holds a file \"{name}\"")]
fn working_file(deploy_context: DeployContext, name: String) -> DeployContext {
    let path = deploy_context.working_dir.join(name.trim());
    std::fs::write(&path, b"#!/bin/sh\n").unwrap_or_else(|err| panic!("write {path}: {err}"));
    deploy_context
}

#[given("the working directory holds a symlink \"{name}\" to \"{target}\"")]
fn working_symlink(deploy_context: DeployContext, name: String, target: String) -> DeployContext {
    let path = deploy_context.working_dir.join(name.trim());
    std::os::unix::fs::symlink(target.trim(), &path)
        .unwrap_or_else(|err| panic!("symlink {path}: {err}"));
    deploy_context
}

#[given("the unit copies \"{source}\" to \"{target}\"")]
fn copies(mut deploy_context: DeployContext, source: String, target: String) -> DeployContext {
    deploy_context.description.copy.push(CopyDirective {
        source,
        target,
        action: None,
    });
    deploy_context
}

#[given("the hypervisor fails to \"{operation}\"")]
fn hypervisor_fails(deploy_context: DeployContext, operation: String) -> DeployContext {
    deploy_context.hypervisor.fail(operation.trim());
    deploy_context
}

#[given("an interrupt arrives during \"{operation}\"")]
fn interrupt_during(deploy_context: DeployContext, operation: String) -> DeployContext {
    deploy_context.hypervisor.interrupt_on(operation.trim());
    deploy_context
}

#[when("I deploy the unit")]
fn deploy_unit(mut deploy_context: DeployContext) -> Result<DeployContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let orchestrator = deploy_context.orchestrator();
    let description = deploy_context.description.clone();

    let result = runtime.block_on(async move { orchestrator.deploy(&description).await });
    deploy_context.outcome = Some(match result {
        Ok(outcome) => DeployResult::Success(outcome),
        Err(err) => DeployResult::Failure {
            message: err.to_string(),
            interrupted: err.is_interrupted(),
        },
    });
    Ok(deploy_context)
}

#[then("the deployment succeeds")]
fn deployment_succeeds(deploy_context: &DeployContext) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployResult::Success(_)) => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected success, got {other:?}"
        ))),
    }
}

#[then("the deployment fails mentioning \"{text}\"")]
fn deployment_fails(deploy_context: &DeployContext, text: String) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployResult::Failure {
            ref message,
            interrupted: false,
        }) if message.contains(text.trim()) => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected failure mentioning {text:?}, got {other:?}"
        ))),
    }
}

#[then("the deployment is interrupted")]
fn deployment_interrupted(deploy_context: &DeployContext) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployResult::Failure {
            interrupted: true, ..
        }) => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected interruption, got {other:?}"
        ))),
    }
}

#[then("the run status is \"{status}\"")]
fn run_status(deploy_context: &DeployContext, status: i32) -> Result<(), StepError> {
    match deploy_context.outcome {
        Some(DeployResult::Success(ref outcome)) if outcome.run_status == status => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected run status {status}, got {other:?}"
        ))),
    }
}

#[then("the hypervisor received \"{call}\"")]
fn hypervisor_received(deploy_context: &DeployContext, call: String) -> Result<(), StepError> {
    if deploy_context.hypervisor.has_call(&call) {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "missing call {call:?} in {:?}",
        deploy_context.hypervisor.calls()
    )))
}

#[then("the hypervisor did not receive \"{call}\"")]
fn hypervisor_not_received(deploy_context: &DeployContext, call: String) -> Result<(), StepError> {
    if !deploy_context.hypervisor.has_call(&call) {
        return Ok(());
    }
    Err(StepError::Assertion(format!("unexpected call {call:?}")))
}

#[then("the call \"{first}\" precedes \"{second}\"")]
fn hypervisor_order(
    deploy_context: &DeployContext,
    first: String,
    second: String,
) -> Result<(), StepError> {
    let calls = deploy_context.hypervisor.calls();
    let position = |call: &str| calls.iter().position(|recorded| recorded == call);
    match (position(&first), position(&second)) {
        (Some(before), Some(after)) if before < after => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected {first:?} before {second:?} in {calls:?}"
        ))),
    }
}

#[then("no hypervisor calls were made")]
fn no_hypervisor_calls(deploy_context: &DeployContext) -> Result<(), StepError> {
    let calls = deploy_context.hypervisor.calls();
    if calls.is_empty() {
        return Ok(());
    }
    Err(StepError::Assertion(format!("unexpected calls {calls:?}")))
}

#[then("the builder ran \"{count}\" times")]
fn images_built(deploy_context: &DeployContext, count: usize) -> Result<(), StepError> {
    let builds = deploy_context.builder.builds();
    if builds == count {
        return Ok(());
    }
    Err(StepError::Assertion(format!(
        "expected {count} builds, got {builds}"
    )))
}
