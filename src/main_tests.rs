//! Unit tests for the `brave` CLI binary implementation.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};

use bravetools::DeployStage;
use bravetools::hypervisor::ProxyDevice;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

const BRAVEFILE: &str = r"
base:
  image: alpine/3.18
  location: public
service:
  name: from-bravefile
  image: web-1.0
  version: '1.0'
";

#[fixture]
fn workdir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    (dir, path)
}

fn deploy_args(image: Option<&str>, name: Option<&str>) -> DeployCommand {
    DeployCommand {
        image: image.map(str::to_owned),
        config: None,
        ip: None,
        ports: Vec::new(),
        name: name.map(str::to_owned),
    }
}

#[rstest]
fn image_and_name_build_a_description(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = workdir;
    let mut args = deploy_args(Some("web-1.0"), Some("web"));
    args.ip = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
    args.ports = vec![String::from("8080:80")];

    let description = deploy_description(&args, &dir).expect("description");

    assert_eq!(description.service.name, "web");
    assert_eq!(description.service.image, "web-1.0");
    assert_eq!(description.service.ip, args.ip);
    assert_eq!(
        description.service.ports,
        vec![PortMapping {
            host: 8080,
            container: 80
        }]
    );
}

#[rstest]
#[case::no_image(None, Some("web"), "missing image")]
#[case::blank_image(Some("  "), Some("web"), "missing image")]
#[case::no_name(Some("web-1.0"), None, "missing unit name")]
fn missing_arguments_are_usage_errors(
    workdir: (TempDir, Utf8PathBuf),
    #[case] image: Option<&str>,
    #[case] name: Option<&str>,
    #[case] expected: &str,
) {
    let (_guard, dir) = workdir;

    let err = deploy_description(&deploy_args(image, name), &dir).expect_err("usage error");

    assert!(
        matches!(err, CliError::Usage(ref message) if message.contains(expected)),
        "unexpected error: {err}"
    );
    assert_eq!(err.exit_code(), USAGE_EXIT_CODE);
}

#[rstest]
fn malformed_port_is_rejected(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = workdir;
    let mut args = deploy_args(Some("web-1.0"), Some("web"));
    args.ports = vec![String::from("8080")];

    let err = deploy_description(&args, &dir).expect_err("bad port");

    assert!(matches!(err, CliError::Bravefile(_)), "unexpected error: {err}");
    assert_eq!(err.exit_code(), 1);
}

#[rstest]
fn bravefile_in_working_dir_wins_over_flags(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = workdir;
    fs::write(dir.join(BRAVEFILE_NAME), BRAVEFILE).expect("write Bravefile");

    let description = deploy_description(&deploy_args(Some("other-2.0"), Some("other")), &dir)
        .expect("description");

    assert_eq!(description.service.name, "from-bravefile");
    assert_eq!(description.service.image, "web-1.0");
}

#[rstest]
fn config_flag_names_the_bravefile(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = workdir;
    fs::write(dir.join("unit.yml"), BRAVEFILE).expect("write Bravefile");
    let mut args = deploy_args(None, None);
    args.config = Some(String::from("unit.yml"));

    let description = deploy_description(&args, &dir).expect("description");

    assert_eq!(description.service.name, "from-bravefile");
}

#[rstest]
fn missing_config_file_is_reported(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = workdir;
    let mut args = deploy_args(None, None);
    args.config = Some(String::from("absent.yml"));

    let err = deploy_description(&args, &dir).expect_err("missing file");

    assert!(matches!(err, CliError::Bravefile(_)), "unexpected error: {err}");
}

#[rstest]
fn default_bravefile_is_only_used_when_present(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = workdir;
    assert_eq!(bravefile_path(None, &dir), None);

    fs::write(dir.join(BRAVEFILE_NAME), BRAVEFILE).expect("write Bravefile");

    assert_eq!(
        bravefile_path(None, &dir),
        Some(dir.join(BRAVEFILE_NAME))
    );
    assert_eq!(
        bravefile_path(Some("/srv/unit.yml"), &dir),
        Some(Utf8PathBuf::from("/srv/unit.yml"))
    );
}

#[rstest]
fn interrupted_deploy_exits_with_signal_status() {
    let err = CliError::Deploy(Box::new(DeployError::Interrupted {
        stage: DeployStage::Running,
        message: String::from("unit deleted"),
    }));

    assert_eq!(err.exit_code(), i32::from(INTERRUPTED_EXIT_CODE));
}

#[rstest]
fn deploy_summary_lists_published_ports() {
    let outcome = DeployOutcome {
        unit: String::from("web"),
        fingerprint: None,
        run_status: 3,
        proxies: vec![ProxyDevice::for_port(
            "web",
            &PortMapping {
                host: 8080,
                container: 80,
            },
        )],
    };
    let mut buf = Vec::new();

    write_deploy_summary(&mut buf, &outcome).expect("write summary");

    let rendered = String::from_utf8(buf).expect("utf8");
    assert!(rendered.starts_with("deployed web\n"), "rendered: {rendered}");
    assert!(
        rendered.contains("tcp:0.0.0.0:8080 -> tcp:127.0.0.1:80"),
        "rendered: {rendered}"
    );
    assert!(rendered.contains("status 3"), "rendered: {rendered}");
}

#[rstest]
fn write_error_writes_cli_error() {
    let mut buf = Vec::new();
    let err = CliError::Usage(String::from("missing unit name: pass --name NAME"));

    write_error(&mut buf, &err);

    let rendered = String::from_utf8(buf).expect("utf8");
    assert_eq!(rendered, "brave: missing unit name: pass --name NAME\n");
}
