//! Unit tests for Bravefile parsing and validation.

use super::*;
use camino::Utf8PathBuf;
use rstest::rstest;
use std::net::{IpAddr, Ipv4Addr};

const FULL_BRAVEFILE: &str = r#"
base:
  image: alpine/3.18
  location: public
copy:
  - source: app/
    target: /opt/app
    action: chmod +x /opt/app/run.sh
run:
  - command: sh
    args: ["-c"]
    content: echo ready
service:
  name: web
  image: web-1.0
  version: "1.0"
  ip: 10.0.0.20
  ports:
    - "8080:80"
    - "8443:443"
  resources:
    cpu: 4
    ram: 4GB
"#;

#[rstest]
fn parses_complete_bravefile() {
    let description = UnitDescription::from_yaml(FULL_BRAVEFILE).expect("valid Bravefile");

    assert_eq!(description.base.image, "alpine/3.18");
    assert_eq!(description.base.location, Location::Public);
    assert_eq!(description.service.name, "web");
    assert_eq!(description.service.version, "1.0");
    assert_eq!(
        description.service.ip,
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 20)))
    );
    assert_eq!(
        description.service.ports,
        vec![
            PortMapping {
                host: 8080,
                container: 80
            },
            PortMapping {
                host: 8443,
                container: 443
            },
        ]
    );
    assert_eq!(description.service.resources.cpu.as_deref(), Some("4"));
    assert_eq!(description.service.resources.ram.as_deref(), Some("4GB"));
    assert_eq!(description.copy.len(), 1);
    assert_eq!(
        description.copy.first().and_then(|c| c.action.as_deref()),
        Some("chmod +x /opt/app/run.sh")
    );
}

#[rstest]
fn location_defaults_to_public() {
    let description = UnitDescription::from_yaml("base:\n  image: ubuntu/22.04\nservice:\n  name: db\n")
        .expect("valid Bravefile");
    assert_eq!(description.base.location, Location::Public);
}

#[rstest]
fn missing_service_name_is_rejected() {
    let err = UnitDescription::from_yaml("base:\n  image: alpine/3.18\n")
        .expect_err("service name is required");
    assert_eq!(
        err,
        BravefileError::Invalid {
            field: String::from("service.name"),
            message: String::from("must not be empty"),
        }
    );
}

#[rstest]
#[case("web_1")]
#[case("-web")]
#[case("web app")]
fn malformed_unit_names_are_rejected(#[case] name: &str) {
    let yaml = format!("service:\n  name: \"{name}\"\n");
    let err = UnitDescription::from_yaml(&yaml).expect_err("name should be rejected");
    assert!(
        matches!(err, BravefileError::Invalid { ref field, .. } if field == "service.name"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn empty_run_command_is_rejected() {
    let yaml = "service:\n  name: web\nrun:\n  - command: echo\n  - command: \"  \"\n";
    let err = UnitDescription::from_yaml(yaml).expect_err("empty command should be rejected");
    assert!(
        matches!(err, BravefileError::Invalid { ref field, .. } if field == "run[1].command"),
        "unexpected error: {err}"
    );
}

#[rstest]
#[case("8080")]
#[case("http:80")]
#[case("70000:80")]
fn malformed_port_mappings_fail_to_parse(#[case] value: &str) {
    assert!(value.parse::<PortMapping>().is_err());
}

#[rstest]
fn malformed_port_in_yaml_is_a_parse_error() {
    let yaml = "service:\n  name: web\n  ports: [\"80\"]\n";
    let err = UnitDescription::from_yaml(yaml).expect_err("port should be rejected");
    assert!(
        matches!(err, BravefileError::Parse { ref message } if message.contains("HOST:CONTAINER")),
        "unexpected error: {err}"
    );
}

#[rstest]
fn invalid_ip_is_a_parse_error() {
    let yaml = "service:\n  name: web\n  ip: 10.0.0\n";
    let err = UnitDescription::from_yaml(yaml).expect_err("ip should be rejected");
    assert!(matches!(err, BravefileError::Parse { .. }), "unexpected error: {err}");
}

#[rstest]
fn empty_ip_means_dynamic_address() {
    let yaml = "service:\n  name: web\n  ip: \"\"\n";
    let description = UnitDescription::from_yaml(yaml).expect("valid Bravefile");
    assert_eq!(description.service.ip, None);
}

#[rstest]
fn unmodelled_sections_are_ignored() {
    let yaml = r#"
base:
  image: alpine/3.18
  location: public
packages:
  manager: apk
  system: [nginx]
service:
  name: web
  version: "1.0"
  resources:
    cpu: "1"
    gpu: "no"
"#;
    let description = UnitDescription::from_yaml(yaml).expect("valid Bravefile");
    assert_eq!(description.service.image_name(), "web-1.0");
    assert_eq!(description.service.resources.cpu.as_deref(), Some("1"));
}

#[rstest]
fn run_argv_appends_content_last() {
    let directive = RunDirective {
        command: String::from("bash"),
        args: vec![String::from("-c")],
        content: Some(String::from("echo hi")),
    };
    assert_eq!(directive.argv(), vec!["bash", "-c", "echo hi"]);
}

#[rstest]
fn run_argv_skips_empty_content() {
    let directive = RunDirective {
        command: String::from("true"),
        args: Vec::new(),
        content: Some(String::new()),
    };
    assert_eq!(directive.argv(), vec!["true"]);
}

#[rstest]
fn for_image_applies_default_resources() {
    let description = UnitDescription::for_image("web:1.0", "web");
    assert_eq!(description.service.resources.cpu.as_deref(), Some(DEFAULT_CPU));
    assert_eq!(description.service.resources.ram.as_deref(), Some(DEFAULT_RAM));
    assert_eq!(description.base, Base::local("web:1.0"));
    assert!(description.copy.is_empty());
    assert!(description.run.is_empty());
}

#[rstest]
#[case(Location::GitHub, "web-1.0", Base { image: String::from("base"), location: Location::GitHub })]
#[case(Location::Public, "web-1.0", Base::local("web-1.0"))]
#[case(Location::Public, "", Base { image: String::from("base"), location: Location::Public })]
fn deployment_base_prefers_github_then_service_image(
    #[case] location: Location,
    #[case] service_image: &str,
    #[case] expected: Base,
) {
    let description = UnitDescription {
        base: Base {
            image: String::from("base"),
            location,
        },
        service: PlatformService {
            name: String::from("web"),
            image: service_image.to_owned(),
            ..PlatformService::default()
        },
        ..UnitDescription::default()
    };
    assert_eq!(description.deployment_base(), expected);
}

#[rstest]
fn build_validation_requires_version() {
    let description = UnitDescription::from_yaml("base:\n  image: alpine/3.18\nservice:\n  name: web\n")
        .expect("valid for deploy");
    let err = description
        .validate_for_build()
        .expect_err("version is required for builds");
    assert!(
        matches!(err, BravefileError::Invalid { ref field, .. } if field == "service.version"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn numeric_version_is_preserved() {
    let description =
        UnitDescription::from_yaml("service:\n  name: web\n  version: 1.0\n").expect("valid");
    assert_eq!(description.service.version, "1.0");
    assert_eq!(description.service.image_name(), "web-1.0");
}

#[rstest]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join(BRAVEFILE_NAME)).expect("utf8 path");
    std::fs::write(&path, FULL_BRAVEFILE).expect("write Bravefile");

    let description = UnitDescription::load(&path).expect("load Bravefile");
    assert_eq!(description.service.name, "web");
}

#[rstest]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("absent")).expect("utf8 path");

    let err = UnitDescription::load(&path).expect_err("missing file should fail");
    assert!(
        matches!(err, BravefileError::Read { path: ref reported, .. } if reported == &path),
        "unexpected error: {err}"
    );
}
