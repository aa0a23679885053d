//! Stage computation through `--show-stages`.

use predicates::prelude::*;

use super::common::{TestEnv, fixture_path};

fn stdout_of(cmd: &mut assert_cmd::Command) -> String {
  let output = cmd.assert().success().get_output().stdout.clone();
  String::from_utf8(output).unwrap()
}

#[test]
fn directory_is_expanded_and_staged_in_dependency_order() {
  let env = TestEnv::from_fixture_dir("network");

  let out = stdout_of(env.cft_cmd().args(["apply", "--show-stages"]).arg(env.path()));

  let networks = out.find("deployment: my-networks").unwrap();
  let firewall = out.find("deployment: my-firewall").unwrap();
  let instance = out.find("deployment: my-instance").unwrap();
  assert!(networks < firewall);
  assert!(firewall < instance);
  assert!(out.contains("---------- Stage 3 ----------"));
  assert!(!out.contains("---------- Stage 4 ----------"));
  assert!(!out.contains("README"));
}

#[test]
fn delete_lists_stages_in_reverse() {
  let out = stdout_of(
    TestEnv::empty()
      .cft_cmd()
      .args(["delete", "--show-stages"])
      .arg(fixture_path("network")),
  );

  let networks = out.find("deployment: my-networks").unwrap();
  let instance = out.find("deployment: my-instance").unwrap();
  assert!(instance < networks);
}

#[test]
fn reverse_flag_reverses_apply_listing() {
  let out = stdout_of(
    TestEnv::empty()
      .cft_cmd()
      .args(["apply", "--reverse", "--show-stages"])
      .arg(fixture_path("network")),
  );

  assert!(out.find("my-instance").unwrap() < out.find("my-networks").unwrap());
}

#[test]
fn json_format_is_nested_lists() {
  let out = stdout_of(
    TestEnv::empty()
      .cft_cmd()
      .args(["apply", "--show-stages", "--format", "json"])
      .arg(fixture_path("network")),
  );

  assert!(out.trim_start().starts_with('['));
  assert!(out.contains("\"deployment\": \"my-networks\""));
  assert!(out.contains("\"project\": \"fixture-project\""));
  assert!(!out.contains("Stage"));
}

#[test]
fn yaml_format_lists_sources() {
  let env = TestEnv::from_fixture_dir("network");

  env
    .cft_cmd()
    .args(["apply", "-s", "-f", "yaml"])
    .arg(env.path().join("networks.yaml"))
    .assert()
    .success()
    .stdout(predicate::str::contains("deployment: my-networks"))
    .stdout(predicate::str::contains("networks.yaml"));
}

#[test]
fn independent_configs_share_a_stage() {
  let env = TestEnv::empty();
  env.write_file("a.yaml", "name: alpha\nproject: p\n");
  env.write_file("b.yml", "name: beta\nproject: p\n");

  let out = stdout_of(env.cft_cmd().args(["create", "--show-stages"]).arg(env.path()));

  assert!(out.contains("deployment: alpha"));
  assert!(out.contains("deployment: beta"));
  assert!(!out.contains("---------- Stage 2 ----------"));
}

#[test]
fn file_name_supplies_missing_deployment_name() {
  let env = TestEnv::empty();
  let path = env.write_file("storage.prod.yaml", "project: p\nresources: []\n");

  env
    .cft_cmd()
    .args(["apply", "--show-stages"])
    .arg(path)
    .assert()
    .success()
    .stdout(predicate::str::contains("deployment: storage"));
}

#[test]
fn templates_see_the_environment() {
  TestEnv::empty()
    .cft_cmd()
    .env("CFT_TEST_STAGE", "prod")
    .args(["apply", "--show-stages", "--project", "p"])
    .arg(fixture_path("templated.jinja"))
    .assert()
    .success()
    .stdout(predicate::str::contains("deployment: templated-prod"));
}

#[test]
fn external_dependency_needs_the_api() {
  let env = TestEnv::empty();
  env.write_file("app.yaml", "name: app\nproject: p\nnet: $(out.shared-net.vpc.selfLink)\n");

  env
    .cft_cmd()
    .args(["apply", "--show-stages"])
    .arg(env.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("p/shared-net"));
}
