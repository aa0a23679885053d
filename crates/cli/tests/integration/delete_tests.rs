//! Delete command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn delete_policy_is_validated() {
  TestEnv::empty()
    .cft_cmd()
    .args(["delete", "--delete-policy", "shred", "name: a\nproject: p"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("shred"));
}

#[test]
fn delete_without_credentials_fails() {
  let env = TestEnv::empty();
  env.write_file("a.yaml", "name: a\nproject: p\n");

  env
    .cft_cmd()
    .args(["delete", "--delete-policy", "abandon"])
    .arg(env.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("no access token"));
}
