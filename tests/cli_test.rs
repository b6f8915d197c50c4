use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn command_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn test_cli_earning_and_listing() -> Result<(), Box<dyn std::error::Error>> {
    let input = command_file(&[
        r#"{"op":"add_earning","user_id":"u1","amount":"25","kind":"earning"}"#,
        r#"{"op":"list_transactions","user_id":"u1"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""success":true"#))
        .stdout(predicate::str::contains(r#""kind":"earning""#))
        .stdout(predicate::str::contains(r#""rail":"manual""#));

    Ok(())
}

#[test]
fn test_cli_withdrawal_without_rails_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    // No config file: all rails disabled, so a valid withdrawal request has
    // nowhere to go.
    let input = command_file(&[
        r#"{"op":"add_earning","user_id":"u1","amount":"100","kind":"earning"}"#,
        r#"{"op":"create_withdrawal","user_id":"u1","to_address":"DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L","amount":"40"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""kind":"no_rail_available""#))
        .stdout(predicate::str::contains(r#""success":false"#));

    Ok(())
}

#[test]
fn test_cli_estimate_fee() -> Result<(), Box<dyn std::error::Error>> {
    let input = command_file(&[r#"{"op":"estimate_fee","amount":"100"}"#]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""policy_fee":"1""#))
        .stdout(predicate::str::contains(r#""net_amount":"99""#));

    Ok(())
}

#[test]
fn test_cli_malformed_command_reported_and_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let input = command_file(&[
        "this is not json",
        r#"{"op":"estimate_fee","amount":"50"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains(r#""net_amount":"49""#));

    Ok(())
}

#[test]
fn test_cli_config_overrides_policy() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "[withdrawal]\nfee_fixed = \"2\"")?;

    let input = command_file(&[r#"{"op":"estimate_fee","amount":"100"}"#]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path()).arg("--config").arg(config.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""policy_fee":"2""#));

    Ok(())
}

#[test]
fn test_cli_missing_input_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("does-not-exist.jsonl");
    cmd.assert().failure();

    Ok(())
}
