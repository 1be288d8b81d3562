// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Smoke tests for the `multicast_tester` binary.

use anyhow::Result;
use std::io::Write;
use std::process::Command;

fn tester() -> Command {
    Command::new(env!("CARGO_BIN_EXE_multicast_tester"))
}

#[test]
fn test_no_arguments_fails() -> Result<()> {
    let output = tester().output()?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_help_lists_both_roles() -> Result<()> {
    let output = tester().arg("--help").output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sender"));
    assert!(stdout.contains("receiver"));
    Ok(())
}

#[test]
fn test_malformed_group_spec_is_rejected() -> Result<()> {
    let output = tester().args(["sender", "239.1.2.3-5000@eth0"]).output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown format"), "stderr: {}", stderr);
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.json5");

    let output = tester().arg("receiver").arg(&path).output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.json5"), "stderr: {}", stderr);
    Ok(())
}

#[test]
fn test_config_without_channels_fails() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "{{ prometheus: {{ enabled: false }}, multicast_channels: [] }}")?;

    let output = tester().arg("receiver").arg(file.path()).output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {}", stderr);
    Ok(())
}

#[test]
fn test_unknown_interface_exits_with_group_error() -> Result<()> {
    let output = tester()
        .args(["sender", "239.1.2.3:5000@nosuchif0", "--count", "1"])
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nosuchif0"), "stderr: {}", stderr);
    Ok(())
}
