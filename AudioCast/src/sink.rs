//! Virtual null sink the caster records from.

use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::info;

pub const PACTL: &str = "pactl";
pub const SINK_NAME: &str = "audiocast";

/// Whether `source` is the monitor of our own virtual sink, in which case
/// the sink has to be created before capturing.
pub fn is_virtual_monitor(source: &str) -> bool {
    source
        .strip_suffix(".monitor")
        .is_some_and(|sink| sink == SINK_NAME)
}

pub fn load_args() -> Vec<String> {
    vec![
        "load-module".to_string(),
        "module-null-sink".to_string(),
        format!("sink_name={}", SINK_NAME),
        "sink_properties=device.description=AudioCast".to_string(),
    ]
}

/// Loads the null sink and returns the module id reported by `pactl`.
pub fn load_null_sink(pactl: &str) -> Result<String> {
    let output = Command::new(pactl)
        .args(load_args())
        .output()
        .with_context(|| format!("cannot run {}", pactl))?;
    if !output.status.success() {
        bail!(
            "{} load-module failed ({}): {}",
            pactl,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let module = parse_module_id(&String::from_utf8_lossy(&output.stdout))?;
    info!("Virtual sink {} loaded (module {})", SINK_NAME, module);
    Ok(module)
}

pub fn unload_module(pactl: &str, module: &str) -> Result<()> {
    let status = Command::new(pactl)
        .args(["unload-module", module])
        .status()
        .with_context(|| format!("cannot run {}", pactl))?;
    if !status.success() {
        bail!("{} unload-module {} failed ({})", pactl, module, status);
    }
    info!("Virtual sink module {} unloaded", module);
    Ok(())
}

fn parse_module_id(stdout: &str) -> Result<String> {
    let id = stdout.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        bail!("unexpected module id from pactl: {:?}", id);
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_monitor() {
        assert!(is_virtual_monitor("audiocast.monitor"));
        assert!(!is_virtual_monitor("audiocast"));
        assert!(!is_virtual_monitor("alsa_output.pci.analog-stereo.monitor"));
    }

    #[test]
    fn test_parse_module_id() {
        assert_eq!(parse_module_id("536870913\n").unwrap(), "536870913");
        assert!(parse_module_id("").is_err());
        assert!(parse_module_id("Failure: Module initialization failed").is_err());
    }

    #[test]
    fn test_load_args() {
        assert_eq!(load_args()[..3], ["load-module", "module-null-sink", "sink_name=audiocast"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_through_fake_pactl() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls");
        let pactl = dir.path().join("pactl");
        std::fs::write(
            &pactl,
            format!("#!/bin/sh\necho \"$@\" >> '{}'\n[ \"$1\" = load-module ] && echo 42\nexit 0\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&pactl, std::fs::Permissions::from_mode(0o755)).unwrap();
        let pactl = pactl.to_str().unwrap();

        assert_eq!(load_null_sink(pactl).unwrap(), "42");
        unload_module(pactl, "42").unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert!(calls[0].starts_with("load-module module-null-sink sink_name=audiocast"));
        assert_eq!(calls[1], "unload-module 42");
    }
}
