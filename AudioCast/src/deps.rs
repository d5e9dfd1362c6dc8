//! Startup check for the external programs the caster runs.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::debug;

/// Resolves `program` the way a shell would: paths are taken as given,
/// bare names are searched in `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH").unwrap_or_default();
    find_program_in(program, env::split_paths(&path))
}

pub fn find_program_in<I>(program: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    if program.is_empty() {
        return None;
    }
    if program.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(program);
        return is_executable(&candidate).then_some(candidate);
    }
    dirs.into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Fails with the list of programs that cannot be found.
pub fn check_dependencies<S: AsRef<str>>(programs: &[S]) -> Result<()> {
    let mut missing = Vec::new();
    for program in programs {
        let program = program.as_ref();
        match find_program(program) {
            Some(path) => debug!("found {} at {}", program, path.display()),
            None => missing.push(program.to_string()),
        }
    }
    if !missing.is_empty() {
        bail!("required programs not found in PATH: {}", missing.join(", "));
    }
    Ok(())
}
