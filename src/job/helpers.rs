//! Helper utilities for job command rendering and defaults.

use camino::Utf8Path;
use shell_escape::unix::escape;

use super::JobRequestError;

/// Rejects arguments containing ASCII control characters.
///
/// # Errors
///
/// Returns [`JobRequestError::ControlCharacter`] for the first offending
/// argument.
pub fn validate_command_args(args: &[String]) -> Result<(), JobRequestError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(JobRequestError::ControlCharacter);
        }
    }
    Ok(())
}

/// Joins `args` into one shell command line, quoting where needed.
///
/// Returns `None` for an empty argument list so the container's default
/// command applies.
///
/// # Errors
///
/// Returns [`JobRequestError::ControlCharacter`] when an argument contains
/// control characters.
pub fn render_command(args: &[String]) -> Result<Option<String>, JobRequestError> {
    validate_command_args(args)?;
    if args.is_empty() {
        return Ok(None);
    }
    let rendered = args
        .iter()
        .map(|arg| escape(arg.as_str().into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Some(rendered))
}

pub(super) fn project_name_for(cwd: &Utf8Path) -> Option<String> {
    cwd.file_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
}

pub(super) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
