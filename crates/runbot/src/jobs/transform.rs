use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::RunbotError;
use crate::jobs::classify::{classify, control_file_path, Classification, CommandKind};
use crate::jobs::model::RunContext;

/// Lines containing this token are job invocations and get the same
/// parameter injection as a standalone runjob command.
pub const NESTED_JOB_MARKER: &str = "runjob";

const REQUEST_FLAG: &str = "-request";
const RUNBOT_ID_FLAG: &str = "-runbot_id";

/// A command that has been classified and rewritten, ready for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub kind: CommandKind,
    pub log_name: String,
    /// What actually gets executed.
    pub command: String,
    pub scrubbed_file: Option<ScrubbedControlFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubbedControlFile {
    pub path: PathBuf,
    pub line_count: usize,
    pub lines_transformed: usize,
}

/// Classify `command` and rewrite it into the form that will run.
pub fn prepare(
    command: &str,
    ctx: &RunContext,
    scratch_dir: &Path,
) -> Result<PreparedCommand, RunbotError> {
    let classification = classify(command, ctx)?;
    rewrite(command, classification, ctx, scratch_dir)
}

/// Rewrite an already classified command.
pub fn rewrite(
    command: &str,
    classification: Classification,
    ctx: &RunContext,
    scratch_dir: &Path,
) -> Result<PreparedCommand, RunbotError> {
    let command = command.trim();
    info!(kind = classification.kind.as_str(), "request type classified");

    let (final_command, scrubbed_file) = match classification.kind {
        CommandKind::ControlFile => {
            let source = control_file_path(command)?;
            let scrubbed = scrub_control_file(Path::new(source), scratch_dir, ctx)?;
            (shell_quote(&scrubbed.path.display().to_string()), Some(scrubbed))
        }
        CommandKind::Runjob => (format_runjob_command(command, ctx), None),
        _ if command.contains(NESTED_JOB_MARKER) => (format_runjob_command(command, ctx), None),
        _ => (command.to_string(), None),
    };

    Ok(PreparedCommand {
        kind: classification.kind,
        log_name: classification.log_name,
        command: final_command,
        scrubbed_file,
    })
}

/// Append the flags a runjob needs to be attributed to this run.
/// Flags already present are left alone, so applying this twice is a no-op.
pub fn format_runjob_command(command: &str, ctx: &RunContext) -> String {
    let suffix = missing_flags(ctx, |flag| command.contains(flag));
    format!("{command}{suffix}")
}

/// The ` -request <ticket>` / ` -runbot_id <id>` text still to be appended.
fn missing_flags(ctx: &RunContext, has_flag: impl Fn(&str) -> bool) -> String {
    let mut suffix = String::new();

    if ctx.production && !has_flag(REQUEST_FLAG) {
        match ctx.ticket_id.as_deref() {
            Some(ticket) => {
                debug!(ticket, "production run; appending request parameter");
                suffix.push_str(&format!(" {REQUEST_FLAG} {ticket}"));
            }
            None => warn!("production run without a ticket; cannot add -request"),
        }
    }

    if !has_flag(RUNBOT_ID_FLAG) {
        suffix.push_str(&format!(" {RUNBOT_ID_FLAG} {}", ctx.item_id));
    }

    suffix
}

/// Single-quote `value` for `sh -c` unless it is made only of safe characters.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_.:/%+=,@".contains(ch))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\"'\"'"))
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn trim_end_bytes(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn is_comment(line: &[u8]) -> bool {
    line.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'#')
}

/// A line ending in `\` continues on the next physical line.
fn continues(line: &[u8]) -> bool {
    !is_comment(line) && trim_end_bytes(line).ends_with(b"\\")
}

pub fn is_nested_job_line(line: &[u8]) -> bool {
    contains_bytes(line, NESTED_JOB_MARKER.as_bytes()) && !is_comment(line)
}

/// Rewrite every uncommented job line of a control file.
///
/// Backslash-continued lines are treated as one logical line: flags are
/// appended to its last physical line. Lines that are not rewritten, and
/// every line terminator, come through byte for byte. Returns the new
/// contents and the number of logical lines rewritten.
pub fn scrub_lines(content: &[u8], ctx: &RunContext) -> (Vec<u8>, usize) {
    let lines: Vec<(&[u8], &[u8])> = content
        .split_inclusive(|b| *b == b'\n')
        .map(split_terminator)
        .collect();

    let mut out = Vec::with_capacity(content.len() + 64);
    let mut transformed = 0;

    let mut i = 0;
    while i < lines.len() {
        let start = i;
        while i + 1 < lines.len() && continues(lines[i].0) {
            i += 1;
        }
        let group = &lines[start..=i];
        i += 1;

        let is_job = !is_comment(group[0].0)
            && group
                .iter()
                .any(|(body, _)| contains_bytes(body, NESTED_JOB_MARKER.as_bytes()));
        if !is_job {
            push_lines(&mut out, group);
            continue;
        }

        transformed += 1;
        let suffix = missing_flags(ctx, |flag| {
            group
                .iter()
                .any(|(body, _)| contains_bytes(body, flag.as_bytes()))
        });
        if suffix.is_empty() {
            push_lines(&mut out, group);
            continue;
        }

        let Some(((body, terminator), head)) = group.split_last() else {
            continue;
        };
        push_lines(&mut out, head);

        let trimmed = trim_end_bytes(body);
        match trimmed.strip_suffix(b"\\") {
            // file ends mid-continuation
            Some(before) => {
                out.extend_from_slice(trim_end_bytes(before));
                out.extend_from_slice(suffix.as_bytes());
                out.extend_from_slice(b" \\");
            }
            None => {
                out.extend_from_slice(trimmed);
                out.extend_from_slice(suffix.as_bytes());
            }
        }
        out.extend_from_slice(terminator);
    }

    (out, transformed)
}

fn push_lines(out: &mut Vec<u8>, lines: &[(&[u8], &[u8])]) {
    for (body, terminator) in lines {
        out.extend_from_slice(body);
        out.extend_from_slice(terminator);
    }
}

fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = line.strip_suffix(b"\r\n") {
        (body, &line[body.len()..])
    } else if let Some(body) = line.strip_suffix(b"\n") {
        (body, &line[body.len()..])
    } else {
        (line, &line[line.len()..])
    }
}

pub fn scrubbed_path(source: &Path, scratch_dir: &Path) -> Result<PathBuf, RunbotError> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RunbotError::MalformedCommand(source.display().to_string()))?;
    Ok(scratch_dir.join(format!("scrubbed_{name}")))
}

/// Copy a control file into the scratch directory with its job lines rewritten.
/// The source is never modified; the copy is written to a temp name and renamed
/// into place so a half-written script can never be executed.
pub fn scrub_control_file(
    source: &Path,
    scratch_dir: &Path,
    ctx: &RunContext,
) -> Result<ScrubbedControlFile, RunbotError> {
    info!(source = %source.display(), "scrubbing control file for runjob commands");

    let content = fs::read(source).map_err(|e| RunbotError::ScrubFailure {
        path: source.to_path_buf(),
        source: e,
    })?;

    let (scrubbed, lines_transformed) = scrub_lines(&content, ctx);
    let dest = scrubbed_path(source, scratch_dir)?;

    write_executable(&dest, &scrubbed).map_err(|e| RunbotError::ScrubFailure {
        path: dest.clone(),
        source: e,
    })?;

    debug!(
        path = %dest.display(),
        contents = %String::from_utf8_lossy(&scrubbed),
        "scrubbed control file contents"
    );

    Ok(ScrubbedControlFile {
        path: dest,
        line_count: content.split_inclusive(|b| *b == b'\n').count(),
        lines_transformed,
    })
}

fn write_executable(dest: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("scrubbed");
    let tmp = dest.with_file_name(format!(".{file_name}.tmp"));

    let result = fs::write(&tmp, contents)
        .and_then(|_| make_executable(&tmp))
        .and_then(|_| fs::rename(&tmp, dest));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(production: bool) -> RunContext {
        RunContext::new(42, Some("PROJ-99".to_string()), production)
    }

    fn scrub_str(src: &str, ctx: &RunContext) -> (String, usize) {
        let (out, n) = scrub_lines(src.as_bytes(), ctx);
        (String::from_utf8(out).unwrap(), n)
    }

    #[test]
    fn appends_runbot_id_outside_production() {
        let out = format_runjob_command("runjob myReport.pl", &ctx(false));
        assert_eq!(out, "runjob myReport.pl -runbot_id 42");
    }

    #[test]
    fn production_also_appends_request() {
        let out = format_runjob_command("runjob myReport.pl", &ctx(true));
        assert_eq!(out, "runjob myReport.pl -request PROJ-99 -runbot_id 42");
    }

    #[test]
    fn existing_flags_are_kept() {
        let cmd = "runjob myReport.pl -request PROJ-1 -runbot_id 7";
        assert_eq!(format_runjob_command(cmd, &ctx(true)), cmd);
    }

    #[test]
    fn formatting_is_idempotent() {
        for production in [false, true] {
            let once = format_runjob_command("runjob -j a.pl", &ctx(production));
            let twice = format_runjob_command(&once, &ctx(production));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn scrub_rewrites_only_uncommented_job_lines() {
        let src = "#!/bin/sh\n\
                   # runjob old_disabled.pl\n\
                   echo start\n\
                   runjob a.pl\n\
                   \x20\x20runjob b.pl -runbot_id 9\n\
                   \x20\x20# runjob c.pl\n\
                   publish.sh x y\n";
        let (out, transformed) = scrub_str(src, &ctx(false));

        let src_lines: Vec<&str> = src.split_inclusive('\n').collect();
        let out_lines: Vec<&str> = out.split_inclusive('\n').collect();
        assert_eq!(src_lines.len(), out_lines.len());
        assert_eq!(transformed, 2);

        let changed: Vec<usize> = (0..src_lines.len())
            .filter(|&i| src_lines[i] != out_lines[i])
            .collect();
        assert_eq!(changed, vec![3]);
        assert_eq!(out_lines[3], "runjob a.pl -runbot_id 42\n");
        assert_eq!(out_lines[4], "  runjob b.pl -runbot_id 9\n");
    }

    #[test]
    fn scrub_preserves_crlf_and_missing_trailing_newline() {
        let src = "echo a\r\nrunjob a.pl\r\nrunjob b.pl";
        let (out, transformed) = scrub_str(src, &ctx(false));
        assert_eq!(transformed, 2);
        assert_eq!(
            out,
            "echo a\r\nrunjob a.pl -runbot_id 42\r\nrunjob b.pl -runbot_id 42"
        );
    }

    #[test]
    fn continued_job_line_gets_flags_after_its_last_segment() {
        let src = "runjob a.pl \\\n  -x foo\necho done\n";
        let (out, transformed) = scrub_str(src, &ctx(true));
        assert_eq!(transformed, 1);
        assert_eq!(
            out,
            "runjob a.pl \\\n  -x foo -request PROJ-99 -runbot_id 42\necho done\n"
        );
    }

    #[test]
    fn continued_job_line_with_flag_on_later_segment_is_untouched() {
        let src = "runjob a.pl \\\r\n  -runbot_id 7\r\n";
        let (out, transformed) = scrub_str(src, &ctx(false));
        assert_eq!(transformed, 1);
        assert_eq!(out, src);
    }

    #[test]
    fn continuation_cut_off_at_end_of_file_keeps_the_backslash_last() {
        let (out, _) = scrub_str("runjob a.pl \\", &ctx(false));
        assert_eq!(out, "runjob a.pl -runbot_id 42 \\");
    }

    #[test]
    fn comment_ending_in_backslash_does_not_swallow_next_line() {
        let src = "# old \\\nrunjob a.pl\n";
        let (out, transformed) = scrub_str(src, &ctx(false));
        assert_eq!(transformed, 1);
        assert_eq!(out, "# old \\\nrunjob a.pl -runbot_id 42\n");
    }

    #[test]
    fn non_utf8_lines_pass_through_byte_for_byte() {
        let src: &[u8] = b"echo caf\xe9\nrunjob a.pl \xff\n";
        let (out, transformed) = scrub_lines(src, &ctx(false));
        assert_eq!(transformed, 1);
        assert_eq!(out, b"echo caf\xe9\nrunjob a.pl \xff -runbot_id 42\n".to_vec());
    }

    #[test]
    fn shell_quote_leaves_plain_paths_alone() {
        assert_eq!(shell_quote("/tmp/scrubbed_a.ctl"), "/tmp/scrubbed_a.ctl");
        assert_eq!(shell_quote("/mnt/my dir/x.ctl"), "'/mnt/my dir/x.ctl'");
        assert_eq!(shell_quote("/a/it's;rm"), "'/a/it'\"'\"'s;rm'");
    }

    #[test]
    fn scrub_control_file_writes_executable_copy() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("nightly.ctl");
        let original = "echo one\nrunjob a.pl\n# runjob b.pl\nrunjob c.pl -x\n";
        fs::write(&source, original).unwrap();

        let scrubbed = scrub_control_file(&source, scratch.path(), &ctx(true)).unwrap();

        assert_eq!(scrubbed.path, scratch.path().join("scrubbed_nightly.ctl"));
        assert_eq!(scrubbed.line_count, 4);
        assert_eq!(scrubbed.lines_transformed, 2);
        assert_eq!(fs::read_to_string(&source).unwrap(), original);
        assert_eq!(
            fs::read_to_string(&scrubbed.path).unwrap(),
            "echo one\n\
             runjob a.pl -request PROJ-99 -runbot_id 42\n\
             # runjob b.pl\n\
             runjob c.pl -x -request PROJ-99 -runbot_id 42\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&scrubbed.path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn unreadable_control_file_is_scrub_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("nope.ctl");
        let err = scrub_control_file(&missing, scratch.path(), &ctx(false)).unwrap_err();
        assert!(matches!(err, RunbotError::ScrubFailure { .. }));
    }

    #[test]
    fn unwritable_scratch_dir_is_scrub_failure() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("a.ctl");
        fs::write(&source, "runjob a.pl\n").unwrap();
        let scratch = src_dir.path().join("does").join("not").join("exist");

        let err = scrub_control_file(&source, &scratch, &ctx(false)).unwrap_err();
        match err {
            RunbotError::ScrubFailure { path, .. } => {
                assert_eq!(path, scratch.join("scrubbed_a.ctl"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!scratch.exists());
    }

    #[test]
    fn prepare_routes_by_kind() {
        let scratch = tempfile::tempdir().unwrap();

        let p = prepare("runjob myReport.pl", &ctx(false), scratch.path()).unwrap();
        assert_eq!(p.kind, CommandKind::Runjob);
        assert!(p.command.ends_with(" -runbot_id 42"));

        let p = prepare("/apps/bin/publish.sh -r weekly", &ctx(false), scratch.path()).unwrap();
        assert_eq!(p.kind, CommandKind::Publish);
        assert_eq!(p.command, "/apps/bin/publish.sh -r weekly");

        let p = prepare("one_time_sql runjob fix.sql", &ctx(false), scratch.path()).unwrap();
        assert_eq!(p.kind, CommandKind::OneTimeSql);
        assert_eq!(p.command, "one_time_sql runjob fix.sql -runbot_id 42");
    }

    #[test]
    fn prepare_control_file_executes_scrubbed_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("batch.ctl");
        fs::write(&source, "runjob a.pl\n").unwrap();
        let cmd = format!("{} extra-arg", source.display());

        let p = prepare(&cmd, &ctx(false), dir.path()).unwrap();
        assert_eq!(p.kind, CommandKind::ControlFile);
        assert_eq!(p.log_name, "batch_42.log");
        let scrubbed = dir.path().join("scrubbed_batch.ctl");
        assert_eq!(p.command, scrubbed.display().to_string());
        assert_eq!(p.scrubbed_file.unwrap().lines_transformed, 1);
    }

    #[test]
    fn scrub_control_file_keeps_non_utf8_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("latin1.ctl");
        fs::write(&source, b"echo caf\xe9\nrunjob a.pl\n").unwrap();

        let scrubbed = scrub_control_file(&source, dir.path(), &ctx(false)).unwrap();
        assert_eq!(
            fs::read(&scrubbed.path).unwrap(),
            b"echo caf\xe9\nrunjob a.pl -runbot_id 42\n".to_vec()
        );
    }

    #[test]
    fn prepare_quotes_scrubbed_path_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch dir");
        fs::create_dir(&scratch).unwrap();
        let source = dir.path().join("batch.ctl");
        fs::write(&source, "runjob a.pl\n").unwrap();

        let p = prepare(&source.display().to_string(), &ctx(false), &scratch).unwrap();
        let scrubbed = scratch.join("scrubbed_batch.ctl");
        assert_eq!(p.command, format!("'{}'", scrubbed.display()));
    }
}
