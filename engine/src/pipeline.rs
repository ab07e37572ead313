//! Streaming pipelines between external tools and compressed files.
//!
//! Dumps run `tool stdout -> gzip -> file`; restores run
//! `file -> gunzip -> tool stdin`. The tool's stderr is inherited so the
//! operator sees its diagnostics directly. Both directions block until the
//! tool has exited and every byte has been flushed.
//!
//! Engine adapters never spawn processes themselves: they describe a
//! `ToolCommand` and hand it to a `ToolRunner`.

use crate::error::{EngineError, PipelinePhase, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::env;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// An external program invocation: program, argument vector, extra environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ToolCommand {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build the `std::process::Command`, inheriting the current environment.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

/// Renders the command line with environment values and `--password`
/// arguments masked.
impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, _) in &self.env {
            write!(f, "{}=*** ", key)?;
        }
        f.write_str(&self.program)?;
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                f.write_str(" ***")?;
                mask_next = false;
                continue;
            }
            write!(f, " {}", arg)?;
            mask_next = arg == "--password";
        }
        Ok(())
    }
}

impl fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToolCommand({})", self)
    }
}

/// Runs external tools on behalf of engine adapters.
pub trait ToolRunner: Send + Sync {
    /// Run to completion and return stdout. A non-zero exit becomes
    /// `ToolInvocation` carrying stderr followed by stdout.
    fn capture(&self, command: &ToolCommand) -> Result<String>;

    /// Stream the tool's stdout through gzip into `destination`.
    fn dump_to_file(&self, command: &ToolCommand, destination: &Path) -> Result<()>;

    /// Stream the gunzipped contents of `source` into the tool's stdin.
    fn restore_from_file(&self, command: &ToolCommand, source: &Path) -> Result<()>;
}

/// `ToolRunner` backed by real child processes.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    compression: Compression,
}

impl SystemRunner {
    /// `level` is the gzip level, clamped to 0..=9.
    pub fn new(level: u32) -> Self {
        SystemRunner {
            compression: Compression::new(level.min(9)),
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        SystemRunner {
            compression: Compression::default(),
        }
    }
}

impl ToolRunner for SystemRunner {
    fn capture(&self, command: &ToolCommand) -> Result<String> {
        tracing::debug!(command = %command, "running");
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::pipeline(PipelinePhase::Start, &command.program, e))?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(tool_failure(command, output.status, combined));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn dump_to_file(&self, command: &ToolCommand, destination: &Path) -> Result<()> {
        tracing::debug!(command = %command, destination = %destination.display(), "dumping");
        pipe_output_to_compressed_file(command, destination, self.compression)
    }

    fn restore_from_file(&self, command: &ToolCommand, source: &Path) -> Result<()> {
        tracing::debug!(command = %command, source = %source.display(), "restoring");
        pipe_compressed_file_to_process_input(command, source)
    }
}

/// Run `command`, compressing its stdout into a newly created `destination`.
///
/// The compressor is finished (trailer written) and the file synced only
/// after the tool exits successfully. On failure the partial file is left
/// in place.
pub fn pipe_output_to_compressed_file(
    command: &ToolCommand,
    destination: &Path,
    level: Compression,
) -> Result<()> {
    let file = File::create(destination)
        .map_err(|e| EngineError::pipeline(PipelinePhase::CreateOutput, destination, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), level);

    let mut child = command
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Start, destination, e))?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        EngineError::pipeline(PipelinePhase::Start, destination, missing_pipe("stdout"))
    })?;
    let streamed = io::copy(&mut stdout, &mut encoder);
    // Closing our end unblocks a tool still writing after a failed copy.
    drop(stdout);

    let status = child
        .wait()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Wait, destination, e))?;
    // A failed copy usually kills the tool with SIGPIPE; the copy error is the cause.
    streamed.map_err(|e| EngineError::pipeline(PipelinePhase::Stream, destination, e))?;
    if !status.success() {
        return Err(tool_failure(command, status, String::new()));
    }

    let writer = encoder
        .finish()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Finish, destination, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Finish, destination, e.into_error()))?;
    file.sync_all()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Finish, destination, e))?;

    Ok(())
}

/// Run `command`, feeding it the decompressed contents of `source`.
pub fn pipe_compressed_file_to_process_input(command: &ToolCommand, source: &Path) -> Result<()> {
    let file = File::open(source)
        .map_err(|e| EngineError::pipeline(PipelinePhase::OpenInput, source, e))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));

    let mut child = command
        .to_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Start, source, e))?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        EngineError::pipeline(PipelinePhase::Start, source, missing_pipe("stdin"))
    })?;
    let streamed = io::copy(&mut decoder, &mut stdin);
    if let Err(e) = &streamed {
        // A broken pipe means the tool already exited; its status says why.
        // Anything else is our side failing, so the tool must not see a
        // clean end of input.
        if e.kind() != io::ErrorKind::BrokenPipe {
            let _ = child.kill();
        }
    }
    drop(stdin);

    let status = child
        .wait()
        .map_err(|e| EngineError::pipeline(PipelinePhase::Wait, source, e))?;
    match streamed {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
            Err(EngineError::pipeline(PipelinePhase::Stream, source, e))
        }
        _ if !status.success() => Err(tool_failure(command, status, String::new())),
        Err(e) => Err(EngineError::pipeline(PipelinePhase::Stream, source, e)),
        Ok(_) => Ok(()),
    }
}

/// Whether `program` resolves to an existing file, either directly (when it
/// contains a path separator) or through `PATH`.
pub fn program_on_path(program: &str) -> bool {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file();
    }

    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| candidates(&dir, program).iter().any(|p| p.is_file()))
}

fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    let plain = dir.join(program);
    if cfg!(windows) {
        vec![plain.clone(), plain.with_extension("exe")]
    } else {
        vec![plain]
    }
}

fn tool_failure(command: &ToolCommand, status: ExitStatus, output: String) -> EngineError {
    EngineError::ToolInvocation {
        program: command.program.clone(),
        code: status.code(),
        output,
    }
}

fn missing_pipe(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("child {} was not captured", name))
}
