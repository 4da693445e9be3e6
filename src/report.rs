//! Instance-attributed rendering of captured command output.
//!
//! Several dispatches may share one sink (usually the process stdout). Each
//! line is prefixed with the instance that produced it so interleaved logs can
//! be filtered and sorted afterwards, and a whole report is written while the
//! sink lock is held so lines from different invocations never interleave
//! mid-block.
//!
//! The service truncates captured output at its own size limit. Nothing here
//! tries to recover the missing tail; when an output bucket was configured the
//! untruncated logs live there.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::types::InstanceId;

const STDOUT_HEADER: &str = "Command stdout:";
const STDERR_HEADER: &str = "Command stderr:";
const DIVIDER: &str = "------";

/// Output captured from one invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapturedOutput {
    /// Instance that produced the output.
    pub instance_id: InstanceId,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Prefixes every line of `content` with `instance_id`.
///
/// A trailing newline does not produce an empty final line.
#[must_use]
pub fn tagged_lines(instance_id: &InstanceId, content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| format!("{instance_id}: {line}"))
        .collect()
}

type Sink = Box<dyn Write + Send>;

/// Writes captured output to a shared sink.
///
/// Cloning the reporter shares the sink.
#[derive(Clone)]
pub struct OutputReporter {
    sink: Arc<Mutex<Sink>>,
}

impl std::fmt::Debug for OutputReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputReporter").finish_non_exhaustive()
    }
}

impl OutputReporter {
    /// Creates a reporter writing to `sink`.
    #[must_use]
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Creates a reporter writing to the process standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Renders `output` as a framed, instance-tagged block and writes it in
    /// one critical section.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the sink rejects the write.
    pub fn report(&self, output: &CapturedOutput) -> io::Result<()> {
        let block = render(output);
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| io::Error::other("output sink lock poisoned"))?;
        sink.write_all(block.as_bytes())?;
        sink.flush()
    }
}

fn render(output: &CapturedOutput) -> String {
    let mut block = String::new();
    for (header, content) in [(STDOUT_HEADER, &output.stdout), (STDERR_HEADER, &output.stderr)] {
        block.push_str(header);
        block.push('\n');
        for line in tagged_lines(&output.instance_id, content) {
            block.push_str(&line);
            block.push('\n');
        }
        block.push_str(DIVIDER);
        block.push('\n');
    }
    block
}
