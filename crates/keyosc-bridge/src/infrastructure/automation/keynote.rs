//! Keynote automation through `osascript`.
//!
//! Each call spawns one `osascript -e <script>` child process.  The script is
//! passed as a single argument, never through a shell, so only AppleScript
//! string literals (file paths) need escaping.
//!
//! The status script answers with one line:
//!
//! ```text
//! no keynote                         Keynote is not running
//! no document                        no document is open
//! <name>|<current>|<total>|<playing> e.g. "Deck.key|3|12|true"
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::application::control_presentation::{AutomationBackend, AutomationError, HostStatus};

const STATUS_SCRIPT: &str = r#"
tell application "System Events"
  if not (exists process "Keynote") then
    return "no keynote"
  end if
end tell
tell application "Keynote"
  if not (exists front document) then
    return "no document"
  end if
  set docName to name of front document
  set slideCount to count of slides of front document
  set isPlaying to playing
  try
    if isPlaying then
      set currentSlide to slide number of current slide of front document
    else
      try
        set currentSlide to slide number of first slide of selection of front document
      on error
        set currentSlide to 1
      end try
    end if
  on error
    set currentSlide to 1
  end try
  return docName & "|" & currentSlide & "|" & slideCount & "|" & isPlaying
end tell
"#;

const START_SCRIPT: &str = r#"tell application "Keynote" to start slideshow"#;

const START_FROM_BEGINNING_SCRIPT: &str = r#"
tell application "Keynote"
  activate
  if front document exists then
    start slideshow
    delay 0.5
    show slide 1 of front document
  end if
end tell
"#;

const STOP_SCRIPT: &str = r#"tell application "Keynote" to stop slideshow"#;
const NEXT_SCRIPT: &str = r#"tell application "Keynote" to show next"#;
const PREVIOUS_SCRIPT: &str = r#"tell application "Keynote" to show previous"#;

const CLOSE_SCRIPT: &str = r#"
tell application "Keynote"
  if front document exists then
    close front document saving no
  end if
end tell
"#;

/// [`AutomationBackend`] that drives Keynote via AppleScript.
#[derive(Debug, Clone)]
pub struct OsascriptBackend {
    program: PathBuf,
}

impl Default for OsascriptBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OsascriptBackend {
    pub fn new() -> Self {
        Self::with_program("osascript")
    }

    /// Uses `program` instead of `osascript` found on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, script: &str) -> Result<String, AutomationError> {
        trace!(script, "running AppleScript");
        let output = Command::new(&self.program)
            .arg("-e")
            .arg(script)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AutomationError::Failure(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("osascript exited with {}", output.status)
            } else {
                stderr
            };
            return Err(AutomationError::Failure(reason));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_action(&self, script: &str) -> Result<(), AutomationError> {
        self.run(script).await.map(|_| ())
    }
}

/// Parses the one-line reply of the status script.
pub fn parse_status_reply(reply: &str) -> Result<HostStatus, AutomationError> {
    match reply.trim() {
        "no keynote" => return Err(AutomationError::AdapterUnavailable),
        "no document" => return Err(AutomationError::NoDocument),
        _ => {}
    }

    let unexpected = || AutomationError::Failure(format!("unexpected status reply: {reply:?}"));

    // Split from the right: the document name may itself contain '|'.
    let mut fields = reply.trim().rsplitn(4, '|');
    let playing = fields.next().ok_or_else(unexpected)?;
    let total = fields.next().ok_or_else(unexpected)?;
    let current = fields.next().ok_or_else(unexpected)?;
    let document = fields.next().ok_or_else(unexpected)?;

    Ok(HostStatus {
        document: document.to_string(),
        current_slide: current.trim().parse().map_err(|_| unexpected())?,
        total_slides: total.trim().parse().map_err(|_| unexpected())?,
        playing: playing.trim() == "true",
    })
}

/// Quotes `path` as an AppleScript string literal.
fn applescript_string(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn open_script(path: &Path) -> String {
    format!(
        "tell application \"Keynote\"\n  activate\n  open POSIX file {}\nend tell",
        applescript_string(path)
    )
}

fn show_slide_script(slide: u32) -> String {
    format!(
        "tell application \"Keynote\"\n  if front document exists then\n    show slide {slide} of front document\n  end if\nend tell"
    )
}

#[async_trait]
impl AutomationBackend for OsascriptBackend {
    async fn query_status(&self) -> Result<HostStatus, AutomationError> {
        let reply = self.run(STATUS_SCRIPT).await?;
        debug!(%reply, "Keynote status");
        parse_status_reply(&reply)
    }

    async fn start_slideshow(&self) -> Result<(), AutomationError> {
        self.run_action(START_SCRIPT).await
    }

    async fn start_from_beginning(&self) -> Result<(), AutomationError> {
        self.run_action(START_FROM_BEGINNING_SCRIPT).await
    }

    async fn stop_slideshow(&self) -> Result<(), AutomationError> {
        self.run_action(STOP_SCRIPT).await
    }

    async fn show_next(&self) -> Result<(), AutomationError> {
        self.run_action(NEXT_SCRIPT).await
    }

    async fn show_previous(&self) -> Result<(), AutomationError> {
        self.run_action(PREVIOUS_SCRIPT).await
    }

    async fn show_slide(&self, slide: u32) -> Result<(), AutomationError> {
        self.run_action(&show_slide_script(slide)).await
    }

    async fn open(&self, path: PathBuf) -> Result<(), AutomationError> {
        self.run_action(&open_script(&path)).await
    }

    async fn close_front_document(&self) -> Result<(), AutomationError> {
        self.run_action(CLOSE_SCRIPT).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
