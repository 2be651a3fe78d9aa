// Progress display
// Renders the status block for in-flight executions in place: two
// lines per execution, erased and redrawn on every poll pass.

use std::io::{self, Write};

use crossterm::cursor::MoveToPreviousLine;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;

use crate::error::ServiceResult;
use crate::targets::{AwaitMode, Execution, ExecutionStatus};

/// Writes launch notes and the redrawable status block to any output.
#[derive(Debug)]
pub struct StatusDisplay<W: Write> {
    out: W,
    /// Lines of the currently drawn status block, 0 when none.
    block_lines: u16,
    /// Lines written by `begin` above the block.
    header_lines: u16,
}

impl StatusDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StatusDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            block_lines: 0,
            header_lines: 0,
        }
    }

    /// Print a plain progress note outside the status block.
    pub fn note(&mut self, line: &str) -> ServiceResult<()> {
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }

    /// Announce why we are waiting and open the status block.
    pub fn begin(&mut self, mode: AwaitMode) -> ServiceResult<()> {
        let headline = match mode {
            AwaitMode::Max => {
                "  maximum number of parallel executions started, so we need to wait a bit before we can continue"
            }
            AwaitMode::Blocking => "  execution needs to finish before we can continue",
            AwaitMode::All => "  waiting for all executions to finish",
        };
        writeln!(self.out, "{}", headline)?;
        writeln!(self.out, "### Status ###")?;
        self.header_lines = 2;
        self.block_lines = 0;
        self.out.flush()?;
        Ok(())
    }

    /// Erase the previous status block and draw the current state.
    pub fn redraw<'a>(
        &mut self,
        executions: impl Iterator<Item = &'a Execution>,
    ) -> ServiceResult<()> {
        if self.block_lines > 0 {
            self.out.queue(MoveToPreviousLine(self.block_lines))?;
        }
        let mut lines = 0u16;
        for execution in executions {
            self.out.queue(Clear(ClearType::CurrentLine))?;
            writeln!(self.out, "- {}", execution.target.rel_path)?;
            self.out.queue(Clear(ClearType::CurrentLine))?;
            writeln!(self.out, "{}", status_line(execution))?;
            lines += 2;
        }
        self.block_lines = lines;
        self.out.flush()?;
        Ok(())
    }

    /// Close the status block. After an ALL wait the block stays on
    /// screen; after MAX or BLOCKING waits the flow continues, so the
    /// whole block is erased again.
    pub fn finish(&mut self, mode: AwaitMode) -> ServiceResult<()> {
        match mode {
            AwaitMode::All => {
                writeln!(self.out, "### End status ###")?;
                writeln!(self.out)?;
            }
            AwaitMode::Max | AwaitMode::Blocking => {
                let lines = self.block_lines + self.header_lines;
                if lines > 0 {
                    self.out.queue(MoveToPreviousLine(lines))?;
                    self.out.queue(Clear(ClearType::FromCursorDown))?;
                }
            }
        }
        self.block_lines = 0;
        self.header_lines = 0;
        self.out.flush()?;
        Ok(())
    }
}

fn status_line(execution: &Execution) -> String {
    match &execution.status {
        ExecutionStatus::Unknown => "  Status couldn't be retrieved".to_string(),
        ExecutionStatus::Pending => "  waiting for the first status".to_string(),
        ExecutionStatus::Running => format!(
            "  {}/{} tests completed with {} passes, {} warnings and {} failures (running for {})",
            execution.completed(),
            execution.total,
            execution.passes,
            execution.warns,
            execution.fails,
            execution.duration
        ),
        terminal => {
            let glyph = if *terminal == ExecutionStatus::Passed {
                "✅"
            } else {
                "❌"
            };
            let mut line = format!(
                "  {} {} passed, {} passed with warnings, {} failed",
                glyph, execution.passes, execution.warns, execution.fails
            );
            if execution.total > execution.completed() {
                line.push_str(&format!(
                    " ({} never started)",
                    execution.total - execution.completed()
                ));
            }
            line
        }
    }
}
