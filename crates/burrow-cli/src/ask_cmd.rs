//! `burrow ask`: run one agent turn from the terminal.

use std::io::{self, Write};

use anyhow::{Result, bail};
use futures::StreamExt;
use uuid::Uuid;

use burrow_core::events::StreamEvent;
use burrow_core::session::{InvokeRequest, SessionOrchestrator};
use burrow_core::transport::Frame;

/// Renders a frame stream for a human: assistant text on stdout, everything
/// else as bracketed notes on stderr.
#[derive(Debug, Default)]
struct TurnPrinter {
    conversation_id: Option<Uuid>,
    failed: bool,
    /// Whether stdout is mid-line after streamed text.
    open_line: bool,
}

impl TurnPrinter {
    fn render(&mut self, frame: &Frame, out: &mut dyn Write, diag: &mut dyn Write) -> io::Result<()> {
        let Frame::Event(event) = frame else {
            if self.open_line {
                writeln!(out)?;
                self.open_line = false;
            }
            return out.flush();
        };

        match event {
            StreamEvent::ConversationCreated { conversation_id } => {
                self.conversation_id = Some(*conversation_id);
                writeln!(diag, "[conversation {conversation_id}]")?;
            }
            StreamEvent::Text { text } => {
                write!(out, "{text}")?;
                out.flush()?;
                self.open_line = !text.ends_with('\n');
            }
            StreamEvent::Thinking { thinking } => {
                writeln!(diag, "[thinking] {}", first_line(thinking))?;
            }
            StreamEvent::ToolUse {
                tool_name,
                tool_input,
                ..
            } => {
                writeln!(diag, "[tool] {tool_name} {tool_input}")?;
            }
            StreamEvent::ToolResult { is_error, .. } => {
                let outcome = if *is_error { "error" } else { "ok" };
                writeln!(diag, "[tool result] {outcome}")?;
            }
            StreamEvent::Result {
                duration_ms,
                total_cost_usd,
                num_turns,
                ..
            } => {
                let cost = total_cost_usd.map_or_else(String::new, |c| format!(", ${c:.4}"));
                writeln!(diag, "[done] {num_turns} turn(s), {duration_ms} ms{cost}")?;
            }
            StreamEvent::Error { error, message } => {
                self.failed = true;
                writeln!(diag, "[error] {error}")?;
                if let Some(message) = message {
                    writeln!(diag, "        {message}")?;
                }
            }
            StreamEvent::StreamCompleted { is_error } => {
                self.failed |= *is_error;
            }
            StreamEvent::System { .. } | StreamEvent::StreamEvent { .. } => {}
        }
        Ok(())
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

pub async fn run_ask(
    orchestrator: &SessionOrchestrator,
    request: InvokeRequest,
    raw: bool,
) -> Result<()> {
    let mut frames = orchestrator.invoke(request);
    let mut printer = TurnPrinter::default();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();

    while let Some(frame) = frames.next().await {
        if raw {
            stdout.write_all(frame.encode().as_bytes())?;
            stdout.flush()?;
            if let Frame::Event(StreamEvent::Error { .. }) = &frame {
                printer.failed = true;
            }
            continue;
        }
        printer.render(&frame, &mut stdout, &mut stderr)?;
    }

    if printer.failed {
        match printer.conversation_id {
            Some(id) => bail!("agent turn failed (conversation {id})"),
            None => bail!("agent turn failed"),
        }
    }
    Ok(())
}
