//! Human-readable and JSON rendering of command results.

use std::io::{self, Write};

use crate::models::Channel;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One line per channel.
    #[default]
    Text,
    /// Pretty-printed JSON array.
    Json,
}

/// Write `channels` to `out` in `format`.
///
/// # Errors
///
/// Returns the underlying I/O error if writing fails.
pub fn render_channels<W: Write>(
    out: &mut W,
    channels: &[Channel],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => render_text(out, channels),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, channels)?;
            writeln!(out)
        }
    }
}

fn render_text<W: Write>(out: &mut W, channels: &[Channel]) -> io::Result<()> {
    if channels.is_empty() {
        return writeln!(out, "(no channels)");
    }

    for channel in channels {
        writeln!(
            out,
            "[{:<10}] {} (ID: {})",
            channel.channel_kind().label(),
            channel.name,
            channel.id
        )?;
    }
    Ok(())
}
