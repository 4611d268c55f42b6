//! Terminal output for search results and index status

use crate::index::types::SearchHit;
use crate::server::protocol::WorkerState;
use std::io::{self, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print ranked hits as `path  score`, best first
pub fn print_hits(hits: &[SearchHit], color: bool) -> io::Result<()> {
    let mut stdout = stdout(color);
    write_hits(&mut stdout, hits)
}

/// Write hits to any color-capable writer
pub fn write_hits(out: &mut impl WriteColor, hits: &[SearchHit]) -> io::Result<()> {
    let width = hits.iter().map(|h| h.reference.len()).max().unwrap_or(0);

    for hit in hits {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{:<width$}", hit.reference, width = width)?;
        out.reset()?;
        write!(out, "  ")?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(out, "{:.4}", hit.score)?;
        out.reset()?;
    }

    Ok(())
}

/// Print the state of the worker for `root`
pub fn print_status(
    root: &Path,
    state: WorkerState,
    documents: usize,
    snapshot: Option<&Path>,
    color: bool,
) -> io::Result<()> {
    let mut stdout = stdout(color);

    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    writeln!(stdout, "{}", root.display())?;
    stdout.reset()?;

    let state_color = match state {
        WorkerState::Ready => Color::Green,
        WorkerState::Initializing => Color::Yellow,
        WorkerState::Uninitialized | WorkerState::Stopped => Color::Red,
    };
    write!(stdout, "  State:     ")?;
    stdout.set_color(ColorSpec::new().set_fg(Some(state_color)))?;
    writeln!(stdout, "{}", state)?;
    stdout.reset()?;

    writeln!(stdout, "  Documents: {}", documents)?;
    match snapshot {
        Some(path) => writeln!(stdout, "  Snapshot:  {}", path.display())?,
        None => writeln!(stdout, "  Snapshot:  none")?,
    }

    Ok(())
}
