//! Main event loop for the line interface.
//!
//! Multiplexes stdin lines, controller events, and a periodic tick.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use blogfeed::feed::{FeedController, FeedEvent};

use super::input::handle_line;
use super::output;

/// Result of handling an input line.
pub enum Action {
    /// Keep reading input.
    Continue,
    /// Leave the loop.
    Quit,
}

/// What woke the loop up
enum Wake {
    Shutdown(&'static str),
    Line(Option<String>),
    Event(Option<FeedEvent>),
    Tick,
}

/// Tracks what has already been printed so each change is shown once.
#[derive(Default)]
struct Printed {
    notification_seq: u64,
    was_loading: bool,
}

/// Runs the interactive loop until `quit`, end of input, or a signal.
///
/// Uses `tokio::select!` over:
/// - **Signals**: SIGTERM/SIGINT end the loop
/// - **Input**: one command per stdin line
/// - **Controller events**: page, search, delete, and aggregate results
/// - **Periodic tick**: 250ms timer for notification expiry
pub async fn run(controller: &mut FeedController) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = io::stdout();
    let mut printed = Printed {
        was_loading: controller.is_loading(),
        ..Printed::default()
    };

    let mut tick_interval = tokio::time::interval(Duration::from_millis(250));

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    writeln!(out, "Type 'help' for commands.")?;
    prompt(&mut out, controller)?;

    loop {
        // Drain queued results before blocking so input never starves them
        while let Some(event) = controller.try_next_event() {
            controller.handle_event(event);
        }
        controller.clear_expired_notification();
        if controller.take_redraw() {
            refresh(&mut out, controller, &mut printed)?;
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = tokio::signal::ctrl_c();

        let wake = tokio::select! {
            biased;

            _ = sigterm_fut => Wake::Shutdown("SIGTERM"),
            _ = sigint_fut => Wake::Shutdown("SIGINT"),

            line = lines.next_line() => Wake::Line(line.context("Failed to read input")?),

            event = controller.next_event() => Wake::Event(event),

            _ = tick_interval.tick() => Wake::Tick,
        };

        match wake {
            Wake::Shutdown(signal) => {
                tracing::info!(signal, "Received signal, shutting down gracefully");
                break;
            }
            Wake::Line(None) => {
                tracing::debug!("End of input");
                break;
            }
            Wake::Line(Some(line)) => {
                match handle_line(controller, &line, &mut out) {
                    Ok(Action::Quit) => break,
                    Ok(Action::Continue) => {}
                    Err(e) => writeln!(out, "Error: {:#}", e)?,
                }
                if controller.pending_confirm().is_none() {
                    prompt(&mut out, controller)?;
                }
            }
            Wake::Event(Some(event)) => controller.handle_event(event),
            // The controller keeps a sender, so the channel never closes under us
            Wake::Event(None) => break,
            Wake::Tick => {}
        }
    }

    Ok(())
}

/// Print results that landed since the last refresh.
fn refresh<W: Write>(out: &mut W, controller: &FeedController, printed: &mut Printed) -> io::Result<()> {
    let mut wrote = false;

    let loading = controller.is_loading();
    if printed.was_loading && !loading {
        output::items(out, controller)?;
        wrote = true;
    }
    printed.was_loading = loading;

    if let Some(notification) = controller.notification() {
        if notification.seq > printed.notification_seq {
            printed.notification_seq = notification.seq;
            output::notification(out, controller)?;
            wrote = true;
        }
    }

    if wrote && controller.pending_confirm().is_none() {
        prompt(out, controller)?;
    }
    out.flush()
}

fn prompt<W: Write>(out: &mut W, controller: &FeedController) -> io::Result<()> {
    let input = controller.search_input();
    if input.is_empty() {
        write!(out, "> ")?;
    } else {
        write!(out, "[{}] > ", blogfeed::util::sanitize_line(input, 24))?;
    }
    out.flush()
}
