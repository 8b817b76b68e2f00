//! External termination signals.
//!
//! One tokio task per configured signal forwards each delivery into the
//! driver's trigger channel. On Unix the listeners cover `SIGHUP`, `SIGINT`
//! and `SIGTERM`. On Windows console close, Ctrl+C and Ctrl+Break stand in for
//! `SIGHUP`, `SIGINT` and `SIGBREAK`. Signals the platform cannot deliver are
//! skipped.

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::classifier::Trigger;
use crate::reason::TerminationSignal;

/// Spawn a listener task for each signal. Must be called inside a tokio
/// runtime with the signal driver enabled.
pub(crate) fn spawn_listeners(
    signals: &[TerminationSignal],
    triggers: &UnboundedSender<Trigger>,
) -> Vec<JoinHandle<()>> {
    signals
        .iter()
        .filter_map(|&signal| match spawn_listener(signal, triggers.clone()) {
            Ok(Some(handle)) => {
                debug!(%signal, "Listening for termination signal");
                Some(handle)
            }
            Ok(None) => {
                debug!(%signal, "Signal not supported on this platform, skipping");
                None
            }
            Err(error) => {
                warn!(%signal, %error, "Failed to install signal listener");
                None
            }
        })
        .collect()
}

/// Send one delivery. Returns `false` once the driver is gone.
fn forward(triggers: &UnboundedSender<Trigger>, signal: TerminationSignal) -> bool {
    debug!(%signal, "Received termination signal");
    triggers.send(Trigger::Signal(signal)).is_ok()
}

#[cfg(unix)]
fn spawn_listener(
    signal: TerminationSignal,
    triggers: UnboundedSender<Trigger>,
) -> std::io::Result<Option<JoinHandle<()>>> {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    let kind = match signal {
        TerminationSignal::Hup => SignalKind::hangup(),
        TerminationSignal::Int => SignalKind::interrupt(),
        TerminationSignal::Term => SignalKind::terminate(),
        TerminationSignal::Break => return Ok(None),
    };
    let mut stream = unix_signal(kind)?;
    Ok(Some(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            if !forward(&triggers, signal) {
                break;
            }
        }
    })))
}

#[cfg(windows)]
fn spawn_listener(
    signal: TerminationSignal,
    triggers: UnboundedSender<Trigger>,
) -> std::io::Result<Option<JoinHandle<()>>> {
    use tokio::signal::windows;

    let handle = match signal {
        TerminationSignal::Hup => {
            let mut stream = windows::ctrl_close()?;
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if !forward(&triggers, signal) {
                        break;
                    }
                }
            })
        }
        TerminationSignal::Int => {
            let mut stream = windows::ctrl_c()?;
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if !forward(&triggers, signal) {
                        break;
                    }
                }
            })
        }
        TerminationSignal::Break => {
            let mut stream = windows::ctrl_break()?;
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if !forward(&triggers, signal) {
                        break;
                    }
                }
            })
        }
        TerminationSignal::Term => return Ok(None),
    };
    Ok(Some(handle))
}

#[cfg(not(any(unix, windows)))]
fn spawn_listener(
    _signal: TerminationSignal,
    _triggers: UnboundedSender<Trigger>,
) -> std::io::Result<Option<JoinHandle<()>>> {
    Ok(None)
}

/// Parse configured signal names, dropping the ones that are not termination
/// signals.
pub(crate) fn parse_signals(names: &[String]) -> Vec<TerminationSignal> {
    let mut signals = Vec::new();
    for name in names {
        match name.parse::<TerminationSignal>() {
            Ok(signal) if !signals.contains(&signal) => signals.push(signal),
            Ok(_) => {}
            Err(error) => warn!(%error, "Ignoring configured signal"),
        }
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_names() {
        let names = vec!["SIGINT".to_string(), "sigterm".to_string()];
        assert_eq!(
            parse_signals(&names),
            [TerminationSignal::Int, TerminationSignal::Term]
        );
    }

    #[test]
    fn parse_drops_unknown_and_duplicates() {
        let names = vec![
            "SIGUSR1".to_string(),
            "SIGINT".to_string(),
            "SIGINT".to_string(),
        ];
        assert_eq!(parse_signals(&names), [TerminationSignal::Int]);
    }

    #[test]
    fn forward_reports_closed_channel() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(forward(&tx, TerminationSignal::Hup));
        drop(rx);
        assert!(!forward(&tx, TerminationSignal::Hup));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn break_is_skipped_on_unix() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let handles = spawn_listeners(&[TerminationSignal::Break], &tx);
        assert!(handles.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hangup_listener_installs() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let handles = spawn_listeners(&[TerminationSignal::Hup], &tx);
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.abort();
        }
    }
}
