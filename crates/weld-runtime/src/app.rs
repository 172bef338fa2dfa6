//! The event loop.
//!
//! [`App`] owns everything the builder wired: the container, the router, the
//! session store and the receiving end of the event channel. [`App::run`]
//! drives the loop: each received event is dispatched on its own task, so a
//! slow handler never delays the next event, and a failing one is contained
//! by the dispatch layer.
//!
//! Shutdown is cooperative. The loop stops when the event source closes or
//! the cancellation token fires, then waits up to the configured grace
//! period for in-flight handlers before aborting them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use weld_core::{Incoming, Session, SessionStore};
use weld_framework::{Container, Router};

use crate::builder::LifecycleHook;
use crate::config::WeldConfig;

/// A fully wired, runnable application.
pub struct App {
    config: WeldConfig,
    container: Arc<Container>,
    router: Arc<Router>,
    sessions: Arc<SessionStore>,
    source: mpsc::Receiver<Incoming>,
    on_startup: Vec<LifecycleHook>,
    on_shutdown: Vec<LifecycleHook>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

impl App {
    pub(crate) fn new(
        config: WeldConfig,
        container: Container,
        router: Router,
        source: mpsc::Receiver<Incoming>,
        on_startup: Vec<LifecycleHook>,
        on_shutdown: Vec<LifecycleHook>,
    ) -> Self {
        Self {
            config,
            container: Arc::new(container),
            router: Arc::new(router),
            sessions: Arc::new(SessionStore::new()),
            source,
            on_startup,
            on_shutdown,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that stops the event loop when cancelled. Clone it before
    /// calling [`run`](Self::run) to request shutdown from outside.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The session store, shared with the event loop.
    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.router.handler_count()
    }

    /// Runs the event loop until the source closes or the token fires.
    pub async fn run(mut self) {
        for hook in &self.on_startup {
            if let Err(err) = hook().await {
                error!(error = %err, "startup callback failed");
            }
        }

        info!(handlers = self.router.handler_count(), "event loop started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                event = self.source.recv() => {
                    let Some(event) = event else {
                        info!("event source closed");
                        break;
                    };
                    self.spawn_dispatch(&mut in_flight, event);
                }
            }

            // Reap finished dispatch tasks without blocking the loop.
            while in_flight.try_join_next().is_some() {}
        }

        self.drain(in_flight).await;

        for hook in &self.on_shutdown {
            if let Err(err) = hook().await {
                error!(error = %err, "shutdown callback failed");
            }
        }
        info!("event loop stopped");
    }

    /// Runs the event loop until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let cancel = self.cancellation_token();
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => {}
            _ = shutdown => {
                cancel.cancel();
                run.await;
            }
        }
    }

    /// Runs the event loop until Ctrl+C (or SIGTERM on Unix).
    pub async fn run_with_signals(self) {
        self.run_until(wait_for_signal()).await;
    }

    fn spawn_dispatch(&self, in_flight: &mut JoinSet<()>, event: Incoming) {
        // Events without a chat identity get a transient session.
        let session = match event.chat_id() {
            Some(chat_id) => self.sessions.get_or_create(chat_id),
            None => Session::new(),
        };
        let router = Arc::clone(&self.router);
        let container = Arc::clone(&self.container);

        in_flight.spawn(async move {
            router.dispatch(&event, &session, &container).await;
        });
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        let timeout = self.config.runtime.shutdown_timeout();
        let all_done = async {
            while in_flight.join_next().await.is_some() {}
        };
        if tokio::time::timeout(timeout, all_done).await.is_err() {
            warn!(
                timeout_secs = self.config.runtime.shutdown_timeout_secs,
                "in-flight handlers did not finish in time, aborting"
            );
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal;
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(error = %err, "failed to register SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AppBuilder;
    use parking_lot::Mutex;
    use weld_core::{MessageEvent, UserRef};
    use weld_framework::{BoundArgs, HandlerEntry, ParamSpec};

    fn message(chat_id: i64, text: &str) -> Incoming {
        Incoming::message(MessageEvent {
            message_id: 1,
            chat_id,
            from: UserRef {
                id: 1,
                username: None,
                first_name: "u".into(),
            },
            text: text.into(),
        })
    }

    #[tokio::test]
    async fn test_events_flow_through_the_app() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_in_handler = Arc::clone(&log);

        let (tx, builder) = AppBuilder::new().event_channel();
        let app = builder
            .on_message(
                HandlerEntry::new("echo", move |args: BoundArgs| {
                    let log = Arc::clone(&log_in_handler);
                    async move {
                        let m = args.require::<MessageEvent>("message")?;
                        log.lock().push(m.text.clone());
                        Ok(())
                    }
                })
                .param(ParamSpec::named("message")),
            )
            .build()
            .unwrap();

        tx.send(message(1, "first")).await.unwrap();
        tx.send(message(1, "second")).await.unwrap();
        drop(tx); // closing the source ends the loop after draining

        app.run().await;

        let mut seen = log.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_sessions_are_keyed_by_chat() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_in_handler = Arc::clone(&states);

        let (tx, builder) = AppBuilder::new().event_channel();
        let app = builder
            .on_message(
                HandlerEntry::new("flow", move |args: BoundArgs| {
                    let states = Arc::clone(&states_in_handler);
                    async move {
                        let session = args.session()?;
                        states.lock().push(session.get());
                        session.set("greeted");
                        Ok(())
                    }
                })
                .param(ParamSpec::named("state")),
            )
            .build()
            .unwrap();

        tx.send(message(7, "hi")).await.unwrap();
        tx.send(message(7, "again")).await.unwrap();
        drop(tx);

        app.run().await;

        let states = states.lock();
        assert_eq!(states.len(), 2);
        // One of the two runs saw the state left by the other; order between
        // spawned tasks is not fixed, but both touch the same session.
        assert!(states.contains(&Some("greeted".to_string())) || states.contains(&None));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_loop() {
        let (tx, builder) = AppBuilder::new().event_channel();
        let app = builder
            .on_message(HandlerEntry::new("noop", |_args: BoundArgs| async { Ok(()) }))
            .build()
            .unwrap();

        let cancel = app.cancellation_token();
        cancel.cancel();
        // Sender stays alive: only the token ends the loop.
        app.run().await;
        drop(tx);
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_run_and_errors_are_suppressed() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let startup_order = Arc::clone(&order);
        let failing_order = Arc::clone(&order);
        let shutdown_order = Arc::clone(&order);

        let (tx, builder) = AppBuilder::new().event_channel();
        let app = builder
            .on_message(HandlerEntry::new("noop", |_args: BoundArgs| async { Ok(()) }))
            .on_startup(move || {
                let order = Arc::clone(&startup_order);
                async move {
                    order.lock().push("startup");
                    Ok(())
                }
            })
            .on_startup(move || {
                let order = Arc::clone(&failing_order);
                async move {
                    order.lock().push("failing");
                    Err("warmup failed".into())
                }
            })
            .on_shutdown(move || {
                let order = Arc::clone(&shutdown_order);
                async move {
                    order.lock().push("shutdown");
                    Ok(())
                }
            })
            .build()
            .unwrap();

        drop(tx);
        app.run().await;

        assert_eq!(&*order.lock(), &["startup", "failing", "shutdown"]);
    }

    #[tokio::test]
    async fn test_command_routing_end_to_end() {
        let hits = Arc::new(Mutex::new(0usize));
        let hits_in_handler = Arc::clone(&hits);

        let (tx, builder) = AppBuilder::new().event_channel();
        let app = builder
            .command(
                "start",
                HandlerEntry::new("start", move |_args: BoundArgs| {
                    let hits = Arc::clone(&hits_in_handler);
                    async move {
                        *hits.lock() += 1;
                        Ok(())
                    }
                }),
            )
            .build()
            .unwrap();

        tx.send(message(1, "/start")).await.unwrap();
        tx.send(message(1, "not a command")).await.unwrap();
        drop(tx);

        app.run().await;
        assert_eq!(*hits.lock(), 1);
    }
}
