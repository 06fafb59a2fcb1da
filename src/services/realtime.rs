use actix_ws::{Message, MessageStream, Session};
use async_trait::async_trait;
use std::time::Duration;

use crate::error::PushError;
use crate::metrics::METRICS;
use crate::models::{ProcessFilter, RealtimeSnapshot};
use crate::services::query::{ProcessQuery, QueryBuilder};
use crate::services::store::Store;

/// Server-to-client half of a realtime connection.
#[async_trait(?Send)]
pub trait PushSink {
    /// Writes one text message.
    async fn send(&mut self, message: String) -> Result<(), PushError>;

    /// Resolves once the peer has gone away. Must be safe to drop and call
    /// again.
    async fn closed(&mut self);
}

/// Pushes `{processes, reports}` snapshots to one connection at a fixed
/// cadence until the peer disconnects.
///
/// The loop only suspends on storage reads and on the wait between pushes;
/// both are raced against peer closure.
#[derive(Clone)]
pub struct Distributor {
    store: Store,
    builder: QueryBuilder,
    interval: Duration,
}

struct ConnectionGauge;

impl ConnectionGauge {
    fn open() -> Self {
        METRICS.realtime_connections.inc();
        Self
    }
}

impl Drop for ConnectionGauge {
    fn drop(&mut self) {
        METRICS.realtime_connections.dec();
    }
}

impl Distributor {
    pub fn new(store: Store, builder: QueryBuilder, interval: Duration) -> Self {
        Self {
            store,
            builder,
            interval,
        }
    }

    /// Current filtered processes plus the per-user report. A failed read
    /// contributes an empty list.
    pub async fn snapshot(&self, query: &ProcessQuery) -> RealtimeSnapshot {
        let processes = self.store.query(query).await.unwrap_or_else(|e| {
            log::error!("Realtime process query failed: {}", e);
            Vec::new()
        });
        let reports = self.store.aggregate_by_user().await.unwrap_or_else(|e| {
            log::error!("Realtime report query failed: {}", e);
            Vec::new()
        });

        RealtimeSnapshot { processes, reports }
    }

    pub async fn run<K: PushSink>(&self, sink: &mut K, filter: &ProcessFilter) {
        let _gauge = ConnectionGauge::open();
        let query = self.builder.build(filter);

        loop {
            let snapshot = tokio::select! {
                biased;
                _ = sink.closed() => break,
                snapshot = self.snapshot(&query) => snapshot,
            };

            match serde_json::to_string(&snapshot) {
                Ok(message) => match sink.send(message).await {
                    Ok(()) => METRICS.realtime_pushes.inc(),
                    Err(PushError::Closed) => break,
                    Err(e) => log::warn!("Realtime push failed, will retry: {}", e),
                },
                Err(e) => log::error!("Failed to serialize realtime snapshot: {}", e),
            }

            tokio::select! {
                biased;
                _ = sink.closed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        log::debug!("Realtime peer disconnected");
    }
}

/// [`PushSink`] over an actix-ws session.
pub struct WsSink {
    session: Session,
    stream: MessageStream,
}

impl WsSink {
    pub fn new(session: Session, stream: MessageStream) -> Self {
        Self { session, stream }
    }

    pub async fn close(self) {
        let _ = self.session.close(None).await;
    }
}

#[async_trait(?Send)]
impl PushSink for WsSink {
    async fn send(&mut self, message: String) -> Result<(), PushError> {
        self.session
            .text(message)
            .await
            .map_err(|_| PushError::Closed)
    }

    async fn closed(&mut self) {
        // the feed is push-only: client frames other than ping/close are ignored
        while let Some(frame) = self.stream.recv().await {
            match frame {
                Ok(Message::Ping(bytes)) => {
                    if self.session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Ok(Message::Close(reason)) => {
                    log::debug!("Realtime peer sent close: {:?}", reason);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Realtime protocol error: {}", e);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessState;
    use crate::services::store::tests::process;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedSink {
        results: VecDeque<Result<(), PushError>>,
        sent: Vec<String>,
        close_after: Option<usize>,
    }

    #[async_trait(?Send)]
    impl PushSink for ScriptedSink {
        async fn send(&mut self, message: String) -> Result<(), PushError> {
            self.sent.push(message);
            self.results.pop_front().unwrap_or(Ok(()))
        }

        async fn closed(&mut self) {
            match self.close_after {
                Some(n) if self.sent.len() >= n => {}
                _ => std::future::pending::<()>().await,
            }
        }
    }

    async fn distributor() -> Distributor {
        let store = Store::in_memory().await;
        store
            .upsert(&[
                process(1, "alice", "chrome", ProcessState::Running, 1.0),
                process(2, "bob", "vim", ProcessState::Sleeping, 2.0),
            ])
            .await
            .unwrap();
        Distributor::new(store, QueryBuilder::default(), Duration::from_millis(1))
    }

    async fn run_bounded(distributor: &Distributor, sink: &mut ScriptedSink, filter: &ProcessFilter) {
        tokio::time::timeout(Duration::from_secs(5), distributor.run(sink, filter))
            .await
            .expect("realtime loop did not terminate");
    }

    #[tokio::test]
    async fn stops_on_disconnect_without_further_writes() {
        let distributor = distributor().await;
        let mut sink = ScriptedSink {
            results: VecDeque::from(vec![Ok(()), Err(PushError::Closed)]),
            ..Default::default()
        };

        run_bounded(&distributor, &mut sink, &ProcessFilter::default()).await;
        assert_eq!(sink.sent.len(), 2);
    }

    #[tokio::test]
    async fn transient_failure_keeps_pushing() {
        let distributor = distributor().await;
        let mut sink = ScriptedSink {
            results: VecDeque::from(vec![
                Err(PushError::Other("buffer full".into())),
                Ok(()),
                Err(PushError::Closed),
            ]),
            ..Default::default()
        };

        run_bounded(&distributor, &mut sink, &ProcessFilter::default()).await;
        assert_eq!(sink.sent.len(), 3);
    }

    #[tokio::test]
    async fn peer_close_during_wait_ends_loop() {
        let distributor = distributor().await;
        let mut sink = ScriptedSink {
            close_after: Some(1),
            ..Default::default()
        };

        run_bounded(&distributor, &mut sink, &ProcessFilter::default()).await;
        assert_eq!(sink.sent.len(), 1);
    }

    #[tokio::test]
    async fn message_carries_filtered_processes_and_reports() {
        let distributor = distributor().await;
        let mut sink = ScriptedSink {
            results: VecDeque::from(vec![Err(PushError::Closed)]),
            ..Default::default()
        };
        let filter = ProcessFilter {
            state: Some("running".into()),
            ..Default::default()
        };

        run_bounded(&distributor, &mut sink, &filter).await;

        let message: serde_json::Value = serde_json::from_str(&sink.sent[0]).unwrap();
        let processes = message["processes"].as_array().unwrap();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0]["command"], "chrome");
        assert_eq!(message["reports"].as_array().unwrap().len(), 2);
    }
}
