//! The control loop.
//!
//! Owns the [`Balancer`] and feeds it one event at a time until shutdown.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::load_balancer::Balancer;
use crate::net::stream::BoxStream;
use crate::observability::metrics;
use crate::runtime::event::Event;

/// Hand one event to the balancer.
pub fn dispatch(balancer: &mut Balancer, event: Event) {
    match event {
        Event::Incoming(stream) => {
            let stream: BoxStream = stream;
            balancer.incoming(stream);
        }
        Event::Stream(event) => balancer.on_stream_event(event),
        Event::Dialed(ticket, stream) => {
            let stream: Option<BoxStream> = stream.map(|s| s as BoxStream);
            balancer.on_dialed(ticket, stream);
        }
        Event::Timer(id, kind) => balancer.on_timer(id, kind),
    }
}

fn report(balancer: &Balancer) {
    let pool = balancer.nodes();
    metrics::record_pool(pool.pool_size(), pool.pool_connecting());
    metrics::record_queue_depth(balancer.wait_queue());
    tracing::debug!(snapshot = %balancer.snapshot().to_json(), "Balancer state");
}

/// Run until `shutdown` fires or every event sender is gone, then shut the
/// balancer down. A zero `stats_interval` disables periodic state reports.
pub async fn run(
    mut balancer: Balancer,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut shutdown: broadcast::Receiver<()>,
    stats_interval: Duration,
) -> Balancer {
    let mut stats: Option<Interval> = (!stats_interval.is_zero()).then(|| {
        let mut ticker = time::interval_at(time::Instant::now() + stats_interval, stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    tracing::info!(nodes = balancer.nodes().len(), "Control loop started");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    tracing::trace!(?event, "Event");
                    dispatch(&mut balancer, event);
                }
                None => {
                    tracing::info!("Event channel closed");
                    break;
                }
            },
            _ = shutdown.recv() => {
                tracing::info!("Control loop received shutdown signal");
                break;
            }
            _ = async {
                match stats.as_mut() {
                    Some(ticker) => {
                        ticker.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => report(&balancer),
        }
    }

    balancer.shutdown();
    balancer
}
