//! Local queue driver: one JSON message per input line, with delayed redelivery.

use crate::features::domain_join::controller::DomainJoinController;
use crate::shared::types::Disposition;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: String,
    /// 1 for the first delivery
    pub attempt: u32,
}

#[derive(Debug)]
enum QueueEvent {
    Message(Delivery),
    InputClosed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub delivered: u64,
    pub acked: u64,
    pub redelivered: u64,
    pub rejected: u64,
}

/// Feed every non-blank line of `reader` to the controller.
///
/// Redelivered messages come back after `redelivery_delay` and run again. Returns
/// once the input is exhausted and no redelivery is still pending.
pub async fn run_json_lines<R>(
    reader: R,
    controller: &DomainJoinController,
    redelivery_delay: Duration,
) -> QueueStats
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_reader(reader, tx.clone());

    let mut stats = QueueStats::default();
    let mut input_closed = false;
    let mut outstanding: u64 = 0;

    while !(input_closed && outstanding == 0) {
        let Some(event) = rx.recv().await else {
            break;
        };

        let delivery = match event {
            QueueEvent::InputClosed => {
                debug!("Input closed");
                input_closed = true;
                continue;
            }
            QueueEvent::Message(delivery) => delivery,
        };

        if delivery.attempt > 1 {
            outstanding = outstanding.saturating_sub(1);
        }
        stats.delivered += 1;

        match controller.handle_message(&delivery.body).await {
            Disposition::Ack => stats.acked += 1,
            Disposition::Reject => stats.rejected += 1,
            Disposition::Redeliver => {
                stats.redelivered += 1;
                outstanding += 1;
                let next = Delivery {
                    body: delivery.body,
                    attempt: delivery.attempt + 1,
                };
                info!(
                    attempt = next.attempt,
                    delay_secs = redelivery_delay.as_secs(),
                    "Scheduling redelivery"
                );
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(redelivery_delay).await;
                    if tx.send(QueueEvent::Message(next)).is_err() {
                        warn!("Queue closed before redelivery");
                    }
                });
            }
        }
    }

    stats
}

fn spawn_reader<R>(reader: R, tx: mpsc::UnboundedSender<QueueEvent>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let delivery = Delivery {
                        body: line,
                        attempt: 1,
                    };
                    if tx.send(QueueEvent::Message(delivery)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read input; no further messages");
                    break;
                }
            }
        }
        let _ = tx.send(QueueEvent::InputClosed);
    });
}
