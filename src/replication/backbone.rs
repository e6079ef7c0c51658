use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// One message as carried by the backbone
#[derive(Debug, Clone, PartialEq)]
pub struct BackboneMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Cross-process publish/subscribe channel.
///
/// At-most-once, unordered across subjects, best-effort ordered within a
/// subject per publisher. Subject patterns follow NATS wildcard rules.
pub trait Backbone: Send + Sync {
    fn publish(&self, subject: String, payload: Vec<u8>) -> BoxFuture<'_, Result<()>>;

    fn subscribe(
        &self,
        pattern: String,
    ) -> BoxFuture<'_, Result<BoxStream<'static, BackboneMessage>>>;
}

/// In-process backbone shared by several instances in one address space.
///
/// Used for tests and single-binary multi-instance setups. Slow subscribers
/// lose messages rather than stall publishers.
#[derive(Clone)]
pub struct MemoryBackbone {
    tx: broadcast::Sender<BackboneMessage>,
}

impl MemoryBackbone {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for MemoryBackbone {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Backbone for MemoryBackbone {
    fn publish(&self, subject: String, payload: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        // No subscribers is fine
        let _ = self.tx.send(BackboneMessage { subject, payload });
        Box::pin(async { Ok(()) })
    }

    fn subscribe(
        &self,
        pattern: String,
    ) -> BoxFuture<'_, Result<BoxStream<'static, BackboneMessage>>> {
        let rx = self.tx.subscribe();
        Box::pin(async move {
            let stream = BroadcastStream::new(rx)
                .filter_map(move |received| {
                    let matched = match received {
                        Ok(msg) if subject_matches(&pattern, &msg.subject) => Some(msg),
                        _ => None,
                    };
                    futures::future::ready(matched)
                })
                .boxed();
            Ok(stream)
        })
    }
}

/// NATS-style subject match: `*` matches one token, a trailing `>` matches
/// one or more remaining tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
