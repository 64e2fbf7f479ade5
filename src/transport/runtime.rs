use crate::transport::traits::{InboundEvent, Transport};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 2;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

pub(crate) fn backoff_settings(
    reliability: &crate::config::ReliabilityConfig,
) -> (u64, u64) {
    let initial_backoff_secs = reliability
        .channel_initial_backoff_secs
        .max(DEFAULT_INITIAL_BACKOFF_SECS);
    let max_backoff_secs = reliability
        .channel_max_backoff_secs
        .max(DEFAULT_MAX_BACKOFF_SECS);

    (initial_backoff_secs, max_backoff_secs)
}

/// Keep one transport listening forever, restarting with exponential
/// backoff after failures. A closed receiver ends the task.
pub(crate) fn spawn_supervised_listener(
    channel: Arc<dyn Transport>,
    tx: tokio::sync::mpsc::Sender<InboundEvent>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            tracing::debug!(channel = channel.name(), "channel listener starting");
            let result = channel.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!(
                        "Channel {} exited unexpectedly; restarting",
                        channel.name()
                    );
                    // Clean exit -- reset backoff since the listener ran successfully
                    backoff = initial_backoff_secs.max(1);
                }
                Err(e) => {
                    tracing::error!("Channel {} error: {e}; restarting", channel.name());
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            // Double backoff AFTER sleeping so first error uses initial_backoff
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::Invoice;
    use crate::transport::traits::Keyboard;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFailChannel {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for AlwaysFailChannel {
        fn name(&self) -> &str {
            "test-supervised-fail"
        }

        async fn listen(
            &self,
            _tx: tokio::sync::mpsc::Sender<InboundEvent>,
        ) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("listen boom")
        }

        async fn send_message(&self, _chat_id: i64, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_message_with_keyboard(
            &self,
            _chat_id: i64,
            _text: &str,
            _keyboard: &Keyboard,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_photo_url(
            &self,
            _chat_id: i64,
            _url: &str,
            _caption: Option<&str>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_photo_file_id(&self, _chat_id: i64, _file_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_document(
            &self,
            _chat_id: i64,
            _file_name: &str,
            _bytes: Vec<u8>,
            _caption: Option<&str>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_invoice(&self, _chat_id: i64, _invoice: &Invoice) -> anyhow::Result<()> {
            Ok(())
        }

        async fn answer_callback(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
            _show_alert: bool,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn answer_precheckout(
            &self,
            _query_id: &str,
            _verdict: Result<(), String>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn edit_message_text(
            &self,
            _chat_id: i64,
            _message_id: i64,
            _text: &str,
            _keyboard: Option<&Keyboard>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_message(&self, _chat_id: i64, _message_id: i64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn fetch_file(&self, _file_id: &str) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn supervised_listener_restarts_on_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let channel: Arc<dyn Transport> = Arc::new(AlwaysFailChannel {
            calls: Arc::clone(&calls),
        });

        let (tx, rx) = tokio::sync::mpsc::channel::<InboundEvent>(1);
        let handle = spawn_supervised_listener(channel, tx, 1, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        drop(rx);
        handle.abort();
        let _ = handle.await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
