// ABOUTME: Fan-in of many channels into one.
// ABOUTME: One forwarding task per source; the output closes after every source has closed.

use tokio::sync::mpsc;

/// Merge `sources` into a single receiver with the given buffer capacity.
///
/// Per-source order is kept. Messages from different sources interleave in
/// arrival order.
pub fn merge<T>(sources: Vec<mpsc::Receiver<T>>, capacity: usize) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    for mut source in sources {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = source.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}
