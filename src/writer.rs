//! Dedicated writer task.
//!
//! All outgoing frames funnel through one task that owns the socket write
//! half, so frames are never interleaved no matter how many callers
//! submit concurrently. The queue is bounded; a stalled daemon applies
//! backpressure to submitters instead of growing the heap.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ChannelError, Result};

/// Frames queued before submitters start waiting.
pub(crate) const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Sending side of the writer queue. Cheap to clone.
#[derive(Debug, Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queues one encoded frame, waiting for queue space if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectionClosed`] once the writer task has
    /// exited.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ChannelError::ConnectionClosed)
    }
}

/// Spawns the writer task over `writer`.
///
/// The task drains the queue until every handle is dropped (clean
/// shutdown, resolves `Ok`) or a write fails (resolves with the I/O
/// error). Frames go out in exactly the order they were queued.
pub(crate) fn spawn_writer_task<W>(
    writer: W,
    queue_depth: usize,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_depth);
    let task = tokio::spawn(writer_loop(writer, rx));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Bytes>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            tracing::error!("Writer task I/O error: {}", e);
            // Stop accepting frames so submitters fail fast.
            rx.close();
            return Err(ChannelError::Io(e));
        }
    }
    tracing::debug!("Writer task shutting down cleanly");
    Ok(())
}

async fn write_frame<W>(writer: &mut W, frame: &Bytes) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (client, mut server) = tokio::io::duplex(256);
        let (handle, task) = spawn_writer_task(client, 8);

        handle.send(Bytes::from_static(b"alpha")).await.unwrap();
        handle.send(Bytes::from_static(b"beta")).await.unwrap();
        handle.send(Bytes::from_static(b"gamma")).await.unwrap();
        drop(handle);

        assert!(task.await.unwrap().is_ok());

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(&received, b"alphabetagamma");
    }

    #[tokio::test]
    async fn test_send_fails_after_writer_death() {
        let (client, server) = tokio::io::duplex(16);
        let (handle, task) = spawn_writer_task(client, 8);

        // Closing the read side makes the next write fail.
        drop(server);
        // The first send may slip into the queue before the task notices.
        let _ = handle.send(Bytes::from_static(b"doomed")).await;

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ChannelError::Io(_))));

        assert!(matches!(
            handle.send(Bytes::from_static(b"late")).await,
            Err(ChannelError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_clean_shutdown_when_handles_drop() {
        let (client, _server) = tokio::io::duplex(256);
        let (handle, task) = spawn_writer_task(client, 8);
        drop(handle);

        assert!(task.await.unwrap().is_ok());
    }
}
