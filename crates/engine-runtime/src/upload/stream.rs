use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// Stream adapter that bounds the gap between chunks instead of the whole
/// transfer.
///
/// The window restarts on every yielded item, so a slow but steadily
/// progressing upload never trips it; only a connection that produces no
/// chunk for a full window fails, with a timed-out I/O error the transport
/// classifies as transient.
pub struct ProgressTimeout<S> {
    inner: S,
    window: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl<S> ProgressTimeout<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        ProgressTimeout {
            inner,
            window,
            deadline: Box::pin(tokio::time::sleep(window)),
        }
    }
}

impl<S, T> Stream for ProgressTimeout<S>
where
    S: Stream<Item = Result<T, std::io::Error>> + Unpin,
{
    type Item = Result<T, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(item) => {
                // progress: the window starts over
                let next = Instant::now() + this.window;
                this.deadline.as_mut().reset(next);
                Poll::Ready(item)
            }
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(Some(Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no upload progress within {:?}", this.window),
                )))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_fails_after_one_window() {
        let stalled = futures::stream::pending::<Result<Vec<u8>, std::io::Error>>();
        let mut stream = ProgressTimeout::new(stalled, Duration::from_secs(300));

        let item = stream.next().await;
        let err = item.unwrap().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_progress_outlives_the_window() {
        // five chunks, 200s apart: 800s total against a 300s window, but the
        // window resets on every chunk
        let chunks = futures::stream::unfold(0u32, |n| async move {
            if n == 5 {
                return None;
            }
            if n > 0 {
                tokio::time::sleep(Duration::from_secs(200)).await;
            }
            Some((Ok::<_, std::io::Error>(vec![n as u8]), n + 1))
        });
        let stream = ProgressTimeout::new(Box::pin(chunks), Duration::from_secs(300));

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 5);
        assert!(items.into_iter().all(|item| item.is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn single_long_gap_still_times_out() {
        let chunks = futures::stream::unfold(0u32, |n| async move {
            match n {
                0 => Some((Ok::<_, std::io::Error>(vec![0u8]), 1)),
                1 => {
                    tokio::time::sleep(Duration::from_secs(301)).await;
                    Some((Ok(vec![1u8]), 2))
                }
                _ => None,
            }
        });
        let mut stream = ProgressTimeout::new(Box::pin(chunks), Duration::from_secs(300));

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
