use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ViewerError, ViewerResult};
use crate::surface::{PixelFrame, TextRun};

/// Decode operations a worker-backed source must provide. Indices are
/// 0-based and pre-validated by the worker loop; implementations never cross
/// threads, so the backend itself does not need to be `Send`.
pub(crate) trait DecodeBackend {
    fn page_count(&self) -> usize;
    fn page_info(&self, index: usize) -> ViewerResult<(f32, f32)>;
    fn render_pixels(&self, index: usize, scale: f32) -> ViewerResult<PixelFrame>;
    fn text_runs(&self, index: usize) -> ViewerResult<Vec<TextRun>>;
    fn release_page(&self, index: usize);
}

pub(crate) enum DecodeRequest {
    PageInfo {
        number: usize,
        reply: oneshot::Sender<ViewerResult<(f32, f32)>>,
    },
    RenderPixels {
        number: usize,
        scale: f32,
        reply: oneshot::Sender<ViewerResult<PixelFrame>>,
    },
    PageText {
        number: usize,
        reply: oneshot::Sender<ViewerResult<Vec<TextRun>>>,
    },
    PageCleanup {
        number: usize,
    },
    Shutdown,
}

/// Request sender shared by the document handle and its page handles.
#[derive(Clone)]
pub(crate) struct DecodeClient {
    request_tx: UnboundedSender<DecodeRequest>,
}

impl DecodeClient {
    pub(crate) async fn page_info(&self, number: usize) -> ViewerResult<(f32, f32)> {
        let (reply, rx) = oneshot::channel();
        self.send(DecodeRequest::PageInfo { number, reply })?;
        rx.await.map_err(|_| ViewerError::SourceGone)?
    }

    pub(crate) async fn render_pixels(&self, number: usize, scale: f32) -> ViewerResult<PixelFrame> {
        let (reply, rx) = oneshot::channel();
        self.send(DecodeRequest::RenderPixels {
            number,
            scale,
            reply,
        })?;
        rx.await.map_err(|_| ViewerError::SourceGone)?
    }

    pub(crate) async fn page_text(&self, number: usize) -> ViewerResult<Vec<TextRun>> {
        let (reply, rx) = oneshot::channel();
        self.send(DecodeRequest::PageText { number, reply })?;
        rx.await.map_err(|_| ViewerError::SourceGone)?
    }

    pub(crate) fn page_cleanup(&self, number: usize) {
        let _ = self.request_tx.send(DecodeRequest::PageCleanup { number });
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.request_tx.send(DecodeRequest::Shutdown);
    }

    fn send(&self, request: DecodeRequest) -> ViewerResult<()> {
        self.request_tx
            .send(request)
            .map_err(|_| ViewerError::SourceGone)
    }
}

/// A dedicated blocking task that owns the decoded document and serves
/// decode requests until shutdown. The backend is opened inside the task so
/// it never has to cross a thread boundary.
pub(crate) struct DecodeWorker {
    client: DecodeClient,
    page_count: usize,
    _task: JoinHandle<()>,
}

impl DecodeWorker {
    pub(crate) async fn spawn<F>(open: F) -> ViewerResult<Self>
    where
        F: FnOnce() -> ViewerResult<Box<dyn DecodeBackend>> + Send + 'static,
    {
        let (request_tx, request_rx) = unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task =
            tokio::task::spawn_blocking(move || decode_worker_main(open, request_rx, ready_tx));

        let page_count = ready_rx.await.map_err(|_| ViewerError::SourceGone)??;
        Ok(Self {
            client: DecodeClient { request_tx },
            page_count,
            _task: task,
        })
    }

    pub(crate) fn client(&self) -> DecodeClient {
        self.client.clone()
    }

    pub(crate) fn page_count(&self) -> usize {
        self.page_count
    }
}

fn decode_worker_main<F>(
    open: F,
    mut request_rx: UnboundedReceiver<DecodeRequest>,
    ready_tx: oneshot::Sender<ViewerResult<usize>>,
) where
    F: FnOnce() -> ViewerResult<Box<dyn DecodeBackend>>,
{
    let backend = match open() {
        Ok(backend) => {
            let _ = ready_tx.send(Ok(backend.page_count()));
            backend
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    while let Some(request) = request_rx.blocking_recv() {
        match request {
            DecodeRequest::PageInfo { number, reply } => {
                let _ = reply.send(
                    validated_index(&*backend, number).and_then(|index| backend.page_info(index)),
                );
            }
            DecodeRequest::RenderPixels {
                number,
                scale,
                reply,
            } => {
                let _ = reply.send(
                    validated_index(&*backend, number)
                        .and_then(|index| backend.render_pixels(index, scale)),
                );
            }
            DecodeRequest::PageText { number, reply } => {
                let _ = reply.send(
                    validated_index(&*backend, number).and_then(|index| backend.text_runs(index)),
                );
            }
            DecodeRequest::PageCleanup { number } => {
                if let Ok(index) = validated_index(&*backend, number) {
                    backend.release_page(index);
                }
            }
            DecodeRequest::Shutdown => break,
        }
    }
}

fn validated_index(backend: &dyn DecodeBackend, number: usize) -> ViewerResult<usize> {
    let index = number
        .checked_sub(1)
        .ok_or_else(|| ViewerError::invalid_argument("page numbers are 1-based"))?;
    if index >= backend.page_count() {
        return Err(ViewerError::invalid_argument(format!(
            "page {number} is out of range (document has {} pages)",
            backend.page_count()
        )));
    }
    Ok(index)
}
