use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ChatClient, NarrationError, NarrationRequest};

pub type RequestId = u64;

/// Outcome of one narration request. Every request yields exactly one event.
#[derive(Debug)]
pub struct NarrationEvent {
    pub id: RequestId,
    pub result: Result<String, NarrationError>,
}

struct Pending {
    id: RequestId,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs narration requests on background tasks, one at a time.
///
/// Issuing a request while another is pending cancels the older one, which
/// then reports [`NarrationError::Superseded`].
pub struct Narrator<C> {
    client: Arc<C>,
    events: UnboundedSender<NarrationEvent>,
    pending: Option<Pending>,
    next_id: RequestId,
}

impl<C: ChatClient> Narrator<C> {
    pub fn new(client: C) -> (Self, UnboundedReceiver<NarrationEvent>) {
        let (events, rx) = unbounded_channel();
        let narrator = Self {
            client: Arc::new(client),
            events,
            pending: None,
            next_id: 0,
        };
        (narrator, rx)
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    /// Must be called inside a tokio runtime.
    pub fn request(&mut self, request: NarrationRequest) -> RequestId {
        self.cancel_pending();

        let id = self.next_id;
        self.next_id += 1;
        let (cancel, cancelled) = oneshot::channel::<()>();
        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let messages = request.messages();
            let max_tokens = request.max_tokens();
            let result = tokio::select! {
                result = client.complete(messages, max_tokens) => result,
                _ = cancelled => Err(NarrationError::Superseded),
            };
            match &result {
                Ok(_) => info!(id, "narration finished"),
                Err(e) => debug!(id, "narration ended: {e}"),
            }
            // the receiver may be gone when the caller stopped listening
            let _ = events.send(NarrationEvent { id, result });
        });
        self.pending = Some(Pending { id, cancel, handle });
        id
    }

    /// Id of the request whose result has not been delivered yet.
    pub fn pending(&self) -> Option<RequestId> {
        self.pending
            .as_ref()
            .filter(|p| !p.handle.is_finished())
            .map(|p| p.id)
    }

    pub fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take()
            && !pending.handle.is_finished()
        {
            debug!(id = pending.id, "superseding narration request");
            let _ = pending.cancel.send(());
        }
    }
}
