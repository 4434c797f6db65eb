use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A live duplex connection to one peer gateway.
///
/// Outbound frames are queued onto `tx`, which feeds a dedicated writer
/// task, keeping the writer off the reader's task so a slow peer can't stall
/// inbound processing. `generation` lets
/// [`crate::service::PeerService::on_disconnect`] tell a stale close of a
/// since-replaced session apart from a close of the current one.
#[derive(Clone)]
pub struct SessionHandle {
    pub peer_id: String,
    pub generation: u64,
    pub tx: mpsc::Sender<Vec<u8>>,
    pub cancel: CancellationToken,
}

impl SessionHandle {
    pub fn connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}
