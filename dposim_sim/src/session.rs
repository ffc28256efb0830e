//! Session routing: which driver connection receives a player's output.

use crate::controller::InjectError;
use crate::wire::Response;
use dposim_env::{OutputSink, PlayerId, ProtocolOutput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One driver connection's output stream.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    tx: mpsc::UnboundedSender<Response>,
}

impl Session {
    /// Opens a session with a process-unique id.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<Response>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues a response. Returns `false` if the receiving side is gone.
    pub fn send(&self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
struct Binding {
    session: Option<Session>,
    in_flight: bool,
}

/// A player's single-owner output slot.
///
/// Holds the most recently bound session, which keeps receiving background
/// output after its Inject call returns, and rejects a new binding while an
/// Inject is outstanding.
#[derive(Debug)]
pub struct SessionSlot {
    player_id: PlayerId,
    binding: Mutex<Binding>,
}

impl SessionSlot {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            binding: Mutex::new(Binding::default()),
        }
    }

    fn binding(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Binds `session` for the duration of one Inject call.
    pub fn bind(self: &Arc<Self>, session: &Session) -> Result<InFlightGuard, InjectError> {
        let mut binding = self.binding();
        if binding.in_flight {
            return Err(InjectError::PlayerBusy(self.player_id));
        }
        binding.in_flight = true;
        if binding.session.as_ref().map(Session::id) != Some(session.id()) {
            debug!(player = %self.player_id, session = session.id(), "Session bound");
        }
        binding.session = Some(session.clone());
        Ok(InFlightGuard { slot: self.clone() })
    }

    /// Id of the currently bound session, if any.
    pub fn bound_session(&self) -> Option<u64> {
        self.binding().session.as_ref().map(Session::id)
    }

    pub fn is_in_flight(&self) -> bool {
        self.binding().in_flight
    }
}

impl OutputSink for SessionSlot {
    fn emit(&self, output: ProtocolOutput) -> bool {
        let mut binding = self.binding();
        let Some(session) = binding.session.as_ref() else {
            debug!(player = %self.player_id, "No session bound, dropping output");
            return false;
        };
        if session.send(Response::output(session.id(), self.player_id, output)) {
            return true;
        }
        debug!(player = %self.player_id, session = session.id(), "Session closed, unbinding");
        binding.session = None;
        false
    }
}

/// Marks a player busy until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    slot: Arc<SessionSlot>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slot.binding().in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(byte: u8) -> ProtocolOutput {
        ProtocolOutput::new(0, vec![byte])
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let (a, _rx_a) = Session::open();
        let (b, _rx_b) = Session::open();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_unbound_slot_drops_output() {
        let slot = SessionSlot::new(PlayerId(0));
        assert!(!slot.emit(output(1)));
        assert_eq!(slot.bound_session(), None);
    }

    #[test]
    fn test_output_is_tagged_with_session_and_player() {
        let slot = Arc::new(SessionSlot::new(PlayerId(3)));
        let (session, mut rx) = Session::open();
        let _guard = slot.bind(&session).unwrap();

        assert!(slot.emit(output(9)));
        assert_eq!(
            rx.try_recv().unwrap(),
            Response::output(session.id(), PlayerId(3), output(9))
        );
    }

    #[test]
    fn test_second_bind_while_in_flight_is_rejected() {
        let slot = Arc::new(SessionSlot::new(PlayerId(1)));
        let (a, _rx_a) = Session::open();
        let (b, _rx_b) = Session::open();

        let guard = slot.bind(&a).unwrap();
        assert!(matches!(slot.bind(&b), Err(InjectError::PlayerBusy(PlayerId(1)))));
        assert_eq!(slot.bound_session(), Some(a.id()));

        drop(guard);
        assert!(!slot.is_in_flight());
        let _guard = slot.bind(&b).unwrap();
        assert_eq!(slot.bound_session(), Some(b.id()));
    }

    #[test]
    fn test_binding_outlives_the_call() {
        let slot = Arc::new(SessionSlot::new(PlayerId(0)));
        let (session, mut rx) = Session::open();
        drop(slot.bind(&session).unwrap());

        // Background output still reaches the last driver.
        assert!(slot.emit(output(2)));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_closed_session_is_unbound() {
        let slot = Arc::new(SessionSlot::new(PlayerId(0)));
        let (session, rx) = Session::open();
        drop(slot.bind(&session).unwrap());
        drop(rx);

        assert!(!slot.emit(output(1)));
        assert_eq!(slot.bound_session(), None);
    }
}
