//! Actor adapter around the RollDPoS state machine.
//!
//! Each engine owns one `RollDpos` inside a task spawned on the player's
//! `HarnessContext`. Callers talk to it through an unbounded mailbox, so
//! envelopes for one player are handled strictly in arrival order.

use super::fsm::{Action, Reaction, RollDpos};
use super::message::ConsensusMessage;
use dposim_env::{
    CompletionSignal, Envelope, EventOutcome, HarnessContext, OutputSink, PeerOverlay, PlayerId,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

enum Command {
    Handle {
        envelope: Envelope,
        done: CompletionSignal,
    },
    Shutdown,
}

/// State held between construction and `start`.
struct Parked<Net: PeerOverlay> {
    inbox: mpsc::UnboundedReceiver<Command>,
    fsm: RollDpos<Net>,
}

/// One player's running consensus engine.
pub struct ConsensusEngine<Ctx, Out, Net>
where
    Ctx: HarnessContext,
    Out: OutputSink,
    Net: PeerOverlay,
{
    player: PlayerId,
    ctx: Arc<Ctx>,
    sink: Arc<Out>,
    ticker: Option<Duration>,
    mailbox: mpsc::UnboundedSender<Command>,
    parked: Mutex<Option<Parked<Net>>>,
}

impl<Ctx, Out, Net> ConsensusEngine<Ctx, Out, Net>
where
    Ctx: HarnessContext,
    Out: OutputSink,
    Net: PeerOverlay,
{
    /// Wraps `fsm`. Envelopes handed in before `start` wait in the mailbox.
    ///
    /// `propose_interval` enables the background round timer, which only
    /// runs when `ctx` is real-time.
    pub fn new(
        player: PlayerId,
        fsm: RollDpos<Net>,
        propose_interval: Option<Duration>,
        ctx: Arc<Ctx>,
        sink: Arc<Out>,
    ) -> Self {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let ticker = propose_interval.filter(|_| ctx.is_realtime());
        Self {
            player,
            ctx,
            sink,
            ticker,
            mailbox,
            parked: Mutex::new(Some(Parked { inbox, fsm })),
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    fn parked(&self) -> MutexGuard<'_, Option<Parked<Net>>> {
        self.parked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns the engine task. Returns `false` if it was already started
    /// or shut down.
    pub fn start(&self) -> bool {
        let Some(Parked { inbox, fsm }) = self.parked().take() else {
            return false;
        };

        let worker = Worker {
            fsm,
            ctx: self.ctx.clone(),
            sink: self.sink.clone(),
        };
        let span = tracing::info_span!("engine", player = %self.player);
        self.ctx.spawn(
            &format!("consensus-{}", self.player),
            worker.run(inbox, self.ticker).instrument(span),
        );
        true
    }

    /// Queues `envelope`; `done` fires once the engine has reacted.
    ///
    /// If the engine has stopped, `done` reports `Abandoned`.
    pub fn handle_event(&self, envelope: Envelope, done: CompletionSignal) {
        let command = Command::Handle { envelope, done };
        if self.mailbox.send(command).is_err() {
            warn!(player = %self.player, "Envelope for stopped engine");
        }
    }

    /// Stops the engine. Queued envelopes are abandoned.
    pub fn shutdown(&self) {
        // Never started: dropping the parked inbox abandons what it holds.
        self.parked().take();
        let _ = self.mailbox.send(Command::Shutdown);
    }

    /// Whether the engine task has exited.
    pub fn is_stopped(&self) -> bool {
        self.mailbox.is_closed()
    }
}

struct Worker<Ctx, Out, Net: PeerOverlay> {
    fsm: RollDpos<Net>,
    ctx: Arc<Ctx>,
    sink: Arc<Out>,
}

impl<Ctx, Out, Net> Worker<Ctx, Out, Net>
where
    Ctx: HarnessContext,
    Out: OutputSink,
    Net: PeerOverlay,
{
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>, ticker: Option<Duration>) {
        info!(height = self.fsm.height(), "Consensus engine started");
        let mut next_tick = ticker.map(|period| self.ctx.now() + period);
        loop {
            let command = match (ticker, next_tick) {
                (Some(period), Some(deadline)) => {
                    let ctx = self.ctx.clone();
                    let remaining = deadline.saturating_sub(ctx.now());
                    tokio::select! {
                        command = inbox.recv() => command,
                        _ = ctx.sleep(remaining) => {
                            next_tick = Some(ctx.now() + period);
                            let outcome = self.drive(ConsensusMessage::TimerTick).await;
                            debug!(?outcome, "Round timer fired");
                            continue;
                        }
                    }
                }
                _ => inbox.recv().await,
            };

            match command {
                Some(Command::Handle { envelope, done }) => {
                    let outcome = self.process(envelope).await;
                    done.fire(outcome);
                }
                Some(Command::Shutdown) | None => break,
            }
        }
        info!(height = self.fsm.height(), "Consensus engine stopped");
    }

    async fn process(&mut self, envelope: Envelope) -> EventOutcome {
        match ConsensusMessage::decode(&envelope) {
            Ok(message) => self.drive(message).await,
            Err(e) => {
                warn!(tag = envelope.tag(), error = %e, "Dropping undecodable envelope");
                EventOutcome::Ignored {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn drive(&mut self, message: ConsensusMessage) -> EventOutcome {
        let kind = message.kind();
        let reaction = self
            .fsm
            .handle(message, self.ctx.now(), self.ctx.unix_millis());

        let actions = match reaction {
            Reaction::Ignored(reason) => {
                debug!(?kind, %reason, "Message ignored");
                return EventOutcome::Ignored { reason };
            }
            Reaction::Acted(actions) => actions,
        };

        let mut emitted = 0;
        for action in actions {
            match action {
                Action::Emit(msg) => {
                    debug!(
                        vc_type = ?msg.vc_type,
                        height = msg.height,
                        round = msg.round,
                        "Emitting view change"
                    );
                    self.sink.emit(msg.to_output());
                    emitted += 1;
                }
                Action::RequestSync { from, to } => {
                    let sync = self.fsm.syncer().request_range(from, to, self.ctx.unix_millis());
                    if let Err(e) = sync.await {
                        warn!(from, to, error = %e, "Block sync request failed");
                    }
                }
            }
        }
        EventOutcome::Processed { emitted }
    }
}
