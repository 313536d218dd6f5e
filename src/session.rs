//! The session core: identification exchange, key-exchange coordination and
//! rekeying, and message dispatch to an upstream [`Service`] once a
//! transport is established.
//!
//! A [`Session`] owns the wire; everything above it (`ssh-userauth`,
//! `ssh-connection`, ...) is a [`Service`] handed raw payloads. The session
//! itself only understands opcodes `1..=49` (RFC 4253 §12) plus watching
//! `SSH_MSG_USERAUTH_SUCCESS` go by to flip its own `authed` bookkeeping.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Instant,
};

use futures::{
    channel::oneshot,
    io::{
        AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf as IoReadHalf,
        WriteHalf as IoWriteHalf,
    },
    lock::Mutex as AsyncMutex,
};
use futures_time::{future::FutureExt as _, time::Duration as FtDuration};
use ssh_packet::{
    arch::{Bool, NameList},
    trans::{
        Debug as DebugMsg, Disconnect, DisconnectReason, Ignore, KexInit, NewKeys, ServiceAccept,
        ServiceRequest, Unimplemented,
    },
};

use crate::{
    codec::{self, Transport},
    error::{DisconnectedBy, DisconnectedError, Error, Result, TimeoutStatus},
    factory::{KexIo, KexTranscript},
    id::Id,
    listener::{self, Listeners},
    message::{self, opcode},
    negotiate,
    rendezvous::{OneShot, Rendezvous},
    service::{Service, ServiceFactory},
    side::Side,
};

/// Bound satisfied by anything a [`Session`] can run over: a duplex, unpin,
/// owned, thread-safe byte stream.
pub trait Pipe: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Pipe for T {}

/// Where a session sits in the key-exchange state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KexState {
    /// Local and peer `KexInit` have been exchanged; negotiation runs next.
    Init,
    /// Negotiation settled; the chosen key-exchange method is running.
    Run,
    /// The exchange produced keys; `NEWKEYS` is being swapped.
    Keys,
    /// Fully established: ordinary traffic may flow and rekeys may start.
    Done,
}

/// Hooks a caller can register to observe session-level events.
///
/// Every method has a no-op default; implement only what you need.
pub trait SessionListener: Send + Sync {
    /// A key-exchange (initial or rekey) just completed successfully.
    fn rekeyed(&self) {}

    /// The session tore down, cleanly or otherwise.
    fn disconnected(&self, _cause: &DisconnectedError) {}
}

struct SharedState {
    kex: KexState,
    session_id: Option<Vec<u8>>,
    username: Option<String>,
    service_name: Option<String>,
    auth_deadline: Instant,
    idle_deadline: Instant,
    closed: bool,
}

struct ReadSide<IO: Pipe> {
    io: BufReader<IoReadHalf<IO>>,
    rx: Transport,
}

struct WriteSide<IO: Pipe> {
    io: IoWriteHalf<IO>,
    tx: Transport,
}

type PendingWrite = (Vec<u8>, oneshot::Sender<Result<()>>);

/// A live SSH-2 transport session: identification, key-exchange and packet
/// framing, with everything past the transport layer handed to a [`Service`].
pub struct Session<IO: Pipe, S: Side> {
    side: S,
    peer_id: Id,

    read: AsyncMutex<ReadSide<IO>>,
    write: AsyncMutex<WriteSide<IO>>,
    state: StdMutex<SharedState>,
    pending: AsyncMutex<Vec<PendingWrite>>,

    /// Shared with both [`Transport`]s, so a negotiated delayed compressor
    /// unlocks the instant `SSH_MSG_USERAUTH_SUCCESS` is sent/dispatched.
    authed: Arc<AtomicBool>,

    rekey_needed: AtomicBool,
    kex_done: OneShot<std::result::Result<(), Arc<Error>>>,
    service_accept: Rendezvous<Result<String>>,

    service: StdMutex<Option<Box<dyn Service>>>,
    service_factory: Arc<dyn ServiceFactory>,

    listeners: Listeners<Arc<dyn SessionListener>>,
}

impl<IO: Pipe, S: Side> Session<IO, S> {
    /// Exchange identification strings and run the first key-exchange to
    /// completion. The returned session is ready to send and receive
    /// upstream service traffic.
    pub async fn new(io: IO, side: S, services: Arc<dyn ServiceFactory>) -> Result<Self> {
        let (reader, mut writer) = io.split();
        let mut reader = BufReader::new(reader);

        side.id().to_async_writer(&mut writer).await?;
        writer.flush().await?;
        let peer_id = Id::from_async_reader(&mut reader).await?;
        tracing::debug!("session started with peer `{peer_id}`");

        let now = Instant::now();
        let state = SharedState {
            kex: KexState::Init,
            session_id: None,
            username: None,
            service_name: None,
            auth_deadline: now + side.config().auth_timeout,
            idle_deadline: now + side.config().idle_timeout,
            closed: false,
        };

        let authed = Arc::new(AtomicBool::new(false));

        let session = Self {
            side,
            peer_id,
            read: AsyncMutex::new(ReadSide {
                io: reader,
                rx: Transport::none(authed.clone()),
            }),
            write: AsyncMutex::new(WriteSide {
                io: writer,
                tx: Transport::none(authed.clone()),
            }),
            state: StdMutex::new(state),
            pending: AsyncMutex::new(Vec::new()),
            authed,
            rekey_needed: AtomicBool::new(false),
            kex_done: OneShot::new(),
            service_accept: Rendezvous::new(),
            service: StdMutex::new(None),
            service_factory: services,
            listeners: Listeners::default(),
        };

        {
            let mut read = session.read.lock().await;
            let mut write = session.write.lock().await;
            session.negotiate_kex(&mut read, &mut write, None).await?;
        }

        Ok(session)
    }

    /// The peer's identification string.
    pub fn peer_id(&self) -> &Id {
        &self.peer_id
    }

    /// The session identifier fixed at the first key-exchange (RFC 4253
    /// §7.2), constant for the life of the connection.
    pub fn session_id(&self) -> Option<Vec<u8>> {
        self.state.lock().expect("state lock poisoned").session_id.clone()
    }

    /// Register an event listener; returns `false` if the session is
    /// already closing.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) -> bool {
        self.listeners.add(listener)
    }

    /// Record the username an upstream authentication service has
    /// authenticated. This alone does not flip [`Session::is_authenticated`];
    /// that happens only once `SSH_MSG_USERAUTH_SUCCESS` is actually sent.
    pub fn set_username(&self, username: impl Into<String>) {
        self.state.lock().expect("state lock poisoned").username = Some(username.into());
    }

    /// The username recorded via [`Session::set_username`], if any.
    pub fn username(&self) -> Option<String> {
        self.state.lock().expect("state lock poisoned").username.clone()
    }

    /// Whether `SSH_MSG_USERAUTH_SUCCESS` has been sent on this session.
    pub fn is_authenticated(&self) -> bool {
        self.authed.load(Ordering::Relaxed)
    }

    fn kex_state(&self) -> KexState {
        self.state.lock().expect("state lock poisoned").kex
    }

    fn set_kex_state(&self, kex: KexState) {
        self.state.lock().expect("state lock poisoned").kex = kex;
    }

    fn is_closed(&self) -> bool {
        self.state.lock().expect("state lock poisoned").closed
    }

    fn touch_idle(&self) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.idle_deadline = Instant::now() + self.side.config().idle_timeout;
    }

    /// Drive the session: read and dispatch packets until disconnection,
    /// a timeout, or an unrecoverable protocol error. On any error this
    /// attempts a best-effort `SSH_MSG_DISCONNECT` before returning.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(needs_rekey) => {
                    if needs_rekey {
                        tracing::debug!("rekey threshold reached, starting key re-exchange");
                        self.rekey().await?;
                    }
                }
                Err(err) => {
                    self.close();
                    return Err(self.report_and_disconnect(err).await);
                }
            }
        }
    }

    async fn report_and_disconnect(&self, err: Error) -> Error {
        if let Error::Disconnected(cause) = &err {
            if cause.by == DisconnectedBy::Them {
                tracing::warn!(reason = ?cause.reason, "peer disconnected: {}", cause.description);
            }
            self.notify_disconnected(cause);
            return err;
        }

        let reason = err.disconnect_reason();
        tracing::warn!("session ending: {err}");

        match reason {
            Some(reason) => self.disconnect(reason, err.to_string()).await,
            None => err,
        }
    }

    fn notify_disconnected(&self, cause: &DisconnectedError) {
        listener::dispatch(&self.listeners, |listener| listener.disconnected(cause));
    }

    /// Read and dispatch exactly one packet, or react to a timeout. Returns
    /// whether a rekey should now be attempted.
    async fn run_once(&self) -> Result<bool> {
        let (deadline, status) = self.next_deadline();
        let tick = Instant::now() + self.side.config().rekey_time_threshold.min(std::time::Duration::from_secs(60));
        let wake_at = deadline.min(tick);

        let mut read = self.read.lock().await;
        let remaining = wake_at.saturating_duration_since(Instant::now());

        let outcome = codec::decode(&mut read.rx, &mut read.io)
            .timeout(FtDuration::from(remaining))
            .await;

        match outcome {
            Ok(Ok(payload)) => {
                let rx_due = read
                    .rx
                    .is_rekeyable(self.side.config().rekey_bytes_threshold, self.side.config().rekey_time_threshold);

                self.touch_idle();
                self.dispatch(&mut read, payload).await?;
                drop(read);

                Ok(rx_due || self.rekey_needed.swap(false, Ordering::Relaxed))
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => {
                let tx_due = self.tx_rekeyable();
                let rx_due = read
                    .rx
                    .is_rekeyable(self.side.config().rekey_bytes_threshold, self.side.config().rekey_time_threshold);
                drop(read);

                if Instant::now() >= deadline {
                    Err(Error::Timeout(status))
                } else {
                    Ok(tx_due || rx_due || self.rekey_needed.load(Ordering::Relaxed))
                }
            }
        }
    }

    fn tx_rekeyable(&self) -> bool {
        self.write
            .try_lock()
            .map(|write| {
                write
                    .tx
                    .is_rekeyable(self.side.config().rekey_bytes_threshold, self.side.config().rekey_time_threshold)
            })
            .unwrap_or(false)
    }

    fn next_deadline(&self) -> (Instant, TimeoutStatus) {
        let state = self.state.lock().expect("state lock poisoned");

        if !self.is_authenticated() && state.auth_deadline <= state.idle_deadline {
            (state.auth_deadline, TimeoutStatus::AuthTimeout)
        } else {
            (state.idle_deadline, TimeoutStatus::IdleTimeout)
        }
    }

    async fn dispatch(&self, read: &mut ReadSide<IO>, payload: Vec<u8>) -> Result<()> {
        let cmd = *payload.first().ok_or(Error::Protocol("empty packet payload"))?;

        match cmd {
            opcode::DISCONNECT => {
                let msg: Disconnect = message::decode(&payload)?;
                let cause = DisconnectedError {
                    by: DisconnectedBy::Them,
                    reason: msg.reason,
                    description: msg.description.to_string(),
                };

                Err(Error::Disconnected(cause))
            }
            opcode::IGNORE => {
                let _: Ignore = message::decode(&payload)?;
                Ok(())
            }
            opcode::UNIMPLEMENTED => {
                let msg: Unimplemented = message::decode(&payload)?;
                tracing::debug!(seq = msg.seq, "peer rejected a packet as unimplemented");
                Ok(())
            }
            opcode::DEBUG => {
                let msg: DebugMsg = message::decode(&payload)?;
                tracing::debug!(message = %msg.message, "peer debug message");
                Ok(())
            }
            opcode::SERVICE_REQUEST => {
                let mut write = self.write.lock().await;
                self.handle_service_request(&mut write, &payload).await
            }
            opcode::SERVICE_ACCEPT => {
                let msg: ServiceAccept = message::decode(&payload)?;
                let name = msg.service_name.to_string();
                self.state.lock().expect("state lock poisoned").service_name = Some(name.clone());
                self.service_accept.respond(Ok(name));
                Ok(())
            }
            opcode::KEXINIT => {
                let mut write = self.write.lock().await;
                self.negotiate_kex(read, &mut write, Some(payload)).await
            }
            opcode::NEWKEYS => Err(Error::Protocol("NEWKEYS received outside of key-exchange")),
            cmd if opcode::KEX_SPECIFIC.contains(&cmd) => {
                Err(Error::Protocol("kex-specific message received outside of key-exchange"))
            }
            opcode::USERAUTH_SUCCESS => {
                let result = self.forward_to_service(cmd, &payload);
                // Set *after* the service has seen the packet, but before the
                // next ingress packet is decoded, per the delayed-compression
                // contract: the very message announcing success must still
                // travel under the pre-auth compression state.
                self.authed.store(true, Ordering::Relaxed);
                result
            }
            cmd => self.forward_to_service(cmd, &payload),
        }
    }

    async fn handle_service_request(&self, write: &mut WriteSide<IO>, payload: &[u8]) -> Result<()> {
        if self.kex_state() != KexState::Done {
            return Err(Error::Protocol("service request before key exchange completed"));
        }

        let req: ServiceRequest = message::decode(payload)?;
        let name = req.service_name.to_string();

        let service = self
            .service_factory
            .create(&name)
            .ok_or_else(|| Error::ServiceNotAvailable(name.clone()))?;

        *self.service.lock().expect("service lock poisoned") = Some(service);
        self.state.lock().expect("state lock poisoned").service_name = Some(name.clone());

        let reply = message::encode(&ServiceAccept {
            service_name: name.as_str().into(),
        })?;

        self.send_framed(write, &reply).await
    }

    fn forward_to_service(&self, cmd: u8, payload: &[u8]) -> Result<()> {
        let mut service = self.service.lock().expect("service lock poisoned");

        match service.as_mut() {
            Some(service) => service.process(cmd, payload),
            None => Err(Error::UnexpectedMessage(cmd)),
        }
    }

    fn build_kexinit(&self) -> KexInit<'static> {
        let algorithms = self.side.algorithms();

        let mut cookie = [0u8; 16];
        self.side.config().factories.prng().fill(&mut cookie);

        let host_keys = NameList::from_iter(self.side.host_key_algorithm_names());
        let kexs = NameList::from_iter(algorithms.kexs.iter().cloned());
        let ciphers = NameList::from_iter(algorithms.ciphers.iter().cloned());
        let macs = NameList::from_iter(algorithms.macs.iter().cloned());
        let compressions = NameList::from_iter(algorithms.compressions.iter().cloned());

        KexInit {
            cookie,
            kex_algorithms: kexs,
            server_host_key_algorithms: host_keys,
            encryption_algorithms_client_to_server: ciphers.clone(),
            encryption_algorithms_server_to_client: ciphers,
            mac_algorithms_client_to_server: macs.clone(),
            mac_algorithms_server_to_client: macs,
            compression_algorithms_client_to_server: compressions.clone(),
            compression_algorithms_server_to_client: compressions,
            languages_client_to_server: NameList::default(),
            languages_server_to_client: NameList::default(),
            first_kex_packet_follows: Bool::from(false),
        }
    }

    /// Run one full key-exchange: negotiate, perform the exchange, derive
    /// and install keys, and flush anything queued while it ran.
    ///
    /// `remote_kexinit` is `Some` when a peer-sent `KexInit` triggered this
    /// call (a reactive rekey or the responder's side of the first
    /// exchange); `None` when this side is initiating.
    async fn negotiate_kex(
        &self,
        read: &mut ReadSide<IO>,
        write: &mut WriteSide<IO>,
        remote_kexinit: Option<Vec<u8>>,
    ) -> Result<()> {
        self.set_kex_state(KexState::Init);

        let local = self.build_kexinit();
        let local_raw = message::encode(&local)?;
        self.send_framed(write, &local_raw).await?;

        let remote_raw = match remote_kexinit {
            Some(payload) => payload,
            None => self.read_transport_message(read, opcode::KEXINIT).await?,
        };
        let remote: KexInit = message::decode(&remote_raw)?;

        let negotiated = if self.side.is_client() {
            negotiate::negotiate(&local, &remote)?
        } else {
            negotiate::negotiate(&remote, &local)?
        };

        self.set_kex_state(KexState::Run);

        let factories = &self.side.config().factories;
        let kex_algo = factories.kex(&negotiated.kex)?;

        let local_id_bytes = self.side.id().to_string().into_bytes();
        let peer_id_bytes = self.peer_id.to_string().into_bytes();

        let (client_id, server_id, client_kexinit, server_kexinit): (&[u8], &[u8], &[u8], &[u8]) =
            if self.side.is_client() {
                (&local_id_bytes, &peer_id_bytes, &local_raw, &remote_raw)
            } else {
                (&peer_id_bytes, &local_id_bytes, &remote_raw, &local_raw)
            };

        let transcript = KexTranscript {
            client_id,
            server_id,
            client_kexinit,
            server_kexinit,
            host_key_algorithm: &negotiated.host_key,
        };

        let prng = factories.prng().clone();
        let mut io = SessionKexIo { read, write, prng: &*prng };

        let output = if self.side.is_client() {
            kex_algo.client_exchange(&transcript, &mut io).await?
        } else {
            kex_algo.server_exchange(&transcript, &mut io, self.side.host_keys()).await?
        };

        let session_id = {
            let mut state = self.state.lock().expect("state lock poisoned");
            state
                .session_id
                .get_or_insert_with(|| output.exchange_hash.clone())
                .clone()
        };

        self.set_kex_state(KexState::Keys);

        let (cipher_name_tx, cipher_name_rx, mac_name_tx, mac_name_rx, compress_name_tx, compress_name_rx) =
            if self.side.is_client() {
                (
                    &negotiated.cipher_c2s,
                    &negotiated.cipher_s2c,
                    &negotiated.mac_c2s,
                    &negotiated.mac_s2c,
                    &negotiated.compress_c2s,
                    &negotiated.compress_s2c,
                )
            } else {
                (
                    &negotiated.cipher_s2c,
                    &negotiated.cipher_c2s,
                    &negotiated.mac_s2c,
                    &negotiated.mac_c2s,
                    &negotiated.compress_s2c,
                    &negotiated.compress_c2s,
                )
            };

        let cipher_tx = factories.cipher(cipher_name_tx)?;
        let mac_tx = factories.mac(mac_name_tx)?;
        let compress_tx = factories.compress(compress_name_tx)?;

        let cipher_rx = factories.cipher(cipher_name_rx)?;
        let mac_rx = factories.mac(mac_name_rx)?;
        let compress_rx = factories.compress(compress_name_rx)?;

        let (tx_keys, rx_keys) = kex_algo.derive(
            &output.shared_secret,
            &output.exchange_hash,
            &session_id,
            cipher_tx.as_ref(),
            mac_tx.as_ref(),
            self.side.is_client(),
        );

        let newkeys = message::encode(&NewKeys)?;
        self.send_framed(write, &newkeys).await?;
        write.tx.install(cipher_tx, mac_tx, compress_tx, tx_keys);

        let newkeys_raw = self.read_transport_message(read, opcode::NEWKEYS).await?;
        let _: NewKeys = message::decode(&newkeys_raw)?;
        read.rx.install(cipher_rx, mac_rx, compress_rx, rx_keys);

        self.drain_pending(write).await;

        self.set_kex_state(KexState::Done);
        self.kex_done.complete(Ok(()));

        tracing::debug!(kex = %negotiated.kex, cipher = %cipher_name_tx, "key exchange complete");

        listener::dispatch(&self.listeners, |listener| listener.rekeyed());

        Ok(())
    }

    /// Read packets until one with opcode `expected` arrives, tolerating
    /// `IGNORE`/`DEBUG` in between (the only messages RFC 4253 allows a
    /// compliant peer to interleave before its next expected message).
    async fn read_transport_message(&self, read: &mut ReadSide<IO>, expected: u8) -> Result<Vec<u8>> {
        loop {
            let payload = codec::decode(&mut read.rx, &mut read.io).await?;
            let cmd = *payload.first().ok_or(Error::Protocol("empty packet payload"))?;

            if cmd == expected {
                return Ok(payload);
            } else if cmd == opcode::IGNORE || cmd == opcode::DEBUG {
                continue;
            } else {
                return Err(Error::UnexpectedMessage(cmd));
            }
        }
    }

    async fn send_framed(&self, write: &mut WriteSide<IO>, payload: &[u8]) -> Result<()> {
        let prng = self.side.config().factories.prng().clone();
        codec::encode(&mut write.tx, payload, prng.as_ref(), &mut write.io).await
    }

    /// Drain the pending-write queue in FIFO order under the already-held
    /// write lock, resolving each writer's future with the outcome of its
    /// now-ready send.
    async fn drain_pending(&self, write: &mut WriteSide<IO>) {
        let mut pending = self.pending.lock().await;

        for (payload, waiter) in pending.drain(..) {
            let result = self.send_framed(write, &payload).await;
            self.note_sent(&payload, result.is_ok());
            let _ = waiter.send(result);
        }
    }

    fn note_sent(&self, payload: &[u8], ok: bool) {
        if ok {
            if let Some(&cmd) = payload.first() {
                if cmd == opcode::USERAUTH_SUCCESS {
                    self.authed.store(true, Ordering::Relaxed);
                }
            }
            self.touch_idle();
        }
    }

    /// Queue or send a non-transport packet, depending on whether a
    /// key-exchange is currently in flight. The returned future resolves
    /// once the packet has actually reached the wire (or the session
    /// closed before it could).
    pub async fn write_packet(&self, payload: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closing);
        }

        let cmd = *payload.first().ok_or(Error::Protocol("empty packet payload"))?;
        if opcode::KEX_SPECIFIC.contains(&cmd) || matches!(cmd, opcode::KEXINIT | opcode::NEWKEYS) {
            return Err(Error::Protocol("transport-layer opcodes may not be sent via write_packet"));
        }

        // The "is kex done" check and the queue push happen under the same
        // lock `drain_pending` uses, so no packet can be accepted here
        // after a drain has already started and missed it.
        let rx = {
            let mut pending = self.pending.lock().await;

            if self.kex_state() != KexState::Done {
                let (tx, rx) = oneshot::channel();
                pending.push((payload, tx));
                Some(rx)
            } else {
                None
            }
        };

        if let Some(rx) = rx {
            return rx.await.unwrap_or(Err(Error::Closing));
        }

        let mut write = self.write.lock().await;
        let result = self.send_framed(&mut write, &payload).await;
        self.note_sent(&payload, result.is_ok());

        if result.is_ok()
            && write
                .tx
                .is_rekeyable(self.side.config().rekey_bytes_threshold, self.side.config().rekey_time_threshold)
        {
            self.rekey_needed.store(true, Ordering::Relaxed);
        }

        result
    }

    /// Resolves once this session's first key-exchange has completed;
    /// already-resolved calls return immediately. This never re-fires for
    /// later rekeys, only the initial one performed by [`Session::new`].
    pub async fn ready(&self) -> Result<()> {
        self.kex_done.wait().await.map_err(|_| Error::Closing)
    }

    /// Request an upstream service by name (`SSH_MSG_SERVICE_REQUEST`),
    /// waiting for the matching `SSH_MSG_SERVICE_ACCEPT`. At most one
    /// request may be outstanding on a session at a time; a second call
    /// waits behind the first.
    pub async fn request_service(&self, name: impl Into<String>) -> Result<String> {
        let name = name.into();

        self.service_accept
            .request(|| async {
                let payload = message::encode(&ServiceRequest {
                    service_name: name.as_str().into(),
                })?;
                self.write_packet(payload).await
            })
            .await?
    }

    /// Force a new key-exchange now, regardless of the rekey thresholds.
    pub async fn rekey(&self) -> Result<()> {
        if self.kex_state() != KexState::Done {
            return Err(Error::KexInProgress);
        }

        let mut read = self.read.lock().await;
        let mut write = self.write.lock().await;
        self.negotiate_kex(&mut read, &mut write, None).await
    }

    /// Send `SSH_MSG_DISCONNECT` and close the session. Always returns an
    /// error describing the disconnection, even if the write itself failed
    /// or timed out.
    pub async fn disconnect(&self, reason: DisconnectReason, description: impl Into<String>) -> Error {
        let description = description.into();
        tracing::debug!(%description, "sending disconnect with peer `{}`", self.peer_id);

        let packet = message::encode(&Disconnect {
            reason: reason.clone(),
            description: description.as_str().into(),
            language: "".into(),
        });

        if let Ok(packet) = packet {
            let grace = self.side.config().disconnect_timeout;
            let mut write = self.write.lock().await;
            let _ = self
                .send_framed(&mut write, &packet)
                .timeout(FtDuration::from(grace))
                .await;
        }

        self.close();

        let cause = DisconnectedError {
            by: DisconnectedBy::Us,
            reason,
            description,
        };
        self.notify_disconnected(&cause);

        Error::Disconnected(cause)
    }

    fn close(&self) {
        self.state.lock().expect("state lock poisoned").closed = true;
        self.listeners.close();
        self.kex_done.complete(Err(Arc::new(Error::Closing)));
        self.service_accept.respond(Err(Error::Closing));
    }
}

/// Bridges a [`crate::factory::KeyExchange`] to the already-framed (but
/// still pre-rekey) transport, so exchange implementations never need to
/// know about framing, rekeying, or even that they're running over a
/// [`Session`] at all.
struct SessionKexIo<'a, IO: Pipe> {
    read: &'a mut ReadSide<IO>,
    write: &'a mut WriteSide<IO>,
    prng: &'a dyn crate::factory::Prng,
}

#[async_trait::async_trait]
impl<'a, IO: Pipe> KexIo for SessionKexIo<'a, IO> {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        codec::encode(&mut self.write.tx, payload, self.prng, &mut self.write.io).await
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        codec::decode(&mut self.read.rx, &mut self.read.io).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn session_is_send_and_sync_over_a_send_pipe() {
        assert_send_sync::<Session<futures::io::Cursor<Vec<u8>>, crate::side::Client>>();
    }
}
