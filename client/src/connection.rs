//! Client side of the relay link: one TCP stream carrying one line per frame.
//!
//! [`ConnectionManager`] owns the socket. Outbound lines go through an
//! unbounded channel to a writer task so sending never blocks the caller;
//! inbound lines are read by a reader task and handed, in arrival order, to
//! every subscribed [`FrameListener`].

use log::{debug, error, info, warn};
use shared::{is_valid_identity, Frame};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("`{0}` cannot be used as an identity")]
    InvalidIdentity(String),
    #[error("listener is already subscribed")]
    DuplicateSubscriber,
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Receives every inbound line, without its terminator.
pub trait FrameListener: Send + Sync {
    fn on_line(&self, line: &str);
}

/// Anything that can put a line on the wire.
pub trait FrameSink: Send + Sync {
    /// Queues `line` for sending. Returns false if it was dropped.
    fn send_line(&self, line: &str) -> bool;

    fn send_frame(&self, frame: &Frame) -> bool {
        self.send_line(&frame.to_string())
    }
}

#[derive(Default)]
struct Listeners {
    inner: RwLock<Vec<Arc<dyn FrameListener>>>,
}

impl Listeners {
    /// Delivers `line` to a snapshot of the listeners so callbacks may
    /// subscribe or unsubscribe without deadlocking.
    fn notify(&self, line: &str) {
        let snapshot = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in snapshot {
            listener.on_line(line);
        }
    }
}

fn same_listener(a: &Arc<dyn FrameListener>, b: &Arc<dyn FrameListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

struct Link {
    identity: String,
    outbound: mpsc::UnboundedSender<String>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct ConnectionManager {
    server_addr: String,
    link: Mutex<Option<Link>>,
    /// Serializes connect, reopen and disconnect.
    lifecycle: tokio::sync::Mutex<()>,
    listeners: Arc<Listeners>,
}

impl ConnectionManager {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            link: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            listeners: Arc::new(Listeners::default()),
        }
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connects as `identity`. Connecting again with the identity of a live
    /// link does nothing; a different identity replaces the current link.
    pub async fn connect(&self, identity: &str) -> Result<(), ConnectionError> {
        let _guard = self.lifecycle.lock().await;

        if let Some(current) = self.identity() {
            if current == identity {
                debug!("Already connected as {}", identity);
                return Ok(());
            }
            info!("Switching identity from {} to {}", current, identity);
        }

        self.teardown().await;
        self.open(identity).await
    }

    /// Drops the current link, if any, and dials again.
    pub async fn reopen(&self, identity: &str) -> Result<(), ConnectionError> {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
        self.open(identity).await
    }

    /// Says goodbye to the relay and closes the socket. Safe to call when
    /// already disconnected.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
    }

    pub fn is_connected(&self) -> bool {
        self.link()
            .as_ref()
            .map_or(false, |link| link.alive.load(Ordering::SeqCst))
    }

    /// Identity of the live link.
    pub fn identity(&self) -> Option<String> {
        self.link()
            .as_ref()
            .filter(|link| link.alive.load(Ordering::SeqCst))
            .map(|link| link.identity.clone())
    }

    /// Queues one line for the relay. Lines containing a line break and lines
    /// sent while disconnected are dropped with a warning.
    pub fn send(&self, line: &str) -> bool {
        if line.contains('\n') || line.contains('\r') {
            warn!("Refusing to send a line containing a line break");
            return false;
        }

        let link = self.link();
        match link.as_ref() {
            Some(link) if link.alive.load(Ordering::SeqCst) => {
                if link.outbound.send(line.to_string()).is_ok() {
                    true
                } else {
                    warn!("Writer has stopped. Message not sent: {}", line);
                    false
                }
            }
            _ => {
                warn!("Not connected. Message not sent: {}", line);
                false
            }
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn FrameListener>) -> Result<(), ConnectionError> {
        let mut listeners = self
            .listeners
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if listeners.iter().any(|known| same_listener(known, &listener)) {
            warn!("Listener already subscribed");
            return Err(ConnectionError::DuplicateSubscriber);
        }

        listeners.push(listener);
        debug!("Listener subscribed. Total listeners: {}", listeners.len());
        Ok(())
    }

    /// Returns false if `listener` was not subscribed.
    pub fn unsubscribe(&self, listener: &Arc<dyn FrameListener>) -> bool {
        let mut listeners = self
            .listeners
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let before = listeners.len();
        listeners.retain(|known| !same_listener(known, listener));
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn open(&self, identity: &str) -> Result<(), ConnectionError> {
        if !is_valid_identity(identity) {
            return Err(ConnectionError::InvalidIdentity(identity.to_string()));
        }

        info!("Connecting to {} as {}", self.server_addr, identity);
        let stream = TcpStream::connect(self.server_addr.as_str()).await.map_err(|e| {
            error!("Failed to connect to {}: {}", self.server_addr, e);
            e
        })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let mut writer = BufWriter::new(write_half);
        write_line(&mut writer, identity).await?;

        let alive = Arc::new(AtomicBool::new(true));
        let (outbound, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(writer, rx, alive.clone()));
        let reader = tokio::spawn(read_loop(read_half, self.listeners.clone(), alive.clone()));

        *self.link() = Some(Link {
            identity: identity.to_string(),
            outbound,
            alive,
            reader,
            writer,
        });

        info!("Connected to {} as {}", self.server_addr, identity);
        Ok(())
    }

    async fn teardown(&self) {
        let Some(link) = self.link().take() else {
            return;
        };
        let Link {
            identity,
            outbound,
            alive,
            reader,
            writer,
        } = link;

        info!("Disconnecting {}", identity);
        if alive.swap(false, Ordering::SeqCst) {
            let _ = outbound.send(Frame::Disconnect { identity }.to_string());
        }

        // Closing the channel lets the writer drain and shut the socket down.
        drop(outbound);
        if let Err(e) = writer.await {
            debug!("Writer task ended abnormally: {}", e);
        }

        reader.abort();
        let _ = reader.await;
    }
}

impl FrameSink for ConnectionManager {
    fn send_line(&self, line: &str) -> bool {
        self.send(line)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let link = self
            .link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = link {
            link.reader.abort();
        }
    }
}

async fn write_line(writer: &mut BufWriter<OwnedWriteHalf>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn write_loop(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut rx: mpsc::UnboundedReceiver<String>,
    alive: Arc<AtomicBool>,
) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = write_line(&mut writer, &line).await {
            error!("Failed to write to server: {}", e);
            alive.store(false, Ordering::SeqCst);
            break;
        }
        debug!("Sent: {}", line);
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Error closing connection: {}", e);
    }
}

/// Reads one line into `buf` without its `\n` or `\r\n` terminator.
/// Returns `false` at end of stream.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

async fn read_loop(read_half: OwnedReadHalf, listeners: Arc<Listeners>, alive: Arc<AtomicBool>) {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    loop {
        match read_line(&mut reader, &mut buf).await {
            Ok(true) => match std::str::from_utf8(&buf) {
                Ok(line) => {
                    debug!("Received: {}", line);
                    listeners.notify(line);
                }
                Err(e) => warn!("Dropping line that is not valid UTF-8: {}", e),
            },
            Ok(false) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                error!("Error reading from server: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    struct Recorder {
        tx: mpsc::UnboundedSender<String>,
    }

    impl FrameListener for Recorder {
        fn on_line(&self, line: &str) {
            let _ = self.tx.send(line.to_string());
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { tx }), rx)
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    async fn accept_lines(
        listener: &TcpListener,
    ) -> (
        tokio::io::Lines<BufReader<OwnedReadHalf>>,
        OwnedWriteHalf,
    ) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, write_half) = stream.into_split();
        (BufReader::new(read_half).lines(), write_half)
    }

    #[tokio::test]
    async fn test_handshake_sends_identity_first() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);

        assert_ok!(manager.connect("alice").await);
        let (mut lines, _write) = accept_lines(&listener).await;

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "alice");
        assert!(manager.is_connected());
        assert_eq!(manager.identity().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_send_preserves_order() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        assert_ok!(manager.connect("alice").await);
        let (mut lines, _write) = accept_lines(&listener).await;

        assert!(manager.send("first"));
        assert!(manager.send("MOVE:7:0:0:1"));

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "alice");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "first");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "MOVE:7:0:0:1");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        let (recorder, mut rx) = recorder();
        assert_ok!(manager.subscribe(recorder));
        assert_ok!(manager.connect("alice").await);
        let (_lines, mut write) = accept_lines(&listener).await;

        write.write_all(b"\xff\xfe bad\nhello after\n").await.unwrap();

        let line = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(line.as_deref(), Some("hello after"));
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let manager = ConnectionManager::new("127.0.0.1:1");
        assert!(!manager.send("hello"));
        assert!(!manager.is_connected());
        assert_eq!(manager.identity(), None);
    }

    #[tokio::test]
    async fn test_send_rejects_line_breaks() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        assert_ok!(manager.connect("alice").await);
        let _peer = accept_lines(&listener).await;

        assert!(!manager.send("two\nlines"));
        assert!(manager.send("one line"));
    }

    #[tokio::test]
    async fn test_listeners_receive_lines_in_order() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        let (recorder, mut rx) = recorder();
        manager.subscribe(recorder).unwrap();

        assert_ok!(manager.connect("alice").await);
        let (_lines, mut write) = accept_lines(&listener).await;
        write.write_all(b"hello\r\nNEW_TICTACTOE:1:bob\n").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "hello");
        assert_eq!(rx.recv().await.unwrap(), "NEW_TICTACTOE:1:bob");
    }

    #[tokio::test]
    async fn test_duplicate_subscriber_is_rejected() {
        let manager = ConnectionManager::new("127.0.0.1:1");
        let (recorder, _rx) = recorder();
        let listener: Arc<dyn FrameListener> = recorder;

        manager.subscribe(listener.clone()).unwrap();
        assert!(matches!(
            manager.subscribe(listener.clone()),
            Err(ConnectionError::DuplicateSubscriber)
        ));
        assert_eq!(manager.listener_count(), 1);

        assert!(manager.unsubscribe(&listener));
        assert!(!manager.unsubscribe(&listener));
        assert_eq!(manager.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_says_goodbye_and_is_idempotent() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        assert_ok!(manager.connect("alice").await);
        let (mut lines, _write) = accept_lines(&listener).await;

        manager.disconnect().await;
        manager.disconnect().await;

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "alice");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "DISCONNECT:alice"
        );
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(!manager.is_connected());
        assert!(!manager.send("late"));
    }

    #[tokio::test]
    async fn test_connect_same_identity_is_noop() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        assert_ok!(manager.connect("alice").await);
        let _first = accept_lines(&listener).await;

        assert_ok!(manager.connect("alice").await);
        let second = timeout(Duration::from_millis(100), listener.accept()).await;
        assert_err!(second, "no second connection expected");
    }

    #[tokio::test]
    async fn test_connect_other_identity_replaces_link() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        assert_ok!(manager.connect("alice").await);
        let (mut first, _w1) = accept_lines(&listener).await;

        assert_ok!(manager.connect("bob").await);
        let (mut second, _w2) = accept_lines(&listener).await;

        assert_eq!(first.next_line().await.unwrap().unwrap(), "alice");
        assert_eq!(
            first.next_line().await.unwrap().unwrap(),
            "DISCONNECT:alice"
        );
        assert_eq!(second.next_line().await.unwrap().unwrap(), "bob");
        assert_eq!(manager.identity().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_server_close_marks_disconnected() {
        let (listener, addr) = listener().await;
        let manager = ConnectionManager::new(addr);
        assert_ok!(manager.connect("alice").await);

        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);

        let closed = timeout(Duration::from_secs(2), async {
            while manager.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert_ok!(closed);
        assert!(!manager.send("anyone there?"));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let (listener, addr) = listener().await;
        drop(listener);

        let manager = ConnectionManager::new(addr);
        let result = manager.connect("alice").await;

        assert!(matches!(result, Err(ConnectionError::Transport(_))));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_identity_is_rejected() {
        let manager = ConnectionManager::new("127.0.0.1:1");
        let result = manager.connect("bad:name").await;
        assert!(matches!(result, Err(ConnectionError::InvalidIdentity(_))));
    }
}
