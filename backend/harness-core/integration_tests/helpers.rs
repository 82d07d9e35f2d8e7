//! Test helpers for supervisor integration tests.
//!
//! This module provides:
//! - A scripted process double (slow shutdown, ignored signal, kill failure, failed wait,
//!   crash on start)
//! - An in-process RESP listener standing in for the server under test
//! - Scratch work directories with a configuration template

use harness_core::error::spawn::SpawnError;
use harness_core::readiness::ReadinessProbe;
use harness_core::supervisor::{
    LaunchCommand, LogSink, ManagedProcess, ProcessExit, ProcessLauncher, Supervisor,
    SupervisorSettings,
};

use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};

pub const TEMPLATE_NAME: &str = "kvstore.conf";
pub const TEMPLATE_TEXT: &str = "port 9221\ndb-path ./db\nlog-dir ./log\ndatabases 16\n";

// ============================================================================
// Scripted process double
// ============================================================================

/// What the double does when it receives the graceful signal.
#[derive(Debug, Clone, Copy)]
pub enum OnSignal {
    ExitAfter(Duration),
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub on_signal: OnSignal,
    pub crash_after: Option<Duration>,
    pub kill_fails: bool,
    pub wait_fails: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            on_signal: OnSignal::ExitAfter(Duration::ZERO),
            crash_after: None,
            kill_fails: false,
            wait_fails: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Events {
    pub launches: Vec<LaunchCommand>,
    pub signals: u32,
    pub kills: u32,
    pub drops: u32,
}

pub struct ScriptedProcess {
    script: Script,
    exit_at: Option<(Instant, ProcessExit)>,
    events: Arc<Mutex<Events>>,
}

impl ScriptedProcess {
    pub fn new(script: Script, events: Arc<Mutex<Events>>) -> Self {
        let exit_at = script
            .crash_after
            .map(|after| (Instant::now() + after, ProcessExit { code: Some(1) }));
        Self {
            script,
            exit_at,
            events,
        }
    }
}

impl ManagedProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn signal(&mut self) -> IoResult<()> {
        self.events.lock().expect("events lock").signals += 1;

        if let OnSignal::ExitAfter(after) = self.script.on_signal
            && self.exit_at.is_none()
        {
            self.exit_at = Some((Instant::now() + after, ProcessExit { code: Some(0) }));
        }
        Ok(())
    }

    async fn wait(&mut self) -> IoResult<ProcessExit> {
        if self.script.wait_fails {
            return Err(IoError::other("wait failed"));
        }

        match self.exit_at {
            Some((at, exit)) => {
                sleep_until(at).await;
                Ok(exit)
            }
            None => std::future::pending().await,
        }
    }

    async fn kill(&mut self) -> IoResult<()> {
        self.events.lock().expect("events lock").kills += 1;

        if self.script.kill_fails {
            return Err(IoError::new(ErrorKind::PermissionDenied, "kill refused"));
        }
        self.exit_at = Some((Instant::now(), ProcessExit { code: None }));
        Ok(())
    }
}

impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        if let Ok(mut events) = self.events.lock() {
            events.drops += 1;
        }
    }
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    script: Script,
    events: Arc<Mutex<Events>>,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            events: Arc::default(),
        }
    }

    pub fn signals(&self) -> u32 {
        self.events.lock().expect("events lock").signals
    }

    pub fn kills(&self) -> u32 {
        self.events.lock().expect("events lock").kills
    }

    pub fn drops(&self) -> u32 {
        self.events.lock().expect("events lock").drops
    }

    pub fn launches(&self) -> usize {
        self.events.lock().expect("events lock").launches.len()
    }

    pub fn last_args(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("events lock")
            .launches
            .last()
            .map(|c| {
                c.args
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    type Process = ScriptedProcess;

    fn launch(&self, command: &LaunchCommand) -> Result<ScriptedProcess, SpawnError> {
        self.events
            .lock()
            .expect("events lock")
            .launches
            .push(command.clone());
        Ok(ScriptedProcess::new(self.script, Arc::clone(&self.events)))
    }
}

// ============================================================================
// Fake RESP server
// ============================================================================

type Store = Arc<Mutex<HashMap<String, String>>>;

/// Minimal RESP listener: SET/GET/DEL/PING, `+OK` for anything else.
pub struct FakeRespServer {
    address: SocketAddr,
    commands: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeRespServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind fake server");
        let address = listener.local_addr().expect("local addr");
        let commands = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(accept_loop(listener, Store::default(), Arc::clone(&commands)));

        Self {
            address,
            commands,
            task,
        }
    }

    /// Start listening only after `delay`, like a server opening its storage first.
    pub async fn start_after(delay: Duration) -> Self {
        let address = closed_address().await;
        let commands = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&commands);

        let task = tokio::spawn(async move {
            sleep(delay).await;
            let listener = TcpListener::bind(address)
                .await
                .expect("rebind reserved port");
            accept_loop(listener, Store::default(), counter).await;
        });

        Self {
            address,
            commands,
            task,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

impl Drop for FakeRespServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, store: Store, commands: Arc<AtomicUsize>) {
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(handle_connection(
            stream,
            Arc::clone(&store),
            Arc::clone(&commands),
        ));
    }
}

async fn handle_connection(stream: TcpStream, store: Store, commands: Arc<AtomicUsize>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    while let Some(parts) = read_command(&mut reader).await {
        commands.fetch_add(1, Ordering::SeqCst);
        let reply = respond(&parts, &store);
        if write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

async fn read_command<R>(reader: &mut BufReader<R>) -> Option<Vec<String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;

        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        parts.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Some(parts)
}

fn respond(parts: &[String], store: &Store) -> String {
    let mut store = store.lock().expect("store lock");
    let command = parts.first().map(|c| c.to_ascii_uppercase());

    match (command.as_deref(), parts) {
        (Some("SET"), [_, key, value, ..]) => {
            store.insert(key.clone(), value.clone());
            "+OK\r\n".to_string()
        }
        (Some("GET"), [_, key, ..]) => match store.get(key) {
            Some(value) => format!("${}\r\n{value}\r\n", value.len()),
            None => "$-1\r\n".to_string(),
        },
        (Some("DEL"), [_, keys @ ..]) => {
            let removed = keys.iter().filter(|k| store.remove(*k).is_some()).count();
            format!(":{removed}\r\n")
        }
        (Some("PING"), _) => "+PONG\r\n".to_string(),
        _ => "+OK\r\n".to_string(),
    }
}

/// An address on loopback with nothing listening.
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind ephemeral port");
    let address = listener.local_addr().expect("local addr");
    drop(listener);
    address
}

// ============================================================================
// Work directories and supervisors
// ============================================================================

pub struct Workspace {
    pub dir: TempDir,
    pub template: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let template = dir.path().join(TEMPLATE_NAME);
        std::fs::write(&template, TEMPLATE_TEXT).expect("write template");
        Self { dir, template }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Probe settings fast enough for tests: 50ms ticks, 10 attempts.
pub fn fast_probe() -> ReadinessProbe {
    ReadinessProbe::new(Duration::from_millis(50), 10, Duration::from_millis(40))
}

pub fn scripted_supervisor(
    workspace: &Workspace,
    launcher: ScriptedLauncher,
    shutdown_timeout: Duration,
) -> Supervisor<ScriptedLauncher> {
    let settings = SupervisorSettings::new("kvstore-server", workspace.root())
        .with_probe(fast_probe())
        .with_shutdown_timeout(shutdown_timeout)
        .with_log_sink(LogSink::Null);

    Supervisor::new(launcher, settings)
}

/// Simulate the server creating its data directory.
pub fn create_data_directory(path: &Path) {
    std::fs::create_dir_all(path.join("db")).expect("create data directory");
    std::fs::write(path.join("db").join("CURRENT"), "MANIFEST-000001\n").expect("write data file");
}
