//! # Menu State Machine
//!
//! Drives one client through the toolbox menus.
//!
//! ```text
//!            "3" + valid signature
//!   +------+ ----------------------> +-------+
//!   | Main |                         | Debug |
//!   +------+ <---------------------- +-------+
//!      |              "3"                |
//!      | "4"                             | unknown option
//!      v                                 v
//!    (quit)                          (violation)
//! ```
//!
//! Every command is read and answered in order; nothing is pipelined.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::line_reader::LineReader;
use crate::oracle::SigningOracle;
use crate::registry::{GlobalScope, LocalScope, Scope};
use crate::transport::{ResponseWriter, TransportStats};

pub const WELCOME: &[u8] = b"Welcome to the ECDSA crypto toolbox!";
pub const MAIN_MENU: &[u8] =
    b"\nMenu:\n1. Generate random number\n2. Sign data\n3. Debug menu\n4. Quit\n";
pub const DEBUG_MENU: &[u8] = b"\nDebug menu:\n1. Retrieve local\n2. Retrieve global\n3. Return\n";
pub const ALREADY_SIGNED: &[u8] =
    b"You've already had something signed. Calculating those signatures is expensive you know!\n";
pub const SIGN_PROMPT: &[u8] = b"Send message to sign\n";
pub const SIGNATURE_PREFIX: &[u8] = b"Your signature is: ";
pub const CHALLENGE_PREFIX: &[u8] = b"Sign the following to verify credentials: ";
pub const INCORRECT_SIGNATURE: &[u8] = b"Incorrect signature\n";
pub const VERIFICATION_SUCCESSFUL: &[u8] = b"Verification successful!\n";
pub const LOCAL_PROMPT: &[u8] = b"Enter local name\n";
pub const GLOBAL_PROMPT: &[u8] = b"Enter global name\n";
pub const BYE: &[u8] = b"Bye!\n";
pub const UNKNOWN_OPTION: &[u8] = b"Unknown option\n";

/// Which menu the client is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    /// Initial menu
    Main,
    /// Reached only after a verified challenge
    Debug,
}

impl fmt::Display for MenuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// Result of one menu step
enum Step {
    Continue,
    Quit,
}

/// One client's view of the toolbox
pub struct Session<R, W> {
    reader: LineReader<R>,
    writer: ResponseWriter<W>,
    oracle: SigningOracle,
    globals: Arc<GlobalScope>,
    state: MenuState,
    peer: String,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: LineReader<R>,
        writer: ResponseWriter<W>,
        oracle: SigningOracle,
        globals: Arc<GlobalScope>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            writer,
            oracle,
            globals,
            state: MenuState::Main,
            peer: peer.into(),
        }
    }

    /// Current menu
    pub fn state(&self) -> MenuState {
        self.state
    }

    /// Send the welcome line and run the menus until the client quits or
    /// the connection fails.
    pub async fn serve(&mut self) -> ProtocolResult<()> {
        self.writer.send(WELCOME).await?;
        self.run().await
    }

    /// Run the menus from the current state
    pub async fn run(&mut self) -> ProtocolResult<()> {
        loop {
            let step = match self.state {
                MenuState::Main => self.main_step().await?,
                MenuState::Debug => self.debug_step().await?,
            };
            if let Step::Quit = step {
                return Ok(());
            }
        }
    }

    async fn read_text(&mut self) -> ProtocolResult<String> {
        let line = self.reader.read_line().await?;
        Ok(String::from_utf8(line.to_vec())?)
    }

    async fn main_step(&mut self) -> ProtocolResult<Step> {
        self.writer.send(MAIN_MENU).await?;
        let option = self.read_text().await?;
        debug!("[{}] main menu option {:?}", self.peer, option);

        match option.as_str() {
            "1" => {
                let roll = self.oracle.roll_random_u32();
                self.writer.send(format!("{}\n", roll).as_bytes()).await?;
            }
            "2" => self.sign_data().await?,
            "3" => self.verify_credentials().await?,
            "4" => {
                self.writer.send(BYE).await?;
                self.writer.send_eof().await?;
                return Ok(Step::Quit);
            }
            _ => return Err(self.unknown_option(option.clone()).await),
        }

        Ok(Step::Continue)
    }

    async fn sign_data(&mut self) -> ProtocolResult<()> {
        if self.oracle.is_used() {
            return self.writer.send(ALREADY_SIGNED).await;
        }

        self.writer.send(SIGN_PROMPT).await?;
        let message = self.reader.read_line().await?;

        match self.oracle.sign_once(&message) {
            Ok(signature) => {
                info!("[{}] signed {} byte message", self.peer, message.len());
                let mut reply = SIGNATURE_PREFIX.to_vec();
                reply.extend_from_slice(hex::encode(signature.to_bytes()).as_bytes());
                reply.push(b'\n');
                self.writer.send(&reply).await
            }
            Err(ProtocolError::AlreadyUsed) => self.writer.send(ALREADY_SIGNED).await,
            Err(e) => Err(e),
        }
    }

    async fn verify_credentials(&mut self) -> ProtocolResult<()> {
        let challenge = self.oracle.challenge();
        let mut prompt = CHALLENGE_PREFIX.to_vec();
        prompt.extend_from_slice(hex::encode(challenge).as_bytes());
        prompt.push(b'\n');
        self.writer.send(&prompt).await?;

        let reply = self.reader.read_line().await?;
        match self.oracle.check_hex(&challenge, &reply) {
            Ok(()) => {
                info!("[{}] challenge verified, entering debug menu", self.peer);
                self.writer.send(VERIFICATION_SUCCESSFUL).await?;
                self.state = MenuState::Debug;
                Ok(())
            }
            Err(ProtocolError::VerificationFailure(reason)) => {
                debug!("[{}] challenge refused: {}", self.peer, reason);
                self.writer.send(INCORRECT_SIGNATURE).await
            }
            Err(e) => Err(e),
        }
    }

    async fn debug_step(&mut self) -> ProtocolResult<Step> {
        self.writer.send(DEBUG_MENU).await?;
        let option = self.read_text().await?;
        debug!("[{}] debug menu option {:?}", self.peer, option);

        match option.as_str() {
            "1" => {
                self.writer.send(LOCAL_PROMPT).await?;
                let name = self.reader.read_line().await?;
                let value = self.lookup_local(&option, &name)?;
                self.send_value(value).await?;
            }
            "2" => {
                self.writer.send(GLOBAL_PROMPT).await?;
                let name = self.read_text().await?;
                let value = self.globals.render(&name);
                self.send_value(value).await?;
            }
            "3" => self.state = MenuState::Main,
            _ => return Err(self.unknown_option(option.clone()).await),
        }

        Ok(Step::Continue)
    }

    fn lookup_local(&self, option: &str, name: &Bytes) -> ProtocolResult<String> {
        let key = String::from_utf8(name.to_vec())?;
        let stream = format!("<SocketStream peer={}>", self.peer);
        let locals = LocalScope {
            stream: &stream,
            reader: format!("<LineReader buffered={}>", self.reader.buffered()),
            result: option,
            name: &name[..],
        };
        Ok(locals.render(&key))
    }

    async fn send_value(&mut self, value: String) -> ProtocolResult<()> {
        let mut reply = value.into_bytes();
        reply.push(b'\n');
        self.writer.send(&reply).await
    }

    /// Answer an unrecognised option, end output, and build the error
    async fn unknown_option(&mut self, option: String) -> ProtocolError {
        warn!("[{}] unknown option {:?} at {} menu", self.peer, option, self.state);
        let state = self.state;
        if let Err(e) = self.writer.send(UNKNOWN_OPTION).await {
            return e;
        }
        if let Err(e) = self.writer.send_eof().await {
            return e;
        }
        ProtocolError::ProtocolViolation { state, option }
    }

    /// Signal end of output if that has not happened yet
    pub async fn finish(&mut self) {
        if let Err(e) = self.writer.send_eof().await {
            debug!("[{}] shutdown: {}", self.peer, e);
        }
    }

    /// Transport statistics so far
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            peer: self.peer.clone(),
            bytes_sent: self.writer.bytes_sent(),
            bytes_received: self.reader.bytes_received(),
        }
    }
}
