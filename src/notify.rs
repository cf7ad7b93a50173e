use std::fmt;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::mpsc;

use crate::model::UserId;
use crate::workflow::Reply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The user blocked the bot or the chat no longer exists.
    Unreachable(UserId),
    Transport(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Unreachable(user) => write!(f, "user {user} unreachable"),
            GatewayError::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Outbound side of the messaging gateway.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user: UserId, reply: &Reply) -> Result<(), GatewayError>;
}

/// Delivers into an in-process channel instead of a chat.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(UserId, Reply)>,
    unreachable: DashSet<UserId>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(UserId, Reply)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Self {
            tx,
            unreachable: DashSet::new(),
        };
        (notifier, rx)
    }

    /// Make every later send to `user` fail, as if they blocked the bot.
    pub fn block(&self, user: UserId) {
        self.unreachable.insert(user);
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, user: UserId, reply: &Reply) -> Result<(), GatewayError> {
        if self.unreachable.contains(&user) {
            return Err(GatewayError::Unreachable(user));
        }
        self.tx
            .send((user, reply.clone()))
            .map_err(|_| GatewayError::Transport("receiver dropped".into()))
    }
}
