use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::model::UserId;
use crate::notify::{GatewayError, Notifier};
use crate::workflow::{Action, Inbound, Reply, Workflow};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "open the main menu")]
    Start,
}

fn keyboard(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    if reply.keyboard.is_empty() {
        return None;
    }
    let rows = reply.keyboard.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.encode()))
            .collect::<Vec<_>>()
    });
    Some(InlineKeyboardMarkup::new(rows))
}

async fn deliver(bot: &Bot, chat: ChatId, reply: &Reply) -> Result<(), RequestError> {
    let request = bot.send_message(chat, reply.text.clone());
    match keyboard(reply) {
        Some(markup) => request.reply_markup(markup).await?,
        None => request.await?,
    };
    Ok(())
}

fn gateway_error(user: UserId, e: RequestError) -> GatewayError {
    match e {
        RequestError::Api(ApiError::BotBlocked | ApiError::ChatNotFound | ApiError::UserDeactivated) => {
            GatewayError::Unreachable(user)
        }
        other => GatewayError::Transport(other.to_string()),
    }
}

/// Sends through the Bot API. Private chats share the user's id.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, user: UserId, reply: &Reply) -> Result<(), GatewayError> {
        deliver(&self.bot, ChatId(user), reply)
            .await
            .map_err(|e| gateway_error(user, e))
    }
}

/// Sessions and bookings belong to the sender, not the chat: in a group the
/// two differ. Updates without a sender (channel posts) are ignored.
fn session_user(sender: Option<teloxide::types::UserId>) -> Option<UserId> {
    sender.map(|id| ChatId::from(id).0)
}

async fn respond(
    bot: &Bot,
    workflow: &Workflow,
    user: UserId,
    chat: ChatId,
    inbound: Inbound,
    clock: Clock,
) -> HandlerResult {
    for reply in workflow.handle(user, inbound, clock.now()).await {
        deliver(bot, chat, &reply).await?;
    }
    Ok(())
}

async fn command_handler(
    bot: Bot,
    msg: Message,
    _cmd: Command,
    workflow: Arc<Workflow>,
    clock: Clock,
) -> HandlerResult {
    let Some(user) = session_user(msg.from.as_ref().map(|u| u.id)) else {
        return Ok(());
    };
    respond(&bot, &workflow, user, msg.chat.id, Inbound::Start, clock).await
}

async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    workflow: Arc<Workflow>,
    clock: Clock,
) -> HandlerResult {
    // A stale query cannot be answered any more; the tap itself still counts.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("could not answer callback query: {e}");
    }
    let sender = ChatId::from(q.from.id);
    let chat = q.message.as_ref().map_or(sender, |m| m.chat().id);
    let Some(action) = q.data.as_deref().and_then(Action::decode) else {
        warn!(user = sender.0, data = ?q.data, "unknown callback data");
        return Ok(());
    };
    respond(&bot, &workflow, sender.0, chat, Inbound::Action(action), clock).await
}

async fn message_handler(
    bot: Bot,
    msg: Message,
    workflow: Arc<Workflow>,
    clock: Clock,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = session_user(msg.from.as_ref().map(|u| u.id)) else {
        return Ok(());
    };
    let inbound = Inbound::Text(text.to_string());
    respond(&bot, &workflow, user, msg.chat.id, inbound, clock).await
}

/// Poll for updates until ctrl-c.
pub async fn run(bot: Bot, workflow: Arc<Workflow>, clock: Clock) {
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("could not register bot commands: {e}");
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_callback_query().endpoint(callback_handler))
        .branch(Update::filter_message().endpoint(message_handler));

    info!("telegram dispatcher started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![workflow, clock])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::workflow::{Button, SessionState};
    use teloxide::types::{InlineKeyboardButtonKind, User};

    #[test]
    fn keyboard_carries_encoded_actions() {
        let reply = Reply::text("Please choose:")
            .row(vec![
                Button::new("Book", Action::Book),
                Button::new("Cancel", Action::Cancel),
            ])
            .row(vec![Button::new("#3", Action::Drop(3))]);

        let markup = keyboard(&reply).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "Book");
        assert_eq!(
            markup.inline_keyboard[1][0].kind,
            InlineKeyboardButtonKind::CallbackData("drop:3".into())
        );
    }

    #[test]
    fn plain_text_has_no_keyboard() {
        assert!(keyboard(&Reply::text("hi")).is_none());
    }

    #[test]
    fn blocked_chat_is_unreachable() {
        assert_eq!(
            gateway_error(5, RequestError::Api(ApiError::BotBlocked)),
            GatewayError::Unreachable(5)
        );
        assert!(matches!(
            gateway_error(5, RequestError::Api(ApiError::MessageTextIsEmpty)),
            GatewayError::Transport(_)
        ));
    }

    #[test]
    fn sessions_follow_the_sender() {
        let sender = Some(teloxide::types::UserId(4242));
        assert_eq!(session_user(sender), Some(4242));
        assert_eq!(session_user(None), None);
    }

    /// A bot whose API calls all fail: nothing listens on port 1.
    fn offline_bot() -> Bot {
        let client = teloxide::net::default_reqwest_settings()
            .no_proxy()
            .build()
            .unwrap();
        Bot::with_client("123:abc", client).set_api_url("http://127.0.0.1:1".parse().unwrap())
    }

    #[tokio::test]
    async fn tap_counts_when_the_answer_fails() {
        let path = std::env::temp_dir().join("slotbook_test_telegram_tap.wal");
        let _ = std::fs::remove_file(&path);
        let workflow = Arc::new(Workflow::new(Arc::new(Store::open(path).unwrap())));
        let clock = Clock::new(chrono_tz::UTC);
        let date = clock.today();

        let q = CallbackQuery {
            id: "1".into(),
            from: User {
                id: teloxide::types::UserId(77),
                is_bot: false,
                first_name: "A".into(),
                last_name: None,
                username: None,
                language_code: None,
                is_premium: false,
                added_to_attachment_menu: false,
            },
            message: None,
            inline_message_id: None,
            chat_instance: "ci".into(),
            data: Some(Action::Date(date).encode()),
            game_short_name: None,
        };

        // The reply cannot be delivered either; only the session matters here.
        let _ = callback_handler(offline_bot(), q, workflow.clone(), clock).await;
        assert_eq!(workflow.sessions().get(77), SessionState::DateSelected { date });
    }
}
