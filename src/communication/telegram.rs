use crate::communication::{error_handler, keyboards};
use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, Service};
use crate::database::Decision;
use crate::workflow::{CallbackAction, Keyboard, Reply, Workflow, WorkflowError};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ReplyMarkup;
use teloxide::utils::command::BotCommands;
use tracing::{error, warn};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    Start,
    Pending,
}

pub struct TelegramService {
    bot: Bot,
    workflow: Arc<Workflow>,
}

#[async_trait]
impl Service for TelegramService {
    type Context = Context;

    async fn new(context: Context) -> Self {
        Self {
            bot: Bot::from_env(),
            workflow: Arc::new(Workflow::new(&context.config, context.database.clone())),
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        let handler = dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_callback_query().endpoint(handle_callback));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.workflow])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
        Ok(())
    }
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    workflow: Arc<Workflow>,
) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    let outcome = match cmd {
        Command::Start => workflow.on_start(user_id).await,
        Command::Pending => workflow.on_pending(user_id).await,
    };
    deliver(&bot, &workflow, msg.chat.id, None, outcome).await
}

async fn handle_message(bot: Bot, msg: Message, workflow: Arc<Workflow>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    if let Some(contact) = msg.contact() {
        let outcome = workflow.on_contact(user_id, &contact.phone_number).await;
        return deliver(&bot, &workflow, msg.chat.id, None, outcome).await;
    }

    if let Some(text) = msg.text() {
        let outcome = workflow.on_text(user_id, text).await;
        return deliver(&bot, &workflow, msg.chat.id, None, outcome).await;
    }

    Ok(())
}

async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    workflow: Arc<Workflow>,
) -> ResponseResult<()> {
    let user_id = query.from.id.0 as i64;
    let action = query.data.as_deref().and_then(CallbackAction::parse);
    let chat_id = query.message.as_ref().map(|message| message.chat.id);

    let (Some(action), Some(chat_id)) = (action, chat_id) else {
        // Stale button or a chat we can no longer see: just stop the spinner.
        bot.answer_callback_query(query.id.clone()).await?;
        return Ok(());
    };

    let outcome = match action {
        CallbackAction::Status => workflow.on_status(user_id).await,
        CallbackAction::Loads => workflow.on_loads(user_id).await,
        CallbackAction::ChangePhone => workflow.on_change_phone(user_id).await,
        CallbackAction::AdminPending => workflow.on_pending(user_id).await,
        CallbackAction::Approve(request_id) => {
            workflow.on_decision(user_id, request_id, Decision::Approved).await
        }
        CallbackAction::Reject(request_id) => {
            workflow.on_decision(user_id, request_id, Decision::Rejected).await
        }
    };
    deliver(&bot, &workflow, chat_id, Some(&query), outcome).await
}

/// Render workflow replies onto the Telegram API. Admin fan-out and
/// requester notifications are best effort: a failed send is logged and the
/// remaining replies still go out.
async fn deliver(
    bot: &Bot,
    workflow: &Workflow,
    chat_id: ChatId,
    query: Option<&CallbackQuery>,
    outcome: Result<Vec<Reply>, WorkflowError>,
) -> ResponseResult<()> {
    let replies = match outcome {
        Ok(replies) => replies,
        Err(error) => {
            match &error {
                WorkflowError::Ledger(e) => error!(error = %e, "Workflow event failed"),
                other => warn!(error = %other, "Workflow event rejected"),
            }
            vec![error_handler::reply_for_error(&error)]
        }
    };

    let mut answered = false;
    for reply in replies {
        match reply {
            Reply::Message { text, keyboard } => {
                send(bot, chat_id, &text, &keyboard).await?;
            }
            Reply::Direct {
                user_id,
                text,
                keyboard,
            } => {
                if let Err(e) = send(bot, ChatId(user_id), &text, &keyboard).await {
                    warn!(user_id, error = %e, "Failed to notify user");
                }
            }
            Reply::AdminBroadcast { text, request_id } => {
                for &admin_id in workflow.admins() {
                    let request = bot.send_message(ChatId(admin_id), &text);
                    let request = match request_id {
                        Some(id) => request.reply_markup(ReplyMarkup::InlineKeyboard(
                            keyboards::admin_decision(id),
                        )),
                        None => request,
                    };
                    if let Err(e) = request.await {
                        warn!(admin_id, error = %e, "Failed to deliver admin notification");
                    }
                }
            }
            Reply::Ack { text } => {
                if let Some(query) = query {
                    if !answered {
                        answered = true;
                        let ack = bot.answer_callback_query(query.id.clone());
                        let ack = match text {
                            Some(text) => ack.text(text),
                            None => ack,
                        };
                        ack.await?;
                    }
                }
            }
            Reply::AckAlert { text } => {
                if let Some(query) = query {
                    if !answered {
                        answered = true;
                        bot.answer_callback_query(query.id.clone())
                            .text(text)
                            .show_alert(true)
                            .await?;
                    }
                }
            }
            Reply::EditDecision { note } => {
                if let Some(message) = query.and_then(|q| q.message.as_ref()) {
                    let text = format!("{}\n\n{}", message.text().unwrap_or_default(), note);
                    if let Err(e) = bot.edit_message_text(message.chat.id, message.id, text).await {
                        warn!(error = %e, "Failed to edit decision message");
                    }
                }
            }
        }
    }

    // A callback press must always be answered, or the client keeps spinning.
    if let Some(query) = query {
        if !answered {
            bot.answer_callback_query(query.id.clone()).await?;
        }
    }
    Ok(())
}

async fn send(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    keyboard: &Keyboard,
) -> ResponseResult<Message> {
    let request = bot.send_message(chat_id, text);
    let request = match markup(keyboard) {
        Some(markup) => request.reply_markup(markup),
        None => request,
    };
    request.await
}

fn markup(keyboard: &Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::UserMenu => Some(ReplyMarkup::InlineKeyboard(keyboards::user_menu())),
        Keyboard::PhoneRequest => Some(ReplyMarkup::Keyboard(keyboards::phone_request())),
        Keyboard::AdminDecision(id) => {
            Some(ReplyMarkup::InlineKeyboard(keyboards::admin_decision(*id)))
        }
        Keyboard::AdminPanel => Some(ReplyMarkup::InlineKeyboard(keyboards::admin_panel())),
    }
}
