//! Definition of Telegram bot commands and handlers.

use chrono::Utc;
use log::{debug, info};
use teloxide::{
    dispatching::{
        dialogue::{self, InMemStorage},
        UpdateHandler,
    },
    prelude::*,
    types::{ParseMode, User},
    utils::command::BotCommands,
};

use crate::{
    context::AppContext,
    database::sqlite::SqliteDatabase,
    endpoints::{
        handle_amount, handle_balance, handle_confirmation, handle_history,
        handle_set_notification_day, handle_set_notification_time, handle_settings, handle_start,
        handle_status,
    },
    error::{BotError, InputError, LedgerError},
    formatter::{format_cancelled, format_insufficient_funds},
    keyboards::{
        cancel_keyboard, confirm_keyboard, main_keyboard, settings_keyboard, BALANCE_BUTTON,
        CANCEL_BUTTON, CONFIRM_BUTTON, HISTORY_BUTTON, MENU_BUTTON, PAY_BUTTON,
        REMINDER_DAY_BUTTON, REMINDER_TIME_BUTTON, SETTINGS_BUTTON, WITHDRAW_BUTTON,
    },
    ledger::PendingTransaction,
    types::{Actor, TransactionKind},
};

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Normal,
    ReceiveAmount {
        kind: TransactionKind,
        initiator: UserId,
    },
    ConfirmTransaction(PendingTransaction),
    ReceiveNotificationTime {
        initiator: UserId,
    },
    ReceiveNotificationDay {
        initiator: UserId,
    },
}

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(
    rename_rule = "lowercase",
    description = "This bot keeps the kitty of the group. Supported commands:"
)]
pub enum Command {
    #[command(description = "shows this message.")]
    Help,
    #[command(description = "registers the group and shows the menu.")]
    Start,
    #[command(description = "records a payment into the kitty.")]
    Pay,
    #[command(description = "records a withdrawal from the kitty (administrators only).")]
    Withdraw,
    #[command(description = "shows the current balance.")]
    Balance,
    #[command(description = "shows the latest transactions.")]
    History,
    #[command(description = "shows the reminder settings (administrators only).")]
    Settings,
    #[command(description = "sets the time of the monthly reminder, e.g. 10:00, or off.")]
    ReminderTime,
    #[command(description = "sets the day of the monthly reminder, 1 to 31, or off.")]
    ReminderDay,
    #[command(description = "shows the main menu.")]
    Menu,
    #[command(description = "cancels the current operation.")]
    Cancel,
    #[command(description = "shows the bot status.")]
    Status,
}

impl Command {
    /// The command behind a reply keyboard button.
    pub fn from_menu_button(text: &str) -> Option<Command> {
        match text.trim() {
            PAY_BUTTON => Some(Command::Pay),
            WITHDRAW_BUTTON => Some(Command::Withdraw),
            BALANCE_BUTTON => Some(Command::Balance),
            HISTORY_BUTTON => Some(Command::History),
            SETTINGS_BUTTON => Some(Command::Settings),
            REMINDER_TIME_BUTTON => Some(Command::ReminderTime),
            REMINDER_DAY_BUTTON => Some(Command::ReminderDay),
            MENU_BUTTON => Some(Command::Menu),
            CANCEL_BUTTON => Some(Command::Cancel),
            _ => None,
        }
    }
}

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type MyDialogue = Dialogue<State, InMemStorage<State>>;

// The dispatcher resolves dependencies by type, so the concrete database
// must be named here.
type ContextInUse = AppContext<SqliteDatabase>;

pub fn dialogue_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>().endpoint(command_endpoint);

    let button_handler =
        dptree::filter_map(|msg: Message| msg.text().and_then(Command::from_menu_button))
            .endpoint(command_endpoint);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(button_handler)
        .branch(case![State::ReceiveAmount { kind, initiator }].endpoint(receive_amount))
        .branch(case![State::ConfirmTransaction(pending)].endpoint(receive_confirmation))
        .branch(
            case![State::ReceiveNotificationTime { initiator }]
                .endpoint(receive_notification_time),
        )
        .branch(
            case![State::ReceiveNotificationDay { initiator }].endpoint(receive_notification_day),
        )
        .branch(dptree::endpoint(ignore_message));

    dialogue::enter::<Update, InMemStorage<State>, State, _>().branch(message_handler)
}

async fn command_endpoint(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: MyDialogue,
    context: ContextInUse,
) -> HandlerResult {
    let previous = dialogue.get().await?.unwrap_or_default();
    // Any command supersedes the pending operation.
    dialogue.exit().await?;

    let result = match cmd {
        Command::Help => handle_help(&bot, &msg).await,
        Command::Start => handle_start_command(&bot, &msg, &context).await,
        Command::Pay => {
            start_amount_dialogue(&bot, &msg, &dialogue, TransactionKind::Deposit).await
        }
        Command::Withdraw => {
            start_amount_dialogue(&bot, &msg, &dialogue, TransactionKind::Withdrawal).await
        }
        Command::Balance => handle_balance_command(&bot, &msg, &context).await,
        Command::History => handle_history_command(&bot, &msg, &context).await,
        Command::Settings => handle_settings_command(&bot, &msg, &context).await,
        Command::ReminderTime => start_reminder_time_dialogue(&bot, &msg, &dialogue).await,
        Command::ReminderDay => start_reminder_day_dialogue(&bot, &msg, &dialogue).await,
        Command::Menu => handle_menu(&bot, &msg).await,
        Command::Cancel => handle_cancel(&bot, &msg, previous).await,
        Command::Status => handle_status_command(&bot, &msg, &context).await,
    };

    report_error(&bot, &msg, result).await
}

/// Send the error (if any) to the chat and return it, so that the teloxide
/// default error handler logs it.
async fn report_error(bot: &Bot, msg: &Message, result: HandlerResult) -> HandlerResult {
    if let Err(e) = &result {
        bot.send_message(msg.chat.id, format!("{e}"))
            .await
            .map_err(|e| BotError::telegram("cannot send error message", e))?;
    }
    result
}

async fn ignore_message() -> HandlerResult {
    Ok(())
}

fn ensure_group(msg: &Message) -> Result<(), BotError> {
    if msg.chat.is_group() || msg.chat.is_supergroup() {
        Ok(())
    } else {
        Err(InputError::not_a_group().into())
    }
}

fn sender(msg: &Message) -> Result<&User, BotError> {
    msg.from().ok_or_else(|| {
        BotError::new(
            format!("message {:?} has no sender", msg.id),
            "cannot identify who sent the message".to_string(),
        )
    })
}

async fn ensure_admin(bot: &Bot, msg: &Message) -> Result<(), BotError> {
    let user = sender(msg)?;
    let member = bot
        .get_chat_member(msg.chat.id, user.id)
        .await
        .map_err(|e| BotError::telegram("cannot get chat member", e))?;

    if member.is_privileged() {
        Ok(())
    } else {
        Err(InputError::not_an_admin().into())
    }
}

fn actor_from(user: &User) -> Actor {
    Actor::new(user.id.0 as i64, &user.full_name())
}

/// The sender, if it is the member who started the current dialogue.
fn initiator_of(msg: &Message, initiator: UserId) -> Option<&User> {
    msg.from().filter(|user| user.id == initiator)
}

fn is_affirmative(text: &str) -> bool {
    let text = text.trim();
    text == CONFIRM_BUTTON || ["yes", "confirm", "ok"].contains(&text.to_lowercase().as_str())
}

async fn handle_help(bot: &Bot, msg: &Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await
        .map_err(|e| BotError::telegram("cannot send help", e))?;
    Ok(())
}

async fn handle_start_command(bot: &Bot, msg: &Message, context: &ContextInUse) -> HandlerResult {
    ensure_group(msg)?;
    let chat_id = msg.chat.id.0;
    info!("Starting in chat {chat_id}. Title: {:?}", msg.chat.title());

    let message = handle_start(chat_id, msg.chat.title(), msg.date, context)
        .await
        .map_err(|e| BotError::database("cannot register group", e))?;

    bot.send_message(msg.chat.id, message)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(main_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send welcome message", e))?;
    Ok(())
}

async fn start_amount_dialogue(
    bot: &Bot,
    msg: &Message,
    dialogue: &MyDialogue,
    kind: TransactionKind,
) -> HandlerResult {
    ensure_group(msg)?;
    if kind == TransactionKind::Withdrawal {
        ensure_admin(bot, msg).await?;
    }
    let user = sender(msg)?;

    dialogue
        .update(State::ReceiveAmount {
            kind,
            initiator: user.id,
        })
        .await?;

    let prompt = match kind {
        TransactionKind::Deposit => "💰 How much did you pay?",
        TransactionKind::Withdrawal => "💸 How much do you want to withdraw?",
    };
    let prompt = format!("{prompt} Send the amount, for example 100 or 100.50");
    bot.send_message(msg.chat.id, prompt)
        .reply_markup(cancel_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send amount prompt", e))?;
    Ok(())
}

async fn receive_amount(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    context: ContextInUse,
    (kind, initiator): (TransactionKind, UserId),
) -> HandlerResult {
    let user = match initiator_of(&msg, initiator) {
        Some(user) => user,
        None => return Ok(()),
    };
    let text = msg.text().unwrap_or_default();
    debug!("Received amount `{text}` in chat {}", msg.chat.id.0);

    let actor = actor_from(user);
    let result = match handle_amount(kind, text, msg.chat.id.0, actor, msg.date, &context).await {
        Ok((pending, message)) => {
            dialogue.update(State::ConfirmTransaction(pending)).await?;
            bot.send_message(msg.chat.id, message)
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(confirm_keyboard())
                .await
                .map_err(|e| BotError::telegram("cannot send confirmation request", e))?;
            Ok(())
        }
        Err(LedgerError::InsufficientFunds { available }) => {
            dialogue.exit().await?;
            send_insufficient_funds(&bot, &msg, available).await
        }
        // The state does not change, so the member can simply try again.
        Err(e) => Err(BotError::from(e).into()),
    };

    report_error(&bot, &msg, result).await
}

async fn receive_confirmation(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    context: ContextInUse,
    pending: PendingTransaction,
) -> HandlerResult {
    if msg.from().map(|user| user.id.0 as i64) != Some(pending.actor.id) {
        return Ok(());
    }
    let affirmative = msg.text().map(is_affirmative).unwrap_or(false);
    dialogue.exit().await?;

    // The message date decides whether the answer came in time; the ledger
    // records when the transaction was actually committed.
    let result = match handle_confirmation(pending, affirmative, msg.date, Utc::now(), &context)
        .await
    {
        Ok(message) => {
            bot.send_message(msg.chat.id, message)
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(main_keyboard())
                .await
                .map_err(|e| BotError::telegram("cannot send transaction outcome", e))?;
            Ok(())
        }
        Err(LedgerError::InsufficientFunds { available }) => {
            send_insufficient_funds(&bot, &msg, available).await
        }
        Err(e) => Err(BotError::from(e).into()),
    };

    report_error(&bot, &msg, result).await
}

async fn send_insufficient_funds(bot: &Bot, msg: &Message, available: i64) -> HandlerResult {
    bot.send_message(msg.chat.id, format_insufficient_funds(available))
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(main_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send insufficient funds message", e))?;
    Ok(())
}

async fn handle_balance_command(
    bot: &Bot,
    msg: &Message,
    context: &ContextInUse,
) -> HandlerResult {
    ensure_group(msg)?;

    let message = handle_balance(msg.chat.id.0, context)
        .await
        .map_err(|e| BotError::database("cannot get balance", e))?;

    bot.send_message(msg.chat.id, message)
        .parse_mode(ParseMode::MarkdownV2)
        .await
        .map_err(|e| BotError::telegram("cannot send balance", e))?;
    Ok(())
}

async fn handle_history_command(
    bot: &Bot,
    msg: &Message,
    context: &ContextInUse,
) -> HandlerResult {
    ensure_group(msg)?;

    let chunks = handle_history(msg.chat.id.0, context)
        .await
        .map_err(|e| BotError::database("cannot get history", e))?;

    for chunk in chunks {
        bot.send_message(msg.chat.id, chunk)
            .parse_mode(ParseMode::MarkdownV2)
            .await
            .map_err(|e| BotError::telegram("cannot send history", e))?;
    }
    Ok(())
}

async fn handle_settings_command(
    bot: &Bot,
    msg: &Message,
    context: &ContextInUse,
) -> HandlerResult {
    ensure_group(msg)?;
    ensure_admin(bot, msg).await?;

    let message = handle_settings(msg.chat.id.0, context)
        .await
        .map_err(|e| BotError::database("cannot get notification settings", e))?;

    bot.send_message(msg.chat.id, message)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(settings_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send settings", e))?;
    Ok(())
}

async fn start_reminder_time_dialogue(
    bot: &Bot,
    msg: &Message,
    dialogue: &MyDialogue,
) -> HandlerResult {
    ensure_group(msg)?;
    ensure_admin(bot, msg).await?;
    let user = sender(msg)?;

    dialogue
        .update(State::ReceiveNotificationTime { initiator: user.id })
        .await?;

    bot.send_message(
        msg.chat.id,
        "⏰ Send the reminder time as HH:MM, for example 10:00, or off to disable it",
    )
    .reply_markup(cancel_keyboard())
    .await
    .map_err(|e| BotError::telegram("cannot send reminder time prompt", e))?;
    Ok(())
}

async fn start_reminder_day_dialogue(
    bot: &Bot,
    msg: &Message,
    dialogue: &MyDialogue,
) -> HandlerResult {
    ensure_group(msg)?;
    ensure_admin(bot, msg).await?;
    let user = sender(msg)?;

    dialogue
        .update(State::ReceiveNotificationDay { initiator: user.id })
        .await?;

    bot.send_message(
        msg.chat.id,
        "📅 Send the day of the month for the reminder, from 1 to 31, or off to disable it",
    )
    .reply_markup(cancel_keyboard())
    .await
    .map_err(|e| BotError::telegram("cannot send reminder day prompt", e))?;
    Ok(())
}

async fn receive_notification_time(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    context: ContextInUse,
    initiator: UserId,
) -> HandlerResult {
    if initiator_of(&msg, initiator).is_none() {
        return Ok(());
    }
    let text = msg.text().unwrap_or_default();

    let result = match handle_set_notification_time(msg.chat.id.0, text, &context).await {
        Ok(message) => {
            dialogue.exit().await?;
            send_settings_updated(&bot, &msg, message).await
        }
        Err(e) => Err(BotError::from(e).into()),
    };

    report_error(&bot, &msg, result).await
}

async fn receive_notification_day(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    context: ContextInUse,
    initiator: UserId,
) -> HandlerResult {
    if initiator_of(&msg, initiator).is_none() {
        return Ok(());
    }
    let text = msg.text().unwrap_or_default();

    let result = match handle_set_notification_day(msg.chat.id.0, text, &context).await {
        Ok(message) => {
            dialogue.exit().await?;
            send_settings_updated(&bot, &msg, message).await
        }
        Err(e) => Err(BotError::from(e).into()),
    };

    report_error(&bot, &msg, result).await
}

async fn send_settings_updated(bot: &Bot, msg: &Message, message: String) -> HandlerResult {
    bot.send_message(msg.chat.id, message)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(settings_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send updated settings", e))?;
    Ok(())
}

async fn handle_menu(bot: &Bot, msg: &Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "Main menu")
        .reply_markup(main_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send menu", e))?;
    Ok(())
}

async fn handle_cancel(bot: &Bot, msg: &Message, previous: State) -> HandlerResult {
    let message = match previous {
        State::Normal => "There is nothing to cancel\\.".to_string(),
        _ => format_cancelled(),
    };

    bot.send_message(msg.chat.id, message)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(main_keyboard())
        .await
        .map_err(|e| BotError::telegram("cannot send cancel message", e))?;
    Ok(())
}

async fn handle_status_command(
    bot: &Bot,
    msg: &Message,
    context: &ContextInUse,
) -> HandlerResult {
    ensure_group(msg)?;

    let me = bot
        .get_me()
        .await
        .map_err(|e| BotError::telegram("cannot get bot user", e))?;
    let bot_is_admin = bot
        .get_chat_member(msg.chat.id, me.id)
        .await
        .map_err(|e| BotError::telegram("cannot get bot chat member", e))?
        .is_privileged();

    let message = handle_status(msg.chat.id.0, bot_is_admin, context)
        .await
        .map_err(|e| BotError::database("cannot get status", e))?;

    bot.send_message(msg.chat.id, message)
        .parse_mode(ParseMode::MarkdownV2)
        .await
        .map_err(|e| BotError::telegram("cannot send status", e))?;
    Ok(())
}
