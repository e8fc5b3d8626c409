//! Ping/pong demo - three actors exchanging messages through their mailboxes
//!
//! Usage:
//!   pingpong --rounds 3
//!   pingpong --config config/mailman.toml --log-level debug
//!
//! Actor `a` requests a pong from `b` while `c` sends `a` unrelated chatter.
//! The chatter is held during each wait and reaches `a`'s dispatcher only
//! once the reply has been collected.

use anyhow::{Context, Result};
use clap::Parser;
use mailman::{
    handler_fn, ActorContext, FilterSpec, MailmanConfig, Message, PostOffice,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pingpong")]
#[command(about = "Mailbox request/reply demo")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ping/pong exchanges
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,

    /// Reply timeout per request in milliseconds
    #[arg(short, long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Delay before `b` answers a ping, in milliseconds
    #[arg(long, default_value_t = 100)]
    reply_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = MailmanConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(log_level, args.json_logs)?;

    info!("Starting pingpong demo");
    info!(
        route = %config.default_route,
        rounds = args.rounds,
        timeout_ms = args.timeout_ms,
        "Configuration loaded"
    );

    let post_office = PostOffice::new();
    let a = ActorContext::open(&post_office, config.actor("a"))?;
    let b = ActorContext::open(&post_office, config.actor("b"))?;
    let c = ActorContext::open(&post_office, config.actor("c"))?;

    let reply_delay = Duration::from_millis(args.reply_delay_ms);
    let messenger = b.messenger().clone();
    b.add_filter(
        FilterSpec::new()
            .id("answer-ping")
            .description("Reply pong to every ping")
            .subject("ping")
            .callback(handler_fn("pong", move |message: Message| {
                let messenger = messenger.clone();
                async move {
                    tokio::time::sleep(reply_delay).await;
                    messenger.reply_with(&message, |draft| draft.body("pong"))?;
                    Ok(())
                }
            })),
    )?;

    let chatter_seen = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&chatter_seen);
    a.add_filter(
        FilterSpec::new()
            .id("log-everything")
            .description("Fall-through logger for unsolicited mail")
            .callback(handler_fn("log", move |message: Message| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::Relaxed);
                    info!(
                        from = %message.sender,
                        subject = %message.subject,
                        "Actor a dispatched message"
                    );
                    Ok(())
                }
            })),
    )?;

    let a_dispatcher = a.spawn_dispatcher()?;
    let b_dispatcher = b.spawn_dispatcher()?;

    let timeout = Duration::from_millis(args.timeout_ms);
    let mut answered = 0;
    for round in 0..args.rounds {
        let chatter = c.messenger().clone();
        let chatter_delay = reply_delay / 2;
        let chatter_task = tokio::spawn(async move {
            tokio::time::sleep(chatter_delay).await;
            chatter.send("a", "other", round)
        });

        match a.messenger().request("b", "ping", round, timeout).await? {
            Some(reply) => {
                answered += 1;
                info!(
                    round,
                    threadid = %reply.threadid,
                    body = ?reply.body,
                    "Received pong"
                );
            }
            None => warn!(round, "No pong before timeout"),
        }

        chatter_task.await.context("Chatter task failed")??;
    }

    // Let a's dispatcher drain the restored chatter
    tokio::time::sleep(config.dispatcher.idle_wait() * 2).await;

    a_dispatcher.shutdown().await;
    b_dispatcher.shutdown().await;

    let stats = a.stats();
    info!(
        answered,
        rounds = args.rounds,
        chatter_dispatched = chatter_seen.load(Ordering::Relaxed),
        replies_matched = stats.replies_matched,
        messages_restored = stats.messages_restored,
        "Demo finished"
    );

    for context in [a, b, c] {
        let id = context.id().clone();
        let leftover = context.close();
        if !leftover.is_empty() {
            warn!(actor = %id, undelivered = leftover.len(), "Closed with pending mail");
        }
    }

    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}
