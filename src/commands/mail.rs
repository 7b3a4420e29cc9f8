use std::io::IsTerminal;

use clap::Subcommand;

use crate::address::Address;
use crate::identity::resolve_sender;
use crate::mail::{BestEffort, MailItem, MailRouter, Mailbox, Message, MessageType, Priority};

use super::TownContext;

#[derive(Debug, Subcommand)]
pub enum MailCommand {
    /// Send a message
    Send {
        /// Recipient address
        to: String,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long, default_value = "")]
        message: String,
        #[arg(long, value_enum, default_value_t = Priority::Normal)]
        priority: Priority,
        #[arg(long = "type", value_enum, default_value_t = MessageType::Notification)]
        msg_type: MessageType,
        /// Thread this message belongs to
        #[arg(long)]
        thread: Option<String>,
        /// Message id this replies to
        #[arg(long)]
        reply_to: Option<String>,
        /// Pin the message in the recipient's inbox
        #[arg(long)]
        pin: bool,
        #[arg(long)]
        from: Option<String>,
    },
    /// List messages for an address (default: yourself)
    Inbox {
        address: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one message
    Read {
        id: String,
        /// Mailbox to read from (default: yourself)
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

impl MailCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        let ctx = TownContext::discover()?;
        let store = ctx.store();
        match self {
            Self::Send {
                to,
                subject,
                message,
                priority,
                msg_type,
                thread,
                reply_to,
                pin,
                from,
            } => {
                let mut msg = Message::new(
                    resolve_sender(from.as_deref())?,
                    Address::parse(to)?,
                    subject.clone(),
                    message.clone(),
                )
                .priority(*priority)
                .msg_type(*msg_type)
                .pinned(*pin);
                if let Some(t) = thread {
                    msg = msg.thread(t.clone());
                }
                if let Some(r) = reply_to {
                    msg = msg.reply_to(r.clone());
                }

                let router = MailRouter::new(&store, &ctx.tmux, &ctx.clock);
                let report = router.send_detailed(&msg)?;
                println!("✓ Sent {} to {}", report.id, msg.to);
                if msg.pinned && !report.pin.is_done() {
                    eprintln!("  pin {}", report.pin);
                }
                if let BestEffort::Done = report.notify {
                    println!("  notified {}", msg.to.session_id());
                }
            }
            Self::Inbox { address, json } => {
                let mailbox = Mailbox::new(&store, owner(address.as_deref())?);
                let items = mailbox.list()?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&items)?);
                } else {
                    print_inbox(mailbox.address(), &items);
                }
            }
            Self::Read { id, address, json } => {
                let mailbox = Mailbox::new(&store, owner(address.as_deref())?);
                let item = mailbox.read(id)?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&item)?);
                } else {
                    print_item(&item);
                }
            }
        }
        Ok(())
    }
}

fn owner(address: Option<&str>) -> anyhow::Result<Address> {
    Ok(match address {
        Some(raw) => Address::parse(raw)?,
        None => resolve_sender(None)?,
    })
}

fn print_inbox(address: &Address, items: &[MailItem]) {
    if items.is_empty() {
        println!("No mail for {address}.");
        return;
    }
    println!("Mail for {address} ({}):", items.len());
    for item in items {
        let pin = if item.pinned { "📌" } else { "  " };
        println!(
            "{pin} {}  [{}] {}  (from {})",
            item.id,
            item.priority.as_str(),
            item.subject,
            item.from
        );
    }
}

fn print_item(item: &MailItem) {
    println!("From:     {}", item.from);
    println!("To:       {}", item.to);
    println!("Subject:  {}", item.subject);
    println!("Priority: {}", item.priority.as_str());
    if item.msg_type != MessageType::Notification {
        println!("Type:     {}", item.msg_type.as_str());
    }
    if let Some(ref thread) = item.thread_id {
        println!("Thread:   {thread}");
    }
    if let Some(ref reply_to) = item.reply_to {
        println!("Reply-To: {reply_to}");
    }
    println!();
    if std::io::stdout().is_terminal() {
        termimad::print_text(&item.body);
    } else {
        println!("{}", item.body);
    }
}
