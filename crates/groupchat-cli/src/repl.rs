use std::io::{self, BufRead, Write};

use groupchat::engine::{ConversationEngine, DEFAULT_PRUNE_DAYS};
use groupchat::{ChatError, RespondOptions};

/// Reply shown in the chat when a turn fails. The error itself goes to the log.
pub const APOLOGY: &str = "Sorry, something went wrong on my side. Please try again in a moment.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Reset,
    ResetAll,
    Memories,
    Forget(String),
    Search(String),
    Stats,
    Prune(u32),
}

impl SlashCommand {
    /// `None` for ordinary chat input; `Err` for a malformed command.
    pub fn parse(input: &str) -> Option<Result<Self, String>> {
        let rest = input.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "help" | "?" => Ok(SlashCommand::Help),
            "quit" | "exit" => Ok(SlashCommand::Quit),
            "reset" => Ok(SlashCommand::Reset),
            "reset-all" => Ok(SlashCommand::ResetAll),
            "memories" => Ok(SlashCommand::Memories),
            "stats" => Ok(SlashCommand::Stats),
            "forget" if !arg.is_empty() => Ok(SlashCommand::Forget(arg.to_string())),
            "forget" => Err("usage: /forget <memory text>".to_string()),
            "search" if !arg.is_empty() => Ok(SlashCommand::Search(arg.to_string())),
            "search" => Err("usage: /search <keyword>".to_string()),
            "prune" if arg.is_empty() => Ok(SlashCommand::Prune(DEFAULT_PRUNE_DAYS)),
            "prune" => arg
                .parse()
                .map(SlashCommand::Prune)
                .map_err(|_| format!("not a number of days: {}", arg)),
            other => Err(format!("unknown command /{}, try /help", other)),
        };
        Some(command)
    }
}

enum Flow {
    Continue,
    Quit,
}

/// One room's chat loop over stdin and stdout.
pub struct ChatSession {
    engine: ConversationEngine,
    room: String,
    options: RespondOptions,
}

impl ChatSession {
    pub fn new(engine: ConversationEngine, room: impl Into<String>, options: RespondOptions) -> Self {
        Self {
            engine,
            room: room.into(),
            options,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        println!("Room: {}  (type /help for commands, /quit to exit)", self.room);
        println!();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("> ");
            stdout.flush().ok();

            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match SlashCommand::parse(input) {
                Some(Ok(command)) => {
                    if let Flow::Quit = self.handle_command(command).await {
                        break;
                    }
                }
                Some(Err(message)) => eprintln!("{}", message),
                None => self.handle_chat(input).await,
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    async fn handle_chat(&self, input: &str) {
        match self.engine.respond(input, &self.room, &self.options).await {
            Ok(Some(reply)) => println!("\n{}\n", reply),
            Ok(None) => println!("\n(no reply)\n"),
            Err(e) => {
                tracing::error!(error = %e, room = %self.room, "Turn failed");
                println!("\n{}\n", APOLOGY);
            }
        }
    }

    async fn handle_command(&self, command: SlashCommand) -> Flow {
        let result = match command {
            SlashCommand::Quit => return Flow::Quit,
            SlashCommand::Help => {
                print_help();
                Ok(())
            }
            SlashCommand::Reset => self
                .engine
                .reset_one(&self.room, true)
                .await
                .map(|_| println!("Conversation reset.")),
            SlashCommand::ResetAll => self
                .engine
                .reset_all(true)
                .await
                .map(|_| println!("All conversations reset.")),
            SlashCommand::Memories => self.engine.list_memories(&self.room).await.map(|memories| {
                if memories.is_empty() {
                    println!("No memories yet.");
                }
                for (i, m) in memories.iter().rev().enumerate() {
                    println!("{:>3}. {}  ({})", i + 1, m.text, m.created_at.format("%Y-%m-%d"));
                }
            }),
            SlashCommand::Forget(text) => self
                .engine
                .forget_memory(&self.room, &text)
                .await
                .map(|removed| println!("Removed {} memor{}.", removed, plural(removed))),
            SlashCommand::Search(keyword) => {
                self.engine
                    .search_memories(&self.room, &keyword)
                    .await
                    .map(|hits| {
                        if hits.is_empty() {
                            println!("No memories match '{}'.", keyword);
                        }
                        for m in hits {
                            println!("  - {}", m.text);
                        }
                    })
            }
            SlashCommand::Stats => self.engine.conversation_stats(&self.room).await.map(|s| {
                println!("Turns in context: {}", s.cached_turns);
                println!("Turns stored:     {}", count_or_dash(s.stored_turns));
                println!("Memories:         {}", count_or_dash(s.memories));
            }),
            SlashCommand::Prune(days) => self
                .engine
                .prune_history(days)
                .await
                .map(|removed| println!("Pruned {} turns older than {} days.", removed, days)),
        };

        if let Err(e) = result {
            report(&e);
        }
        Flow::Continue
    }
}

fn report(e: &ChatError) {
    match e {
        ChatError::Config(message) => eprintln!("Not available: {}", message),
        other => eprintln!("[Error] {}", other),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "y" } else { "ies" }
}

fn count_or_dash(count: Option<usize>) -> String {
    count.map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn print_help() {
    println!("Commands:");
    println!("  /reset           Forget this room's context and stored history");
    println!("  /reset-all       Same for every room");
    println!("  /memories        List what the bot remembers about this room");
    println!("  /forget <text>   Delete a memory by its exact text");
    println!("  /search <word>   Find memories containing a keyword");
    println!("  /stats           Show turn and memory counts");
    println!("  /prune [days]    Delete stored history older than N days (default {})", DEFAULT_PRUNE_DAYS);
    println!("  /quit            Exit");
    println!();
}
