use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::chat::Session;
use crate::core::ConfigStore;
use crate::openai::{Message, Role};

pub fn format_message(msg: &Message) -> String {
    let prefix = match msg.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    format!("[{}] {}", prefix, msg.content)
}

fn print_new_messages(rx: &mut mpsc::UnboundedReceiver<Message>) {
    while let Ok(msg) = rx.try_recv() {
        // The user already sees what they typed at the prompt
        if msg.role != Role::User {
            println!("{}", format_message(&msg));
        }
    }
}

pub async fn run(store: &dyn ConfigStore) -> Result<()> {
    let config = store.load()?;
    if config.base_url.is_empty() {
        println!("No base URL set, run `settings set --base-url <url>` first");
        return Ok(());
    }

    let mut rl = DefaultEditor::new()?;
    let mut session = Session::builder(config).build()?;
    let mut updates = session.subscribe();

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line == "/history" {
                    for msg in session.transcript().iter() {
                        println!("{}", format_message(msg));
                    }
                    continue;
                }

                session.send_and_wait(line).await?;
                print_new_messages(&mut updates);
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
