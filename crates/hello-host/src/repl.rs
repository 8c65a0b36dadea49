//! stdin command loop.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use lc_engine::{ChatEngine, EventKind};

const HELP: &str = "\
commands:
  /begin [skill] [account]  start a chat (pending destination when omitted)
  /end [alert]              end the chat
  /var <key> <value>        set a custom variable (JSON or plain text)
  /event <name>             report a visitor event
  /deflect <seconds>        report a deflected call
  /visible on|off           tell the engine whether the chat is on screen
  /disable on|off           disable or re-enable chat
  /status                   print engine state
  /quit                     leave
anything else is sent to the agent";

/// Read commands from stdin until `/quit` or end of input.
pub async fn run(engine: &ChatEngine) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(command) = line.strip_prefix('/') else {
            match engine.send_message(line).await {
                Ok(seq) => tracing::debug!(seq, "line sent"),
                Err(e) => println!("not sent: {e}"),
            }
            continue;
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        match (name, args.as_slice()) {
            ("quit", _) => break,
            ("help", _) => println!("{HELP}"),
            ("begin", []) => report(engine.begin_chat().await),
            ("begin", [skill]) => report(engine.begin_chat_with_skill(skill).await),
            ("begin", [skill, account, ..]) => report(
                engine
                    .begin_chat_with_skill_and_account(skill, account)
                    .await,
            ),
            ("end", rest) => report(engine.end_chat(rest.first() == Some(&"alert")).await),
            ("var", [key, value @ ..]) if !value.is_empty() => {
                let raw = value.join(" ");
                let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
                engine.set_custom_variable(value, key);
            }
            ("event", [name]) => engine.report_event(EventKind::from_name(name)),
            ("deflect", [secs]) => match secs.parse::<u64>() {
                Ok(secs) => engine.report_call_deflection(Duration::from_secs(secs)),
                Err(_) => println!("not a number of seconds: {secs}"),
            },
            ("visible", [flag]) => engine.set_chat_visible(*flag == "on").await,
            ("disable", [flag]) => engine.set_chat_disabled(*flag == "on"),
            ("status", _) => println!(
                "state={} enabled={} destination={} variables={}",
                engine.state(),
                engine.is_enabled(),
                engine.pending_destination(),
                engine.custom_variables().len()
            ),
            _ => println!("unknown command, /help lists them"),
        }
    }
    Ok(())
}

fn report(result: Result<(), lc_engine::EngineError>) {
    if let Err(e) = result {
        println!("{e}");
    }
}
