//! Interactive loop: read a line, send it, print the reply.

use std::io::{BufRead, Write};

use chatdrive_core::{ChatConfig, ChatSession};
use colored::Colorize;
use tokio::sync::mpsc;

/// Open one session and talk until an empty line, EOF or Ctrl+C.
/// The browser is closed on every exit path.
pub async fn run(config: &ChatConfig) -> anyhow::Result<()> {
    println!(
        "{} ({}). Quit: empty line or Ctrl+C\n",
        "chatdrive".bold(),
        config.target.url
    );

    let mut session = ChatSession::open(config).await?;
    let result = converse(&mut session).await;
    let closed = session.close().await;
    result?;
    closed?;
    Ok(())
}

/// Read lines on a plain thread and hand them over a channel.
///
/// A blocked stdin read can't be cancelled, so it must not live on the
/// runtime: the process exits without waiting for it. The channel closes
/// on EOF, after the first read error, or once the receiver is dropped.
fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

async fn converse(session: &mut ChatSession) -> anyhow::Result<()> {
    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));

    loop {
        print!("{}", "> ".cyan());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.recv() => line.transpose()?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nBye.");
            return Ok(());
        };

        let text = line.trim();
        if text.is_empty() {
            return Ok(());
        }

        println!("{}", "Waiting for reply...".dimmed());
        // Dropping `send` on Ctrl+C stops the poll loop before the page is torn down
        tokio::select! {
            reply = session.send(text) => println!("{}\n", reply.yellow()),
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted.");
                return Ok(());
            }
        }
    }
}
