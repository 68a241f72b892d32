//! Roomcast CLI chat client.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin roomcast-client -- --project-id p1 --token secret --channel-id general
//! ```

use clap::Parser;
use roomcast_client::{
    Backoff, Client, ClientConfig, ClientError, ClientEvent, ClientHandle,
    input::{self, HELP, Input},
};
use roomcast_shared::logger::setup_logger;
use rustyline::{DefaultEditor, error::ReadlineError};

#[tokio::main]
async fn main() {
    let config = ClientConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    if let Err(e) = run(config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> Result<(), ClientError> {
    let target = config.target()?;
    let Client {
        handle,
        mut events,
        driver,
    } = Client::start(target, Backoff::new(config.backoff()));

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Message(message) => println!("{}", input::render(&message)),
                ClientEvent::State(state) => println!("* {state}"),
            }
        }
    });

    println!("{HELP}");
    let input_handle = handle.clone();
    let result = match tokio::task::spawn_blocking(move || read_input(&input_handle)).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Input task failed: {}", e);
            Ok(())
        }
    };

    // The driver may already be gone; shutting down twice is harmless.
    let _ = handle.shutdown();
    let _ = driver.await;
    printer.abort();
    result
}

fn read_input(handle: &ClientHandle) -> Result<(), ClientError> {
    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let Some(parsed) = Input::parse(&line) else {
            continue;
        };
        let _ = editor.add_history_entry(line.trim());

        match parsed {
            Input::Chat(text) => handle.send(input::chat(&text))?,
            Input::Switch(channel) => handle.switch_channel(channel)?,
            Input::Reconnect => handle.reconnect()?,
            Input::Quit => return Ok(()),
            Input::Help => println!("{HELP}"),
            Input::Unknown(command) => println!("unknown command: {command} ({HELP})"),
        }
    }
}
