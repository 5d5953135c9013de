use anyhow::{anyhow, bail, Context, Result};
use crossterm::{
    cursor, execute,
    terminal::{self, ClearType},
};
use dotenv::dotenv;
use gemini_chat::{
    config::AppConfig,
    logging,
    response_card::ResponseCard,
    AnyGenerativeClient, ChatSession, GenerativeClient, Rejected, SingleTurnSession,
    SingleTurnState, Transcript, TurnHandle,
};
use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Chat,
    Ask,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    mode: Mode,
    mock: bool,
    /// Simulated latency for the mock client, in milliseconds
    mock_delay: u64,
    config: Option<PathBuf>,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args {
        mode: Mode::Chat,
        mock: false,
        mock_delay: 0,
        config: None,
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "chat" => parsed.mode = Mode::Chat,
            "ask" => parsed.mode = Mode::Ask,
            "--mock" => parsed.mock = true,
            "--mock-delay" => {
                let ms = args.next().ok_or_else(|| anyhow!("--mock-delay needs milliseconds"))?;
                parsed.mock_delay = ms
                    .parse()
                    .with_context(|| format!("Invalid --mock-delay value: {}", ms))?;
                parsed.mock = true;
            }
            "--config" => {
                let path = args.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                parsed.config = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {}\nUsage: gemini-chat [chat|ask] [--mock] [--mock-delay <ms>] [--config <path>]", other),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = parse_args(env::args().skip(1))?;
    let _log_guard = logging::init(Path::new("."))?;
    let config = AppConfig::load(args.config.as_deref())?;

    let client: Arc<dyn GenerativeClient> = if args.mock {
        Arc::new(AnyGenerativeClient::new_mock(args.mock_delay))
    } else {
        Arc::new(AnyGenerativeClient::new_gemini(&config)?)
    };
    tracing::info!(client = client.client_name(), model = client.model(), mode = ?args.mode, "starting");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let card = ResponseCard::new();
    match args.mode {
        Mode::Chat => run_chat(ChatSession::chat(client, config.settings.empty_response), &card, &mut input).await,
        Mode::Ask => run_ask(SingleTurnSession::single_turn(client, config.settings.empty_response), &card, &mut input).await,
    }
}

fn clear_screen(title: &str) -> Result<()> {
    execute!(io::stdout(), terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    println!("{}", title);
    println!("{}", "=".repeat(title.len()));
    Ok(())
}

async fn read_prompt(input: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    print!("> ");
    io::stdout().flush()?;
    Ok(input.next_line().await?)
}

fn save_transcript(transcript: &Transcript, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(transcript)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Wait for a turn to land. Returns false if the user interrupted.
async fn wait_for(turn: TurnHandle) -> bool {
    tokio::select! {
        _ = turn.finished() => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

fn print_help(mode: Mode) {
    println!("Commands:");
    println!("  /help    - Show this help");
    println!("  /clear   - Clear the screen");
    match mode {
        Mode::Chat => println!("  /save    - Save the transcript as JSON: /save <path>"),
        Mode::Ask => println!("  /retry   - Ask the last question again"),
    }
    println!("  /quit    - Exit");
}

async fn run_chat(
    session: ChatSession,
    card: &ResponseCard,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    let view = session.subscribe();
    clear_screen(&format!("Gemini Chat ({})", session.client_name()))?;
    println!("Type a message, or /help for commands.");
    println!();

    while let Some(line) = read_prompt(input).await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" | "/q" => break,
            "/help" | "/h" => {
                print_help(Mode::Chat);
                continue;
            }
            "/clear" | "/cls" => {
                clear_screen("Gemini Chat")?;
                continue;
            }
            _ => {}
        }
        if let Some(path) = line.strip_prefix("/save") {
            let path = path.trim();
            if path.is_empty() {
                println!("Usage: /save <path>");
            } else {
                match save_transcript(&view.snapshot(), Path::new(path)) {
                    Ok(()) => println!("Transcript saved to {}", path),
                    Err(e) => println!("Could not save transcript: {:#}", e),
                }
            }
            continue;
        }

        let shown = view.snapshot().len();
        let turn = match session.submit(line) {
            Ok(turn) => turn,
            Err(Rejected::Busy) => {
                println!("Still waiting for the previous reply.");
                continue;
            }
            Err(reason) => {
                tracing::debug!(%reason, "input ignored");
                continue;
            }
        };
        card.print(&card.render_messages(view.snapshot()[shown..].iter()))?;

        if !wait_for(turn).await {
            session.close();
            println!("\nInterrupted.");
            break;
        }

        // The user bubble is already on screen; show what the turn produced.
        let transcript = view.snapshot();
        let produced = transcript
            .get(shown + 1..)
            .unwrap_or_default()
            .iter()
            .filter(|m| !m.text.is_empty());
        card.print(&card.render_messages(produced))?;
    }

    println!("Goodbye!");
    Ok(())
}

async fn run_ask(
    session: SingleTurnSession,
    card: &ResponseCard,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    let mut view = session.subscribe();
    let mut last_prompt: Option<String> = None;
    clear_screen(&format!("Gemini Q&A ({})", session.client_name()))?;
    card.print(&card.render_state(&view.snapshot()))?;

    while let Some(line) = read_prompt(input).await? {
        let line = line.trim().to_string();
        let turn = match line.as_str() {
            "" => continue,
            "/quit" | "/exit" | "/q" => break,
            "/help" | "/h" => {
                print_help(Mode::Ask);
                continue;
            }
            "/clear" | "/cls" => {
                clear_screen("Gemini Q&A")?;
                continue;
            }
            "/retry" => match &last_prompt {
                Some(prompt) => session.retry(prompt),
                None => {
                    println!("Nothing to retry yet.");
                    continue;
                }
            },
            _ => {
                last_prompt = Some(line.clone());
                session.ask(&line)
            }
        };

        let turn = match turn {
            Ok(turn) => turn,
            Err(reason) => {
                println!("Not sent: {}", reason);
                continue;
            }
        };
        view.changed().await;
        card.print(&card.render_state(&view.snapshot()))?;

        if !wait_for(turn).await {
            session.close();
            println!("\nInterrupted.");
            break;
        }
        let state = view.snapshot();
        if state != SingleTurnState::Loading {
            card.print(&card.render_state(&state))?;
        }
    }

    println!("Goodbye!");
    Ok(())
}
