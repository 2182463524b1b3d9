use dbchat::agent::{AgencyLevel, Session, SessionOptions, TurnOutcome, TurnReport};
use dbchat::config::Config;
use dbchat::db::{init_pool, MySqlExecutor, SqlExecutor};
use dbchat::llm::{ChatModel, LlmClient};
use dbchat::render::format_outcome;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbchat")]
#[command(about = "Browse a MySQL database and let an AI assistant draft or run SQL")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Agency level: draft-only, moderate or full-autonomy (or set DBCHAT_AGENCY)
    #[arg(long, global = true)]
    agency: Option<AgencyLevel>,

    /// Model id (or set OPENAI_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum tool calls per turn (or set DBCHAT_MAX_TOOL_CALLS)
    #[arg(long, global = true)]
    max_tool_calls: Option<usize>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat with the assistant
    Chat,
    /// Send a single message and print the outcome
    Ask {
        /// The message for the assistant
        message: String,
    },
    /// Run SQL directly and print the result
    Query {
        /// The SQL to run
        sql: String,
    },
    /// Print the database schema as the assistant sees it
    Schema,
    /// Draft SQL for a request without running it
    Generate {
        /// What the query should do, in plain language
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = Config::from_env()?;
    if let Some(level) = args.agency {
        config.agency_level = level;
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }
    if let Some(max) = args.max_tool_calls {
        config.max_tool_calls = max;
    }

    let pool = init_pool(&config.db)
        .await
        .context("Failed to connect to MySQL")?;
    let executor: Arc<dyn SqlExecutor> = Arc::new(MySqlExecutor::new(pool));

    match args.command {
        Commands::Query { sql } => {
            let outcome = executor.execute(&sql).await?;
            print!("{}", format_outcome(&outcome));
            Ok(())
        }
        Commands::Schema => {
            let snapshot = executor.fetch_schema().await?;
            print!("{}", snapshot.to_context());
            Ok(())
        }
        Commands::Chat => run_chat(new_session(&config, executor)?).await,
        Commands::Ask { message } => {
            let mut session = new_session(&config, executor)?;
            let report = session.send(&message).await?;
            print_report(&report);
            Ok(())
        }
        Commands::Generate { request } => {
            let mut session = new_session(&config, executor)?;
            println!("{}", session.generate_sql(&request).await?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn new_session(config: &Config, executor: Arc<dyn SqlExecutor>) -> Result<Session> {
    let llm = LlmClient::from_config(&config.llm)?;
    info!("Using model {} at {} agency", llm.model(), config.agency_level);
    let model: Arc<dyn ChatModel> = Arc::new(llm);
    Ok(Session::new(model, executor, SessionOptions::from_config(config)))
}

enum Flow {
    Continue,
    Quit,
}

const CHAT_HELP: &str = "\
Type a message to talk to the assistant. Commands:
  :run [sql]       run the drafted query (or your edited version of it)
  :sql <sql>       run SQL yourself
  :retry           retry after a failed model call
  :reset           clear the conversation
  :schema          show the schema the assistant sees
  :refresh         reload the schema from the database
  :agency [level]  show or set the agency level (draft-only, moderate, full-autonomy)
  :help            show this help
  :quit            exit";

async fn run_chat(mut session: Session) -> Result<()> {
    println!("dbchat: agency level {}. Type :help for commands.", session.agency_level());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            match handle_command(&mut session, command).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => eprintln!("Error: {}", e),
            }
            continue;
        }

        match session.send(line).await {
            Ok(report) => print_report(&report),
            Err(e) => report_error(&session, &e),
        }
    }
    Ok(())
}

async fn handle_command(session: &mut Session, command: &str) -> Result<Flow> {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "q" | "quit" | "exit" => return Ok(Flow::Quit),
        "h" | "help" => println!("{}", CHAT_HELP),
        "run" => {
            let edited = (!rest.is_empty()).then_some(rest);
            match session.confirm_draft(edited).await {
                Ok(report) => print_report(&report),
                Err(e) => report_error(session, &e),
            }
        }
        "sql" => {
            if rest.is_empty() {
                println!("Usage: :sql <query>");
            } else {
                let outcome = session.run_manual_query(rest).await?;
                print!("{}", format_outcome(&outcome));
            }
        }
        "retry" => match session.retry().await {
            Ok(report) => print_report(&report),
            Err(e) => report_error(session, &e),
        },
        "reset" => {
            session.reset();
            println!("Conversation cleared.");
        }
        "schema" => print!("{}", session.schema_context().await),
        "refresh" => {
            let snapshot = session.refresh_schema().await?;
            println!("Schema reloaded: {} table(s).", snapshot.table_count());
        }
        "agency" => {
            if !rest.is_empty() {
                session.set_agency_level(rest.parse()?);
            }
            println!("Agency level: {}", session.agency_level());
        }
        other => println!("Unknown command ':{}'. Type :help for commands.", other),
    }
    Ok(Flow::Continue)
}

fn report_error(session: &Session, error: &dbchat::DbChatError) {
    eprintln!("Error: {}", error);
    if session.can_retry() {
        eprintln!("Your conversation is intact; type :retry to try again.");
    }
}

fn print_report(report: &TurnReport) {
    for executed in &report.executions {
        println!("\nRan {} query: {}", executed.kind, executed.query);
        match &executed.result {
            Ok(outcome) => print!("{}", format_outcome(outcome)),
            Err(error) => println!("Query failed: {}", error),
        }
    }

    match &report.outcome {
        TurnOutcome::Answer(text) => println!("\nAI:\n{}\n", text),
        TurnOutcome::Draft(draft) => {
            println!("\nDrafted {} query (not run):\n  {}", draft.kind, draft.query);
            println!("Run it with :run, or :run <edited sql>. Typing a message continues the chat instead.\n");
        }
        TurnOutcome::Clarification(question) => println!("\nAI asks:\n{}\n", question),
        TurnOutcome::ToolLimitReached { limit } => println!(
            "\nStopped after {} tool calls in one turn. Send a message to continue.\n",
            limit
        ),
    }
}

