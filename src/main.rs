use anyhow::{Context, Result};
use askdb::{ConnectRequest, ExecutionReport, Gateway, GatewayConfig, GenerateOutcome, SessionId};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask questions of a SQL database in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and list the tables of the database
    Tables {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Interactive session: type a question to generate SQL, `:run` to execute it
    Repl {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// OpenAI API key (or set OPENAI_API_KEY env var)
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Args)]
struct ConnectionArgs {
    /// Full connection string; takes precedence over the individual parts
    #[arg(long)]
    connection_string: Option<String>,

    /// Database type: mysql or postgresql
    #[arg(long)]
    db_type: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    database: Option<String>,
}

impl From<ConnectionArgs> for ConnectRequest {
    fn from(args: ConnectionArgs) -> Self {
        ConnectRequest {
            connection_string: args.connection_string,
            db_type: args.db_type,
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
            database: args.database,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askdb=info")),
        )
        .init();

    let cli = Cli::parse();
    let gateway = std::sync::Arc::new(Gateway::with_llm_client(config));

    match cli.command {
        Command::Tables { connection } => {
            let session = gateway.open_session();
            let tables = gateway
                .register_connection(session, connection.into())
                .await
                .context("could not connect")?;
            for table in tables {
                println!("{table}");
            }
            gateway.close_session(session).await;
        }
        Command::Repl { connection, api_key } => {
            let session = gateway.open_session();
            let tables = gateway
                .register_connection(session, connection.into())
                .await
                .context("could not connect")?;
            info!("Connected; {} table(s)", tables.len());

            let api_key = api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .unwrap_or_else(|| askdb::llm::DUMMY_API_KEY.to_string());
            gateway.set_credential(session, &api_key)?;

            let reaper = gateway.spawn_idle_reaper(Duration::from_secs(60));
            repl(&gateway, session).await?;
            reaper.abort();
            gateway.close_session(session).await;
        }
    }

    Ok(())
}

async fn repl(gateway: &Gateway, session: SessionId) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"askdb> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":tables" => match gateway.list_tables(session).await {
                Ok(tables) => println!("{}", tables.join("\n")),
                Err(e) => error!("{e}"),
            },
            ":schema" => match gateway.describe_schema(session).await {
                Ok(schema) => println!("{schema}"),
                Err(e) => error!("{e}"),
            },
            ":run" => match gateway.execute_query(session).await {
                Ok(report) => print_report(&report)?,
                Err(e) => error!("{e}"),
            },
            question => match gateway.generate_query(session, question).await {
                Ok(GenerateOutcome::Acknowledged { reply }) => println!("{reply}"),
                Ok(GenerateOutcome::Generated { query, refusal: true }) => println!("{query}"),
                Ok(GenerateOutcome::Generated { query, .. }) => {
                    println!("{query}");
                    println!("(type :run to execute)");
                }
                Err(e) => error!("{e}"),
            },
        }
    }
    Ok(())
}

fn print_report(report: &ExecutionReport) -> Result<()> {
    if report.rows.is_empty() {
        println!("{} row(s) affected", report.rows_affected);
    } else {
        println!("{}", report.columns.join(" | "));
        for row in &report.rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    println!("\n{}", report.explanation);
    Ok(())
}
