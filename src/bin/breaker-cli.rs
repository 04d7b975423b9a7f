use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "breaker-cli")]
#[command(about = "Management CLI for the queue circuit breaker", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:7013")]
    url: String,

    /// Path prefix of the circuit resources.
    #[arg(short, long, default_value = "/queuecircuitbreaker/circuit")]
    prefix: String,

    /// Admin API key; omit when the API is open.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all circuits with state and fail ratio
    Circuits,
    /// Show one circuit
    Info { id: String },
    /// Show the state of one circuit
    Status { id: String },
    /// Close one circuit and schedule its queues for unlocking
    Close { id: String },
    /// Close every circuit
    CloseAll,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let base = format!("{}{}", cli.url.trim_end_matches('/'), cli.prefix.trim_end_matches('/'));
    let closed = json!({ "status": "closed" });

    let request = match &cli.command {
        Commands::Circuits => client.get(format!("{}/_all", base)),
        Commands::Info { id } => client.get(format!("{}/{}", base, id)),
        Commands::Status { id } => client.get(format!("{}/{}/status", base, id)),
        Commands::Close { id } => client.put(format!("{}/{}/status", base, id)).json(&closed),
        Commands::CloseAll => client.put(format!("{}/_all/status", base)).json(&closed),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
