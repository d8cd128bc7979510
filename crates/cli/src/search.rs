//! `r2r-search`: one-shot or interactive search and RAG against R2R.

use crate::ConnectionArgs;
use anyhow::bail;
use clap::Parser;
use owo_colors::OwoColorize as _;
use r2r_http_client::format::{extract_citations, format_search_results};
use r2r_http_client::types::{RagAnswer, RagRequest, SearchRequest, SearchResults};
use r2r_http_client::ApiClient;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};

/// Search the R2R knowledge base.
#[derive(Debug, Clone, Parser)]
#[command(name = "r2r-search", version, about)]
pub struct SearchArgs {
    /// Search query (omit with `-i`).
    pub query: Option<String>,

    /// Maximum number of results.
    #[arg(long, default_value_t = 5)]
    pub limit: u32,

    /// Ask a question with RAG instead of searching.
    #[arg(long)]
    pub rag: bool,

    /// Generation budget for RAG answers.
    #[arg(long, default_value_t = 2000)]
    pub max_tokens: u32,

    /// Print the raw JSON response.
    #[arg(long)]
    pub json: bool,

    /// Interactive mode.
    #[arg(short, long)]
    pub interactive: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Rag(String),
    Quit,
    Empty,
    /// `search` or `rag` without a query.
    Usage(String),
}

/// `search <q>`, `rag <q>`, `quit`/`exit`/`q`; anything else is searched verbatim.
#[must_use]
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q") {
        return Command::Quit;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head.to_lowercase().as_str() {
        cmd @ ("search" | "rag") if rest.is_empty() => Command::Usage(cmd.to_string()),
        "search" => Command::Search(rest.to_string()),
        "rag" => Command::Rag(rest.to_string()),
        _ => Command::Search(line.to_string()),
    }
}

const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Human-readable search output.
#[must_use]
pub fn render_search(results: &SearchResults) -> String {
    let count = results.chunk_search_results.len();
    if count == 0 {
        return format_search_results(results, None);
    }
    format!(
        "Found {count} results:\n\n{}",
        format_search_results(results, None)
    )
}

/// Answer between rules, followed by up to three citation snippets.
#[must_use]
pub fn render_rag(answer: &RagAnswer) -> String {
    let mut out = format!("Answer:\n{}\n{}\n{}\n", rule(), answer.generated_answer, rule());
    let citations = extract_citations(answer);
    if !citations.is_empty() {
        out.push_str(&format!("\nSources ({}):\n", citations.len()));
        for (i, text) in citations.iter().take(3).enumerate() {
            out.push_str(&format!("  {}. {text}\n", i + 1));
        }
    }
    out
}

async fn search(client: &ApiClient, query: &str, limit: u32, json: bool) -> anyhow::Result<()> {
    let request = SearchRequest::new(query, limit);
    let results = client.search(&request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{} '{query}'\n", "Searching for:".cyan());
        println!("{}", render_search(&results));
    }
    Ok(())
}

async fn rag(client: &ApiClient, query: &str, max_tokens: u32, json: bool) -> anyhow::Result<()> {
    let answer = client.rag(&RagRequest::new(query, max_tokens)).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{} '{query}'\n", "Asking:".cyan());
        println!("{}", render_rag(&answer));
    }
    Ok(())
}

async fn interactive(client: &ApiClient, args: &SearchArgs) -> anyhow::Result<()> {
    println!("{}", "R2R Interactive Search".bold());
    println!("{}", rule());
    println!("Commands:");
    println!("  search <query>  - Search the knowledge base");
    println!("  rag <query>     - Ask a question (RAG)");
    println!("  quit / exit     - Exit");
    println!("{}\n", rule());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let outcome = match parse_command(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Usage(cmd) => {
                println!("{} {cmd} <query>", "Usage:".yellow());
                continue;
            }
            Command::Search(query) => search(client, &query, args.limit, args.json).await,
            Command::Rag(query) => rag(client, &query, args.max_tokens, args.json).await,
        };
        if let Err(e) = outcome {
            println!("{} {e:#}", "error:".red());
        }
    }
    println!("Goodbye!");
    Ok(())
}

/// # Errors
///
/// Fails when no query is given outside interactive mode, or when a one-shot request fails.
pub async fn run(args: SearchArgs) -> anyhow::Result<()> {
    let client = args.connection.client()?;
    if args.interactive {
        return interactive(&client, &args).await;
    }
    let Some(query) = args.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        bail!("a query is required unless --interactive is set");
    };
    if args.rag {
        rag(&client, query, args.max_tokens, args.json).await
    } else {
        search(&client, query, args.limit, args.json).await
    }
}
