//! CLI for the palaver line client.
//!
//! With a raw request argument it fires that single line and prints the
//! response; without one it runs a small smoke scenario against the server
//! (signup, post to the default chat, status, open a private chat).

use clap::Parser;
use tracing_subscriber::EnvFilter;

use palaver_client::ChatClient;

#[derive(Parser, Debug)]
#[command(name = "palaver-client")]
#[command(about = "Line client for the palaver chat server")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8001")]
    port: u16,

    /// Raw request line to send, e.g. 'POST /connect ' or
    /// 'GET /status {"user_id": "..."}'
    request: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    if let Some(request) = args.request {
        let client = ChatClient::new(addr);
        let response = client.exchange(&request).await?;
        println!("{response}");
        return Ok(());
    }

    smoke_scenario(&addr).await
}

/// End-to-end walkthrough: two users, the default chat, and a private chat
/// between them.
async fn smoke_scenario(addr: &str) -> anyhow::Result<()> {
    let mut client = ChatClient::new(addr);
    let token = client.signup().await?;
    println!("signed up: {token}");

    let sent = client.send_message(None, "hello, world!", None).await?;
    println!("sent to default chat: {sent}");

    let status = client.status().await?;
    println!("status: {status}");

    let chats = client.chat_list().await?;
    println!("chats: {chats}");

    let mut other = ChatClient::new(addr);
    let other_token = other.signup().await?;
    println!("second user: {other_token}");

    let p2p = client.connect_p2p(&other_token).await?;
    let chat_id = p2p["chat_id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("no chat_id in response"))?
        .to_string();
    println!("private chat: {chat_id}");

    client.send_message(Some(&chat_id), "psst", None).await?;
    let history = other.chat_history(&chat_id, None).await?;
    println!("history: {history}");

    other.exit_chat(&chat_id).await?;
    println!("second user left the private chat");

    Ok(())
}
