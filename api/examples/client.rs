//! Sends one PDF and one question to a running server.
//!
//! cargo run -p chat_api --example client -- policy.pdf "Is knee surgery covered?"

use reqwest::multipart::{Form, Part};
use reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(pdf_path), Some(query)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: client <file.pdf> <question>");
    };
    let base_url =
        std::env::var("CHAT_API_URL").unwrap_or_else(|_| "http://127.0.0.1:5000".to_string());

    let client = Client::new();

    let health = client.get(format!("{}/health", base_url)).send().await?;
    println!("Health: {}", health.status());

    let data = tokio::fs::read(&pdf_path).await?;
    let filename = std::path::Path::new(&pdf_path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());

    let form = Form::new()
        .part("pdf", Part::bytes(data).file_name(filename).mime_str("application/pdf")?)
        .text("query", query);

    let response = client
        .post(format!("{}/chat", base_url))
        .multipart(form)
        .send()
        .await?;

    println!("Status: {}", response.status());
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}
