// End-to-end smoke run against a live quickteams server: register two
// participants, publish a profile, create a group, send an invitation and
// accept it.
use quickteams::server::config::ClientConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

async fn send_command(host: &str, command: String) -> anyhow::Result<String> {
    let stream = TcpStream::connect(host).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    let mut response = String::new();
    reader.read_line(&mut response).await?;
    Ok(response.trim().to_string())
}

fn session_token(response: &str) -> Option<String> {
    response.split("SESSION:").nth(1).map(|s| s.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ClientConfig::from_env();
    let host = format!("{}:{}", cfg.default_host, cfg.default_port);
    println!("Using host {}", host);

    let suffix = uuid::Uuid::new_v4().to_string();
    let sender = format!("sender-{}", &suffix[..8]);
    let recipient = format!("recipient-{}", &suffix[..8]);

    let resp = send_command(&host, format!("/register {} pw1", sender)).await?;
    println!("REGISTER SENDER -> {}", resp);
    let sender_tok = session_token(&resp).ok_or_else(|| anyhow::anyhow!("no session token"))?;

    let resp = send_command(&host, format!("/register {} pw2", recipient)).await?;
    println!("REGISTER RECIPIENT -> {}", resp);
    let rcpt_tok = session_token(&resp).ok_or_else(|| anyhow::anyhow!("no session token"))?;
    let resp = send_command(&host, format!("/validate_session {}", rcpt_tok)).await?;
    println!("VALIDATE -> {}", resp);
    let rcpt_id = resp.trim_start_matches("OK:").trim().to_string();

    let resp = send_command(
        &host,
        format!(
            "/save_profile {} {}",
            rcpt_tok,
            r#"{"name":"Recipient","skills":"Rust, SQL","availability":"2026-09-01","commitment":["Full-time"]}"#
        ),
    )
    .await?;
    println!("SAVE PROFILE -> {}", resp);

    let resp = send_command(
        &host,
        format!(
            "/create_group {} {}",
            sender_tok,
            r#"{"name":"Weekend Hack","project_description":"Build a thing","required_skills":"Rust"}"#
        ),
    )
    .await?;
    println!("CREATE GROUP -> {}", resp);
    let group_id = resp
        .trim_start_matches("OK:")
        .trim()
        .split("\"id\":\"")
        .nth(1)
        .and_then(|s| s.split('"').next())
        .ok_or_else(|| anyhow::anyhow!("no group id in response"))?
        .to_string();

    let payload = format!(
        r#"{{"recipient_id":"{}","group_id":"{}","project_title":"Weekend Hack","project_description":"Join us"}}"#,
        rcpt_id, group_id
    );
    let resp = send_command(&host, format!("/send_invite {} {}", sender_tok, payload)).await?;
    println!("SEND INVITE -> {}", resp);

    let resp = send_command(&host, format!("/my_invites {}", rcpt_tok)).await?;
    println!("MY INVITES -> {}", resp);
    let invite_id = resp
        .split("\"id\":")
        .nth(1)
        .and_then(|s| s.split(',').next())
        .ok_or_else(|| anyhow::anyhow!("no invitation id in response"))?
        .trim()
        .to_string();

    let resp = send_command(&host, format!("/accept_invite {} {}", rcpt_tok, invite_id)).await?;
    println!("ACCEPT -> {}", resp);

    let resp = send_command(&host, format!("/group_members {} {}", sender_tok, group_id)).await?;
    println!("MEMBERS -> {}", resp);

    Ok(())
}
