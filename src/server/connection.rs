use crate::common::matching::{self, FilterState, SearchCriteria};
use crate::common::models::{NewGroup, NewInvitation, ProfileUpdate};
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::error::CoreError;
use crate::server::{auth, groups, invitations, profiles};
use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

// Optional TLS
use rustls::ServerConfig as RustlsConfig;
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio_rustls::TlsAcceptor;

pub struct Server {
    pub db: Arc<Database>,
    pub config: ServerConfig,
}

impl Server {
    /// Configure a TLS acceptor from TLS_CERT_PATH / TLS_KEY_PATH.
    fn setup_tls_acceptor(&self) -> anyhow::Result<Option<TlsAcceptor>> {
        if !self.config.enable_encryption {
            return Ok(None);
        }

        let cert_path = std::env::var("TLS_CERT_PATH")
            .map_err(|_| anyhow::anyhow!("TLS_CERT_PATH environment variable not set"))?;
        let key_path = std::env::var("TLS_KEY_PATH")
            .map_err(|_| anyhow::anyhow!("TLS_KEY_PATH environment variable not set"))?;

        let cert_file = File::open(&cert_path)
            .map_err(|e| anyhow::anyhow!("Failed to open certificate file '{}': {}", cert_path, e))?;
        let mut cert_reader = StdBufReader::new(cert_file);
        let cert_chain = certs(&mut cert_reader)?
            .into_iter()
            .map(rustls::Certificate)
            .collect::<Vec<_>>();
        if cert_chain.is_empty() {
            return Err(anyhow::anyhow!("No certificates found in {}", cert_path));
        }

        let key_file = File::open(&key_path)
            .map_err(|e| anyhow::anyhow!("Failed to open private key file '{}': {}", key_path, e))?;
        let mut key_reader = StdBufReader::new(key_file);
        // Try PKCS8 first, then RSA
        let mut keys = pkcs8_private_keys(&mut key_reader)?;
        if keys.is_empty() {
            let key_file = File::open(&key_path)?;
            let mut key_reader = StdBufReader::new(key_file);
            keys = rsa_private_keys(&mut key_reader)?;
        }
        if keys.is_empty() {
            return Err(anyhow::anyhow!("No private keys found in {}", key_path));
        }

        let priv_key = rustls::PrivateKey(keys.remove(0));
        let rustls_cfg = RustlsConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(cert_chain, priv_key)
            .map_err(|e| anyhow::anyhow!("TLS configuration error: {}", e))?;
        Ok(Some(TlsAcceptor::from(std::sync::Arc::new(rustls_cfg))))
    }

    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("[SERVER] Listening on {}", addr);
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let tls_acceptor = match self.setup_tls_acceptor() {
            Ok(Some(acceptor)) => {
                info!("[TLS] TLS enabled and configured successfully");
                Some(acceptor)
            }
            Ok(None) => {
                info!("[TLS] TLS disabled; connections will be plain TCP");
                None
            }
            Err(e) => {
                warn!("[TLS] TLS configuration failed: {}; falling back to plain TCP", e);
                None
            }
        };

        let limiter = Arc::new(Semaphore::new(self.config.max_clients));
        loop {
            let (stream, peer) = listener.accept().await?;
            // Connections over the limit are closed without service.
            let permit = match limiter.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("[SERVER] Connection limit ({}) reached, rejecting {}", self.config.max_clients, peer);
                    drop(stream);
                    continue;
                }
            };
            info!("[SERVER] New connection from {}", peer);
            let db = self.db.clone();
            let config = self.config.clone();
            let acceptor = tls_acceptor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Some(acceptor) = acceptor {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            if let Err(e) = handle_socket(db, config, tls_stream, peer).await {
                                error!("[SERVER] Client error (tls {}): {}", peer, e);
                            }
                        }
                        Err(e) => error!("[SERVER] TLS accept failed: {}", e),
                    }
                } else if let Err(e) = handle_socket(db, config, stream, peer).await {
                    error!("[SERVER] Client error ({}): {}", peer, e);
                }
            });
        }
    }

    pub async fn handle_command(&self, cmd: &str, args: &[&str], filters: &mut FilterState) -> String {
        info!("[SERVER] Received command: {} ({} args)", cmd, args.len());
        match cmd {
            // ACCOUNTS & SESSIONS
            "/register" if args.len() == 2 => {
                match auth::register(self.db.clone(), args[0], args[1], &self.config).await {
                    Ok(session) => format!("OK: Registered as {} SESSION: {}", session.username, session.session_token),
                    Err(e) => render_error(e),
                }
            }
            "/login" if args.len() == 2 => {
                match auth::login(self.db.clone(), args[0], args[1], &self.config).await {
                    Ok(session) => format!("OK: Logged in as {} SESSION: {}", session.username, session.session_token),
                    Err(e) => render_error(e),
                }
            }
            "/logout" if args.len() == 1 => match auth::logout(self.db.clone(), args[0]).await {
                Ok(()) => "OK: Logged out".to_string(),
                Err(e) => render_error(e),
            },
            "/validate_session" if args.len() == 1 => {
                match auth::validate_session(self.db.clone(), args[0]).await {
                    Some(uid) => format!("OK: {}", uid),
                    None => invalid_session(),
                }
            }

            // PROFILES
            "/save_profile" if args.len() >= 2 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                let update: ProfileUpdate = match parse_payload(&args[1..]) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                match profiles::upsert_profile(self.db.clone(), &uid, update).await {
                    Ok(profile) => render_json(&profile),
                    Err(e) => render_error(e),
                }
            }
            "/my_profile" if args.len() == 1 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                match profiles::get_profile(self.db.clone(), &uid).await {
                    Ok(profile) => render_json(&profile),
                    Err(e) => render_error(e),
                }
            }
            "/get_profile" if args.len() == 2 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                match profiles::get_profile(self.db.clone(), args[1]).await {
                    Ok(profile) => render_json(&profile),
                    Err(e) => render_error(e),
                }
            }
            "/list_profiles" if args.len() == 1 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                match profiles::list_profiles(self.db.clone()).await {
                    Ok(all) => render_json(&all),
                    Err(e) => render_error(e),
                }
            }

            // PROFILE SEARCH (draft/applied filter state)
            "/search_draft" if args.len() >= 2 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                let criteria: SearchCriteria = match parse_payload(&args[1..]) {
                    Ok(c) => c,
                    Err(resp) => return resp,
                };
                filters.edit(criteria);
                render_json(&filters.draft)
            }
            "/search_apply" if args.len() == 1 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                filters.apply();
                match profiles::list_profiles(self.db.clone()).await {
                    Ok(all) => {
                        let matched = matching::filter_profiles(&filters.applied, &all);
                        render_json(&matched)
                    }
                    Err(e) => render_error(e),
                }
            }
            "/available_from" if args.len() == 2 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                let from = match NaiveDate::parse_from_str(args[1], "%Y-%m-%d") {
                    Ok(d) => d,
                    Err(_) => return format!("ERR: Invalid date '{}', expected YYYY-MM-DD", args[1]),
                };
                match profiles::list_profiles(self.db.clone()).await {
                    Ok(all) => {
                        let matched = matching::profiles_available_from(from, &all);
                        render_json(&matched)
                    }
                    Err(e) => render_error(e),
                }
            }

            // GROUPS
            "/create_group" if args.len() >= 2 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                let new: NewGroup = match parse_payload(&args[1..]) {
                    Ok(g) => g,
                    Err(resp) => return resp,
                };
                match groups::create_group(self.db.clone(), &uid, new).await {
                    Ok(group) => render_json(&group),
                    Err(e) => render_error(e),
                }
            }
            "/list_groups" if args.len() == 1 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                match groups::list_groups(self.db.clone()).await {
                    Ok(all) => render_json(&all),
                    Err(e) => render_error(e),
                }
            }
            "/find_groups" if args.len() == 1 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                // No saved profile means no skills: only open groups match.
                let skills = match profiles::get_profile(self.db.clone(), &uid).await {
                    Ok(profile) => profile.skills,
                    Err(CoreError::NotFound(_)) => vec![],
                    Err(e) => return render_error(e),
                };
                match groups::list_groups(self.db.clone()).await {
                    Ok(all) => {
                        let matched = matching::matching_groups(&skills, &all);
                        render_json(&matched)
                    }
                    Err(e) => render_error(e),
                }
            }
            "/group_members" if args.len() == 2 => {
                if let Err(resp) = self.require_session(args[0]).await {
                    return resp;
                }
                match groups::group_members(self.db.clone(), args[1]).await {
                    Ok(members) => render_json(&members),
                    Err(e) => render_error(e),
                }
            }

            // INVITATIONS
            "/send_invite" if args.len() >= 2 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                let new: NewInvitation = match parse_payload(&args[1..]) {
                    Ok(i) => i,
                    Err(resp) => return resp,
                };
                match invitations::send_invitation(self.db.clone(), &uid, new, &self.config).await {
                    Ok(id) => format!("OK: Invitation {} sent", id),
                    Err(e) => render_error(e),
                }
            }
            "/my_invites" if args.len() == 1 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                match invitations::pending_invitations(self.db.clone(), &uid).await {
                    Ok(pending) => render_json(&pending),
                    Err(e) => render_error(e),
                }
            }
            "/accept_invite" if args.len() == 2 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                let id = match args[1].parse::<i64>() {
                    Ok(id) => id,
                    Err(_) => return format!("ERR: Invalid invitation id '{}'", args[1]),
                };
                match invitations::accept_invitation(self.db.clone(), &uid, id).await {
                    Ok(()) => "OK: Invitation accepted".to_string(),
                    Err(e) => render_error(e),
                }
            }
            "/decline_invite" if args.len() == 2 => {
                let uid = match self.require_session(args[0]).await {
                    Ok(uid) => uid,
                    Err(resp) => return resp,
                };
                let id = match args[1].parse::<i64>() {
                    Ok(id) => id,
                    Err(_) => return format!("ERR: Invalid invitation id '{}'", args[1]),
                };
                match invitations::decline_invitation(self.db.clone(), &uid, id).await {
                    Ok(()) => "OK: Invitation declined".to_string(),
                    Err(e) => render_error(e),
                }
            }

            // SYSTEM
            "/help" => help_text(),
            "/quit" => "OK: Disconnected".to_string(),
            _ => "ERR: Unknown command or wrong arguments (try /help)".to_string(),
        }
    }

    async fn require_session(&self, token: &str) -> Result<String, String> {
        auth::validate_session(self.db.clone(), token)
            .await
            .ok_or_else(invalid_session)
    }
}

fn invalid_session() -> String {
    "ERR: Invalid or expired session".to_string()
}

fn render_error(err: CoreError) -> String {
    format!("ERR: {}", err)
}

fn render_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format!("OK: {}", json),
        Err(e) => format!("ERR: Serialization failed: {}", e),
    }
}

// JSON payloads may contain spaces, so they arrive split; rejoin first.
fn parse_payload<T: serde::de::DeserializeOwned>(args: &[&str]) -> Result<T, String> {
    let raw = args.join(" ");
    serde_json::from_str(&raw).map_err(|e| format!("ERR: Invalid payload: {}", e))
}

fn help_text() -> String {
    "Available commands:\n\
    /register <username> <password>\n\
    /login <username> <password>\n\
    /logout <session>\n\
    /validate_session <session>\n\
    /save_profile <session> <json>\n\
    /my_profile <session>\n\
    /get_profile <session> <profile_id>\n\
    /list_profiles <session>\n\
    /search_draft <session> <json>\n\
    /search_apply <session>\n\
    /available_from <session> <YYYY-MM-DD>\n\
    /create_group <session> <json>\n\
    /list_groups <session>\n\
    /find_groups <session>\n\
    /group_members <session> <group_id>\n\
    /send_invite <session> <json>\n\
    /my_invites <session>\n\
    /accept_invite <session> <invitation_id>\n\
    /decline_invite <session> <invitation_id>\n\
    /help\n\
    /quit\n"
        .to_string()
}

/// One protocol loop per connection, shared by the plain and TLS paths.
/// Each connection carries its own search FilterState.
async fn handle_socket<S>(
    db: Arc<Database>,
    config: ServerConfig,
    stream: S,
    peer: std::net::SocketAddr,
) -> anyhow::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut line = String::new();
    let mut filters = FilterState::default();
    let mut authenticated_user: Option<String> = None;
    let server = Server { db, config };

    loop {
        line.clear();
        // Bound the read itself, so a newline-free stream cannot grow the
        // buffer past the limit before the check runs.
        let n = {
            let mut limited = (&mut reader).take(server.config.max_line_length as u64 + 1);
            limited.read_line(&mut line).await?
        };
        if n == 0 {
            info!("[SERVER] Client disconnected: {}", peer);
            break;
        }
        if line.len() > server.config.max_line_length {
            warn!("[SERVER] Oversized line from {}, closing connection", peer);
            writer.write_all(b"ERR: Line too long\n").await?;
            writer.flush().await?;
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        let response = server.handle_command(cmd, &args, &mut filters).await;

        // Remember who this connection belongs to, for the teardown event.
        if response.contains("SESSION:") {
            if let Some(tok) = response.split("SESSION:").nth(1) {
                let token = tok.trim();
                if let Some(uid) = auth::validate_session(server.db.clone(), token).await {
                    authenticated_user = Some(uid);
                }
            }
        }
        if cmd == "/validate_session" && args.len() == 1 && response.starts_with("OK:") {
            authenticated_user = Some(response.trim_start_matches("OK:").trim().to_string());
        }

        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        if cmd == "/quit" {
            info!("[SERVER] Client quit: {}", peer);
            break;
        }
    }

    if let Some(uid) = authenticated_user {
        auth::record_session_event(server.db.clone(), &uid, "quit").await;
        info!("[SERVER] Connection for user {} ended; recorded quit event", uid);
    }
    Ok(())
}
